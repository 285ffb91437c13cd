pub mod catalog;
pub mod session;

pub use catalog::{
    language_by_code, translate_targets, Language, MenuAction, MenuCommand, RewriteStyle, LANGUAGES,
};
pub use session::{MenuSession, MenuSnapshot, MenuView, Submenu};
