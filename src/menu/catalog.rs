use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Backend actions the menu can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MenuAction {
    Summarize,
    Explain,
    Rewrite,
    Translate,
    XrayToggle,
}

impl MenuAction {
    pub fn wire_name(self) -> &'static str {
        match self {
            MenuAction::Summarize => "SUMMARIZE",
            MenuAction::Explain => "EXPLAIN",
            MenuAction::Rewrite => "REWRITE",
            MenuAction::Translate => "TRANSLATE",
            MenuAction::XrayToggle => "XRAY_TOGGLE",
        }
    }

    /// Menu label; without a selection the action applies to the whole page.
    pub fn label(self, has_text: bool) -> &'static str {
        match (self, has_text) {
            (MenuAction::Summarize, true) => "Summary",
            (MenuAction::Summarize, false) => "Summary All",
            (MenuAction::Explain, true) => "Explain / Define",
            (MenuAction::Explain, false) => "Explain / Define All",
            (MenuAction::Rewrite, true) => "Rewrite",
            (MenuAction::Rewrite, false) => "Rewrite All",
            (MenuAction::Translate, true) => "Translate",
            (MenuAction::Translate, false) => "Translate All",
            (MenuAction::XrayToggle, _) => "X-ray",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RewriteStyle {
    Formal,
    Concise,
    Casual,
    Friendly,
}

impl RewriteStyle {
    pub const ALL: [RewriteStyle; 4] = [
        RewriteStyle::Formal,
        RewriteStyle::Concise,
        RewriteStyle::Casual,
        RewriteStyle::Friendly,
    ];

    pub fn id(self) -> &'static str {
        match self {
            RewriteStyle::Formal => "formal",
            RewriteStyle::Concise => "concise",
            RewriteStyle::Casual => "casual",
            RewriteStyle::Friendly => "friendly",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RewriteStyle::Formal => "Formal",
            RewriteStyle::Concise => "Concise",
            RewriteStyle::Casual => "Casual",
            RewriteStyle::Friendly => "Friendly",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Language {
    pub name: &'static str,
    pub code: &'static str,
}

pub const LANGUAGES: [Language; 6] = [
    Language { name: "Spanish", code: "ES" },
    Language { name: "English", code: "EN" },
    Language { name: "French", code: "FR" },
    Language { name: "German", code: "DE" },
    Language { name: "Italian", code: "IT" },
    Language { name: "Portuguese", code: "PT" },
];

/// Languages offered in the translate submenu.
pub fn translate_targets() -> &'static [Language] {
    &LANGUAGES[..4]
}

pub fn language_by_code(code: &str) -> Option<Language> {
    LANGUAGES
        .iter()
        .copied()
        .find(|language| language.code.eq_ignore_ascii_case(code))
}

/// A fully specified menu pick: the action plus its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuCommand {
    Summarize,
    Explain,
    Rewrite(RewriteStyle),
    Translate(Language),
}

impl MenuCommand {
    pub fn action(self) -> MenuAction {
        match self {
            MenuCommand::Summarize => MenuAction::Summarize,
            MenuCommand::Explain => MenuAction::Explain,
            MenuCommand::Rewrite(_) => MenuAction::Rewrite,
            MenuCommand::Translate(_) => MenuAction::Translate,
        }
    }

    pub fn payload(self) -> Value {
        match self {
            MenuCommand::Summarize => Value::from("summary"),
            MenuCommand::Explain => Value::from("explain"),
            MenuCommand::Rewrite(style) => Value::from(style.id()),
            MenuCommand::Translate(language) => Value::from(language.name),
        }
    }
}
