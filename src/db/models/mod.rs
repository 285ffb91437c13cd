pub mod setting;

pub use setting::SettingRecord;
