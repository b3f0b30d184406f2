pub mod format;
pub mod list;
pub mod run;
