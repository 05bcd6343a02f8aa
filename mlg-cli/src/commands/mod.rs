pub mod clean;
pub mod common;
pub mod install;
pub mod uninstall;
