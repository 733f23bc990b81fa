pub mod add;
pub mod auth_cmd;
pub mod collections;
pub mod common;
pub mod completions;
pub mod delete;
pub mod list;
pub mod visit;
pub mod watch;
