//! CLI command modules.

pub mod connections;
pub mod http;
pub mod messages;
pub mod status;
