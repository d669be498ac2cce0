//! CLI Commands

pub mod client;
pub mod server;
