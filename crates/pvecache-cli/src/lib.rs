// pvecache-cli: Clap commands, HTTP surface, daemon wiring
// Depends on pvecache-core, pvecache-source, pvecache-cache

pub mod api;
pub mod commands;
pub mod display;
pub mod logging;
pub mod output;
pub mod server;

pub use commands::run;
