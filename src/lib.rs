pub mod api;
pub mod attachments;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod orchestrator;
pub mod repl;
pub mod server;
pub mod session;
pub mod tools;
pub mod ui;

#[cfg(test)]
mod test_support;
