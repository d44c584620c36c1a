//! serial-io command line client, as a library so the command handlers
//! can be driven from tests.

pub mod args;
pub mod commands;
pub mod config;
