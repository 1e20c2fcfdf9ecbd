//! Command-line front end and socket server for uidrive.

pub mod cli;
pub mod commands;
pub mod config;
pub mod daemon;
pub mod logging;
