//! collector-cli library, exposing command modules for unit tests

pub mod commands;
pub mod error;
