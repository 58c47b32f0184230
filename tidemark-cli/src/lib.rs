//! Tidemark CLI - command-line interface for Tidemark migrations.
//!
//! This crate provides the `tidemark` binary: applying and reverting
//! migrations, reporting status and scaffolding new migration files.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod output;
