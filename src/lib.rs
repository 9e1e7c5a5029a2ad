//! Layered configuration resolver library
//!
//! This module exports the core components for testing and integration.

pub mod cli;
pub mod config;
pub mod error;
pub mod format;
pub mod logging;
