//! CLI command implementations
//!
//! This module contains all CLI command implementations.

pub mod ingest;
pub mod init;
pub mod serve;
pub mod status;
pub mod sweep;
pub mod validate;
