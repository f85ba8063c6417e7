//! Diagnostic dependency chains (order, specimen, result, report)

pub mod payload;
pub mod submitter;

pub use submitter::ChainSubmitter;
