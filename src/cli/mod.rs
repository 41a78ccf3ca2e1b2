//! CLI subcommand implementations for the reelscan binary.

pub mod doctor;
pub mod output;
pub mod scan;
