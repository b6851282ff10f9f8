//! CLI subcommand implementations for the otter-harvest binary.

pub mod doctor;
pub mod harvest_cmd;
pub mod manifest_cmd;
pub mod output;
