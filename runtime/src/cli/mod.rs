//! CLI subcommand implementations for the PlaceRank binary.

pub mod batch;
pub mod doctor;
pub mod generate_cmd;
pub mod output;
pub mod resolve_cmd;
pub mod serve_cmd;
pub mod sweep_cmd;
