//! PlaceRank core: candidate generation, result resolution, and sweep state
//! for local-search rank sweeps.

pub mod checkpoint;
pub mod generator;
pub mod resolver;
pub mod state;
pub mod supply;
pub mod types;
pub mod vocabulary;

pub use checkpoint::{Checkpoint, CheckpointReader, CheckpointWriter};
pub use generator::{CandidateGenerator, GeneratorCursor};
pub use resolver::matcher::{BranchPolicy, TokenBranchPolicy};
pub use resolver::variant::{MarkupVariantClassifier, VariantClassifier};
pub use resolver::Resolver;
pub use state::SweepState;
pub use supply::CandidateSupply;
pub use types::*;
pub use vocabulary::Vocabulary;
