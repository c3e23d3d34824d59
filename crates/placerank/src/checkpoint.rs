//! Checkpoint files: hits, counts, and the unconsumed candidate remainder.
//!
//! Checkpoints are pretty-printed JSON so that export tools can read and
//! write them without knowing anything about sweep internals.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::generator::{CandidateGenerator, GeneratorCursor};
use crate::state::SweepState;
use crate::supply::CandidateSupply;
use crate::types::{BusinessProfile, Candidate, Hit, PlaceRankError, PlaceRankResult};
use crate::vocabulary::Vocabulary;

/// Current checkpoint format version.
pub const FORMAT_VERSION: u32 = 1;

/// A resumable snapshot of one sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub format_version: u32,
    pub business_id: String,
    pub business_name: String,
    pub saved_at: DateTime<Utc>,
    pub checked: u64,
    pub hits: Vec<Hit>,
    #[serde(default)]
    pub remaining: Vec<String>,
    #[serde(default)]
    pub retry_queue: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generator: Option<GeneratorCursor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_left: Option<usize>,
}

impl Checkpoint {
    /// Snapshot the current sweep. `in_flight` holds keywords drawn from
    /// the supply but not yet evaluated; they go back into `remaining`.
    pub fn capture(
        profile: &BusinessProfile,
        state: &SweepState,
        supply: &CandidateSupply,
        in_flight: &[String],
    ) -> Self {
        let mut remaining: Vec<String> = in_flight
            .iter()
            .filter(|k| !state.is_evaluated(k))
            .cloned()
            .collect();
        remaining.extend(supply.remainder());
        Self {
            format_version: FORMAT_VERSION,
            business_id: profile.id.clone(),
            business_name: profile.name.clone(),
            saved_at: Utc::now(),
            checked: state.checked(),
            hits: state.sorted_hits(),
            remaining,
            retry_queue: state.retry_queue().to_vec(),
            generator: supply.cursor(),
            budget_left: supply.budget_left(),
        }
    }

    /// `<business_id>.checkpoint.json`
    pub fn file_name(business_id: &str) -> String {
        format!("{business_id}.checkpoint.json")
    }

    pub fn path_in(dir: &Path, business_id: &str) -> PathBuf {
        dir.join(Self::file_name(business_id))
    }

    /// Rebuild sweep state and a candidate supply for `profile`.
    ///
    /// Explicit remaining keywords are evaluated first; a generator cursor,
    /// when present, continues after them.
    pub fn into_resume(
        self,
        profile: &BusinessProfile,
        vocab: &Vocabulary,
        retry_capacity: usize,
    ) -> PlaceRankResult<(SweepState, CandidateSupply)> {
        if self.business_id != profile.id {
            return Err(PlaceRankError::Checkpoint(format!(
                "checkpoint is for business {}, not {}",
                self.business_id, profile.id
            )));
        }
        let state = SweepState::restore(self.hits, self.checked, self.retry_queue, retry_capacity);
        let supply = match self.generator {
            Some(mut cursor) => {
                // Unevaluated keywords go back in front of the generator.
                let mut buffered: Vec<Candidate> = self
                    .remaining
                    .into_iter()
                    .map(|phrase| Candidate { phrase, round: cursor.round })
                    .collect();
                let returned = buffered.len();
                cursor.emitted.retain(|p| !buffered.iter().any(|c| &c.phrase == p));
                buffered.append(&mut cursor.buffered);
                cursor.buffered = buffered;
                let budget = self.budget_left.map(|b| b + returned);
                let gen = CandidateGenerator::resume(profile, vocab, cursor);
                CandidateSupply::generated(gen, budget)
            }
            None => CandidateSupply::fixed(self.remaining),
        };
        Ok((state, supply))
    }
}

/// Writer for checkpoint files.
pub struct CheckpointWriter;

/// Reader for checkpoint files.
pub struct CheckpointReader;

impl CheckpointWriter {
    /// Write atomically: a sibling temp file is renamed over `path`.
    pub fn write_to_file(checkpoint: &Checkpoint, path: &Path) -> PlaceRankResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        {
            let mut file = std::fs::File::create(&tmp)?;
            Self::write_to(checkpoint, &mut file)?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn write_to<W: Write>(checkpoint: &Checkpoint, writer: &mut W) -> PlaceRankResult<()> {
        serde_json::to_writer_pretty(&mut *writer, checkpoint)?;
        writer.write_all(b"\n")?;
        Ok(())
    }
}

impl CheckpointReader {
    pub fn read_from_file(path: &Path) -> PlaceRankResult<Checkpoint> {
        let mut file = std::fs::File::open(path)?;
        Self::read_from(&mut file)
    }

    pub fn read_from<R: Read>(reader: &mut R) -> PlaceRankResult<Checkpoint> {
        let checkpoint: Checkpoint = serde_json::from_reader(reader)?;
        if checkpoint.format_version != FORMAT_VERSION {
            return Err(PlaceRankError::Checkpoint(format!(
                "unsupported format version: {}",
                checkpoint.format_version
            )));
        }
        Ok(checkpoint)
    }
}
