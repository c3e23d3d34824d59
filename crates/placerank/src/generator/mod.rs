//! Candidate Generator: an unbounded, prioritized stream of search phrases.
//!
//! Construction derives location, service, and suffix pools from the profile
//! once. Phrases are then produced round by round (see [`rounds`]) and pass a
//! filter before they are buffered. A phrase is never handed out twice by the
//! same generator.

pub mod location;
pub mod rounds;
pub mod services;

use crate::types::{BusinessProfile, Candidate};
use crate::vocabulary::Vocabulary;
use location::{LocationFilter, LocationTokens};
use rounds::{Batch, Pools};
use serde::{Deserialize, Serialize};
use services::ServiceTokens;
use std::collections::{HashSet, VecDeque};

/// Minimum phrase length, in characters.
pub const MIN_PHRASE_CHARS: usize = 2;
/// Maximum phrase length, in characters.
pub const MAX_PHRASE_CHARS: usize = 50;
/// Consecutive rounds without a new phrase before `next` gives up.
pub const NO_PROGRESS_GUARD: u32 = 100_000;

/// Exported generator position, enough to continue without repeats.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorCursor {
    /// Next round to generate.
    pub round: u32,
    /// Phrases already handed out.
    pub emitted: Vec<String>,
    /// Phrases generated but not yet handed out.
    pub buffered: Vec<Candidate>,
}

pub struct CandidateGenerator {
    category_code: String,
    pools: Pools,
    location: LocationTokens,
    stopwords: HashSet<String>,
    blocklist: Vec<String>,
    emitted: HashSet<String>,
    /// Emission order of `emitted`, kept for cursors.
    emitted_order: Vec<String>,
    pending: HashSet<String>,
    buffer: VecDeque<Candidate>,
    round: u32,
}

impl CandidateGenerator {
    pub fn new(profile: &BusinessProfile, vocab: &Vocabulary) -> Self {
        let category_code = vocab.detect_category(profile);
        let cfg = vocab.category(&category_code);
        let location = LocationTokens::derive(&profile.address, &profile.name, vocab);
        let services = ServiceTokens::derive(profile, &category_code, vocab);
        let pools = Pools::new(
            &category_code,
            profile.category_name.as_deref(),
            &profile.name,
            &location,
            &services,
            cfg,
            &vocab.phrases,
        );

        tracing::debug!(
            category = %category_code,
            prefixes = location.prefixes.len(),
            core_services = services.core.len(),
            compounds = services.compounds.len(),
            place_suffixes = services.place_suffixes.len(),
            landmarks = pools.all_landmarks.len(),
            "candidate generator ready"
        );

        Self {
            blocklist: vocab.blocklist(&category_code),
            stopwords: vocab.stopwords.clone(),
            category_code,
            pools,
            location,
            emitted: HashSet::new(),
            emitted_order: Vec::new(),
            pending: HashSet::new(),
            buffer: VecDeque::new(),
            round: 0,
        }
    }

    /// Rebuild a generator and continue from `cursor`.
    pub fn resume(profile: &BusinessProfile, vocab: &Vocabulary, cursor: GeneratorCursor) -> Self {
        let mut gen = Self::new(profile, vocab);
        gen.round = cursor.round;
        for phrase in cursor.emitted {
            if gen.emitted.insert(phrase.clone()) {
                gen.emitted_order.push(phrase);
            }
        }
        for c in cursor.buffered {
            if !gen.emitted.contains(&c.phrase) && gen.pending.insert(c.phrase.clone()) {
                gen.buffer.push_back(c);
            }
        }
        gen
    }

    /// Return up to `n` phrases never returned before.
    ///
    /// Rounds are generated until the buffer holds `n`. With a degenerate
    /// vocabulary every combination can run out; after
    /// [`NO_PROGRESS_GUARD`] rounds in a row add nothing, the call returns
    /// what it has.
    pub fn next(&mut self, n: usize) -> Vec<Candidate> {
        let mut idle_rounds = 0u32;
        while self.buffer.len() < n && idle_rounds < NO_PROGRESS_GUARD {
            let added = self.generate_round();
            if added == 0 {
                idle_rounds += 1;
            } else {
                idle_rounds = 0;
            }
        }
        if self.buffer.len() < n {
            tracing::warn!(
                round = self.round,
                wanted = n,
                have = self.buffer.len(),
                "candidate pools exhausted"
            );
        }

        let take = n.min(self.buffer.len());
        let batch: Vec<Candidate> = self.buffer.drain(..take).collect();
        for c in &batch {
            self.pending.remove(&c.phrase);
            if self.emitted.insert(c.phrase.clone()) {
                self.emitted_order.push(c.phrase.clone());
            }
        }
        batch
    }

    /// Always false: the generator never reports exhaustion.
    pub fn exhausted(&self) -> bool {
        false
    }

    /// Next round to be generated.
    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn emitted_count(&self) -> usize {
        self.emitted.len()
    }

    pub fn category_code(&self) -> &str {
        &self.category_code
    }

    pub fn location(&self) -> &LocationTokens {
        &self.location
    }

    /// Location-context filter for this generator's business.
    pub fn location_filter(&self, vocab: &Vocabulary) -> LocationFilter {
        LocationFilter::new(vocab, &self.location, &self.pools.business_name)
    }

    pub fn cursor(&self) -> GeneratorCursor {
        GeneratorCursor {
            round: self.round,
            emitted: self.emitted_order.clone(),
            buffered: self.buffer.iter().cloned().collect(),
        }
    }

    /// Run one round and buffer whatever survives the filter.
    fn generate_round(&mut self) -> usize {
        let round = self.round;
        self.round = self.round.saturating_add(1);

        let mut batch = Batch::default();
        rounds::generate(round, &self.pools, &mut batch);

        let before = self.buffer.len();
        for phrase in batch.items {
            self.offer(phrase, round);
        }
        let added = self.buffer.len() - before;
        if round % 50 == 0 {
            tracing::debug!(round, added, buffered = self.buffer.len(), emitted = self.emitted.len(), "generator round");
        }
        added
    }

    fn offer(&mut self, phrase: String, round: u32) {
        let Some(phrase) = self.accept(&phrase) else {
            return;
        };
        if self.pending.insert(phrase.clone()) {
            self.buffer.push_back(Candidate { phrase, round });
        }
    }

    /// Normalize `raw` and decide whether it may be buffered.
    fn accept(&self, raw: &str) -> Option<String> {
        let phrase = normalize_phrase(raw);
        let len = phrase.chars().count();
        if !(MIN_PHRASE_CHARS..=MAX_PHRASE_CHARS).contains(&len) {
            return None;
        }
        if self.emitted.contains(&phrase) || self.pending.contains(&phrase) {
            return None;
        }
        if phrase.split(' ').any(|t| self.stopwords.contains(t)) {
            return None;
        }
        if self.blocklist.iter().any(|b| phrase.contains(b.as_str())) {
            return None;
        }
        Some(phrase)
    }
}

/// Trim and collapse internal whitespace to single spaces.
pub fn normalize_phrase(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}
