//! Accumulated sweep results, owned by the scheduler.

use crate::types::{Hit, MapVariant, MatchOutcome};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

/// Default bound on the retry queue.
pub const DEFAULT_RETRY_CAPACITY: usize = 10_000;

/// Keywords whose first attempt failed, retried once after the main pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryQueue {
    capacity: usize,
    items: VecDeque<String>,
}

impl RetryQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: VecDeque::new(),
        }
    }

    /// Queue `keyword` unless the queue is full or already holds it.
    pub fn push(&mut self, keyword: &str) -> bool {
        if self.items.len() >= self.capacity || self.items.iter().any(|k| k == keyword) {
            return false;
        }
        self.items.push_back(keyword.to_string());
        true
    }

    pub fn drain(&mut self) -> Vec<String> {
        self.items.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.items.iter().cloned().collect()
    }
}

impl Default for RetryQueue {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_CAPACITY)
    }
}

/// What recording one outcome changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recorded {
    /// The new hit, when the outcome ranked and was not already known.
    pub new_hit: Option<Hit>,
    /// Whether the keyword went onto the retry queue.
    pub queued_retry: bool,
}

/// Hits, counts, and the retry queue for one sweep.
#[derive(Debug, Clone, Default)]
pub struct SweepState {
    hits: Vec<Hit>,
    keys: HashSet<(String, MapVariant)>,
    checked: u64,
    evaluated: HashSet<String>,
    retry: RetryQueue,
}

impl SweepState {
    pub fn new(retry_capacity: usize) -> Self {
        Self {
            retry: RetryQueue::new(retry_capacity),
            ..Default::default()
        }
    }

    /// Rebuild from saved hits and counts. Duplicate (keyword, variant)
    /// pairs are dropped, keeping the first.
    pub fn restore(hits: Vec<Hit>, checked: u64, retry: Vec<String>, retry_capacity: usize) -> Self {
        let mut state = Self::new(retry_capacity);
        state.checked = checked;
        let mut hits = hits;
        hits.sort_by_key(|h| h.found_order);
        for h in hits {
            state.evaluated.insert(h.keyword.clone());
            if state.keys.insert((h.keyword.clone(), h.map_variant)) {
                state.hits.push(h);
            }
        }
        for k in retry {
            state.retry.push(&k);
        }
        state
    }

    /// Apply one outcome. A failed load is queued for retry when
    /// `allow_retry` is set; every call counts toward `checked`.
    pub fn record(&mut self, keyword: &str, outcome: &MatchOutcome, allow_retry: bool) -> Recorded {
        self.checked += 1;
        let mut rec = Recorded::default();
        if outcome.load_failed {
            if allow_retry {
                rec.queued_retry = self.retry.push(keyword);
            }
            return rec;
        }
        self.evaluated.insert(keyword.to_string());
        if let (Some(rank), Some(variant)) = (outcome.rank, outcome.map_variant) {
            rec.new_hit = self.add_hit(keyword, rank, variant);
        }
        rec
    }

    /// Insert a hit unless (keyword, variant) is already present.
    pub fn add_hit(&mut self, keyword: &str, rank: u8, map_variant: MapVariant) -> Option<Hit> {
        if !self.keys.insert((keyword.to_string(), map_variant)) {
            return None;
        }
        let hit = Hit {
            keyword: keyword.to_string(),
            rank,
            map_variant,
            found_order: self.hits.len() as u32 + 1,
        };
        self.hits.push(hit.clone());
        Some(hit)
    }

    /// Hits in discovery order.
    pub fn hits(&self) -> &[Hit] {
        &self.hits
    }

    /// Hits by rank, then current before legacy, then discovery order.
    pub fn sorted_hits(&self) -> Vec<Hit> {
        let mut out = self.hits.clone();
        out.sort_by(|a, b| {
            a.rank
                .cmp(&b.rank)
                .then_with(|| b.map_variant.cmp(&a.map_variant))
                .then_with(|| a.found_order.cmp(&b.found_order))
        });
        out
    }

    pub fn hit_count(&self) -> usize {
        self.hits.len()
    }

    pub fn count_for(&self, variant: MapVariant) -> usize {
        self.hits.iter().filter(|h| h.map_variant == variant).count()
    }

    pub fn checked(&self) -> u64 {
        self.checked
    }

    /// Whether the keyword already produced a non-failed outcome.
    pub fn is_evaluated(&self, keyword: &str) -> bool {
        self.evaluated.contains(keyword)
    }

    pub fn retry_queue(&self) -> &RetryQueue {
        &self.retry
    }

    pub fn take_retries(&mut self) -> Vec<String> {
        self.retry.drain()
    }

    /// Put keywords back on the retry queue, e.g. when the retry pass is
    /// cut short.
    pub fn requeue_retries<I: IntoIterator<Item = String>>(&mut self, keywords: I) {
        for k in keywords {
            self.retry.push(&k);
        }
    }

    /// Whether `target` hits over `preferred` have been collected.
    pub fn target_reached(&self, preferred: MapVariant, target: Option<usize>) -> bool {
        match target {
            Some(n) if n > 0 => self.count_for(preferred) >= n,
            _ => false,
        }
    }
}
