//! Where sweep candidates come from.

use crate::generator::{normalize_phrase, CandidateGenerator, GeneratorCursor};
use std::collections::{HashSet, VecDeque};

/// A bounded keyword list or a live generator.
pub enum CandidateSupply {
    /// Explicit keywords, e.g. imported or left over from a checkpoint.
    Fixed(VecDeque<String>),
    /// Generated on demand, optionally capped at `budget` keywords in total.
    Generated {
        generator: Box<CandidateGenerator>,
        budget: Option<usize>,
        drawn: usize,
    },
}

impl CandidateSupply {
    /// A fixed list, normalized, with blanks and duplicates removed.
    pub fn fixed<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let list = keywords
            .into_iter()
            .map(|k| normalize_phrase(k.as_ref()))
            .filter(|k| !k.is_empty() && seen.insert(k.clone()))
            .collect();
        Self::Fixed(list)
    }

    pub fn generated(generator: CandidateGenerator, budget: Option<usize>) -> Self {
        Self::Generated {
            generator: Box::new(generator),
            budget,
            drawn: 0,
        }
    }

    /// Up to `n` keywords; empty once the supply is spent.
    pub fn next_batch(&mut self, n: usize) -> Vec<String> {
        match self {
            Self::Fixed(list) => {
                let take = n.min(list.len());
                list.drain(..take).collect()
            }
            Self::Generated { generator, budget, drawn } => {
                let want = match budget {
                    Some(b) => n.min(b.saturating_sub(*drawn)),
                    None => n,
                };
                if want == 0 {
                    return Vec::new();
                }
                let batch: Vec<String> = generator.next(want).into_iter().map(|c| c.phrase).collect();
                *drawn += batch.len();
                batch
            }
        }
    }

    /// Keywords left, or `None` for an unbounded generator.
    pub fn remaining_len(&self) -> Option<usize> {
        match self {
            Self::Fixed(list) => Some(list.len()),
            Self::Generated { budget, drawn, .. } => budget.map(|b| b.saturating_sub(*drawn)),
        }
    }

    pub fn is_spent(&self) -> bool {
        self.remaining_len() == Some(0)
    }

    /// Unconsumed explicit keywords.
    pub fn remainder(&self) -> Vec<String> {
        match self {
            Self::Fixed(list) => list.iter().cloned().collect(),
            Self::Generated { .. } => Vec::new(),
        }
    }

    /// Generator position, for generated supplies.
    pub fn cursor(&self) -> Option<GeneratorCursor> {
        match self {
            Self::Fixed(_) => None,
            Self::Generated { generator, .. } => Some(generator.cursor()),
        }
    }

    /// Budget left for generated supplies with a cap.
    pub fn budget_left(&self) -> Option<usize> {
        match self {
            Self::Fixed(_) => None,
            Self::Generated { .. } => self.remaining_len(),
        }
    }

    /// Drop keywords for which `keep` is false. Generated supplies are
    /// filtered as they are drawn instead.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) -> Vec<String> {
        let Self::Fixed(list) = self else {
            return Vec::new();
        };
        let mut dropped = Vec::new();
        list.retain(|k| {
            let ok = keep(k);
            if !ok {
                dropped.push(k.clone());
            }
            ok
        });
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BusinessProfile;
    use crate::vocabulary::Vocabulary;

    #[test]
    fn test_fixed_supply_dedups_and_drains() {
        let mut s = CandidateSupply::fixed(["a  b", "a b", "", "c"]);
        assert_eq!(s.remaining_len(), Some(2));
        assert_eq!(s.next_batch(1), vec!["a b"]);
        assert_eq!(s.remainder(), vec!["c"]);
        assert_eq!(s.next_batch(5), vec!["c"]);
        assert!(s.is_spent());
        assert!(s.next_batch(5).is_empty());
    }

    #[test]
    fn test_generated_budget() {
        let profile = BusinessProfile {
            id: "1234567".into(),
            name: "바다 칼국수".into(),
            category_code: "food".into(),
            address: "부산광역시 수영구 광안동".into(),
            services: vec!["칼국수".into(), "수제비".into()],
            ..Default::default()
        };
        let gen = CandidateGenerator::new(&profile, Vocabulary::embedded());
        let mut s = CandidateSupply::generated(gen, Some(7));
        assert_eq!(s.next_batch(5).len(), 5);
        assert_eq!(s.next_batch(5).len(), 2);
        assert!(s.is_spent());
        assert_eq!(s.cursor().map(|c| c.emitted.len()), Some(7));
    }

    #[test]
    fn test_retain_reports_dropped() {
        let mut s = CandidateSupply::fixed(["수영구 맛집", "맛집 추천"]);
        let dropped = s.retain(|k| k.contains("수영"));
        assert_eq!(dropped, vec!["맛집 추천"]);
        assert_eq!(s.remaining_len(), Some(1));
    }
}
