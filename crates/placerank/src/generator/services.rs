//! Service, compound, and place-suffix pools derived from a profile.

use super::location::dedup;
use crate::types::BusinessProfile;
use crate::vocabulary::Vocabulary;

/// Service and suffix pools the rounds draw from.
#[derive(Debug, Clone, Default)]
pub struct ServiceTokens {
    /// Trusted terms: the profile's own services, or a hint-padded fallback.
    pub core: Vec<String>,
    /// Services, review tags, and matching hints together.
    pub extended: Vec<String>,
    /// Modifier+base menu compounds and pairwise service joins.
    pub compounds: Vec<String>,
    pub place_suffixes: Vec<String>,
    pub review_tags: Vec<String>,
}

impl ServiceTokens {
    pub fn derive(profile: &BusinessProfile, category_code: &str, vocab: &Vocabulary) -> Self {
        let cfg = vocab.category(category_code);
        let category_text = profile.category_name.clone().unwrap_or_default();

        let services: Vec<String> = profile.service_terms().into_iter().take(40).collect();
        let tags: Vec<String> = profile
            .tags
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .take(25)
            .map(str::to_string)
            .collect();

        let body = {
            let mut parts: Vec<&str> = services.iter().map(String::as_str).collect();
            parts.extend(tags.iter().map(String::as_str));
            parts.push(&category_text);
            parts.push(&profile.name);
            parts.join(" ")
        };
        let safe_hints: Vec<String> = cfg
            .service_hints
            .iter()
            .take(10)
            .filter(|h| body.contains(h.as_str()))
            .take(8)
            .cloned()
            .collect();

        let core: Vec<String> = if services.len() >= 2 {
            services.iter().take(25).cloned().collect()
        } else {
            let mut pool = services.clone();
            pool.extend(safe_hints.iter().cloned());
            dedup(pool).into_iter().take(25).collect()
        };

        let mut ext = services.clone();
        ext.extend(tags.iter().take(15).cloned());
        ext.extend(safe_hints.iter().cloned());
        let extended: Vec<String> = dedup(ext).into_iter().take(45).collect();

        let (compounds, bases) = compounds(&core, &extended, &category_text, vocab);
        let place_suffixes = place_suffixes(category_code, &category_text, &bases, vocab);

        Self {
            core,
            extended,
            compounds,
            place_suffixes,
            review_tags: tags,
        }
    }

    /// Core services first, then extended ones not already present.
    pub fn all(&self) -> Vec<String> {
        dedup(self.core.iter().chain(self.extended.iter()).cloned().collect())
    }
}

/// Returns the compound terms and the base menus found along the way.
fn compounds(
    core: &[String],
    extended: &[String],
    category_text: &str,
    vocab: &Vocabulary,
) -> (Vec<String>, Vec<String>) {
    let pool = dedup(
        core.iter()
            .chain(extended.iter().take(20))
            .cloned()
            .collect(),
    );

    let mut mods: Vec<&str> = Vec::new();
    let mut bases: Vec<&str> = Vec::new();
    for term in pool.iter().map(String::as_str).chain(std::iter::once(category_text)) {
        for m in &vocab.menu_modifiers {
            if term.contains(m.as_str()) && !mods.contains(&m.as_str()) {
                mods.push(m);
            }
        }
        for b in &vocab.base_menus {
            if term.contains(b.as_str()) && !bases.contains(&b.as_str()) {
                bases.push(b);
            }
        }
    }

    let mut out = Vec::new();
    for m in &mods {
        for b in &bases {
            if m != b {
                out.push(format!("{m}{b}"));
                out.push(format!("{m} {b}"));
            }
        }
    }

    let top: Vec<&String> = core.iter().take(8).collect();
    for i in 0..top.len() {
        for j in (i + 1)..top.len() {
            if top[i].chars().count() + top[j].chars().count() <= 10 {
                out.push(format!("{} {}", top[i], top[j]));
            }
        }
    }

    (
        dedup(out),
        bases.into_iter().map(str::to_string).collect(),
    )
}

fn place_suffixes(
    category_code: &str,
    category_text: &str,
    bases: &[String],
    vocab: &Vocabulary,
) -> Vec<String> {
    let mut out = vocab.place_suffixes.clone();
    if category_code == "food" {
        out.extend(
            category_text
                .split_whitespace()
                .filter(|w| w.chars().count() >= 2)
                .map(str::to_string),
        );
        for base in bases {
            if let Some(extra) = vocab.menu_place_suffixes.get(base) {
                out.extend(extra.iter().cloned());
            }
        }
        out.extend(vocab.food_place_suffixes.iter().cloned());
    }
    dedup(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(services: &[&str]) -> BusinessProfile {
        BusinessProfile {
            id: "1234567".into(),
            name: "바다 칼국수".into(),
            category_code: "food".into(),
            category_name: Some("칼국수".into()),
            address: "부산 수영구".into(),
            services: services.iter().map(|s| s.to_string()).collect(),
            tags: vec!["양이 많아요".into()],
        }
    }

    #[test]
    fn test_core_services_prefer_profile_terms() {
        let p = profile(&["차돌박이칼국수", "들깨수제비", "보쌈"]);
        let s = ServiceTokens::derive(&p, "food", Vocabulary::embedded());
        assert_eq!(s.core, vec!["차돌박이칼국수", "들깨수제비", "보쌈"]);
        assert!(s.extended.contains(&"양이 많아요".to_string()));
    }

    #[test]
    fn test_fallback_uses_only_hints_seen_in_text() {
        let p = profile(&["바지락칼국수"]);
        let s = ServiceTokens::derive(&p, "food", Vocabulary::embedded());
        assert!(s.core.contains(&"바지락칼국수".to_string()));
        assert!(!s.core.contains(&"삼겹살".to_string()));
    }

    #[test]
    fn test_compounds_and_food_place_suffixes() {
        let p = profile(&["차돌박이칼국수", "들깨수제비"]);
        let s = ServiceTokens::derive(&p, "food", Vocabulary::embedded());
        assert!(s.compounds.contains(&"차돌박이칼국수".to_string()));
        assert!(s.compounds.contains(&"들깨 칼국수".to_string()));
        assert!(s.compounds.contains(&"차돌박이 수제비".to_string()));
        assert!(s.place_suffixes.contains(&"국수집".to_string()));
        assert!(s.place_suffixes.contains(&"수제비집".to_string()));
        assert!(s.place_suffixes.contains(&"식당".to_string()));
        assert!(s.place_suffixes.contains(&"칼국수".to_string()));
    }
}
