//! Static vocabulary tables: category configs, location data, phrase pools.
//!
//! The tables are embedded at compile time from `vocabulary.json` and parsed
//! once. An alternate document with the same shape can be loaded from disk
//! with [`Vocabulary::from_path`].

use crate::types::{BusinessProfile, PlaceRankError, PlaceRankResult};
use serde::{Deserialize, Deserializer};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::OnceLock;

/// Raw JSON of the built-in vocabulary.
const EMBEDDED_JSON: &str = include_str!("vocabulary.json");

/// Per-category word lists.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CategoryConfig {
    pub label: String,
    /// Keywords that identify the category in listing text.
    #[serde(default)]
    pub detect: Vec<String>,
    #[serde(default)]
    pub intents: Vec<String>,
    #[serde(default)]
    pub situations: Vec<String>,
    #[serde(default)]
    pub modifiers: Vec<String>,
    #[serde(default)]
    pub suffixes: Vec<String>,
    /// Terms that work as a complete query next to a location ("맛집", "치과").
    #[serde(default)]
    pub alone: Vec<String>,
    #[serde(default)]
    pub service_hints: Vec<String>,
    /// Substrings never allowed in a candidate for this category.
    #[serde(default)]
    pub blocked: Vec<String>,
    /// Also apply the shared food/cafe-only blocklist.
    #[serde(default)]
    pub inherit_food_cafe_block: bool,
}

/// Nearby places registered for one area name.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LandmarkEntry {
    #[serde(default)]
    pub station: Vec<String>,
    #[serde(default)]
    pub sights: Vec<String>,
    #[serde(default)]
    pub shopping: Vec<String>,
}

/// Phrase pools shared by every category.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PhrasePools {
    #[serde(default)]
    pub customer_intents: Vec<String>,
    #[serde(default)]
    pub nearby: Vec<String>,
    #[serde(default)]
    pub time: Vec<String>,
    #[serde(default)]
    pub purpose: Vec<String>,
    #[serde(default)]
    pub food_context: Vec<String>,
    #[serde(default)]
    pub vibe: Vec<String>,
    #[serde(default)]
    pub questions: Vec<String>,
    #[serde(default)]
    pub seasons: Vec<String>,
    #[serde(default)]
    pub price: Vec<String>,
    #[serde(default)]
    pub group: Vec<String>,
    #[serde(default)]
    pub age: Vec<String>,
    /// Two-word intent phrases such as "맛집 추천".
    #[serde(default)]
    pub intent_pairs: Vec<String>,
    #[serde(default)]
    pub top_suffixes: Vec<String>,
    #[serde(default)]
    pub alone_suffixes: Vec<String>,
    #[serde(default)]
    pub stack_modifiers: Vec<String>,
    #[serde(default)]
    pub stack_suffixes: Vec<String>,
    /// Words searched together with the business name.
    #[serde(default)]
    pub name_words: Vec<String>,
}

/// The read-only vocabulary store.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Vocabulary {
    pub default_category: String,
    /// Category configs in document order; detection walks them in this order.
    #[serde(deserialize_with = "ordered_categories")]
    pub categories: Vec<(String, CategoryConfig)>,
    #[serde(default)]
    pub food_cafe_only: Vec<String>,
    #[serde(default)]
    pub stopwords: HashSet<String>,
    /// Short metro name to formal name ("부산" -> "부산광역시").
    #[serde(default)]
    pub metro: BTreeMap<String, String>,
    #[serde(default)]
    pub general_cities: Vec<String>,
    #[serde(default)]
    pub country_prefix: String,
    #[serde(default)]
    pub landmarks: BTreeMap<String, LandmarkEntry>,
    #[serde(default)]
    pub regions: Vec<String>,
    #[serde(default)]
    pub menu_modifiers: Vec<String>,
    #[serde(default)]
    pub base_menus: Vec<String>,
    #[serde(default)]
    pub place_suffixes: Vec<String>,
    #[serde(default)]
    pub food_place_suffixes: Vec<String>,
    /// Base menu to place-type suffixes ("국수" -> "국수집").
    #[serde(default)]
    pub menu_place_suffixes: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub phrases: PhrasePools,
    #[serde(default)]
    pub branch_tokens: Vec<String>,
}

impl Vocabulary {
    /// The built-in vocabulary, parsed on first use.
    pub fn embedded() -> &'static Vocabulary {
        static EMBEDDED: OnceLock<Vocabulary> = OnceLock::new();
        EMBEDDED.get_or_init(|| Self::from_json(EMBEDDED_JSON).expect("embedded vocabulary is valid"))
    }

    /// Parse and check a vocabulary document.
    pub fn from_json(json: &str) -> PlaceRankResult<Self> {
        let vocab: Vocabulary = serde_json::from_str(json)?;
        vocab.check()?;
        Ok(vocab)
    }

    /// Load a vocabulary document from disk.
    pub fn from_path(path: &Path) -> PlaceRankResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    fn check(&self) -> PlaceRankResult<()> {
        if !self.has_category(&self.default_category) {
            return Err(PlaceRankError::Vocabulary(format!(
                "default category {:?} has no config",
                self.default_category
            )));
        }
        for (code, cfg) in &self.categories {
            if cfg.alone.is_empty() {
                return Err(PlaceRankError::Vocabulary(format!(
                    "category {code:?} has no stand-alone terms"
                )));
            }
        }
        Ok(())
    }

    /// Config for `code`, falling back to the default category.
    pub fn category(&self, code: &str) -> &CategoryConfig {
        self.lookup(code)
            .or_else(|| self.lookup(&self.default_category))
            .unwrap_or_else(|| empty_category())
    }

    /// Whether `code` names a configured category.
    pub fn has_category(&self, code: &str) -> bool {
        self.lookup(code).is_some()
    }

    fn lookup(&self, code: &str) -> Option<&CategoryConfig> {
        self.categories.iter().find(|(c, _)| c == code).map(|(_, cfg)| cfg)
    }

    /// The category code to use for `profile`.
    ///
    /// An explicit, known code wins. Otherwise the listing's category text is
    /// searched for detection keywords, then the name, tags and services
    /// (keywords of at least two characters only), then the default.
    pub fn detect_category(&self, profile: &BusinessProfile) -> String {
        let explicit = profile.category_code.trim();
        if !explicit.is_empty() && self.has_category(explicit) {
            return explicit.to_string();
        }

        if let Some(text) = profile.category_name.as_deref() {
            if let Some(code) = self.first_detected(text, 1) {
                return code;
            }
        }

        let mut body = profile.name.clone();
        for term in profile.tags.iter().chain(profile.services.iter()) {
            body.push(' ');
            body.push_str(term);
        }
        if let Some(code) = self.first_detected(&body, 2) {
            return code;
        }

        self.default_category.clone()
    }

    fn first_detected(&self, text: &str, min_chars: usize) -> Option<String> {
        for (code, cfg) in &self.categories {
            let hit = cfg
                .detect
                .iter()
                .any(|kw| kw.chars().count() >= min_chars && text.contains(kw.as_str()));
            if hit {
                return Some(code.clone());
            }
        }
        None
    }

    /// Substrings a candidate for category `code` must not contain.
    pub fn blocklist(&self, code: &str) -> Vec<String> {
        let cfg = self.category(code);
        let mut out = cfg.blocked.clone();
        if cfg.inherit_food_cafe_block {
            for w in &self.food_cafe_only {
                if !out.contains(w) {
                    out.push(w.clone());
                }
            }
        }
        out
    }

    /// Whether a whitespace-separated token is a global stopword.
    pub fn is_stopword(&self, token: &str) -> bool {
        self.stopwords.contains(token)
    }

    /// All short city names recognised in addresses: metros first, then the
    /// general cities.
    pub fn city_names(&self) -> Vec<&str> {
        self.metro
            .keys()
            .map(String::as_str)
            .chain(self.general_cities.iter().map(String::as_str))
            .collect()
    }
}

fn ordered_categories<'de, D>(d: D) -> Result<Vec<(String, CategoryConfig)>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = serde_json::Map::<String, serde_json::Value>::deserialize(d)?;
    raw.into_iter()
        .map(|(code, value)| {
            serde_json::from_value(value)
                .map(|cfg| (code, cfg))
                .map_err(serde::de::Error::custom)
        })
        .collect()
}

fn empty_category() -> &'static CategoryConfig {
    static EMPTY: OnceLock<CategoryConfig> = OnceLock::new();
    EMPTY.get_or_init(CategoryConfig::default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_vocabulary_parses() {
        let v = Vocabulary::from_json(EMBEDDED_JSON).unwrap();
        assert_eq!(v.default_category, "food");
        assert!(v.categories.len() >= 10);
        assert!(v.category("food").alone.contains(&"맛집".to_string()));
        assert!(!v.phrases.nearby.is_empty());
        assert!(!Vocabulary::embedded().categories.is_empty());
    }

    #[test]
    fn test_unknown_category_falls_back_to_default() {
        let v = Vocabulary::embedded();
        assert_eq!(v.category("no_such_code").label, v.category("food").label);
    }

    #[test]
    fn test_medical_blocklist_inherits_food_words() {
        let v = Vocabulary::embedded();
        let block = v.blocklist("medical_dental");
        assert!(block.iter().any(|w| w == "맛집"));
        assert!(block.iter().any(|w| w == "혼밥"));
        assert!(!v.blocklist("food").iter().any(|w| w == "맛집"));
    }

    #[test]
    fn test_detect_category() {
        let v = Vocabulary::embedded();
        let mut p = BusinessProfile {
            id: "11111".into(),
            name: "하얀이치과".into(),
            ..Default::default()
        };
        assert_eq!(v.detect_category(&p), "medical_dental");

        p.name = "그냥가게".into();
        p.category_name = Some("미용실".into());
        assert_eq!(v.detect_category(&p), "beauty_hair");

        p.category_name = None;
        assert_eq!(v.detect_category(&p), "food");

        p.category_code = "pet".into();
        assert_eq!(v.detect_category(&p), "pet");
    }

    #[test]
    fn test_detection_follows_document_order() {
        let v = Vocabulary::embedded();
        assert_eq!(v.categories[0].0, "food");

        let mut p = BusinessProfile {
            id: "11111".into(),
            name: "한방삼계탕".into(),
            ..Default::default()
        };
        assert_eq!(v.detect_category(&p), "food");

        p.name = "그냥가게".into();
        p.category_name = Some("호텔뷔페".into());
        assert_eq!(v.detect_category(&p), "food");

        let doc = r#"{"default_category":"b","categories":{
            "b":{"label":"B","detect":["공통"],"alone":["x"]},
            "a":{"label":"A","detect":["공통"],"alone":["y"]}}}"#;
        let v = Vocabulary::from_json(doc).unwrap();
        p.category_name = Some("공통".into());
        assert_eq!(v.detect_category(&p), "b");
    }

    #[test]
    fn test_missing_default_category_is_rejected() {
        let err = Vocabulary::from_json(r#"{"default_category":"x","categories":{}}"#);
        assert!(matches!(err, Err(PlaceRankError::Vocabulary(_))));
    }
}
