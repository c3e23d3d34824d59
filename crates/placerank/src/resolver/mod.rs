//! Result Resolver: payload text in, [`MatchOutcome`] out.
//!
//! A payload is first classified (empty, blocked, no result section). If it
//! looks like a results page, an ordered chain of extraction strategies is
//! run and the first one yielding at least two entities wins. The target is
//! then located among those entities.

pub mod json;
pub mod markup;
pub mod matcher;
pub mod variant;

use crate::types::{MatchOutcome, ResultEntity, Strategy, Target};
use crate::vocabulary::Vocabulary;
use matcher::{match_rank, BranchPolicy, TokenBranchPolicy};
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use std::cell::OnceCell;
use variant::{MarkupVariantClassifier, VariantClassifier};

/// Shortest payload that can be a results page.
pub const MIN_PAYLOAD_LEN: usize = 500;
/// Block pages are short; longer payloads with a marker are real results.
pub const BLOCK_PAGE_MAX_LEN: usize = 30_000;
/// Below this length a page without place markers has no result section.
pub const SECTION_PROBE_LEN: usize = 3_000;

macro_rules! regex {
    ($re:literal) => {{
        static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
        RE.get_or_init(|| Regex::new($re).expect("resolver regex is valid"))
    }};
}

/// An extraction strategy: payload in, ordered entities out.
pub type StrategyFn = fn(&Payload<'_>) -> Option<Vec<ResultEntity>>;

/// Strategies in the order they are tried.
pub const STRATEGIES: &[(Strategy, StrategyFn)] = &[
    (Strategy::SktPayload, skt_payload),
    (Strategy::Hydration, hydration),
    (Strategy::EntityGraph, entity_graph),
    (Strategy::ScriptScan, script_scan),
    (Strategy::Markup, markup_links),
    (Strategy::IdNamePairs, id_name_pairs),
];

/// One `<script>` element.
#[derive(Debug, Clone)]
pub struct ScriptBlock {
    pub id: Option<String>,
    pub kind: Option<String>,
    pub text: String,
}

/// A fetched payload with lazily derived views shared across strategies.
pub struct Payload<'a> {
    raw: &'a str,
    scripts: OnceCell<Vec<ScriptBlock>>,
    organic: OnceCell<String>,
}

impl<'a> Payload<'a> {
    pub fn new(raw: &'a str) -> Self {
        Self {
            raw,
            scripts: OnceCell::new(),
            organic: OnceCell::new(),
        }
    }

    pub fn raw(&self) -> &str {
        self.raw
    }

    /// Script elements in document order.
    pub fn scripts(&self) -> &[ScriptBlock] {
        self.scripts.get_or_init(|| {
            let Ok(sel) = Selector::parse("script") else {
                return Vec::new();
            };
            Html::parse_document(self.raw)
                .select(&sel)
                .map(|el| ScriptBlock {
                    id: el.value().attr("id").map(str::to_string),
                    kind: el.value().attr("type").map(str::to_string),
                    text: el.text().collect(),
                })
                .collect()
        })
    }

    /// Markup with sponsored blocks removed.
    pub fn organic(&self) -> &str {
        self.organic.get_or_init(|| markup::strip_ads(self.raw))
    }
}

/// Classify a payload before extraction.
///
/// `Some` is a final verdict (failure or no result section); `None` means
/// the payload should go through the strategy chain.
pub fn classify(payload: &str) -> Option<MatchOutcome> {
    let len = payload.len();
    if len < MIN_PAYLOAD_LEN {
        return Some(MatchOutcome::failed(Strategy::EmptyPayload));
    }
    let has_content = regex!(r#"(?i)__NEXT_DATA__|place_section|place-main-section|PlaceItem|placeId|"items"|"businesses""#)
        .is_match(payload);
    if !has_content
        && len < BLOCK_PAGE_MAX_LEN
        && regex!(r"(?i)보안문자|자동입력방지|비정상적인\s*접근|unusual\s*traffic|blocked").is_match(payload)
    {
        return Some(MatchOutcome::failed(Strategy::Blocked));
    }
    if len < SECTION_PROBE_LEN && !regex!(r"(?i)place\.naver\.com|placeId|businessId").is_match(payload) {
        return Some(MatchOutcome::miss(Strategy::NoResultSection, None));
    }
    None
}

/// Run the strategy chain and return the winning strategy's entities.
pub fn extract(payload: &Payload<'_>) -> Option<(Strategy, Vec<ResultEntity>)> {
    STRATEGIES.iter().find_map(|(tag, run)| {
        let found = run(payload).filter(|e| e.len() >= 2)?;
        tracing::debug!(strategy = %tag, entities = found.len(), "extraction strategy matched");
        Some((*tag, found))
    })
}

/// Resolves payloads against a target with swappable branch and variant
/// policies.
pub struct Resolver {
    branch: Box<dyn BranchPolicy>,
    variant: Box<dyn VariantClassifier>,
}

impl Resolver {
    /// Token branch policy from `vocab` and the markup variant classifier.
    pub fn new(vocab: &Vocabulary) -> Self {
        Self::with_policies(
            Box::new(TokenBranchPolicy::from_vocabulary(vocab)),
            Box::new(MarkupVariantClassifier),
        )
    }

    pub fn with_policies(branch: Box<dyn BranchPolicy>, variant: Box<dyn VariantClassifier>) -> Self {
        Self { branch, variant }
    }

    pub fn resolve(&self, payload: &str, target: &Target) -> MatchOutcome {
        if let Some(verdict) = classify(payload) {
            return verdict;
        }
        let map_variant = self.variant.classify(payload);
        let page = Payload::new(payload);
        let Some((strategy, entities)) = extract(&page) else {
            return MatchOutcome::miss(Strategy::NoEntities, Some(map_variant));
        };
        match match_rank(&entities, target, self.branch.as_ref()) {
            Some((position, method)) => MatchOutcome::ranked(position, map_variant, strategy, method),
            None => MatchOutcome::miss(strategy, Some(map_variant)),
        }
    }
}

// ── Strategies ──

fn skt_payload(p: &Payload<'_>) -> Option<Vec<ResultEntity>> {
    let m = regex!(r"window\.__skt_view_payload__\s*=\s*").find(p.raw())?;
    let literal = json::extract_balanced(p.raw(), m.end())?;
    let data: Value = serde_json::from_str(literal).ok()?;
    json::find_place_array(&data, 0, "skt-view")
}

fn from_tree(tree: &Value, label: &str) -> Option<Vec<ResultEntity>> {
    if let Some(query) = json::find_search_place_query(tree) {
        if let Some(found) = json::find_place_array(query, 0, "placeQuery") {
            return Some(found);
        }
    }
    json::find_place_array(tree, 0, label)
}

fn hydration(p: &Payload<'_>) -> Option<Vec<ResultEntity>> {
    let script = p
        .scripts()
        .iter()
        .find(|s| s.id.as_deref() == Some("__NEXT_DATA__"))?;
    let tree: Value = serde_json::from_str(script.text.trim()).ok()?;
    from_tree(&tree, "nextdata")
}

fn entity_graph(p: &Payload<'_>) -> Option<Vec<ResultEntity>> {
    json::literals_after(p.raw(), regex!(r"window\.__APOLLO_STATE__\s*=\s*"))
        .iter()
        .find_map(json::resolve_graph)
}

fn script_scan(p: &Payload<'_>) -> Option<Vec<ResultEntity>> {
    let scripts = p.scripts();

    for s in scripts {
        let is_json = s.kind.as_deref().is_some_and(|k| k.contains("application/json"));
        if !is_json || s.text.len() < 100 {
            continue;
        }
        if let Ok(tree) = serde_json::from_str::<Value>(s.text.trim()) {
            if let Some(found) = from_tree(&tree, "jsonScript") {
                return Some(found);
            }
        }
    }

    let hint = regex!(r#"placeId|businessId|"sid"|place_id|placeList|place_nid|PlaceItem|SearchPlace|localSearch|smartAround|naver\.com/place|"rank"|"imageCount"|reviewCount"#);
    let assignments: [&Regex; 4] = [
        regex!(r"window\.__([A-Za-z0-9_]+)__\s*="),
        regex!(r"window\.([A-Za-z_]\w+)\s*="),
        regex!(r"(?:var|let|const)\s+[A-Za-z_]\w*\s*="),
        regex!(r"[A-Za-z_]\w*\s*=\s*[\{\[]"),
    ];

    for s in scripts {
        if s.text.len() < 150 || !hint.is_match(&s.text) {
            continue;
        }
        if let Ok(tree) = serde_json::from_str::<Value>(s.text.trim()) {
            if let Some(found) = json::find_place_array(&tree, 0, "rawScript") {
                return Some(found);
            }
        }
        for re in assignments {
            for value in json::literals_after(&s.text, re) {
                if let Some(found) = from_tree(&value, "assign") {
                    return Some(found);
                }
            }
        }
    }
    None
}

fn markup_links(p: &Payload<'_>) -> Option<Vec<ResultEntity>> {
    let found = markup::place_links(p.organic());
    (found.len() >= 2).then_some(found)
}

fn id_name_pairs(p: &Payload<'_>) -> Option<Vec<ResultEntity>> {
    let found = markup::id_name_pairs(p.organic());
    (found.len() >= 2).then_some(found)
}
