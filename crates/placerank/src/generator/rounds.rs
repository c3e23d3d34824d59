//! Round rules: the explicit early rounds, the phase engine, and the
//! unbounded engine.
//!
//! Every rule is a pure function of the round number and the token pools, so
//! a generator restored at round `n` continues exactly where it left off.

use super::location::{dedup, LocationTokens};
use super::services::ServiceTokens;
use crate::vocabulary::{CategoryConfig, PhrasePools};

/// Rounds `0..EARLY_ROUNDS` are explicit rules.
pub const EARLY_ROUNDS: u32 = 40;
/// Last round handled by the phase engine.
pub const PHASE_LAST_ROUND: u32 = 500;

/// Length cap for long chain phrases.
const CHAIN_MAX: usize = 35;
/// Length cap for five-word phase phrases.
const PHASE_CHAIN_MAX: usize = 45;

// Fixed words used to close many phrase shapes.
const BEST: &str = "맛집";
const RECOMMEND: &str = "추천";
const DOES_WELL: &str = "잘하는곳";
const NEAR: &str = "근처";
const AROUND: &str = "주변";
const CLOSE_BY: &str = "인근";

/// Token pools a round draws from, fixed for the generator's lifetime.
#[derive(Debug, Clone, Default)]
pub struct Pools {
    pub category_code: String,
    /// Listing category text ("칼국수", "한식"), when known.
    pub category_text: Option<String>,
    pub business_name: String,
    pub road: Option<String>,
    pub r1: Vec<String>,
    pub r2: Vec<String>,
    pub r3: Vec<String>,
    pub r4: Vec<String>,
    pub ra: Vec<String>,
    pub landmarks: Vec<String>,
    pub stations: Vec<String>,
    pub sights: Vec<String>,
    pub shopping: Vec<String>,
    pub all_landmarks: Vec<String>,
    pub core: Vec<String>,
    pub extended: Vec<String>,
    pub compounds: Vec<String>,
    pub place_suffixes: Vec<String>,
    pub review_tags: Vec<String>,
    pub suffixes: Vec<String>,
    pub intents: Vec<String>,
    pub situations: Vec<String>,
    pub modifiers: Vec<String>,
    pub alone: Vec<String>,
    pub phrases: PhrasePools,
    /// Stacking pools for the unbounded engine.
    pub all_mods: Vec<String>,
    pub all_sfx: Vec<String>,
    pub all_svc: Vec<String>,
}

impl Pools {
    pub fn new(
        category_code: &str,
        category_text: Option<&str>,
        business_name: &str,
        location: &LocationTokens,
        services: &ServiceTokens,
        cfg: &CategoryConfig,
        phrases: &PhrasePools,
    ) -> Self {
        let all_mods = dedup(
            cfg.modifiers
                .iter()
                .chain(phrases.vibe.iter())
                .chain(phrases.stack_modifiers.iter())
                .cloned()
                .collect(),
        );
        let all_sfx = dedup(
            services
                .place_suffixes
                .iter()
                .chain(cfg.suffixes.iter())
                .chain(cfg.intents.iter())
                .chain(phrases.stack_suffixes.iter())
                .cloned()
                .collect(),
        );

        Self {
            category_code: category_code.to_string(),
            category_text: category_text
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string),
            business_name: business_name.trim().to_string(),
            road: location.road.clone(),
            r1: location.prefixes_of(1),
            r2: location.prefixes_of(2),
            r3: location.prefixes_of(3),
            r4: location.prefixes_of(4),
            ra: location.all_prefixes(),
            landmarks: location.landmarks.clone(),
            stations: location.stations.clone(),
            sights: location.sights.clone(),
            shopping: location.shopping.clone(),
            all_landmarks: location.all_landmarks(),
            core: services.core.clone(),
            extended: services.extended.clone(),
            compounds: services.compounds.clone(),
            place_suffixes: services.place_suffixes.clone(),
            review_tags: services.review_tags.clone(),
            suffixes: cfg.suffixes.clone(),
            intents: cfg.intents.clone(),
            situations: cfg.situations.clone(),
            modifiers: cfg.modifiers.clone(),
            alone: cfg.alone.clone(),
            phrases: phrases.clone(),
            all_mods,
            all_sfx,
            all_svc: services.all(),
        }
    }

    fn is_food(&self) -> bool {
        self.category_code == "food"
    }

    fn cat(&self) -> Option<&str> {
        self.category_text.as_deref()
    }

    fn first_alone(&self) -> &str {
        self.alone.first().map(String::as_str).unwrap_or(BEST)
    }
}

/// Raw phrases produced by one round, before filtering.
#[derive(Debug, Default)]
pub struct Batch {
    pub items: Vec<String>,
}

impl Batch {
    fn add(&mut self, phrase: String) {
        self.items.push(phrase);
    }

    /// Add only when the phrase is at most `max` characters.
    fn add_max(&mut self, phrase: String, max: usize) {
        if phrase.chars().count() <= max {
            self.items.push(phrase);
        }
    }
}

fn head(v: &[String], n: usize) -> &[String] {
    &v[..n.min(v.len())]
}

fn concat(a: &[String], b: &[String]) -> Vec<String> {
    a.iter().chain(b.iter()).cloned().collect()
}

/// Produce the raw phrases for `round`.
pub fn generate(round: u32, p: &Pools, out: &mut Batch) {
    if round < EARLY_ROUNDS {
        early(round, p, out);
    } else if round <= PHASE_LAST_ROUND {
        let idx = (round - EARLY_ROUNDS) as usize;
        Phase::from_index(idx).run(idx / Phase::COUNT, p, out);
    } else {
        let idx = (round - PHASE_LAST_ROUND - 1) as usize;
        Engine::from_index(idx).run(idx / Engine::COUNT, p, out);
    }
}

// ── Early rounds ─────────────────────────────────────────────────────────────

fn early(round: u32, p: &Pools, out: &mut Batch) {
    let ph = &p.phrases;
    let cat = p.cat();
    let ci = &ph.customer_intents;
    match round {
        // Two-word location + stand-alone term, then location + core service.
        0 => {
            for r in &p.r1 {
                for a in &p.alone {
                    out.add(format!("{r} {a}"));
                    out.add(format!("{a} {r}"));
                }
                if let Some(c) = cat {
                    out.add(format!("{r} {c}"));
                    out.add(format!("{c} {r}"));
                }
            }
            for r in &p.r1 {
                for s in head(&p.core, 15) {
                    out.add(format!("{r} {s}"));
                    out.add(format!("{s} {r}"));
                }
            }
        }
        1 => {
            for r in &p.r1 {
                for s in head(&p.core, 15) {
                    for sf in &ph.top_suffixes {
                        out.add(format!("{r} {s} {sf}"));
                    }
                }
                for a in &p.alone {
                    for sf in &ph.alone_suffixes {
                        out.add(format!("{r} {a} {sf}"));
                    }
                }
                if let Some(c) = cat {
                    for sf in head(&ph.alone_suffixes, 5) {
                        out.add(format!("{r} {c} {sf}"));
                    }
                }
            }
        }
        2 => {
            for r in &p.r1 {
                for s in head(&p.core, 25) {
                    for sf in &p.place_suffixes {
                        out.add(format!("{r} {s} {sf}"));
                    }
                }
            }
        }
        3 => {
            for r in &p.r1 {
                for s in head(&p.core, 25) {
                    for c in ci {
                        out.add(format!("{r} {s} {c}"));
                    }
                }
            }
        }
        // "Near" phrasing around single locations, landmarks, and the road.
        4 => {
            let mut places = p.r1.clone();
            places.extend(head(&p.all_landmarks, 8).iter().cloned());
            places.extend(p.road.iter().cloned());
            for r in &places {
                for nw in &ph.nearby {
                    for a in &p.alone {
                        out.add(format!("{r} {nw} {a}"));
                    }
                    if let Some(c) = cat {
                        out.add(format!("{r} {nw} {c}"));
                    }
                    for s in head(&p.core, 12) {
                        out.add(format!("{r} {nw} {s}"));
                    }
                    for cm in head(&p.compounds, 10) {
                        out.add(format!("{r} {nw} {cm}"));
                    }
                    for sf in head(&p.place_suffixes, 6) {
                        out.add(format!("{r} {nw} {sf}"));
                    }
                    out.add(format!("{r} {nw} {BEST}"));
                    out.add(format!("{r} {nw} {RECOMMEND}"));
                }
            }
        }
        // Two-word pairs in both orders, spaced and joined.
        5 => {
            for r in &p.r1 {
                for s in head(&p.core, 25) {
                    out.add(format!("{s} {r}"));
                    out.add(format!("{r} {s}"));
                    out.add(format!("{r}{s}"));
                    out.add(format!("{s}{r}"));
                }
                for cm in head(&p.compounds, 15) {
                    out.add(format!("{cm} {r}"));
                    out.add(format!("{r} {cm}"));
                }
                if let Some(c) = cat {
                    out.add(format!("{c} {r}"));
                    out.add(format!("{r} {c}"));
                    out.add(format!("{r}{c}"));
                }
                for a in &p.alone {
                    out.add(format!("{a} {r}"));
                    out.add(format!("{r} {a}"));
                    out.add(format!("{r}{a}"));
                }
            }
        }
        6 => {
            combo(&p.r2, &p.core, head(&p.place_suffixes, 10), out);
            for r in &p.r2 {
                if let Some(c) = cat {
                    for sf in head(&p.place_suffixes, 8) {
                        out.add(format!("{r} {c} {sf}"));
                    }
                }
                for a in &p.alone {
                    for sf in head(&p.place_suffixes, 8) {
                        out.add(format!("{r} {a} {sf}"));
                    }
                }
            }
        }
        7 => {
            for r in &p.r2 {
                for s in head(&p.core, 25) {
                    for c in head(ci, 10) {
                        out.add(format!("{r} {s} {c}"));
                    }
                }
                if let Some(c) = cat {
                    for i in head(ci, 8) {
                        out.add(format!("{r} {c} {i}"));
                    }
                }
            }
        }
        8 => {
            for r in &p.r2 {
                for cm in &p.compounds {
                    for sf in head(&p.place_suffixes, 8) {
                        out.add(format!("{r} {cm} {sf}"));
                    }
                    out.add(format!("{r} {cm}"));
                }
            }
        }
        // Time of day and purpose.
        9 => {
            for r in &p.r1 {
                for tc in &ph.time {
                    for a in &p.alone {
                        out.add(format!("{r} {tc} {a}"));
                    }
                    if let Some(c) = cat {
                        out.add(format!("{r} {tc} {c}"));
                    }
                    for s in head(&p.core, 8) {
                        out.add(format!("{r} {tc} {s}"));
                    }
                    for cm in head(&p.compounds, 6) {
                        out.add(format!("{r} {tc} {cm}"));
                    }
                }
                for pw in &ph.purpose {
                    for a in &p.alone {
                        out.add(format!("{r} {pw} {a}"));
                    }
                    if let Some(c) = cat {
                        out.add(format!("{r} {pw} {c}"));
                    }
                    for s in head(&p.core, 6) {
                        out.add(format!("{r} {pw} {s}"));
                    }
                }
            }
        }
        10 => {
            for r in &p.r3 {
                for s in head(&p.core, 15) {
                    for sf in head(&p.place_suffixes, 6) {
                        out.add(format!("{r} {s} {sf}"));
                    }
                    out.add(format!("{r} {s}"));
                }
                for cm in head(&p.compounds, 10) {
                    for sf in head(&p.place_suffixes, 4) {
                        out.add(format!("{r} {cm} {sf}"));
                    }
                    out.add(format!("{r} {cm}"));
                }
                if let Some(c) = cat {
                    out.add(format!("{r} {c} {RECOMMEND}"));
                    out.add(format!("{r} {c} {BEST}"));
                }
                for a in &p.alone {
                    out.add(format!("{r} {a} {RECOMMEND}"));
                }
            }
        }
        // The business name itself.
        11 => {
            let name = &p.business_name;
            if name.is_empty() {
                return;
            }
            let clean = strip_branch_suffix(name);
            out.add(clean.clone());
            out.add(name.clone());
            for w in &ph.name_words {
                out.add(format!("{clean} {w}"));
            }
            for r in head(&p.ra, 20) {
                out.add(format!("{r} {clean}"));
                out.add(format!("{r} {clean} {RECOMMEND}"));
                out.add(format!("{clean} {r}"));
                out.add(format!("{r} {clean} {BEST}"));
            }
            for c in head(ci, 8) {
                out.add(format!("{clean} {c}"));
                out.add(format!("{name} {c}"));
            }
        }
        12 => {
            for lm in head(&p.all_landmarks, 15) {
                for nw in &ph.nearby {
                    for s in head(&p.core, 15) {
                        out.add(format!("{lm} {nw} {s}"));
                    }
                    for cm in head(&p.compounds, 10) {
                        out.add(format!("{lm} {nw} {cm}"));
                    }
                    for a in &p.alone {
                        out.add(format!("{lm} {nw} {a}"));
                    }
                    if let Some(c) = cat {
                        out.add(format!("{lm} {nw} {c}"));
                    }
                    for sf in head(&p.place_suffixes, 6) {
                        out.add(format!("{lm} {nw} {sf}"));
                    }
                }
            }
        }
        13 => {
            let mods = concat(head(&p.modifiers, 10), &ph.vibe);
            for r in &p.r1 {
                for m in &mods {
                    for a in &p.alone {
                        out.add(format!("{r} {m} {a}"));
                    }
                    if let Some(c) = cat {
                        out.add(format!("{r} {m} {c}"));
                    }
                    for s in head(&p.core, 6) {
                        out.add(format!("{r} {m} {s}"));
                    }
                    out.add(format!("{r} {m}"));
                }
            }
        }
        // Review tags.
        14 => {
            let places = concat(&p.r1, head(&p.r2, 8));
            for tag in head(&p.review_tags, 20) {
                for r in &places {
                    for sf in head(&p.place_suffixes, 6) {
                        out.add(format!("{r} {tag} {sf}"));
                    }
                    out.add(format!("{r} {tag}"));
                    out.add(format!("{tag} {r}"));
                }
                out.add(format!("{tag} {RECOMMEND}"));
                out.add(format!("{tag} {BEST}"));
                out.add(format!("{tag} {DOES_WELL}"));
            }
        }
        15 => {
            if !p.is_food() {
                return;
            }
            for r in &p.r1 {
                for fc in &ph.food_context {
                    for s in head(&p.core, 12) {
                        out.add(format!("{r} {fc} {s}"));
                    }
                    for cm in head(&p.compounds, 8) {
                        out.add(format!("{r} {fc} {cm}"));
                    }
                    for sf in head(&p.place_suffixes, 6) {
                        out.add(format!("{r} {fc} {sf}"));
                    }
                    out.add(format!("{r} {fc}"));
                    out.add(format!("{r} {fc} {BEST}"));
                    out.add(format!("{r} {fc} {RECOMMEND}"));
                }
            }
            for lm in head(&p.all_landmarks, 8) {
                for fc in &ph.food_context {
                    for s in head(&p.core, 8) {
                        out.add(format!("{lm} {fc} {s}"));
                    }
                    out.add(format!("{lm} {fc} {BEST}"));
                }
            }
        }
        // Long chains.
        16 => {
            let places = concat(head(&p.r2, 6), head(&p.r3, 4));
            for r in &places {
                for nw in head(&ph.nearby, 4) {
                    for s in head(&p.core, 8) {
                        for sf in head(&p.place_suffixes, 4) {
                            out.add_max(format!("{r} {nw} {s} {sf}"), CHAIN_MAX);
                        }
                    }
                    for cm in head(&p.compounds, 6) {
                        for sf in head(&p.place_suffixes, 3) {
                            out.add_max(format!("{r} {nw} {cm} {sf}"), CHAIN_MAX);
                        }
                    }
                }
            }
            if p.is_food() {
                for r in head(&p.r2, 4) {
                    for nw in head(&ph.nearby, 3) {
                        for fc in head(&ph.food_context, 2) {
                            for s in head(&p.core, 6) {
                                out.add_max(format!("{r} {nw} {fc} {s} {BEST}"), CHAIN_MAX);
                            }
                        }
                    }
                }
            }
        }
        17 => {
            for r in head(&p.r2, 8) {
                for tc in head(&ph.time, 6) {
                    for a in &p.alone {
                        out.add(format!("{r} {tc} {a}"));
                    }
                    for s in head(&p.core, 6) {
                        out.add(format!("{r} {tc} {s}"));
                    }
                }
                for pw in head(&ph.purpose, 6) {
                    for a in &p.alone {
                        out.add(format!("{r} {pw} {a}"));
                    }
                    for s in head(&p.core, 4) {
                        out.add(format!("{r} {pw} {s}"));
                    }
                }
            }
        }
        // Road name.
        18 => {
            let Some(road) = p.road.as_deref() else {
                return;
            };
            for s in head(&p.core, 15) {
                for sf in head(&p.place_suffixes, 6) {
                    out.add(format!("{road} {s} {sf}"));
                }
                out.add(format!("{road} {s}"));
            }
            for cm in head(&p.compounds, 10) {
                for sf in head(&p.place_suffixes, 4) {
                    out.add(format!("{road} {cm} {sf}"));
                }
            }
            for nw in head(&ph.nearby, 4) {
                for a in &p.alone {
                    out.add(format!("{road} {nw} {a}"));
                }
                for s in head(&p.core, 8) {
                    out.add(format!("{road} {nw} {s}"));
                }
            }
            if let Some(c) = cat {
                out.add(format!("{road} {NEAR} {c} {RECOMMEND}"));
            }
        }
        19 => {
            for lm in head(&p.all_landmarks, 15) {
                for s in head(&p.core, 15) {
                    for sf in head(&p.place_suffixes, 8) {
                        out.add(format!("{lm} {s} {sf}"));
                    }
                    out.add(format!("{lm} {s}"));
                    out.add(format!("{s} {lm}"));
                }
                for cm in head(&p.compounds, 10) {
                    for sf in head(&p.place_suffixes, 4) {
                        out.add(format!("{lm} {cm} {sf}"));
                    }
                    out.add(format!("{lm} {cm}"));
                }
                if let Some(c) = cat {
                    out.add(format!("{lm} {c} {RECOMMEND}"));
                    out.add(format!("{lm} {NEAR} {c}"));
                }
                for a in &p.alone {
                    out.add(format!("{lm} {a} {RECOMMEND}"));
                    out.add(format!("{lm} {a}"));
                }
            }
        }
        // Question phrasing.
        20 => {
            for r in &p.r1 {
                for q in &ph.questions {
                    for a in &p.alone {
                        out.add(format!("{r} {q} {a}"));
                    }
                    if let Some(c) = cat {
                        out.add(format!("{r} {q} {c}"));
                    }
                    out.add(format!("{r} {q}"));
                }
            }
        }
        21 => {
            for r in &p.r1 {
                for sw in &ph.seasons {
                    for a in &p.alone {
                        out.add(format!("{r} {sw} {a}"));
                    }
                    if let Some(c) = cat {
                        out.add(format!("{r} {sw} {c}"));
                    }
                    for s in head(&p.core, 6) {
                        out.add(format!("{r} {sw} {s}"));
                    }
                }
            }
        }
        // Price, group size, audience.
        22 => {
            let words: Vec<&String> = ph.price.iter().chain(&ph.group).chain(&ph.age).collect();
            for r in &p.r1 {
                for w in &words {
                    for a in &p.alone {
                        out.add(format!("{r} {w} {a}"));
                    }
                    if let Some(c) = cat {
                        out.add(format!("{r} {w} {c}"));
                    }
                    for s in head(&p.core, 4) {
                        out.add(format!("{r} {w} {s}"));
                    }
                }
            }
        }
        // Stations.
        23 => {
            let first = p.first_alone();
            for st in head(&p.stations, 12) {
                for a in &p.alone {
                    out.add(format!("{st} {a}"));
                    for c in head(ci, 8) {
                        out.add(format!("{st} {a} {c}"));
                    }
                }
                if let Some(c) = cat {
                    out.add(format!("{st} {c}"));
                    for i in head(ci, 6) {
                        out.add(format!("{st} {c} {i}"));
                    }
                }
                for s in head(&p.core, 12) {
                    out.add(format!("{st} {s}"));
                    out.add(format!("{st} {s} {RECOMMEND}"));
                    out.add(format!("{st} {s} {BEST}"));
                }
                for cm in head(&p.compounds, 8) {
                    out.add(format!("{st} {cm}"));
                    out.add(format!("{st} {cm} {BEST}"));
                }
                for pw in head(&ph.purpose, 6) {
                    out.add(format!("{st} {pw} {first}"));
                }
                for tc in head(&ph.time, 6) {
                    out.add(format!("{st} {tc} {first}"));
                }
            }
        }
        // Sights and shopping.
        24 => {
            for si in head(&p.sights, 10) {
                for a in &p.alone {
                    out.add(format!("{si} {a}"));
                    out.add(format!("{si} {NEAR} {a}"));
                    out.add(format!("{si} {AROUND} {a}"));
                    out.add(format!("{si} {CLOSE_BY} {a}"));
                }
                if let Some(c) = cat {
                    out.add(format!("{si} {c}"));
                    out.add(format!("{si} {NEAR} {c}"));
                    out.add(format!("{si} {AROUND} {c}"));
                }
                for s in head(&p.core, 10) {
                    out.add(format!("{si} {s}"));
                    out.add(format!("{si} {s} {BEST}"));
                    out.add(format!("{si} {s} {RECOMMEND}"));
                }
                for cm in head(&p.compounds, 6) {
                    out.add(format!("{si} {cm} {BEST}"));
                }
            }
            for sh in head(&p.shopping, 6) {
                for a in &p.alone {
                    out.add(format!("{sh} {NEAR} {a}"));
                    out.add(format!("{sh} {AROUND} {a}"));
                    out.add(format!("{sh} {a}"));
                }
                if let Some(c) = cat {
                    out.add(format!("{sh} {NEAR} {c}"));
                }
                for s in head(&p.core, 6) {
                    out.add(format!("{sh} {s}"));
                }
            }
        }
        // Paired intent phrases and vibe words.
        25 => {
            for r in &p.r1 {
                for pair in &ph.intent_pairs {
                    out.add(format!("{r} {pair}"));
                    if let (Some(c), Some(first)) = (cat, pair.split_whitespace().next()) {
                        out.add(format!("{r} {c} {first}"));
                    }
                }
                for m in &ph.vibe {
                    for a in &p.alone {
                        out.add(format!("{r} {m} {a}"));
                    }
                    if let Some(c) = cat {
                        out.add(format!("{r} {m} {c}"));
                    }
                }
            }
        }
        26 => {
            for lm in head(&p.all_landmarks, 8) {
                for nw in head(&ph.nearby, 4) {
                    for tc in head(&ph.time, 4) {
                        for s in head(&p.core, 6) {
                            out.add_max(format!("{lm} {nw} {tc} {s} {BEST}"), CHAIN_MAX);
                        }
                    }
                    if p.is_food() {
                        for fc in head(&ph.food_context, 3) {
                            for s in head(&p.core, 6) {
                                out.add_max(format!("{lm} {nw} {fc} {s} {BEST}"), CHAIN_MAX);
                            }
                        }
                    }
                }
            }
        }
        // Category situations.
        27 => {
            let places = concat(&p.r1, head(&p.r2, 6));
            for r in &places {
                for sit in head(&p.situations, 8) {
                    for s in head(&p.core, 10) {
                        out.add(format!("{r} {sit} {s}"));
                    }
                    for cm in head(&p.compounds, 6) {
                        out.add(format!("{r} {sit} {cm}"));
                    }
                    if let Some(c) = cat {
                        out.add(format!("{r} {sit} {c}"));
                    }
                    for a in &p.alone {
                        out.add(format!("{r} {sit} {a}"));
                    }
                }
            }
        }
        28 => {
            for r in head(&p.r2, 10) {
                for nw in &ph.nearby {
                    for a in &p.alone {
                        out.add(format!("{r} {nw} {a}"));
                    }
                    if let Some(c) = cat {
                        out.add(format!("{r} {nw} {c}"));
                    }
                    for s in head(&p.core, 10) {
                        out.add(format!("{r} {nw} {s}"));
                    }
                    for cm in head(&p.compounds, 6) {
                        out.add(format!("{r} {nw} {cm}"));
                    }
                }
                for pw in head(&ph.purpose, 6) {
                    for a in &p.alone {
                        out.add(format!("{r} {pw} {a}"));
                    }
                    for s in head(&p.core, 4) {
                        out.add(format!("{r} {pw} {s}"));
                    }
                }
                for tc in head(&ph.time, 6) {
                    for a in &p.alone {
                        out.add(format!("{r} {tc} {a}"));
                    }
                    for s in head(&p.core, 4) {
                        out.add(format!("{r} {tc} {s}"));
                    }
                }
            }
        }
        29 => {
            for r in &p.r1 {
                for s in head(&p.core, 25) {
                    for sf in &p.place_suffixes {
                        out.add(format!("{r} {s} {sf}"));
                    }
                }
            }
        }
        30 => {
            for r in &p.r2 {
                for s in head(&p.core, 20) {
                    for sf in &p.place_suffixes {
                        out.add(format!("{r} {s} {sf}"));
                    }
                }
            }
        }
        31 => {
            for r in head(&p.r2, 8) {
                for cm in &p.compounds {
                    for nw in head(&ph.nearby, 4) {
                        out.add(format!("{r} {nw} {cm}"));
                    }
                    for sf in head(&p.place_suffixes, 8) {
                        out.add(format!("{r} {cm} {sf}"));
                    }
                }
            }
        }
        32 => {
            for tag in head(&p.review_tags, 20) {
                for c in head(ci, 8) {
                    for r in &p.r1 {
                        out.add(format!("{r} {tag} {c}"));
                    }
                }
                for nw in head(&ph.nearby, 3) {
                    for r in &p.r1 {
                        out.add(format!("{r} {nw} {tag}"));
                    }
                }
            }
        }
        // Extended services not already covered by the core list.
        33 => {
            let places = concat(&p.r1, head(&p.r2, 6));
            for r in &places {
                for s in head(&p.extended, 40) {
                    if p.core.contains(s) {
                        continue;
                    }
                    for sf in head(&p.place_suffixes, 8) {
                        out.add(format!("{r} {s} {sf}"));
                    }
                    out.add(format!("{r} {s}"));
                    out.add(format!("{s} {r}"));
                }
            }
        }
        34 => {
            for r in head(&p.r3, 8) {
                for nw in head(&ph.nearby, 4) {
                    for s in head(&p.core, 10) {
                        out.add(format!("{r} {nw} {s}"));
                    }
                    for cm in head(&p.compounds, 6) {
                        out.add(format!("{r} {nw} {cm}"));
                    }
                    for a in &p.alone {
                        out.add(format!("{r} {nw} {a}"));
                    }
                }
            }
        }
        35 => {
            for r in head(&p.r4, 6) {
                for s in head(&p.core, 10) {
                    for sf in head(&p.place_suffixes, 4) {
                        out.add(format!("{r} {s} {sf}"));
                    }
                    out.add(format!("{r} {s}"));
                }
                for cm in head(&p.compounds, 6) {
                    out.add(format!("{r} {cm} {BEST}"));
                }
            }
        }
        // Landmark chains.
        36 => {
            if p.landmarks.len() < 2 || !p.is_food() {
                return;
            }
            for i in 0..p.landmarks.len() {
                for j in (i + 1)..p.landmarks.len() {
                    let chain = format!("{} {}", p.landmarks[i], p.landmarks[j]);
                    for nw in head(&ph.nearby, 4) {
                        for fc in head(&ph.food_context, 3) {
                            for s in head(&p.core, 8) {
                                out.add_max(format!("{chain} {nw} {fc} {s} {BEST}"), CHAIN_MAX);
                            }
                        }
                        for s in head(&p.core, 8) {
                            out.add_max(format!("{chain} {nw} {s} {BEST}"), CHAIN_MAX);
                        }
                    }
                }
            }
        }
        37 => {
            for st in head(&p.stations, 10) {
                for tc in head(&ph.time, 6) {
                    for s in head(&p.core, 8) {
                        out.add(format!("{st} {tc} {s}"));
                    }
                    for a in &p.alone {
                        out.add(format!("{st} {tc} {a}"));
                    }
                }
                for pw in head(&ph.purpose, 6) {
                    for s in head(&p.core, 6) {
                        out.add(format!("{st} {pw} {s}"));
                    }
                    for a in &p.alone {
                        out.add(format!("{st} {pw} {a}"));
                    }
                }
            }
        }
        38 => {
            for r in &p.r1 {
                for cm in &p.compounds {
                    for nw in &ph.nearby {
                        out.add(format!("{r} {nw} {cm}"));
                    }
                    for c in head(ci, 8) {
                        out.add(format!("{r} {cm} {c}"));
                    }
                }
            }
        }
        39 => {
            for tag in head(&p.review_tags, 15) {
                for sit in head(&p.situations, 6) {
                    for r in &p.r1 {
                        out.add(format!("{r} {sit} {tag}"));
                    }
                }
            }
        }
        _ => {}
    }
}

/// Every prefix × service, with the suffix list, plus the bare pair.
fn combo(prefixes: &[String], services: &[String], suffixes: &[String], out: &mut Batch) {
    for r in prefixes {
        for s in services {
            for sf in suffixes {
                out.add(format!("{r} {s} {sf}"));
            }
            out.add(format!("{r} {s}"));
        }
    }
}

/// Drop a trailing branch marker such as "본점" or "해운대2호점".
pub(crate) fn strip_branch_suffix(name: &str) -> String {
    let re = {
        static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
        RE.get_or_init(|| {
            regex::Regex::new(r"\s*(?:본점|[가-힣]{1,4}\d*호?점)$").expect("branch suffix regex is valid")
        })
    };
    let clean = re.replace(name, "").trim().to_string();
    if clean.is_empty() {
        name.trim().to_string()
    } else {
        clean
    }
}

// ── Phase engine ─────────────────────────────────────────────────────────────

/// The combination shapes cycled through after the explicit rounds.
///
/// The round index modulo [`Phase::COUNT`] picks the shape; the quotient
/// (the cycle) picks which region prefix the shape works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// One prefix × core services × every place suffix.
    FullCartesian,
    CompoundRegion,
    NearbyExtended,
    TimePurpose,
    ExtendedCartesian,
    ReviewTags,
    ModifierRegion,
    /// Service before location.
    Reversed,
    LandmarkTime,
    DoubleRegionModifier,
    LongPrefix,
    LandmarkChain,
}

impl Phase {
    pub const COUNT: usize = 12;

    const ALL: [Phase; Phase::COUNT] = [
        Phase::FullCartesian,
        Phase::CompoundRegion,
        Phase::NearbyExtended,
        Phase::TimePurpose,
        Phase::ExtendedCartesian,
        Phase::ReviewTags,
        Phase::ModifierRegion,
        Phase::Reversed,
        Phase::LandmarkTime,
        Phase::DoubleRegionModifier,
        Phase::LongPrefix,
        Phase::LandmarkChain,
    ];

    pub fn from_index(idx: usize) -> Self {
        Self::ALL[idx % Self::COUNT]
    }

    pub fn run(self, cycle: usize, p: &Pools, out: &mut Batch) {
        let ph = &p.phrases;
        let pick = |list: &[String]| -> Option<String> {
            if list.is_empty() {
                None
            } else {
                Some(list[cycle % list.len()].clone())
            }
        };

        match self {
            Phase::FullCartesian => {
                let Some(r) = pick(&p.ra) else { return };
                for s in head(&p.core, 25) {
                    for sf in &p.place_suffixes {
                        out.add(format!("{r} {s} {sf}"));
                    }
                    out.add(format!("{r} {s}"));
                    out.add(format!("{s} {r}"));
                }
            }
            Phase::CompoundRegion => {
                let Some(r) = pick(&p.ra) else { return };
                for cm in head(&p.compounds, 30) {
                    for sf in &p.place_suffixes {
                        out.add(format!("{r} {cm} {sf}"));
                    }
                    out.add(format!("{r} {cm}"));
                }
            }
            Phase::NearbyExtended => {
                let Some(r) = pick(&p.ra) else { return };
                for nw in &ph.nearby {
                    for s in head(&p.extended, 45) {
                        out.add(format!("{r} {nw} {s}"));
                    }
                    for a in &p.alone {
                        out.add(format!("{r} {nw} {a}"));
                    }
                }
            }
            Phase::TimePurpose => {
                let Some(r) = pick(&p.ra) else { return };
                for tc in &ph.time {
                    for s in head(&p.core, 12) {
                        out.add(format!("{r} {tc} {s}"));
                    }
                    for a in &p.alone {
                        out.add(format!("{r} {tc} {a}"));
                    }
                    for sf in head(&p.place_suffixes, 8) {
                        out.add(format!("{r} {tc} {sf}"));
                    }
                }
                for pw in &ph.purpose {
                    for s in head(&p.core, 8) {
                        out.add(format!("{r} {pw} {s}"));
                    }
                    for a in &p.alone {
                        out.add(format!("{r} {pw} {a}"));
                    }
                }
            }
            Phase::ExtendedCartesian => {
                let Some(r) = pick(&p.ra) else { return };
                for s in head(&p.extended, 45) {
                    for sf in &p.place_suffixes {
                        out.add(format!("{r} {s} {sf}"));
                    }
                    out.add(format!("{r} {s}"));
                }
            }
            Phase::ReviewTags => {
                let Some(r) = pick(&p.ra) else { return };
                for tag in &p.review_tags {
                    for sf in head(&p.place_suffixes, 10) {
                        out.add(format!("{r} {tag} {sf}"));
                    }
                    out.add(format!("{r} {tag}"));
                    for c in head(&ph.customer_intents, 8) {
                        out.add(format!("{r} {tag} {c}"));
                    }
                }
            }
            Phase::ModifierRegion => {
                let Some(r) = pick(&p.r1) else { return };
                for m in p.modifiers.iter().chain(&ph.vibe) {
                    for s in head(&p.core, 15) {
                        out.add(format!("{r} {m} {s}"));
                    }
                    for a in &p.alone {
                        out.add(format!("{r} {m} {a}"));
                    }
                    out.add(format!("{m} {r}"));
                }
            }
            Phase::Reversed => {
                let Some(r) = pick(&p.ra) else { return };
                for s in head(&p.core, 20) {
                    out.add(format!("{s} {r}"));
                    for sf in head(&p.place_suffixes, 8) {
                        out.add(format!("{s} {sf} {r}"));
                    }
                    out.add(format!("{s} {r} {RECOMMEND}"));
                }
            }
            Phase::LandmarkTime => {
                for lm in head(&p.all_landmarks, 10) {
                    for tc in head(&ph.time, 6) {
                        for s in head(&p.core, 8) {
                            for sf in head(&p.place_suffixes, 4) {
                                out.add_max(format!("{lm} {tc} {s} {sf}"), PHASE_CHAIN_MAX);
                            }
                            out.add(format!("{lm} {tc} {s}"));
                        }
                    }
                }
            }
            Phase::DoubleRegionModifier => {
                let Some(r) = pick(&p.r2) else { return };
                let mods = concat(head(&p.modifiers, 6), head(&ph.vibe, 4));
                for m in &mods {
                    for s in head(&p.core, 10) {
                        for sf in head(&p.place_suffixes, 6) {
                            out.add_max(format!("{r} {m} {s} {sf}"), PHASE_CHAIN_MAX);
                        }
                    }
                }
            }
            Phase::LongPrefix => {
                for r in p.r3.iter().chain(&p.r4) {
                    for s in head(&p.core, 15) {
                        for sf in head(&p.place_suffixes, 6) {
                            out.add(format!("{r} {s} {sf}"));
                        }
                        out.add(format!("{r} {s}"));
                    }
                    for a in &p.alone {
                        for sf in head(&p.place_suffixes, 4) {
                            out.add(format!("{r} {a} {sf}"));
                        }
                    }
                }
            }
            Phase::LandmarkChain => {
                let lms = &p.landmarks;
                if lms.len() < 2 {
                    return;
                }
                for i in 0..lms.len() {
                    for j in 0..lms.len() {
                        if i == j {
                            continue;
                        }
                        let chain = format!("{} {}", lms[i], lms[j]);
                        for nw in head(&ph.nearby, 4) {
                            for s in head(&p.core, 8) {
                                out.add(format!("{chain} {nw} {s}"));
                            }
                            for a in &p.alone {
                                out.add(format!("{chain} {nw} {a}"));
                            }
                        }
                        for s in head(&p.core, 6) {
                            out.add(format!("{chain} {s}"));
                        }
                    }
                }
            }
        }
    }
}

// ── Unbounded engine ─────────────────────────────────────────────────────────

/// Stacking shapes used forever once the phase engine is spent.
///
/// Each engine indexes its pools with the cycle plus a small prime offset.
/// The offset grows by one every full lap of the indexed pool, so the pairing
/// of pool entries keeps shifting instead of repeating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    /// Two stacked modifiers around location + service.
    DoubleModifier,
    /// Two stacked suffixes after location + service.
    DoubleSuffix,
    ModifierSuffixWrap,
    FullReverse,
    TripleModifier,
    DoubleRegionModifier,
    LandmarkModifier,
    NearbyTime,
    PurposeModifier,
    TagModifier,
}

impl Engine {
    pub const COUNT: usize = 10;

    const ALL: [Engine; Engine::COUNT] = [
        Engine::DoubleModifier,
        Engine::DoubleSuffix,
        Engine::ModifierSuffixWrap,
        Engine::FullReverse,
        Engine::TripleModifier,
        Engine::DoubleRegionModifier,
        Engine::LandmarkModifier,
        Engine::NearbyTime,
        Engine::PurposeModifier,
        Engine::TagModifier,
    ];

    pub fn from_index(idx: usize) -> Self {
        Self::ALL[idx % Self::COUNT]
    }

    pub fn run(self, cycle: usize, p: &Pools, out: &mut Batch) {
        let ph = &p.phrases;
        let mods = &p.all_mods;
        let sfx = &p.all_sfx;
        let svc = &p.all_svc;

        match self {
            Engine::DoubleModifier => {
                let (Some(m1), Some(m2)) = (at(mods, cycle, 0), at(mods, cycle, 7)) else {
                    return;
                };
                if m1 == m2 {
                    return;
                }
                for r in &p.r1 {
                    for s in head(svc, 15) {
                        out.add(format!("{m1} {m2} {r} {s}"));
                        out.add(format!("{r} {m1} {m2} {s}"));
                    }
                }
            }
            Engine::DoubleSuffix => {
                let (Some(sf1), Some(sf2)) = (at(sfx, cycle, 0), at(sfx, cycle, 5)) else {
                    return;
                };
                if sf1 == sf2 {
                    return;
                }
                for r in &p.r1 {
                    for s in head(svc, 12) {
                        out.add(format!("{r} {s} {sf1} {sf2}"));
                    }
                    for a in &p.alone {
                        out.add(format!("{r} {a} {sf1} {sf2}"));
                    }
                }
            }
            Engine::ModifierSuffixWrap => {
                let (Some(m), Some(sf)) = (at(mods, cycle, 0), at(sfx, cycle, lap(cycle, mods.len()))) else {
                    return;
                };
                for r in &p.r1 {
                    for s in head(svc, 10) {
                        out.add(format!("{m} {r} {s} {sf}"));
                    }
                }
            }
            Engine::FullReverse => {
                let Some(r) = at(&p.ra, cycle, 0) else { return };
                let start = (lap(cycle, p.ra.len()) * 10) % sfx.len().max(1);
                let window: Vec<&String> = sfx.iter().cycle().skip(start).take(10.min(sfx.len())).collect();
                for s in head(svc, 15) {
                    for sf in &window {
                        out.add(format!("{sf} {s} {r}"));
                        out.add(format!("{sf} {r} {s}"));
                        out.add(format!("{s} {sf} {r}"));
                    }
                }
            }
            Engine::TripleModifier => {
                let (Some(m1), Some(m2), Some(m3)) =
                    (at(mods, cycle, 0), at(mods, cycle, 3), at(mods, cycle, 7))
                else {
                    return;
                };
                if m1 == m2 || m2 == m3 || m1 == m3 {
                    return;
                }
                for r in head(&p.r1, 4) {
                    for s in head(svc, 6) {
                        out.add(format!("{m1} {m2} {m3} {r} {s}"));
                        out.add(format!("{r} {m1} {m2} {s} {m3}"));
                    }
                }
            }
            Engine::DoubleRegionModifier => {
                let (Some(r), Some(m)) = (at(&p.r2, cycle, 0), at(mods, cycle, lap(cycle, p.r2.len()))) else {
                    return;
                };
                for s in head(svc, 10) {
                    out.add(format!("{r} {m} {s}"));
                    for sf in head(sfx, 6) {
                        out.add(format!("{r} {m} {s} {sf}"));
                    }
                }
            }
            Engine::LandmarkModifier => {
                let lms = &p.all_landmarks;
                let (Some(lm), Some(m)) = (at(lms, cycle, 0), at(mods, cycle, lap(cycle, lms.len()))) else {
                    return;
                };
                for s in head(svc, 8) {
                    for sf in head(sfx, 6) {
                        out.add(format!("{lm} {m} {s} {sf}"));
                        out.add(format!("{m} {lm} {s} {sf}"));
                    }
                }
            }
            Engine::NearbyTime => {
                let (Some(nw), Some(tc)) = (
                    at(&ph.nearby, cycle, 0),
                    at(&ph.time, cycle, lap(cycle, ph.nearby.len())),
                ) else {
                    return;
                };
                for r in &p.r1 {
                    for s in head(svc, 8) {
                        out.add(format!("{nw} {r} {tc} {s}"));
                        out.add(format!("{r} {tc} {nw} {s}"));
                    }
                }
            }
            Engine::PurposeModifier => {
                let (Some(pw), Some(m)) = (
                    at(&ph.purpose, cycle, 0),
                    at(mods, cycle, lap(cycle, ph.purpose.len())),
                ) else {
                    return;
                };
                for r in &p.r1 {
                    for a in &p.alone {
                        out.add(format!("{pw} {m} {r} {a}"));
                        out.add(format!("{r} {pw} {a} {m}"));
                    }
                }
            }
            Engine::TagModifier => {
                let tags = &p.review_tags;
                let (Some(tag), Some(m)) = (at(tags, cycle, 0), at(mods, cycle, lap(cycle, tags.len()))) else {
                    return;
                };
                for r in &p.r1 {
                    out.add(format!("{r} {m} {tag}"));
                    for sf in head(sfx, 6) {
                        out.add(format!("{r} {tag} {m} {sf}"));
                    }
                }
            }
        }
    }
}

/// How many full passes over a pool of `len` entries `cycle` has made.
fn lap(cycle: usize, len: usize) -> usize {
    cycle / len.max(1)
}

/// Entry `cycle + offset` of `list`, where the offset widens every lap.
/// A zero offset indexes by the cycle alone.
fn at(list: &[String], cycle: usize, offset: usize) -> Option<&String> {
    if list.is_empty() {
        return None;
    }
    let widened = if offset == 0 {
        0
    } else {
        offset + lap(cycle, list.len())
    };
    list.get((cycle + widened) % list.len())
}
