//! Location tokens derived from a business address.

use crate::types::normalize_name;
use crate::vocabulary::Vocabulary;
use regex::Regex;
use std::collections::HashSet;

/// Longest region prefix kept, in characters.
pub const MAX_PREFIX_CHARS: usize = 35;

macro_rules! regex {
    ($re:literal) => {{
        static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
        RE.get_or_init(|| regex::Regex::new($re).expect("location regex is valid"))
    }};
}

/// A whitespace-joined combination of one to four location tokens.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegionPrefix {
    pub text: String,
    /// How many location tokens were joined. "Busan City" counts as one.
    pub parts: u8,
}

/// Everything the generator knows about where the business is.
#[derive(Debug, Clone, Default)]
pub struct LocationTokens {
    pub city_bare: Vec<String>,
    pub city_formal: Vec<String>,
    /// Bare, formal, and country-qualified city forms.
    pub city_all: Vec<String>,
    pub district: Vec<String>,
    pub neighborhood: Vec<String>,
    pub road: Option<String>,
    /// Landmark-DB area names found in the address or business name.
    pub landmarks: Vec<String>,
    pub stations: Vec<String>,
    pub sights: Vec<String>,
    pub shopping: Vec<String>,
    pub prefixes: Vec<RegionPrefix>,
}

impl LocationTokens {
    pub fn derive(address: &str, name: &str, vocab: &Vocabulary) -> Self {
        let mut loc = LocationTokens::default();
        loc.collect_cities(address, vocab);
        loc.collect_district(address);
        loc.collect_neighborhood(address);
        loc.road = road_name(address);

        for area in vocab.landmarks.keys() {
            if address.contains(area.as_str()) || name.contains(area.as_str()) {
                loc.landmarks.push(area.clone());
            }
        }

        let mut stations = Vec::new();
        let mut sights = Vec::new();
        let mut shopping = Vec::new();
        for area in loc
            .district
            .iter()
            .chain(loc.neighborhood.iter())
            .chain(loc.landmarks.iter())
        {
            if let Some(entry) = vocab.landmarks.get(area) {
                stations.extend(entry.station.iter().cloned());
                sights.extend(entry.sights.iter().cloned());
                shopping.extend(entry.shopping.iter().cloned());
            }
        }
        loc.stations = dedup(stations).into_iter().take(12).collect();
        loc.sights = dedup(sights).into_iter().take(10).collect();
        loc.shopping = dedup(shopping).into_iter().take(8).collect();

        loc.prefixes = build_prefixes(&loc);
        loc
    }

    fn collect_cities(&mut self, address: &str, vocab: &Vocabulary) {
        let mut bare: Vec<String> = Vec::new();
        let mut formal: Vec<String> = Vec::new();

        if let Some(city) = first_city_name(address, vocab) {
            bare.push(city.to_string());
            formal.push(format!("{city}시"));
            if let Some(full) = vocab.metro.get(city) {
                if *full != format!("{city}시") {
                    formal.push(full.clone());
                }
            }
        }

        if let Some(c) = regex!(r"([가-힣]{2,6}(?:시|군))").captures(address) {
            let full = c[1].to_string();
            let stripped = strip_city_suffix(&full);
            if stripped.chars().count() >= 2 {
                push_unique(&mut bare, stripped.to_string());
                push_unique(&mut formal, format!("{stripped}시"));
                push_unique(&mut formal, full);
            } else {
                push_unique(&mut formal, full);
            }
        }

        if let Some(c) = regex!(r"\b([A-Za-z][A-Za-z\-]+) City\b").captures(address) {
            let stem = c[1].to_string();
            push_unique(&mut formal, format!("{stem} City"));
            if stem.chars().count() >= 2 {
                push_unique(&mut bare, stem);
            }
        }

        let mut all: Vec<String> = bare.iter().chain(formal.iter()).cloned().collect();
        let country = vocab.country_prefix.trim();
        if !country.is_empty() {
            for c in bare.iter().chain(formal.iter()) {
                all.push(format!("{country} {c}"));
            }
        }

        self.city_bare = bare;
        self.city_formal = formal;
        self.city_all = dedup(all);
    }

    fn collect_district(&mut self, address: &str) {
        if let Some(c) = regex!(r"([가-힣]{2,4}구)").captures(address) {
            let full = c[1].to_string();
            let bare: String = full.trim_end_matches('구').to_string();
            self.district.push(full);
            if bare.chars().count() >= 2 {
                self.district.push(bare);
            }
            return;
        }
        let english = regex!(r"\bDistrict ([A-Za-z0-9][A-Za-z0-9\-]*)\b")
            .captures(address)
            .or_else(|| regex!(r"\b([A-Za-z][A-Za-z\-]+) District\b").captures(address));
        if let Some(c) = english {
            let stem = c[1].to_string();
            self.district.push(c[0].to_string());
            if stem.chars().count() >= 2 {
                self.district.push(stem);
            }
        }
    }

    fn collect_neighborhood(&mut self, address: &str) {
        if let Some(c) = regex!(r"([가-힣]{2,4}동)").captures(address) {
            let full = c[1].to_string();
            let bare: String = full.trim_end_matches('동').to_string();
            if bare.chars().count() >= 2 && bare != full {
                self.neighborhood.push(full);
                self.neighborhood.push(bare);
            } else {
                self.neighborhood.push(full);
            }
            return;
        }
        if let Some(c) = regex!(r"\b([A-Za-z][A-Za-z\-]+) (?:Dong|Neighborhood)\b").captures(address) {
            let stem = c[1].to_string();
            self.neighborhood.push(c[0].to_string());
            if stem.chars().count() >= 2 {
                self.neighborhood.push(stem);
            }
        }
    }

    /// Landmark areas, stations, sights, and shopping in one list.
    pub fn all_landmarks(&self) -> Vec<String> {
        self.stations
            .iter()
            .chain(self.sights.iter())
            .chain(self.shopping.iter())
            .chain(self.landmarks.iter())
            .cloned()
            .collect()
    }

    /// District, neighborhood, and city tokens of at least two characters.
    pub fn regions(&self) -> Vec<String> {
        let bare_and_formal = self.city_bare.iter().chain(self.city_formal.iter());
        let all = self
            .district
            .iter()
            .chain(self.neighborhood.iter())
            .chain(bare_and_formal)
            .filter(|r| r.chars().count() >= 2)
            .cloned()
            .collect();
        dedup(all)
    }

    /// Prefixes made of exactly `parts` tokens (`4` also takes longer ones).
    pub fn prefixes_of(&self, parts: u8) -> Vec<String> {
        self.prefixes
            .iter()
            .filter(|p| if parts >= 4 { p.parts >= 4 } else { p.parts == parts })
            .map(|p| p.text.clone())
            .collect()
    }

    pub fn all_prefixes(&self) -> Vec<String> {
        self.prefixes.iter().map(|p| p.text.clone()).collect()
    }
}

fn first_city_name<'a>(address: &str, vocab: &'a Vocabulary) -> Option<&'a str> {
    vocab
        .city_names()
        .into_iter()
        .filter_map(|c| address.find(c).map(|pos| (pos, c)))
        .min_by_key(|(pos, _)| *pos)
        .map(|(_, c)| c)
}

fn strip_city_suffix(full: &str) -> &str {
    for suffix in ["광역시", "특별자치시", "특별자치도", "특별시", "시", "군"] {
        if let Some(stripped) = full.strip_suffix(suffix) {
            return stripped;
        }
    }
    full
}

fn road_name(address: &str) -> Option<String> {
    if let Some(c) = regex!(r"([가-힣]{2,8}(?:로|길))").captures(address) {
        return Some(c[1].to_string());
    }
    regex!(r"\b([A-Za-z][A-Za-z\-]+ (?:Road|Street))\b")
        .captures(address)
        .map(|c| c[1].to_string())
}

fn build_prefixes(loc: &LocationTokens) -> Vec<RegionPrefix> {
    let c = &loc.city_all;
    let g = &loc.district;
    let d = &loc.neighborhood;
    let lm = &loc.landmarks;
    let st: Vec<String> = loc.stations.iter().take(6).cloned().collect();
    let si: Vec<String> = loc.sights.iter().take(5).cloned().collect();

    let mut set = PrefixSet::default();

    for t in c.iter().chain(g).chain(d).chain(lm).chain(&st).chain(&si) {
        set.add(t.clone(), 1);
    }

    let pairs: [(&Vec<String>, &Vec<String>); 13] = [
        (c, g),
        (c, d),
        (c, lm),
        (c, &st),
        (c, &si),
        (g, d),
        (g, lm),
        (g, &st),
        (g, &si),
        (d, lm),
        (d, &st),
        (lm, &si),
        (lm, &st),
    ];
    for (a_list, b_list) in pairs {
        for a in a_list {
            for b in b_list {
                if a != b {
                    set.add(format!("{a} {b}"), 2);
                }
            }
        }
    }

    let triples: [(&Vec<String>, &Vec<String>, &Vec<String>); 14] = [
        (c, g, d),
        (c, g, lm),
        (c, g, &st),
        (c, g, &si),
        (c, d, lm),
        (c, d, &st),
        (c, d, &si),
        (g, d, lm),
        (g, d, &st),
        (g, d, &si),
        (c, lm, &st),
        (c, lm, &si),
        (g, lm, &st),
        (g, lm, &si),
    ];
    for (a_list, b_list, c_list) in triples {
        for a in a_list {
            for b in b_list {
                for x in c_list {
                    if a != b && b != x && a != x {
                        set.add(format!("{a} {b} {x}"), 3);
                    }
                }
            }
        }
    }

    if !g.is_empty() && !d.is_empty() && !lm.is_empty() {
        for a in c {
            for b in g {
                for x in d {
                    for l in lm {
                        let p = format!("{a} {b} {x} {l}");
                        if p.chars().count() <= MAX_PREFIX_CHARS {
                            set.add(p, 4);
                        }
                    }
                }
            }
        }
    }

    if lm.len() >= 2 {
        for i in 0..lm.len() {
            for j in (i + 1)..lm.len() {
                set.add(format!("{} {}", lm[i], lm[j]), 2);
                set.add(format!("{} {}", lm[j], lm[i]), 2);
                for city in c.iter().take(2) {
                    set.add(format!("{city} {} {}", lm[i], lm[j]), 3);
                }
            }
        }
    }

    let mut out: Vec<RegionPrefix> = set
        .items
        .into_iter()
        .filter(|p| {
            let n = p.text.chars().count();
            (2..=MAX_PREFIX_CHARS).contains(&n)
        })
        .collect();
    out.sort_by_key(|p| (p.parts, p.text.chars().count()));
    out
}

#[derive(Default)]
struct PrefixSet {
    seen: HashSet<String>,
    items: Vec<RegionPrefix>,
}

impl PrefixSet {
    fn add(&mut self, text: String, parts: u8) {
        if self.seen.insert(text.clone()) {
            self.items.push(RegionPrefix { text, parts });
        }
    }
}

fn push_unique(list: &mut Vec<String>, item: String) {
    if !list.contains(&item) {
        list.push(item);
    }
}

/// Order-preserving dedup.
pub(crate) fn dedup(items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

// ── Location-context filter ──

/// Decides whether a keyword carries enough location context to be worth a
/// search, or names the business itself.
#[derive(Debug, Clone)]
pub struct LocationFilter {
    tokens: Vec<String>,
    business_name: String,
}

impl LocationFilter {
    /// Region tokens come from the global region list, every landmark name in
    /// the vocabulary, and the profile's own location tokens.
    pub fn new(vocab: &Vocabulary, location: &LocationTokens, business_name: &str) -> Self {
        let mut tokens: Vec<String> = vocab.regions.clone();
        for (area, entry) in &vocab.landmarks {
            tokens.push(area.clone());
            tokens.extend(entry.station.iter().cloned());
            tokens.extend(entry.sights.iter().cloned());
            tokens.extend(entry.shopping.iter().cloned());
        }
        tokens.extend(location.regions());
        tokens.extend(location.all_landmarks());
        tokens.extend(location.road.iter().cloned());
        let tokens = dedup(tokens)
            .into_iter()
            .filter(|t| t.chars().count() >= 2)
            .map(|t| t.to_lowercase())
            .collect();
        Self {
            tokens,
            business_name: business_name.to_string(),
        }
    }

    pub fn allows(&self, keyword: &str) -> bool {
        if keyword.trim().is_empty() {
            return false;
        }
        let lower = keyword.to_lowercase();
        if self.tokens.iter().any(|t| lower.contains(t.as_str())) {
            return true;
        }
        if self.business_name.chars().count() < 2 {
            return false;
        }
        let nb = normalize_name(&self.business_name);
        let nk = normalize_name(keyword);
        if nk.contains(&nb) {
            return true;
        }
        let stripped = strip_name_suffix(&nk);
        stripped.chars().count() >= 2 && nb.contains(stripped.as_str())
    }
}

fn strip_name_suffix(s: &str) -> String {
    let re: &Regex = regex!(r"[가-힣]{1,2}(?:맛집|추천|후기|인기|순위|예약|가격)");
    re.replacen(s, 1, "").into_owned()
}
