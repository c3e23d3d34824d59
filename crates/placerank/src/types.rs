//! Core data types shared by the generator, resolver, and sweep state.

use serde::{Deserialize, Serialize};

/// Maximum number of service/menu terms consumed from a profile.
pub const MAX_PROFILE_SERVICES: usize = 60;

/// Highest rank the system reports; anything below is treated as absent.
pub const RANK_WINDOW: u8 = 5;

/// The business whose visibility is being swept.
///
/// Supplied by an external profiling step and read-only for the whole sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessProfile {
    /// Opaque numeric listing identifier.
    pub id: String,
    /// Display name of the listing.
    pub name: String,
    /// Category code (e.g. `food`, `medical_dental`). Empty means "detect".
    #[serde(default)]
    pub category_code: String,
    /// Free-form category text shown on the listing, if known.
    #[serde(default)]
    pub category_name: Option<String>,
    /// Street address as displayed.
    #[serde(default)]
    pub address: String,
    /// Ordered service or menu terms, most important first.
    #[serde(default)]
    pub services: Vec<String>,
    /// Review-derived tags.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl BusinessProfile {
    /// Check the fields the sweep cannot run without.
    pub fn validate(&self) -> PlaceRankResult<()> {
        let id = self.id.trim();
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_digit()) {
            return Err(PlaceRankError::InvalidProfile(format!(
                "identifier must be numeric, got {:?}",
                self.id
            )));
        }
        if self.name.trim().is_empty() {
            return Err(PlaceRankError::InvalidProfile(
                "display name is empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Service terms with blanks removed, capped at [`MAX_PROFILE_SERVICES`].
    pub fn service_terms(&self) -> Vec<String> {
        self.services
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .take(MAX_PROFILE_SERVICES)
            .map(str::to_string)
            .collect()
    }

    /// The identity the resolver matches against.
    pub fn target(&self) -> Target {
        Target::new(&self.id, &self.name, &self.address)
    }
}

/// Identity of the listing being looked for in a results page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub id: String,
    pub name: String,
    pub address: String,
}

impl Target {
    pub fn new(id: &str, name: &str, address: &str) -> Self {
        Self {
            id: id.trim().to_string(),
            name: name.trim().to_string(),
            address: address.trim().to_string(),
        }
    }

    /// Name with all whitespace removed and lowercased.
    pub fn normalized_name(&self) -> String {
        normalize_name(&self.name)
    }
}

/// Strip whitespace and lowercase, the comparison form used for names.
pub fn normalize_name(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// A generated search phrase plus the round that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Candidate {
    pub phrase: String,
    pub round: u32,
}

/// One organic result row extracted from a fetched payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultEntity {
    pub id: String,
    pub name: String,
    pub address: Option<String>,
    pub image_count: u32,
    pub has_review_signal: bool,
    pub has_visitor_reviews: bool,
    /// Source fragment, kept for deep id matching only.
    #[serde(skip)]
    pub raw: String,
}

/// The two structural styles of the results page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MapVariant {
    Legacy,
    Current,
}

impl std::fmt::Display for MapVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Legacy => write!(f, "legacy"),
            Self::Current => write!(f, "current"),
        }
    }
}

impl std::str::FromStr for MapVariant {
    type Err = PlaceRankError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "legacy" | "old" => Ok(Self::Legacy),
            "current" | "new" => Ok(Self::Current),
            other => Err(PlaceRankError::InvalidInput(format!(
                "unknown map variant: {other}"
            ))),
        }
    }
}

/// Which classification or extraction path produced an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Payload empty or too short to be a results page.
    EmptyPayload,
    /// Challenge or block marker present.
    Blocked,
    /// Fetch itself failed before any payload arrived.
    FetchError,
    /// Page loaded but has no local-results section.
    NoResultSection,
    SktPayload,
    Hydration,
    EntityGraph,
    ScriptScan,
    Markup,
    IdNamePairs,
    /// Result section present but no strategy yielded entities.
    NoEntities,
}

impl Strategy {
    /// Failures that call for an immediate pool reset.
    pub fn is_hard_block(self) -> bool {
        matches!(self, Self::Blocked)
    }

    /// Failures that are retried and counted toward the failure threshold.
    pub fn is_transient_failure(self) -> bool {
        matches!(self, Self::EmptyPayload | Self::FetchError)
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::EmptyPayload => "empty-payload",
            Self::Blocked => "blocked",
            Self::FetchError => "fetch-error",
            Self::NoResultSection => "no-result-section",
            Self::SktPayload => "skt-payload",
            Self::Hydration => "hydration",
            Self::EntityGraph => "entity-graph",
            Self::ScriptScan => "script-scan",
            Self::Markup => "markup",
            Self::IdNamePairs => "id-name-pairs",
            Self::NoEntities => "no-entities",
        };
        f.write_str(s)
    }
}

/// How the target was located inside the entity list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    Id,
    DeepId,
    NamePrefix,
}

/// Result of resolving one payload against the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchOutcome {
    /// 1-based position, only ever in `1..=5`.
    pub rank: Option<u8>,
    pub map_variant: Option<MapVariant>,
    pub load_failed: bool,
    pub strategy: Strategy,
    pub method: Option<MatchMethod>,
}

impl MatchOutcome {
    /// A failed load (transient or blocked).
    pub fn failed(strategy: Strategy) -> Self {
        Self {
            rank: None,
            map_variant: None,
            load_failed: true,
            strategy,
            method: None,
        }
    }

    /// A healthy page where the target does not rank.
    pub fn miss(strategy: Strategy, map_variant: Option<MapVariant>) -> Self {
        Self {
            rank: None,
            map_variant,
            load_failed: false,
            strategy,
            method: None,
        }
    }

    /// A ranked outcome. Positions outside the rank window become a miss.
    pub fn ranked(
        position: usize,
        map_variant: MapVariant,
        strategy: Strategy,
        method: MatchMethod,
    ) -> Self {
        if position == 0 || position > RANK_WINDOW as usize {
            return Self::miss(strategy, Some(map_variant));
        }
        Self {
            rank: Some(position as u8),
            map_variant: Some(map_variant),
            load_failed: false,
            strategy,
            method: Some(method),
        }
    }

    pub fn is_hit(&self) -> bool {
        self.rank.is_some() && self.map_variant.is_some()
    }

    pub fn is_hard_block(&self) -> bool {
        self.load_failed && self.strategy.is_hard_block()
    }
}

/// One (keyword, variant) pair at which the target ranked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hit {
    pub keyword: String,
    pub rank: u8,
    pub map_variant: MapVariant,
    /// 1-based discovery order within the sweep.
    pub found_order: u32,
}

/// Errors that can occur in the core library.
#[derive(thiserror::Error, Debug)]
pub enum PlaceRankError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Vocabulary error: {0}")]
    Vocabulary(String),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Invalid profile: {0}")]
    InvalidProfile(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Convenience result type.
pub type PlaceRankResult<T> = Result<T, PlaceRankError>;
