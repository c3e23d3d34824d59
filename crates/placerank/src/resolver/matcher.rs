//! Locating the target inside an ordered entity list.

use crate::types::{normalize_name, MatchMethod, ResultEntity, Target};
use crate::vocabulary::Vocabulary;

/// Entities considered when matching; later rows never count.
pub const MATCH_WINDOW: usize = 10;
/// Minimum normalized name length for prefix matching.
pub const MIN_PREFIX_CHARS: usize = 4;

/// Decides whether a name-prefix match is really a different location of
/// the same brand.
pub trait BranchPolicy: Send + Sync {
    fn rejects(&self, entity: &ResultEntity, target: &Target) -> bool;
}

/// Rejects entities whose name carries a branch token the target address
/// lacks, or whose address lacks the target's district.
#[derive(Debug, Clone, Default)]
pub struct TokenBranchPolicy {
    tokens: Vec<String>,
}

impl TokenBranchPolicy {
    pub fn new(tokens: Vec<String>) -> Self {
        Self { tokens }
    }

    pub fn from_vocabulary(vocab: &Vocabulary) -> Self {
        Self::new(vocab.branch_tokens.clone())
    }
}

impl BranchPolicy for TokenBranchPolicy {
    fn rejects(&self, entity: &ResultEntity, target: &Target) -> bool {
        let in_name: Vec<&String> = self
            .tokens
            .iter()
            .filter(|t| entity.name.contains(t.as_str()))
            .collect();
        if !in_name.is_empty() {
            let same_area = !target.address.is_empty()
                && in_name.iter().any(|t| target.address.contains(t.as_str()));
            if !same_area {
                return true;
            }
        }

        let Some(entity_addr) = entity.address.as_deref().filter(|a| !a.is_empty()) else {
            return false;
        };
        match district_of(&target.address) {
            Some(gu) => !entity_addr.contains(gu),
            None => false,
        }
    }
}

fn district_of(address: &str) -> Option<&str> {
    static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"[가-힣]{2,4}구").expect("district regex is valid"))
        .find(address)
        .map(|m| m.as_str())
}

/// 1-based position of the target among the first [`MATCH_WINDOW`]
/// entities, and how it was recognized.
///
/// Identifier equality wins, then the identifier appearing in the source
/// fragment, then a normalized name prefix that `policy` does not reject.
pub fn match_rank(
    entities: &[ResultEntity],
    target: &Target,
    policy: &dyn BranchPolicy,
) -> Option<(usize, MatchMethod)> {
    let window = &entities[..entities.len().min(MATCH_WINDOW)];

    if !target.id.is_empty() {
        if let Some(i) = window.iter().position(|e| e.id == target.id) {
            return Some((i + 1, MatchMethod::Id));
        }
        if let Some(i) = window.iter().position(|e| e.raw.contains(&target.id)) {
            return Some((i + 1, MatchMethod::DeepId));
        }
    }

    let wanted = normalize_name(&target.name);
    if wanted.chars().count() < MIN_PREFIX_CHARS {
        return None;
    }
    window
        .iter()
        .position(|e| {
            let name = normalize_name(&e.name);
            name.chars().count() >= MIN_PREFIX_CHARS
                && name.starts_with(&wanted)
                && !policy.rejects(e, target)
        })
        .map(|i| (i + 1, MatchMethod::NamePrefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ent(id: &str, name: &str, address: Option<&str>) -> ResultEntity {
        ResultEntity {
            id: id.into(),
            name: name.into(),
            address: address.map(str::to_string),
            image_count: 0,
            has_review_signal: false,
            has_visitor_reviews: false,
            raw: String::new(),
        }
    }

    fn policy() -> TokenBranchPolicy {
        TokenBranchPolicy::new(vec!["강남점".into(), "본점".into(), "2호점".into()])
    }

    #[test]
    fn test_id_match_position() {
        let list = vec![ent("1", "a", None), ent("2", "b", None), ent("1234567", "c", None)];
        let t = Target::new("1234567", "Nothing Alike", "");
        assert_eq!(match_rank(&list, &t, &policy()), Some((3, MatchMethod::Id)));
    }

    #[test]
    fn test_exact_id_beats_earlier_weaker_matches() {
        let t = Target::new("1234567", "바다칼국수", "");

        let list = vec![ent("1111111", "바다칼국수", None), ent("1234567", "다른집", None)];
        assert_eq!(match_rank(&list, &t, &policy()), Some((2, MatchMethod::Id)));

        let mut first = ent("1111111", "x", None);
        first.raw = r#"{"next":"/place/1234567"}"#.into();
        let list = vec![first, ent("1234567", "다른집", None)];
        assert_eq!(match_rank(&list, &t, &policy()), Some((2, MatchMethod::Id)));
    }

    #[test]
    fn test_deep_id_beats_earlier_name_match() {
        let mut second = ent("999", "x", None);
        second.raw = "/place/1234567".into();
        let list = vec![ent("1111111", "바다칼국수", None), second];
        let t = Target::new("1234567", "바다칼국수", "");
        assert_eq!(match_rank(&list, &t, &policy()), Some((2, MatchMethod::DeepId)));
    }

    #[test]
    fn test_deep_id_match() {
        let mut e = ent("999", "x", None);
        e.raw = r#"{"link":"/place/1234567"}"#.into();
        let t = Target::new("1234567", "zz", "");
        assert_eq!(match_rank(&[e], &t, &policy()), Some((1, MatchMethod::DeepId)));
    }

    #[test]
    fn test_branch_rejected_unless_same_area() {
        let list = vec![ent("1", "바다칼국수 강남점", None), ent("2", "바다 칼국수", None)];
        let t = Target::new("7", "바다 칼국수", "부산 수영구 광안동");
        assert_eq!(match_rank(&list, &t, &policy()), Some((2, MatchMethod::NamePrefix)));

        let t = Target::new("7", "바다 칼국수", "서울 강남점 옆");
        assert_eq!(match_rank(&list, &t, &policy()), Some((1, MatchMethod::NamePrefix)));
    }

    #[test]
    fn test_district_mismatch_rejected() {
        let list = vec![
            ent("1", "바다칼국수", Some("부산 해운대구 우동")),
            ent("2", "바다칼국수", Some("부산 수영구 광안동")),
        ];
        let t = Target::new("7", "바다칼국수", "부산광역시 수영구 광안해변로 219");
        assert_eq!(match_rank(&list, &t, &policy()), Some((2, MatchMethod::NamePrefix)));
    }

    #[test]
    fn test_short_names_and_window() {
        let t = Target::new("7", "바다", "");
        assert_eq!(match_rank(&[ent("1", "바다횟집", None)], &t, &policy()), None);

        let mut list: Vec<ResultEntity> = (0..12).map(|i| ent(&format!("x{i}"), "x", None)).collect();
        list.push(ent("7", "y", None));
        assert_eq!(match_rank(&list, &Target::new("7", "yyyy", ""), &policy()), None);
    }
}
