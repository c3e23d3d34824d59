//! JSON introspection for embedded result data.
//!
//! Payload shapes change without notice, so everything here is heuristic:
//! wrapper keys are searched a few levels deep, arrays are tried wherever
//! they appear, and any failure simply yields `None`.

use crate::types::ResultEntity;
use regex::Regex;
use serde_json::{Map, Value};

/// Longest span scanned for a balanced literal, in characters.
pub const MAX_BALANCED_CHARS: usize = 500_000;
/// Shortest extracted literal worth parsing.
const MIN_LITERAL_LEN: usize = 50;

macro_rules! regex {
    ($re:literal) => {{
        static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
        RE.get_or_init(|| regex::Regex::new($re).expect("json heuristics regex is valid"))
    }};
}

const ID_KEYS: &[&str] = &[
    "id", "placeId", "businessId", "nid", "sid", "place_id", "place_nid", "cid", "u_cid",
    "placeID", "shopId", "storeId", "entryId", "bizId", "localId", "naverMapId",
];
const NAME_KEYS: &[&str] = &[
    "name", "title", "businessName", "placeName", "display", "shopName", "storeName",
    "displayName", "placeTitle", "itemName",
];
const ADDRESS_KEYS: &[&str] = &["roadAddress", "fullAddress", "jibunAddress", "streetAddress"];
const IMAGE_ARRAY_KEYS: &[&str] = &["images", "imageList", "thumUrls", "photos", "imageUrls"];
const IMAGE_COUNT_KEYS: &[&str] = &[
    "imageCount", "imgCount", "photoCount", "imageLength", "totalImageCount", "placeImageCount",
];
const THUMB_KEYS: &[&str] = &["thumUrl", "imageUrl", "thumbnail", "thumbUrl", "mainImage", "representImage"];
const REVIEW_SIGNAL_KEYS: &[&str] = &[
    "menuInfo", "receiptReview", "visitorReviewScore", "scoreInfo", "reviewTags", "microReview",
    "reviewKeywordList", "placeReviewCount",
];
const VISITOR_COUNT_KEYS: &[&str] = &[
    "reviewCount", "visitorReviewCount", "fsVisitorReviewCount", "totalReviewCount",
    "blogCafeReviewCount", "bookingReviewCount", "cardReviewNum", "blogReviewCount", "reviewCnt",
    "placeReviewCount", "visitorReviewTotal", "saveCnt",
];
/// Wrapper objects searched when a key is not found at the top level.
const WRAPPER_KEYS: &[&str] = &[
    "place", "business", "item", "commonData", "base", "detail", "placeDetail", "data", "info", "node",
];
/// Candidate ref-array locations under a graph root query.
const GRAPH_ARRAY_KEYS: &[&str] = &["items", "result", "data", "list", "places", "businesses", "edges", "nodes"];

// ── Balanced literal extraction ──

/// The `{...}` or `[...]` literal starting at byte `start`, found by bracket
/// counting that skips string contents.
pub fn extract_balanced(s: &str, start: usize) -> Option<&str> {
    let rest = s.get(start..)?;
    let open = rest.chars().next()?;
    let close = match open {
        '{' => '}',
        '[' => ']',
        _ => return None,
    };
    let mut depth = 0i64;
    let mut in_str = false;
    let mut escaped = false;
    for (i, c) in rest.char_indices().take(MAX_BALANCED_CHARS) {
        if escaped {
            escaped = false;
            continue;
        }
        if c == '\\' && in_str {
            escaped = true;
            continue;
        }
        if c == '"' {
            in_str = !in_str;
            continue;
        }
        if in_str {
            continue;
        }
        match c {
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth -= 1;
                if depth == 0 && c == close {
                    return Some(&rest[..i + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse every balanced literal that follows a match of `pattern`.
///
/// The opening bracket is looked for from three bytes before the end of the
/// match to twenty bytes after it. A literal that fails to parse is retried
/// with trailing `;`, `,` and whitespace removed.
pub fn literals_after(text: &str, pattern: &Regex) -> Vec<Value> {
    let bytes = text.as_bytes();
    let mut out = Vec::new();
    for m in pattern.find_iter(text) {
        let from = m.end().saturating_sub(3);
        let to = (m.end() + 20).min(bytes.len());
        let Some(pos) = (from..to).find(|&i| bytes[i] == b'{' || bytes[i] == b'[') else {
            continue;
        };
        let Some(literal) = extract_balanced(text, pos) else {
            continue;
        };
        if literal.len() < MIN_LITERAL_LEN {
            continue;
        }
        match serde_json::from_str::<Value>(literal) {
            Ok(v) => out.push(v),
            Err(_) => {
                let trimmed = literal.trim_end_matches(|c: char| c == ';' || c == ',' || c.is_whitespace());
                if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
                    out.push(v);
                }
            }
        }
    }
    out
}

// ── Ad detection ──

/// Explicit advertisement flags or fields on a result object.
pub fn is_ad(item: &Value) -> bool {
    let Some(obj) = item.as_object() else {
        return false;
    };
    let field = |k: &str| obj.get(k);

    match field("ad") {
        Some(Value::Bool(true)) => return true,
        Some(Value::String(s)) if s == "true" => return true,
        Some(Value::Number(n)) if n.as_i64() == Some(1) => return true,
        _ => {}
    }
    match field("isAd") {
        Some(Value::Bool(true)) => return true,
        Some(Value::String(s)) if s == "true" => return true,
        _ => {}
    }
    match field("adyn") {
        Some(Value::Bool(true)) => return true,
        Some(Value::String(s)) if s == "Y" => return true,
        _ => {}
    }
    let truthy_keys = [
        "isAdItem", "isPaymentAd", "isVisitAd", "adId", "adBidId", "adExposureId", "adRank",
    ];
    if truthy_keys.iter().any(|k| field(k).is_some_and(truthy)) {
        return true;
    }
    if let Some(Value::String(t)) = field("type") {
        if t.eq_ignore_ascii_case("ad") {
            return true;
        }
    }
    if let Some(Value::String(t)) = field("adType") {
        if !t.is_empty() {
            return true;
        }
    }
    if let Some(Value::String(t)) = field("businessItemType") {
        if t.eq_ignore_ascii_case("ad") {
            return true;
        }
    }
    if let Some(Value::String(t)) = field("itemType") {
        if regex!(r"(?i)ad|sponsor|power").is_match(t) {
            return true;
        }
    }
    false
}

/// JavaScript-style truthiness.
fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Leading integer of a number or numeric-prefixed string ("1,234" is 1).
fn leading_int(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let t = s.trim_start();
            let (sign, digits) = match t.strip_prefix('-') {
                Some(rest) => (-1, rest),
                None => (1, t.strip_prefix('+').unwrap_or(t)),
            };
            let end = digits.find(|c: char| !c.is_ascii_digit()).unwrap_or(digits.len());
            digits[..end].parse::<i64>().ok().map(|n| sign * n)
        }
        _ => None,
    }
}

fn scalar_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// ── Entity extraction ──

/// First usable value for any of `keys`, searching wrapper objects up to
/// four levels down.
pub fn deep_find<'a>(obj: &'a Value, keys: &[&str], depth: usize) -> Option<&'a Value> {
    let map = obj.as_object()?;
    if depth > 4 {
        return None;
    }
    for k in keys {
        match map.get(*k) {
            None | Some(Value::Null) => {}
            Some(Value::String(s)) if s.is_empty() => {}
            Some(v) => return Some(v),
        }
    }
    for w in WRAPPER_KEYS {
        if let Some(inner @ Value::Object(_)) = map.get(*w) {
            if let Some(found) = deep_find(inner, keys, depth + 1) {
                return Some(found);
            }
        }
    }
    None
}

/// Build result entities from an array of objects. Needs at least two.
pub fn extract_entities(arr: &[Value]) -> Option<Vec<ResultEntity>> {
    if arr.len() < 2 {
        return None;
    }
    let hits: Vec<ResultEntity> = arr.iter().filter_map(entity_from).collect();
    (hits.len() >= 2).then_some(hits)
}

fn entity_from(item: &Value) -> Option<ResultEntity> {
    let obj = item.as_object()?;

    let raw_id = deep_find(item, ID_KEYS, 0)
        .filter(|v| truthy(v))
        .and_then(scalar_string)
        .unwrap_or_default();
    let id = strip_id_prefix(&raw_id);
    let name = deep_find(item, NAME_KEYS, 0)
        .filter(|v| truthy(v))
        .and_then(scalar_string)
        .unwrap_or_default()
        .trim()
        .to_string();
    if id.len() < 5 || !id.chars().all(|c| c.is_ascii_digit()) || name.is_empty() {
        return None;
    }
    if is_ad(item) {
        return None;
    }

    let address = address_of(item, obj);
    let raw = serde_json::to_string(item).unwrap_or_default();

    let mut image_count = image_count_of(item);
    let mut has_review_signal = REVIEW_SIGNAL_KEYS.iter().any(|k| {
        deep_find(item, &[k], 0).is_some_and(|v| match v {
            Value::Array(a) => !a.is_empty(),
            other => truthy(other),
        })
    });
    let mut has_visitor_reviews = VISITOR_COUNT_KEYS
        .iter()
        .any(|k| deep_find(item, &[k], 0).and_then(leading_int).is_some_and(|n| n > 0));

    // Signals that sit deeper than the key search reaches.
    if image_count == 0 {
        if let Some(c) = regex!(r#""(?:imageCount|imgCount|photoCount|totalImageCount|imageLength)"[:\s]*(\d+)"#).captures(&raw) {
            image_count = c[1].parse().unwrap_or(0);
        }
    }
    if !has_review_signal {
        has_review_signal = regex!(r#""menuInfo"|"reviewKeywordList"|"receiptReview"|"visitorReviewScore"|"scoreInfo"|"reviewTags"|"microReview""#)
            .is_match(&raw);
    }
    if !has_visitor_reviews {
        if let Some(c) = regex!(r#""(?:reviewCount|visitorReviewCount|totalReviewCount|blogCafeReviewCount)"[:\s]*"?(\d+)"?"#).captures(&raw) {
            has_visitor_reviews = c[1].parse::<u64>().is_ok_and(|n| n > 0);
        }
    }

    Some(ResultEntity {
        id,
        name,
        address,
        image_count,
        has_review_signal,
        has_visitor_reviews,
        raw,
    })
}

fn strip_id_prefix(raw: &str) -> String {
    let b = raw.as_bytes();
    if b.len() >= 2 && b[0].is_ascii_lowercase() && b[1] == b':' {
        raw[2..].to_string()
    } else {
        raw.to_string()
    }
}

fn address_of(item: &Value, obj: &Map<String, Value>) -> Option<String> {
    let text = |v: Option<&Value>| v.and_then(Value::as_str).filter(|s| !s.is_empty()).map(str::to_string);

    if let Some(a) = deep_find(item, ADDRESS_KEYS, 0).filter(|v| truthy(v)).and_then(scalar_string) {
        return Some(a);
    }
    if let Some(info) = obj.get("addressInfo").and_then(Value::as_object) {
        if let Some(a) = text(info.get("roadAddress")).or_else(|| text(info.get("fullAddress"))) {
            return Some(a);
        }
    }
    match obj.get("address") {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Object(a)) => text(a.get("streetAddress"))
            .or_else(|| text(a.get("roadAddress")))
            .or_else(|| text(a.get("fullAddress"))),
        _ => None,
    }
}

fn image_count_of(item: &Value) -> u32 {
    let mut count: u32 = match deep_find(item, IMAGE_ARRAY_KEYS, 0) {
        Some(Value::Array(a)) => a.len() as u32,
        Some(Value::String(s)) if s.len() > 10 => s.split(',').count() as u32,
        _ => 0,
    };
    if count <= 1 {
        let explicit = deep_find(item, IMAGE_COUNT_KEYS, 0)
            .and_then(leading_int)
            .unwrap_or(0);
        if explicit > count as i64 {
            count = explicit.min(u32::MAX as i64) as u32;
        }
    }
    if count == 0 && deep_find(item, THUMB_KEYS, 0).is_some_and(truthy) {
        count = 1;
    }
    count
}

// ── Place array search ──

fn ad_key(key: &str) -> bool {
    regex!(r"(?i)\bad\b|aditem|powerlink|sponsor|banner").is_match(key)
}

/// Depth-first search for the first array that yields result entities.
///
/// Object keys that look like place lists are tried first, then generic
/// container keys, then the rest. Advertisement-looking keys are skipped.
pub fn find_place_array(value: &Value, depth: usize, parent_key: &str) -> Option<Vec<ResultEntity>> {
    if depth > 30 {
        return None;
    }
    if regex!(r"(?i)\bad\b|aditem|powerlink|sponsor|banner|cm_a|nkw|plcash").is_match(parent_key) {
        return None;
    }
    match value {
        Value::Array(arr) if arr.len() >= 2 => {
            if let Some(found) = extract_entities(arr) {
                return Some(found);
            }
            arr.iter()
                .take(40)
                .enumerate()
                .find_map(|(i, v)| find_place_array(v, depth + 1, &i.to_string()))
        }
        Value::Object(map) => {
            let tier1 = regex!(r"(?i)place|smart_?around|organic|placelist|placesearch|localsearch|searchresult|bluelink|nxplaces");
            let tier2 = regex!(r"(?i)list|items|result|data|search|local|query|queries|documents|entries|contents|nodes|edges");
            let keys: Vec<&String> = map.keys().collect();
            let first: Vec<&String> = keys.iter().copied().filter(|k| tier1.is_match(k)).collect();
            let second: Vec<&String> = keys
                .iter()
                .copied()
                .filter(|k| !tier1.is_match(k) && tier2.is_match(k))
                .collect();
            let rest: Vec<&String> = keys
                .iter()
                .copied()
                .filter(|k| !tier1.is_match(k) && !tier2.is_match(k) && !ad_key(k))
                .collect();
            first
                .into_iter()
                .chain(second)
                .chain(rest)
                .find_map(|k| find_place_array(&map[k.as_str()], depth + 1, k))
        }
        _ => None,
    }
}

/// Locate the data of a named place-list query inside a hydration tree.
///
/// Returns `None` as soon as a normalized entity graph is found, since
/// those are handled by [`resolve_graph`].
pub fn find_search_place_query(root: &Value) -> Option<&Value> {
    let at = |path: &[&str]| -> Option<&Value> {
        let mut cur = root;
        for p in path {
            cur = cur.get(*p)?;
        }
        Some(cur)
    };
    let paths: [Option<&Value>; 12] = [
        at(&["props", "pageProps", "dehydratedState"]),
        at(&["props", "pageProps", "initialState"]),
        at(&["props", "pageProps"]),
        at(&["props", "initialState"]),
        at(&["props"]),
        at(&["__APOLLO_STATE__"]),
        at(&["ROOT_QUERY"]),
        at(&["data"]),
        at(&["result"]),
        at(&["pageData"]),
        at(&["initialData"]),
        Some(root),
    ];

    let query_key_re = regex!(r"(?i)SearchPlaceList|PlaceList|place.*list|smart_?around|local.*search|nxPlaces|PlaceBlueLink|placeSearch|localSearch");
    let ad_query_re = regex!(r"(?i)powerlink|adItem|AD_ITEM|sponsoredList");
    let id_field_re = regex!(r#"(?i)placeId|businessId|"sid""#);
    let list_key_re = regex!(r"(?i)PlaceList|placeSearch|searchPlace|localSearch|smartAround");

    for target in paths.into_iter().flatten() {
        if !truthy(target) {
            continue;
        }
        for qk in ["queries", "dehydratedQueries", "cache"] {
            let Some(queries) = target.get(qk).and_then(Value::as_array) else {
                continue;
            };
            for q in queries {
                let key = ["queryKey", "key", "queryHash"]
                    .iter()
                    .find_map(|k| q.get(*k).filter(|v| truthy(v)));
                let key_text = key
                    .map(|v| serde_json::to_string(v).unwrap_or_default())
                    .unwrap_or_default();
                if query_key_re.is_match(&key_text) {
                    let data = q
                        .get("state")
                        .and_then(|s| s.get("data"))
                        .filter(|v| truthy(v))
                        .or_else(|| q.get("data").filter(|v| truthy(v)))
                        .or_else(|| q.get("result").filter(|v| truthy(v)));
                    if let Some(d) = data {
                        return Some(d);
                    }
                }
            }
            for q in queries {
                let text = serde_json::to_string(q).unwrap_or_default();
                if ad_query_re.is_match(&text) {
                    continue;
                }
                if id_field_re.find_iter(&text).count() >= 3 {
                    let data = q
                        .get("state")
                        .and_then(|s| s.get("data"))
                        .filter(|v| truthy(v))
                        .or_else(|| q.get("data").filter(|v| truthy(v)))
                        .unwrap_or(q);
                    return Some(data);
                }
            }
        }
        if let Value::Object(map) = target {
            if map.contains_key("ROOT_QUERY") {
                return None;
            }
            for (k, v) in map {
                if list_key_re.is_match(k) && !k.eq_ignore_ascii_case("ROOT_QUERY") && (v.is_object() || v.is_array()) {
                    return Some(v);
                }
            }
        }
    }
    None
}

// ── Entity graph ──

fn ref_key(v: &Value) -> Option<&str> {
    v.get("__ref")
        .and_then(Value::as_str)
        .or_else(|| v.get("node").and_then(|n| n.get("__ref")).and_then(Value::as_str))
}

/// Resolve the place list of a normalized entity graph.
///
/// The root query holds arrays of `{"__ref": key}` indirections into the
/// flat entity map. They are resolved in array order, which is the rank
/// order; map iteration order is never used.
pub fn resolve_graph(graph: &Value) -> Option<Vec<ResultEntity>> {
    let root = graph.get("ROOT_QUERY").or_else(|| graph.get("root_query"))?.as_object()?;
    let list_re = regex!(r"(?i)PlaceList|placeSearch|searchPlace|localSearch|smartAround|nxPlaces|PlaceBlueLink");
    let ad_re = regex!(r"(?i)\bad\b|adItem|powerlink|sponsor");

    for (key, val) in root {
        if !list_re.is_match(key) || ad_re.is_match(key) {
            continue;
        }
        if !(val.is_object() || val.is_array()) {
            continue;
        }
        let mut candidates: Vec<&Vec<Value>> = Vec::new();
        if let Value::Array(a) = val {
            candidates.push(a);
        }
        for k in GRAPH_ARRAY_KEYS {
            if let Some(Value::Array(a)) = val.get(*k) {
                candidates.push(a);
            }
        }

        for arr in candidates {
            if arr.len() < 2 {
                continue;
            }
            if ref_key(&arr[0]).is_some() {
                let resolved: Vec<Value> = arr
                    .iter()
                    .filter_map(|entry| match ref_key(entry) {
                        Some(k) => graph.get(k).cloned(),
                        None if entry.is_object() && entry.get("__ref").is_none() => Some(entry.clone()),
                        None => None,
                    })
                    .collect();
                if resolved.len() >= 2 {
                    if let Some(found) = extract_entities(&resolved) {
                        return Some(found);
                    }
                }
            } else if let Some(found) = extract_entities(arr) {
                return Some(found);
            }
        }
    }
    None
}
