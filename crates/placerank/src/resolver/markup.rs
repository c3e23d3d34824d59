//! Markup-level extraction: ad stripping, place links, and id/name pairs.
//!
//! Context windows are measured in bytes and widened to the nearest char
//! boundaries, so they stay valid slices over mixed Hangul/ASCII markup.

use crate::types::ResultEntity;
use std::collections::HashSet;

macro_rules! regex {
    ($re:literal) => {{
        static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
        RE.get_or_init(|| regex::Regex::new($re).expect("markup regex is valid"))
    }};
}

/// Place path segments that prefix a listing id in result links.
const PLACE_PATHS: &[&str] = &["place/", "restaurant/", "hairshop/", "hospital/", "accommodation/"];

/// `s[start..end]` widened outward to char boundaries.
pub fn window(s: &str, start: usize, end: usize) -> &str {
    let mut a = start.min(s.len());
    while a > 0 && !s.is_char_boundary(a) {
        a -= 1;
    }
    let mut b = end.min(s.len()).max(a);
    while b < s.len() && !s.is_char_boundary(b) {
        b += 1;
    }
    &s[a..b]
}

// ── Ad stripping ──

/// Remove sponsored blocks so later scans only see organic results.
pub fn strip_ads(html: &str) -> String {
    let blocks = regex!(
        r#"(?is)<(?:div|section|ul)[^>]*class="[^"]*(?:ad_area|power_link|spns|sponsor|_ad_|plc_adpk|sc_ad)[^"]*"[^>]*>.*?</(?:div|section|ul)>"#
    );
    let out = blocks.replace_all(html, "").into_owned();
    let out = strip_power_link_windows(&out);
    strip_ad_anchors(&out)
}

/// Drop the text around each sponsored-links heading when it carries a
/// place link.
fn strip_power_link_windows(html: &str) -> String {
    const HEADING: &str = "파워링크";
    let place_link = regex!(r"place/\d{5,15}");
    let mut out = String::with_capacity(html.len());
    let mut cursor = 0;
    let mut search_from = 0;
    while let Some(rel) = html[search_from..].find(HEADING) {
        let pos = search_from + rel;
        let w = window(html, pos.saturating_sub(200).max(cursor), pos + HEADING.len() + 300);
        let w_start = w.as_ptr() as usize - html.as_ptr() as usize;
        let w_end = w_start + w.len();
        if place_link.is_match(w) {
            out.push_str(&html[cursor..w_start]);
            cursor = w_end;
            search_from = w_end;
        } else {
            search_from = pos + HEADING.len();
        }
    }
    out.push_str(&html[cursor..]);
    out
}

/// Drop ad-network anchors and up to 500 bytes of their content.
fn strip_ad_anchors(html: &str) -> String {
    let open = regex!(r"(?i)<[^>]*(?:searchad\.naver|adcr\.naver|ad\.search\.naver)[^>]*>");
    let close = regex!(r"</[^>]+>");
    let mut out = String::with_capacity(html.len());
    let mut cursor = 0;
    for m in open.find_iter(html) {
        if m.start() < cursor {
            continue;
        }
        let tail = window(html, m.end(), m.end() + 500 + 64);
        let Some(c) = close.find(tail).filter(|c| c.start() <= 500) else {
            continue;
        };
        out.push_str(&html[cursor..m.start()]);
        cursor = m.end() + c.end();
    }
    out.push_str(&html[cursor..]);
    out
}

// ── Card signals ──

fn card_signals(card: &str) -> (u32, bool, bool) {
    let image_count = match regex!(r#""(?:imageCount|imgCount|photoCount)"[:\s]*(\d+)"#).captures(card) {
        Some(c) => c[1].parse().unwrap_or(0),
        None => regex!(r"(?i)<img[^>]+>").find_iter(card).count().min(5) as u32,
    };
    let has_review_signal = regex!(r#""menuInfo"|"reviewKeywordList"|"scoreInfo"|"microReview""#).is_match(card)
        || regex!(r"방문자리뷰|블로그리뷰|별점|이런\s*점이\s*좋아요").is_match(card);
    let has_visitor_reviews =
        regex!(r#""(?:reviewCount|visitorReviewCount|totalReviewCount)"[:\s]*"?([1-9]\d*)"#).is_match(card);
    (image_count, has_review_signal, has_visitor_reviews)
}

fn entity(id: String, name: String, card: &str) -> ResultEntity {
    let (image_count, has_review_signal, has_visitor_reviews) = card_signals(card);
    ResultEntity {
        id,
        name,
        address: None,
        image_count,
        has_review_signal,
        has_visitor_reviews,
        raw: window(card, 0, 500).to_string(),
    }
}

// ── Place links ──

/// Entities from place links in document order, first occurrence per id.
pub fn place_links(organic: &str) -> Vec<ResultEntity> {
    let link = regex!(
        r"(?:place\.naver\.com|map\.naver\.com)/(?:place|restaurant|hairshop|hospital|accommodation|p/entry/place)/(\d{5,15})"
    );
    let ad_context = regex!(r"(?i)광고|파워링크|powerlink|searchad\.naver|adcr\.naver|ad\.search\.naver|sponsor");

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for caps in link.captures_iter(organic) {
        let Some(whole) = caps.get(0) else { continue };
        let pid = caps[1].to_string();
        if seen.contains(&pid) {
            continue;
        }
        let pos = whole.start();
        if ad_context.is_match(window(organic, pos.saturating_sub(300), pos + 300)) {
            continue;
        }
        seen.insert(pid.clone());
        let card = window(organic, pos.saturating_sub(500), pos + 1500);
        let name = link_name(organic, &pid).unwrap_or_default();
        out.push(entity(pid, name, card));
    }
    out
}

/// Byte ranges of `<path>/<pid>` occurrences not followed by another digit.
fn path_hits(organic: &str, pid: &str) -> Vec<(usize, usize)> {
    let mut hits = Vec::new();
    let mut from = 0;
    while let Some(rel) = organic[from..].find(pid) {
        let start = from + rel;
        let end = start + pid.len();
        from = end;
        if organic[end..].starts_with(|c: char| c.is_ascii_digit()) {
            continue;
        }
        let before = &organic[..start];
        if let Some(p) = PLACE_PATHS.iter().find(|p| before.ends_with(*p)) {
            hits.push((start - p.len(), end));
        }
    }
    hits
}

/// Display name for a place link, trying progressively looser patterns.
fn link_name(organic: &str, pid: &str) -> Option<String> {
    let hits = path_hits(organic, pid);

    let title_class = regex!(r#"class="[^"]*(?:place_bluelink|YwYLL|TYaxT|title)[^"]*"[^>]*>([^<]{2,40})<"#);
    let aria = regex!(r#"aria-label="([^"]{2,40})""#);
    let near = regex!(r">([가-힣a-zA-Z0-9][^<]{1,30})<");

    let after = |end: usize, reach: usize, re: &regex::Regex| -> Option<String> {
        let w = window(organic, end, end + reach + 256);
        re.captures(w)
            .filter(|c| c.get(0).is_some_and(|m| m.start() <= reach))
            .map(|c| c[1].trim().to_string())
            .filter(|s| !s.is_empty())
    };

    if let Some(n) = hits.iter().find_map(|&(_, end)| after(end, 500, title_class)) {
        return Some(n);
    }
    if let Some(n) = hits.iter().find_map(|&(_, end)| after(end, 300, aria)) {
        return Some(n);
    }
    if let Some(n) = hits.iter().find_map(|&(start, _)| anchor_text(organic, start)) {
        return Some(n);
    }
    hits.iter().find_map(|&(_, end)| after(end, 200, near))
}

/// Text of the `<a>` element whose `href` contains byte `pos`.
fn anchor_text(organic: &str, pos: usize) -> Option<String> {
    let tag_start = organic[..pos].rfind('<')?;
    if organic[tag_start..pos].contains('>') {
        return None;
    }
    let tag = &organic[tag_start..];
    if !(tag.starts_with("<a ") || tag.starts_with("<a\t") || tag.starts_with("<a\n")) {
        return None;
    }
    let tag_end = tag_start + organic[tag_start..].find('>')? + 1;
    let inner = regex!(r"^\s*(?:<[^>]+>)*\s*([^<]{2,40}?)\s*(?:<|$)");
    let c = inner.captures(window(organic, tag_end, tag_end + 1024))?;
    let text = c[1].trim().to_string();
    (!text.is_empty()).then_some(text)
}

// ── Id/name pairs ──

/// Entities from adjacent id and name fields in embedded data.
///
/// Id-then-name pairs are tried first; name-then-id only when that finds
/// fewer than two.
pub fn id_name_pairs(organic: &str) -> Vec<ResultEntity> {
    let forward = pairs(
        organic,
        regex!(r#"["'](?:id|placeId|businessId|nid|sid|shopId|storeId|entryId|bizId)["']\s*:\s*["']?(\d{5,15})["']?"#),
        regex!(r#"["'](?:name|title|businessName|placeName|displayName|shopName|storeName)["']\s*:\s*["']([^"']{2,40})["']"#),
        true,
    );
    if forward.len() >= 2 {
        return forward;
    }
    let reverse = pairs(
        organic,
        regex!(r#"["'](?:name|title|businessName|placeName)["']\s*:\s*["']([^"']{2,40})["']"#),
        regex!(r#"["'](?:id|placeId|businessId|sid|shopId)["']\s*:\s*["']?(\d{5,15})["']?"#),
        false,
    );
    if reverse.len() > forward.len() {
        reverse
    } else {
        forward
    }
}

/// Scan for `lead` followed within 400 bytes by `follow`.
fn pairs(organic: &str, lead: &regex::Regex, follow: &regex::Regex, id_first: bool) -> Vec<ResultEntity> {
    let ad_context = regex!(r#"(?i)광고|파워링크|powerlink|"isAd"\s*:\s*true|"adyn"\s*:\s*"Y"|"adId"|"adBidId""#);
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    let mut from = 0;
    while from < organic.len() {
        let Some(lc) = lead.captures_at(organic, from) else { break };
        let Some(lm) = lc.get(0) else { break };
        let tail = window(organic, lm.end(), lm.end() + 400 + 256);
        let fc = follow
            .captures(tail)
            .filter(|c| c.get(0).is_some_and(|m| m.start() <= 400));
        let Some(fc) = fc else {
            from = next_char(organic, lm.start());
            continue;
        };
        let (Some(fm), Some(lv), Some(fv)) = (fc.get(0), lc.get(1), fc.get(1)) else {
            break;
        };
        from = lm.end() + fm.end();

        let (id, name) = if id_first {
            (lv.as_str().to_string(), fv.as_str().trim().to_string())
        } else {
            (fv.as_str().to_string(), lv.as_str().trim().to_string())
        };
        if id.is_empty() || name.is_empty() || seen.contains(&id) {
            continue;
        }
        let pos = lm.start();
        if ad_context.is_match(window(organic, pos.saturating_sub(200), pos + 200)) {
            continue;
        }
        seen.insert(id.clone());
        let card = window(organic, pos.saturating_sub(200), pos + 1000);
        out.push(entity(id, name, card));
    }
    out
}

fn next_char(s: &str, i: usize) -> usize {
    s[i..].chars().next().map_or(s.len(), |c| i + c.len_utf8())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_respects_char_boundaries() {
        let s = "가나다abc";
        assert_eq!(window(s, 1, 4), "가나");
        assert_eq!(window(s, 0, 100), s);
    }

    #[test]
    fn test_strip_ads_removes_sponsored_blocks() {
        let html = r#"<div class="list"><div class="ad_area x"><a href="https://place.naver.com/place/9999999">AD</a></div><a href="https://place.naver.com/place/1000001">Real</a></div>"#;
        let organic = strip_ads(html);
        assert!(!organic.contains("9999999"));
        assert!(organic.contains("1000001"));
    }

    #[test]
    fn test_strip_ads_removes_ad_network_anchor() {
        let html = r#"<li><a href="https://adcr.naver.com/x?u=place/8888888">sponsored</a></li><li>ok</li>"#;
        let organic = strip_ads(html);
        assert!(!organic.contains("8888888"));
        assert!(organic.contains("<li>ok</li>"));
    }

    #[test]
    fn test_place_links_in_document_order_with_names() {
        let html = r#"
            <ul>
              <li><a href="https://m.place.naver.com/restaurant/1111111/home"><span class="place_bluelink">첫번째 식당</span></a><img src="a"><img src="b"> 방문자리뷰 12</li>
              <li><a href="https://m.place.naver.com/restaurant/2222222/home" aria-label="두번째 식당">x</a></li>
              <li><a href="https://m.place.naver.com/restaurant/1111111/photo">again</a></li>
            </ul>"#;
        let got = place_links(html);
        let ids: Vec<&str> = got.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["1111111", "2222222"]);
        assert_eq!(got[0].name, "첫번째 식당");
        assert!(got[0].image_count >= 2);
        assert!(got[0].has_review_signal);
        assert_eq!(got[1].name, "두번째 식당");
    }

    #[test]
    fn test_id_name_pairs_forward() {
        let blob = r#"{"items":[{"id":"3000001","category":"x","name":"Alpha"},{"id":"3000002","name":"Beta"}]}"#;
        let got = id_name_pairs(blob);
        let ids: Vec<&str> = got.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["3000001", "3000002"]);
        assert_eq!(got[1].name, "Beta");
    }

    #[test]
    fn test_id_name_pairs_skip_ad_context() {
        let pad = " ".repeat(400);
        let blob = format!(
            r#"{{"id":"4000001","name":"Organic"}}{pad}{{"id":"4000002","adId":"a1","name":"Sponsored"}}{pad}{{"id":"4000003","name":"Other"}}"#
        );
        let got = id_name_pairs(&blob);
        let ids: Vec<&str> = got.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["4000001", "4000003"]);
    }
}
