//! Map-variant classification.

use crate::types::MapVariant;

/// Decides which structural style a results payload uses.
pub trait VariantClassifier: Send + Sync {
    fn classify(&self, markup: &str) -> MapVariant;
}

/// Filter-bar or save-button markup means the current layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkupVariantClassifier;

impl VariantClassifier for MarkupVariantClassifier {
    fn classify(&self, markup: &str) -> MapVariant {
        static FILTER: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
        static SAVE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
        let filter = FILTER.get_or_init(|| {
            regex::Regex::new(
                r#"(?i)<[^>]+class="[^"]*(?:place_filter|sc_filter|loc_filter|filter_wrap|filter_area|btn_filter|filter_item)[^"]*"[^>]*>"#,
            )
            .expect("filter regex is valid")
        });
        let save = SAVE.get_or_init(|| {
            regex::Regex::new(r#"(?i)<[^>]+class="[^"]*(?:btn_save|save_btn|place_save)[^"]*"[^>]*>"#)
                .expect("save regex is valid")
        });
        if filter.is_match(markup) || save.is_match(markup) {
            MapVariant::Current
        } else {
            MapVariant::Legacy
        }
    }
}
