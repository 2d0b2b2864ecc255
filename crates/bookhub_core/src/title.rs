use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));
static LENTICULAR_NOTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"【.*?】").expect("valid regex"));
static VOLUME_PATTERNS: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        Regex::new(r"(?:第\s*)?(\d{1,3})\s*巻").expect("valid regex"),
        Regex::new(r"(?i)(?:vol\.?|volume)\s*(\d{1,3})").expect("valid regex"),
        Regex::new(r"(?i)(?:#|No\.)\s*(\d{1,3})").expect("valid regex"),
    ]
});

/// Collapses whitespace runs and trims; `None` when nothing is left.
pub fn normalize_text(value: &str) -> Option<String> {
    let collapsed = WHITESPACE.replace_all(value, " ");
    let trimmed = collapsed.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Search-friendly title: whitespace collapsed, `【...】` annotations dropped.
pub fn normalize_title(title: &str) -> String {
    let collapsed = WHITESPACE.replace_all(title, " ");
    LENTICULAR_NOTE.replace_all(&collapsed, "").trim().to_string()
}

/// Volume number embedded in a title (`第3巻`, `Vol. 12`, `#7`), after NFKC.
pub fn extract_volume(title: &str) -> Option<u32> {
    let normalized: String = title.nfkc().collect();
    VOLUME_PATTERNS.iter().find_map(|pattern| {
        pattern
            .captures(&normalized)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<u32>().ok())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_patterns_in_priority_order() {
        assert_eq!(extract_volume("ワンピース 第12巻"), Some(12));
        assert_eq!(extract_volume("進撃の巨人 3巻"), Some(3));
        assert_eq!(extract_volume("Saga Vol. 4"), Some(4));
        assert_eq!(extract_volume("Saga volume 9"), Some(9));
        assert_eq!(extract_volume("Issue #7"), Some(7));
        assert_eq!(extract_volume("Plain title"), None);
    }

    #[test]
    fn fullwidth_digits_are_normalized_before_matching() {
        assert_eq!(extract_volume("ブルーピリオド　１５巻"), Some(15));
    }

    #[test]
    fn title_normalization_drops_annotations() {
        assert_eq!(normalize_title("  葬送の  フリーレン【電子特典付き】 "), "葬送の フリーレン");
        assert_eq!(normalize_text(" \n\t "), None);
        assert_eq!(normalize_text(" a \n b ").as_deref(), Some("a b"));
    }
}
