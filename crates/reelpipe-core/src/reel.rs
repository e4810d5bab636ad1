//! Helpers for Instagram reel URLs and the relative timestamps shown on
//! profile grids.

use chrono::NaiveDate;
use regex::Regex;
use std::sync::OnceLock;

const INSTAGRAM_ORIGIN: &str = "https://www.instagram.com";

static REEL_ID_RE: OnceLock<Regex> = OnceLock::new();
static NUMBER_RE: OnceLock<Regex> = OnceLock::new();

fn reel_id_re() -> &'static Regex {
    REEL_ID_RE.get_or_init(|| Regex::new(r"/(?:reels?|p)/([A-Za-z0-9_-]+)").unwrap())
}

fn number_re() -> &'static Regex {
    NUMBER_RE.get_or_init(|| Regex::new(r"\d+").unwrap())
}

/// Shortcode of a reel URL, e.g. `C8abc_12` for `.../reel/C8abc_12/`.
pub fn extract_reel_id(url: &str) -> Option<String> {
    reel_id_re()
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// `@username` from a profile or reel URL, `@unknown` when the URL does not
/// carry one (e.g. `instagram.com/reel/<id>`).
pub fn extract_username(url: &str) -> String {
    let Some((_, rest)) = url.split_once("instagram.com/") else {
        return "@unknown".to_string();
    };
    let segment = rest
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    match segment {
        "" | "reel" | "reels" | "p" | "explore" | "stories" => "@unknown".to_string(),
        name => format!("@{name}"),
    }
}

/// Normalise an anchor `href` into a reel link, or `None` for anything that
/// isn't a reel (posts under `/p/` are skipped).
pub fn canonical_url(href: &str) -> Option<String> {
    let href = href.trim();
    if !href.contains("/reel/") {
        return None;
    }
    let absolute = if href.starts_with('/') {
        format!("{INSTAGRAM_ORIGIN}{href}")
    } else if href.contains("instagram.com") {
        href.to_string()
    } else {
        return None;
    };
    let clean = absolute
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .to_string();
    Some(clean)
}

/// Profile URL of the reels tab (`https://www.instagram.com/<name>/reels/`).
pub fn reels_tab_url(profile_url: &str) -> String {
    let base = profile_url
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .trim_end_matches('/');
    if base.ends_with("/reels") {
        format!("{base}/")
    } else {
        format!("{base}/reels/")
    }
}

/// Interpret relative time text ("3 hours ago", "2d", "1w", "4 months")
/// against a day limit. Unknown text counts as recent.
pub fn is_within_days_limit(text: &str, days_limit: u32) -> bool {
    let text = text.trim().to_lowercase();
    let first_number = || {
        number_re()
            .find(&text)
            .and_then(|m| m.as_str().parse::<u32>().ok())
    };

    if ["second", "minute", "hour", "just now", "now"]
        .iter()
        .any(|k| text.contains(k))
    {
        return true;
    }
    if text.contains("year") || text.contains("yr") {
        return false;
    }
    if text.contains("month") || text.contains("mo") {
        return match first_number() {
            Some(months) => months.saturating_mul(30) <= days_limit,
            None => false,
        };
    }
    if text.contains("week") || text.ends_with('w') {
        if let Some(weeks) = first_number() {
            return weeks <= days_limit / 7;
        }
    }
    if text.contains("day") || text.ends_with('d') {
        if let Some(days) = first_number() {
            return days <= days_limit;
        }
    }
    true
}

/// Date cell format: `28-JUN-25`.
pub fn sheet_date(date: NaiveDate) -> String {
    date.format("%d-%b-%y").to_string().to_uppercase()
}

/// Collapse every run of whitespace (including newlines) into one space.
pub fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reel_ids() {
        assert_eq!(
            extract_reel_id("https://www.instagram.com/reel/C8abc_1-2/").as_deref(),
            Some("C8abc_1-2")
        );
        assert_eq!(
            extract_reel_id("https://www.instagram.com/someone/reel/XYZ?igsh=1").as_deref(),
            Some("XYZ")
        );
        assert_eq!(extract_reel_id("https://www.instagram.com/someone/"), None);
    }

    #[test]
    fn usernames() {
        assert_eq!(
            extract_username("https://www.instagram.com/composedmindset/reels/"),
            "@composedmindset"
        );
        assert_eq!(
            extract_username("https://www.instagram.com/reel/ABC/"),
            "@unknown"
        );
        assert_eq!(
            extract_username("https://www.instagram.com/someone?hl=en"),
            "@someone"
        );
        assert_eq!(extract_username("https://example.com/x"), "@unknown");
    }

    #[test]
    fn canonical_urls() {
        assert_eq!(
            canonical_url("/reel/ABC/?utm_source=ig").as_deref(),
            Some("https://www.instagram.com/reel/ABC/")
        );
        assert_eq!(
            canonical_url("https://www.instagram.com/user/reel/ABC/#x").as_deref(),
            Some("https://www.instagram.com/user/reel/ABC/")
        );
        assert_eq!(canonical_url("https://www.instagram.com/p/ABC/"), None);
        assert_eq!(canonical_url("https://evil.example/reel/ABC/"), None);
    }

    #[test]
    fn reels_tab() {
        assert_eq!(
            reels_tab_url("https://www.instagram.com/user/"),
            "https://www.instagram.com/user/reels/"
        );
        assert_eq!(
            reels_tab_url("https://www.instagram.com/user/reels"),
            "https://www.instagram.com/user/reels/"
        );
    }

    #[test]
    fn relative_dates() {
        assert!(is_within_days_limit("3 hours ago", 7));
        assert!(is_within_days_limit("Just now", 1));
        assert!(is_within_days_limit("5d", 7));
        assert!(!is_within_days_limit("9 days ago", 7));
        assert!(is_within_days_limit("2w", 14));
        assert!(!is_within_days_limit("3 weeks", 14));
        assert!(is_within_days_limit("1 month ago", 30));
        assert!(!is_within_days_limit("2 months ago", 30));
        assert!(!is_within_days_limit("a month ago", 30));
        assert!(!is_within_days_limit("1 year ago", 3650));
        assert!(is_within_days_limit("June 3", 7));
    }

    #[test]
    fn date_cells() {
        let d = NaiveDate::from_ymd_opt(2025, 6, 28).unwrap();
        assert_eq!(sheet_date(d), "28-JUN-25");
    }

    #[test]
    fn whitespace_collapse() {
        assert_eq!(single_line("  a\n\nb\t c  "), "a b c");
        assert_eq!(single_line(""), "");
    }
}
