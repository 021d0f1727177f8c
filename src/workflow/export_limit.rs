//! Working out how many documents the export dialog will accept

use regex::Regex;
use std::sync::LazyLock;

/// Raw texts read from the export dialog
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportLimitHints {
    /// Dialog heading, e.g. `Export 1,234 documents`
    pub title: Option<String>,
    /// Declared `max` attribute of the range end input
    pub max_attribute: Option<String>,
    /// Free-text hint, e.g. `You can export up to 20,000 documents`
    pub hint: Option<String>,
}

#[allow(clippy::expect_used)]
static TITLE_COUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Export\s+([\d,]+)\s+documents?").expect("valid regex"));

#[allow(clippy::expect_used)]
static HINT_COUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"up to\s+([\d,]+)\s+documents?").expect("valid regex"));

fn parse_count(digits: &str) -> Option<u32> {
    digits
        .trim()
        .replace(',', "")
        .parse::<u32>()
        .ok()
        .filter(|n| *n > 0)
}

/// Upper bound of the export range
///
/// Every source that parses to a positive count is a ceiling (the result
/// count, the input's declared maximum, the site's export cap), so the
/// smallest one wins. When nothing parses, `default` is used.
///
/// ```
/// use scopus_harvester::workflow::{ExportLimitHints, resolve_export_limit};
///
/// let hints = ExportLimitHints {
///     title: Some("Export 1,234 documents".into()),
///     max_attribute: None,
///     hint: Some("You can export up to 20,000 documents".into()),
/// };
/// assert_eq!(resolve_export_limit(&hints, 2000), 1234);
/// ```
pub fn resolve_export_limit(hints: &ExportLimitHints, default: u32) -> u32 {
    let from_title = hints
        .title
        .as_deref()
        .and_then(|t| TITLE_COUNT.captures(t))
        .and_then(|c| parse_count(&c[1]));
    let from_attribute = hints.max_attribute.as_deref().and_then(parse_count);
    let from_hint = hints
        .hint
        .as_deref()
        .and_then(|t| HINT_COUNT.captures(t))
        .and_then(|c| parse_count(&c[1]));

    [from_title, from_attribute, from_hint]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(default)
}
