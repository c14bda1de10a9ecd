//! Coverage extraction from trace text.

use regex::Regex;

/// Scrape a coverage percentage out of trace text with a user-supplied
/// regex. The last match wins; when the pattern has a capture group, group
/// one is used, otherwise the whole match. A malformed pattern yields
/// `None` — user regexes must never fail the transition that invoked this.
pub fn extract_coverage(text: &str, pattern: &str) -> Option<f64> {
    let re = Regex::new(pattern).ok()?;
    let captures = re.captures_iter(text).last()?;
    let matched = captures
        .get(1)
        .or_else(|| captures.get(0))
        .map(|m| m.as_str())?;
    parse_percentage(matched)
}

fn parse_percentage(matched: &str) -> Option<f64> {
    let number: String = matched
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    number.parse().ok()
}
