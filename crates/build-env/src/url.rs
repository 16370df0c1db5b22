//! URL validation for source fetches.

use std::sync::OnceLock;

use regex::Regex;

/// `http`, `https`, `ftp` or `ftps`; a domain, `localhost` or IPv4 address;
/// optional port; optional path.
const URL_PATTERN: &str = concat!(
    r"(?i)^(?:http|ftp)s?://",
    r"(?:(?:[A-Z0-9](?:[A-Z0-9-]{0,61}[A-Z0-9])?\.)+(?:[A-Z]{2,6}\.?|[A-Z0-9-]{2,}\.?)|",
    r"localhost|",
    r"\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})",
    r"(?::\d+)?",
    r"(?:/?|[/?]\S+)$",
);

static URL_REGEX: OnceLock<Regex> = OnceLock::new();

fn url_regex() -> &'static Regex {
    URL_REGEX.get_or_init(|| Regex::new(URL_PATTERN).expect("URL pattern is valid"))
}

/// Whether `url` is a well-formed http(s)/ftp(s) URL.
pub fn validate_url(url: &str) -> bool {
    url_regex().is_match(url)
}
