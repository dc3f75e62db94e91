//! Site names → URLs for `Navigate` targets.

use std::collections::HashMap;

const TEST_PAGE_HTML: &str = include_str!("../static/test_page.html");

const BUILTIN_SITES: &[(&str, &str)] = &[
    ("google", "https://www.google.com"),
    ("amazon", "https://www.amazon.in"),
    ("flipkart", "https://www.flipkart.com"),
    ("youtube", "https://www.youtube.com"),
    ("github", "https://github.com"),
    ("bing", "https://www.bing.com"),
];

/// Targets that mean "the bundled static test page".
const TEST_PAGE_NAMES: &[&str] = &["test", "test page", "local test page", "login page", "local"];

const SCHEMES: &[&str] = &["http://", "https://", "file://", "data:", "about:"];

/// Noise around a site name: "the google website", "amazon homepage".
const NAME_NOISE: &[&str] = &["the", "website", "site", "homepage", "home", "web"];

/// Resolves navigation targets to URLs.
#[derive(Debug, Clone)]
pub struct SiteDirectory {
    sites: HashMap<String, String>,
    test_page: String,
}

impl Default for SiteDirectory {
    fn default() -> Self {
        Self::new(&HashMap::new(), None)
    }
}

impl SiteDirectory {
    /// Built-in sites plus `extra` (which wins on name clashes).
    pub fn new(extra: &HashMap<String, String>, test_page: Option<&str>) -> Self {
        let mut sites: HashMap<String, String> = BUILTIN_SITES
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        for (k, v) in extra {
            sites.insert(k.to_lowercase(), v.clone());
        }
        let test_page = test_page
            .map(str::to_string)
            .unwrap_or_else(bundled_test_page_url);
        Self { sites, test_page }
    }

    /// URL of the test page the sentinel targets point at.
    pub fn test_page(&self) -> &str {
        &self.test_page
    }

    /// Whether `target` names a site this directory knows, or the test page.
    pub fn knows(&self, target: &str) -> bool {
        let key = site_key(target);
        self.sites.contains_key(&key) || self.is_test_page(&key)
    }

    /// Resolve a navigation target to a loadable URL.
    pub fn resolve(&self, target: &str) -> String {
        let trimmed = target.trim().trim_matches(|c| c == '"' || c == '\'');
        let lower = trimmed.to_lowercase();
        if SCHEMES.iter().any(|s| lower.starts_with(s)) {
            return trimmed.to_string();
        }

        let key = site_key(trimmed);
        if self.is_test_page(&key) {
            return self.test_page.clone();
        }
        if let Some(url) = self.sites.get(&key) {
            return url.clone();
        }
        format!("https://{}", trimmed)
    }

    fn is_test_page(&self, key: &str) -> bool {
        TEST_PAGE_NAMES.contains(&key)
    }
}

fn site_key(target: &str) -> String {
    let lower = target.trim().to_lowercase();
    let words: Vec<&str> = lower
        .split_whitespace()
        .filter(|w| !NAME_NOISE.contains(w))
        .collect();
    let key = words.join(" ");
    // "google page" → "google", but "test page" stays a sentinel.
    match key.strip_suffix(" page") {
        Some(stem) if !TEST_PAGE_NAMES.contains(&key.as_str()) => stem.to_string(),
        _ => key,
    }
}

/// The bundled page as a `data:` URL. `%` and `#` are the only characters
/// that change meaning there.
fn bundled_test_page_url() -> String {
    let mut url = String::with_capacity(TEST_PAGE_HTML.len() + 32);
    url.push_str("data:text/html;charset=utf-8,");
    for c in TEST_PAGE_HTML.chars() {
        match c {
            '%' => url.push_str("%25"),
            '#' => url.push_str("%23"),
            _ => url.push(c),
        }
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_names() {
        let sites = SiteDirectory::default();
        assert_eq!(sites.resolve("google"), "https://www.google.com");
        assert_eq!(sites.resolve("Google"), "https://www.google.com");
        assert_eq!(sites.resolve("the amazon website"), "https://www.amazon.in");
        assert_eq!(sites.resolve("youtube homepage"), "https://www.youtube.com");
        assert!(sites.knows("flipkart"));
        assert!(!sites.knows("example.com"));
    }

    #[test]
    fn scheme_is_prefixed_when_absent() {
        let sites = SiteDirectory::default();
        assert_eq!(sites.resolve("example.com"), "https://example.com");
        assert_eq!(sites.resolve("https://example.com/a"), "https://example.com/a");
        assert_eq!(sites.resolve("http://localhost:5000"), "http://localhost:5000");
        assert_eq!(sites.resolve("about:blank"), "about:blank");
    }

    #[test]
    fn sentinel_targets_use_bundled_page() {
        let sites = SiteDirectory::default();
        for name in ["test", "test page", "the local test page", "login page"] {
            let url = sites.resolve(name);
            assert!(url.starts_with("data:text/html"), "{} -> {}", name, &url[..30]);
        }
        assert!(sites.knows("test page"));
        // Element ids survive the data URL encoding.
        assert!(sites.test_page().contains("getElementById"));
        assert!(!sites.test_page()[30..].contains('#'));
    }

    #[test]
    fn configured_sites_and_test_page() {
        let mut extra = HashMap::new();
        extra.insert("Intranet".to_string(), "http://intranet.local".to_string());
        extra.insert("google".to_string(), "https://www.google.co.uk".to_string());
        let sites = SiteDirectory::new(&extra, Some("http://127.0.0.1:5000/test.html"));
        assert_eq!(sites.resolve("intranet"), "http://intranet.local");
        assert_eq!(sites.resolve("google"), "https://www.google.co.uk");
        assert_eq!(sites.resolve("test"), "http://127.0.0.1:5000/test.html");
    }
}
