use url::Url;

use super::fetcher::host_within;

/// URL substrings that take a candidate out of scope: destructive or
/// session-ending paths, social networks, and CDN asset hosts.
pub const DEFAULT_EXCLUDE_TOKENS: &[&str] = &[
    "logout",
    "signout",
    "sign-out",
    "delete",
    "facebook.com",
    "twitter.com",
    "instagram.com",
    "linkedin.com",
    "youtube.com",
    "cdn.",
    "cloudfront.net",
    "akamaihd.net",
    "googleapis.com",
    "gstatic.com",
];

pub const STATIC_ASSET_EXTENSIONS: &[&str] = &[
    ".css", ".js", ".jpg", ".png", ".gif", ".pdf", ".zip", ".svg", ".ico",
];

/// Path keywords that keep a URL interesting when an include list is active.
pub const RELEVANT_PATH_KEYWORDS: &[&str] = &[
    "login", "account", "admin", "user", "profile", "search", "product", "cart", "checkout",
    "contact", "about", "api",
];

/// Decides whether a URL may be crawled, given the seed it came from.
/// Pure: no I/O, no state beyond the configured token lists.
#[derive(Debug, Clone)]
pub struct ScopePolicy {
    root: String,
    exclude_tokens: Vec<String>,
    include_tokens: Vec<String>,
    asset_extensions: Vec<String>,
}

impl ScopePolicy {
    /// Build the policy for a seed URL. `None` when the seed has no host.
    pub fn for_seed(seed: &Url) -> Option<Self> {
        let host = seed.host_str()?;
        Some(ScopePolicy {
            root: registrable_root(host),
            exclude_tokens: DEFAULT_EXCLUDE_TOKENS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            include_tokens: Vec::new(),
            asset_extensions: STATIC_ASSET_EXTENSIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        })
    }

    pub fn with_include_tokens(mut self, tokens: Vec<String>) -> Self {
        self.include_tokens = tokens.into_iter().map(|t| t.to_lowercase()).collect();
        self
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn in_scope(&self, candidate: &str) -> bool {
        let Ok(url) = Url::parse(candidate) else {
            return false;
        };
        if url.scheme() != "http" && url.scheme() != "https" {
            return false;
        }
        let Some(host) = url.host_str() else {
            return false;
        };
        if !host_within(host, &self.root) {
            return false;
        }

        let lowered = candidate.to_lowercase();
        if self
            .exclude_tokens
            .iter()
            .any(|token| lowered.contains(token))
        {
            return false;
        }

        let path = url.path().to_lowercase();
        if self
            .asset_extensions
            .iter()
            .any(|ext| path.ends_with(ext.as_str()))
        {
            return false;
        }

        if !self.include_tokens.is_empty() {
            let trivial_path = path.is_empty() || path == "/";
            let relevant = RELEVANT_PATH_KEYWORDS.iter().any(|kw| path.contains(kw));
            let included = self.include_tokens.iter().any(|t| lowered.contains(t));
            if !(included || trivial_path || relevant) {
                return false;
            }
        }

        true
    }
}

/// Last two DNS labels of a host, or the whole host when it has two or
/// fewer labels.
pub fn registrable_root(host: &str) -> String {
    let host = host.to_ascii_lowercase();
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() <= 2 {
        host
    } else {
        labels[labels.len() - 2..].join(".")
    }
}

/// Canonical form of a URL: fragment stripped, query preserved verbatim.
/// Scheme/host lower-casing and default-port removal come from the parser.
pub fn canonicalize(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.to_string()
}

pub fn canonicalize_str(raw: &str) -> Option<String> {
    Url::parse(raw).ok().map(|url| canonicalize(&url))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(seed: &str) -> ScopePolicy {
        ScopePolicy::for_seed(&Url::parse(seed).unwrap()).unwrap()
    }

    #[test]
    fn test_registrable_root() {
        assert_eq!(registrable_root("www.example.com"), "example.com");
        assert_eq!(registrable_root("a.b.example.com"), "example.com");
        assert_eq!(registrable_root("example.com"), "example.com");
        assert_eq!(registrable_root("localhost"), "localhost");
        assert_eq!(registrable_root("127.0.0.1"), "0.1");
    }

    #[test]
    fn test_same_root_and_subdomains_in_scope() {
        let policy = policy("https://www.example.com/");
        assert!(policy.in_scope("https://www.example.com/page"));
        assert!(policy.in_scope("https://example.com/page"));
        assert!(policy.in_scope("http://shop.example.com/item?id=1"));
        assert!(!policy.in_scope("https://other.net/"));
        assert!(!policy.in_scope("https://example.com.evil.net/"));
    }

    #[test]
    fn test_rejects_non_http_and_relative() {
        let policy = policy("https://example.com/");
        assert!(!policy.in_scope("ftp://example.com/file"));
        assert!(!policy.in_scope("javascript:alert(1)"));
        assert!(!policy.in_scope("/relative/path"));
    }

    #[test]
    fn test_exclude_tokens() {
        let policy = policy("https://example.com/");
        assert!(!policy.in_scope("https://example.com/logout"));
        assert!(!policy.in_scope("https://example.com/admin/DELETE?id=2"));
        assert!(policy.in_scope("https://example.com/admin/list"));
    }

    #[test]
    fn test_asset_extensions() {
        let policy = policy("https://example.com/");
        assert!(!policy.in_scope("https://example.com/style.css"));
        assert!(!policy.in_scope("https://example.com/img/logo.PNG"));
        assert!(policy.in_scope("https://example.com/downloads"));
    }

    #[test]
    fn test_include_tokens_gate_deep_paths() {
        let policy =
            policy("https://example.com/").with_include_tokens(vec!["blog".to_string()]);
        // Root and relevant-keyword paths always pass.
        assert!(policy.in_scope("https://example.com/"));
        assert!(policy.in_scope("https://example.com/login"));
        assert!(policy.in_scope("https://example.com/blog/post-1"));
        assert!(!policy.in_scope("https://example.com/press/2024"));
    }

    #[test]
    fn test_canonicalize() {
        let url = Url::parse("HTTPS://Example.COM:443/Path?q=Foo#frag").unwrap();
        assert_eq!(canonicalize(&url), "https://example.com/Path?q=Foo");
        assert_eq!(
            canonicalize_str("http://example.com:8080/a?x=1&y=2#z").unwrap(),
            "http://example.com:8080/a?x=1&y=2"
        );
        assert!(canonicalize_str("not a url").is_none());
    }
}
