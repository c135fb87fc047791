pub mod passive;
pub mod payloads;
pub mod sqli;
pub mod xss;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::Method;
use url::Url;

use crate::crawler::{FetchError, FetchResponse, Fetcher};
use crate::models::{Finding, Form, FormMethod};

/// What one active detector produced against a page: its findings plus the
/// number of payload attempts actually dispatched (failed fetches included).
#[derive(Debug, Default)]
pub struct ProbeOutcome {
    pub findings: Vec<Finding>,
    pub endpoints_tested: u32,
}

/// Percent-encoding for payloads spliced into probe query strings. Kept
/// minimal so probe locations stay readable: `( ) / ' *` and the unreserved
/// characters pass through literally.
const PAYLOAD_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'(')
    .remove(b')')
    .remove(b'/')
    .remove(b'\'')
    .remove(b'*')
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

pub(crate) fn encode_payload(payload: &str) -> String {
    utf8_percent_encode(payload, PAYLOAD_ENCODE_SET).to_string()
}

/// Parameter names from a URL's raw query, in order, first occurrence kept.
pub(crate) fn query_param_names(url: &Url) -> Vec<String> {
    let mut names = Vec::new();
    for pair in url.query().unwrap_or("").split('&') {
        if pair.is_empty() {
            continue;
        }
        let name = pair.split('=').next().unwrap_or("").to_string();
        if !name.is_empty() && !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

/// Rebuild `base` with `target_param` set to the encoded payload and every
/// other query pair preserved verbatim.
pub(crate) fn probe_url(base: &Url, target_param: &str, payload: &str) -> String {
    let encoded = encode_payload(payload);
    let rebuilt: Vec<String> = base
        .query()
        .unwrap_or("")
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let name = pair.split('=').next().unwrap_or("");
            if name == target_param {
                format!("{name}={encoded}")
            } else {
                pair.to_string()
            }
        })
        .collect();

    let mut stripped = base.clone();
    stripped.set_query(None);
    stripped.set_fragment(None);
    format!("{}?{}", stripped, rebuilt.join("&"))
}

/// Submit a probe body through a form: POST sends a urlencoded body, GET
/// appends the pairs to the action's query string.
pub(crate) async fn submit_form(
    fetcher: &Fetcher,
    form: &Form,
    params: &[(String, String)],
) -> Result<FetchResponse, FetchError> {
    match form.method {
        FormMethod::Post => fetcher.fetch(Method::POST, &form.action, Some(params)).await,
        FormMethod::Get => {
            let query: Vec<String> = params
                .iter()
                .map(|(name, value)| format!("{name}={}", encode_payload(value)))
                .collect();
            let separator = if form.action.contains('?') { '&' } else { '?' };
            let url = format!("{}{separator}{}", form.action, query.join("&"));
            fetcher.get(&url).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_payload_matches_probe_location_format() {
        assert_eq!(
            encode_payload(r#"<script>alert("XSS")</script>"#),
            "%3Cscript%3Ealert(%22XSS%22)%3C/script%3E"
        );
        assert_eq!(encode_payload("'"), "'");
        assert_eq!(encode_payload("' OR '1'='1"), "'%20OR%20'1'%3D'1");
    }

    #[test]
    fn test_query_param_names_order_and_dedup() {
        let url = Url::parse("http://t/p?b=2&a=1&b=3&=x").unwrap();
        assert_eq!(query_param_names(&url), vec!["b", "a"]);
        let bare = Url::parse("http://t/p").unwrap();
        assert!(query_param_names(&bare).is_empty());
    }

    #[test]
    fn test_probe_url_preserves_other_params() {
        let url = Url::parse("http://t/item?id=1&page=2").unwrap();
        assert_eq!(
            probe_url(&url, "id", "'"),
            "http://t/item?id='&page=2"
        );
        assert_eq!(
            probe_url(&url, "page", "<x>"),
            "http://t/item?id=1&page=%3Cx%3E"
        );
    }

    #[test]
    fn test_probe_url_canonical_xss_shape() {
        let url = Url::parse("http://t/search?q=foo").unwrap();
        assert_eq!(
            probe_url(&url, "q", r#"<script>alert("XSS")</script>"#),
            "http://t/search?q=%3Cscript%3Ealert(%22XSS%22)%3C/script%3E"
        );
    }
}
