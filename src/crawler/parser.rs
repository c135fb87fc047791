use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

use crate::models::{Form, FormInput, FormMethod};

/// What the scanner needs from one HTML document.
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    pub title: String,
    /// Absolute http/https URLs, fragment stripped, first occurrence kept.
    pub links: Vec<String>,
    pub forms: Vec<Form>,
}

pub struct Parser;

impl Parser {
    /// Parse a document and extract title, outbound links, and forms.
    /// Non-HTML input simply produces no links and no forms.
    pub fn parse(html: &str, base_url: &str) -> ParsedPage {
        let document = Html::parse_document(html);
        let base = Url::parse(base_url).ok();

        ParsedPage {
            title: Self::extract_title(&document),
            links: Self::extract_links(&document, &base),
            forms: Self::extract_forms(&document, &base),
        }
    }

    /// Bodies of `<script>` elements without a `src` attribute, for the
    /// DOM-sink heuristics.
    pub fn inline_scripts(html: &str) -> Vec<String> {
        let document = Html::parse_document(html);
        let sel = Selector::parse("script").unwrap();
        document
            .select(&sel)
            .filter(|el| el.value().attr("src").is_none())
            .map(|el| el.text().collect::<String>())
            .filter(|s| !s.trim().is_empty())
            .collect()
    }

    fn extract_title(document: &Html) -> String {
        let sel = Selector::parse("title").unwrap();
        document
            .select(&sel)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .unwrap_or_default()
    }

    fn extract_links(document: &Html, base: &Option<Url>) -> Vec<String> {
        let sel = Selector::parse("a[href]").unwrap();
        let mut seen = HashSet::new();
        let mut links = Vec::new();

        for el in document.select(&sel) {
            let Some(href) = el.value().attr("href") else {
                continue;
            };
            let resolved = match base {
                Some(base) => base.join(href).ok(),
                None => Url::parse(href).ok(),
            };
            let Some(mut url) = resolved else { continue };
            if url.scheme() != "http" && url.scheme() != "https" {
                continue;
            }
            url.set_fragment(None);
            let url = url.to_string();
            if seen.insert(url.clone()) {
                links.push(url);
            }
        }

        links
    }

    fn extract_forms(document: &Html, base: &Option<Url>) -> Vec<Form> {
        let form_sel = Selector::parse("form").unwrap();
        let input_sel = Selector::parse("input, textarea, select").unwrap();

        let mut forms = Vec::new();
        for form_el in document.select(&form_sel) {
            // Missing or empty action falls back to the page URL itself.
            let action_attr = form_el.value().attr("action").unwrap_or("");
            let action = if action_attr.trim().is_empty() {
                base.as_ref().map(|b| b.to_string()).unwrap_or_default()
            } else {
                match base {
                    Some(base) => match base.join(action_attr) {
                        Ok(resolved) => resolved.to_string(),
                        Err(_) => continue,
                    },
                    None => action_attr.to_string(),
                }
            };
            if action.is_empty() {
                continue;
            }

            let method = FormMethod::from_attr(form_el.value().attr("method").unwrap_or(""));

            let inputs = form_el
                .select(&input_sel)
                .filter_map(|el| {
                    let name = el.value().attr("name").unwrap_or("").trim().to_string();
                    if name.is_empty() {
                        return None;
                    }
                    Some(FormInput {
                        name,
                        kind: el
                            .value()
                            .attr("type")
                            .unwrap_or("text")
                            .to_ascii_lowercase(),
                        required: el.value().attr("required").is_some(),
                        value: el.value().attr("value").unwrap_or("").to_string(),
                    })
                })
                .collect();

            forms.push(Form {
                action,
                method,
                inputs,
            });
        }

        forms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><title>  Login Portal  </title></head>
<body>
    <a href="/accounts">Accounts</a>
    <a href="/accounts#top">Accounts again</a>
    <a href="https://other.example.net/page">Elsewhere</a>
    <a href="mailto:root@example.com">Mail</a>
    <form method="post" action="/login">
        <input type="text" name="username" required>
        <input type="PASSWORD" name="password" value="">
        <input type="hidden" name="csrf_token" value="abc123">
        <input type="submit" value="Go">
        <textarea name="note"></textarea>
    </form>
    <form>
        <input name="q">
    </form>
    <script src="/app.js"></script>
    <script>document.getElementById("out").innerHTML = location.hash;</script>
</body>
</html>"#;

    #[test]
    fn test_title_trimmed() {
        let page = Parser::parse(TEST_HTML, "http://example.com/page");
        assert_eq!(page.title, "Login Portal");
    }

    #[test]
    fn test_links_resolved_deduped_fragment_stripped() {
        let page = Parser::parse(TEST_HTML, "http://example.com/page");
        // /accounts and /accounts#top collapse into one; mailto dropped.
        assert_eq!(
            page.links,
            vec![
                "http://example.com/accounts".to_string(),
                "https://other.example.net/page".to_string(),
            ]
        );
    }

    #[test]
    fn test_form_extraction() {
        let page = Parser::parse(TEST_HTML, "http://example.com/page");
        assert_eq!(page.forms.len(), 2);

        let login = &page.forms[0];
        assert_eq!(login.action, "http://example.com/login");
        assert_eq!(login.method, FormMethod::Post);
        // The nameless submit button is dropped; textarea kept.
        let names: Vec<&str> = login.inputs.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["username", "password", "csrf_token", "note"]);
        assert_eq!(login.inputs[0].kind, "text");
        assert!(login.inputs[0].required);
        assert_eq!(login.inputs[1].kind, "password");
        assert_eq!(login.inputs[2].kind, "hidden");
        assert_eq!(login.inputs[2].value, "abc123");
        // Elements without a type attribute default to "text".
        assert_eq!(login.inputs[3].kind, "text");
    }

    #[test]
    fn test_actionless_form_targets_page_url() {
        let page = Parser::parse(TEST_HTML, "http://example.com/page");
        let bare = &page.forms[1];
        assert_eq!(bare.action, "http://example.com/page");
        assert_eq!(bare.method, FormMethod::Get);
    }

    #[test]
    fn test_inline_scripts_skip_external() {
        let scripts = Parser::inline_scripts(TEST_HTML);
        assert_eq!(scripts.len(), 1);
        assert!(scripts[0].contains("innerHTML"));
    }

    #[test]
    fn test_non_html_is_empty() {
        let page = Parser::parse("{\"not\": \"html\"}", "http://example.com/data.json");
        assert!(page.links.is_empty());
        assert!(page.forms.is_empty());
    }
}
