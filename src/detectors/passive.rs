//! Passive checks: no probe traffic, only the page and its initial response.

use super::payloads::match_sql_error;
use crate::crawler::FetchResponse;
use crate::models::{Category, Finding, FormInput, FormMethod, Page, Severity};

/// JavaScript sinks that turn attacker-controlled strings into markup.
const DOM_SINKS: &[&str] = &["innerHTML", "document.write"];

/// Flag POST forms that carry sensitive inputs but no recognizable
/// anti-CSRF token field.
pub fn csrf_findings(page: &Page) -> Vec<Finding> {
    page.forms
        .iter()
        .filter(|form| form.method == FormMethod::Post)
        .filter(|form| form.inputs.iter().any(is_sensitive))
        .filter(|form| !form.inputs.iter().any(is_csrf_token))
        .map(|form| {
            Finding::new(
                "Cross-Site Request Forgery (CSRF)",
                Category::Csrf,
                Severity::Medium,
                "State-changing form with sensitive inputs has no CSRF token; a \
                 third-party page can submit it on the victim's behalf"
                    .to_string(),
                format!("POST {}", form.action),
                "An attacker can perform account actions (password or email \
                 changes, logins) without the victim's consent.",
            )
        })
        .collect()
}

/// One finding per inline script per sink it references.
pub fn dom_sink_findings(page_url: &str, inline_scripts: &[String]) -> Vec<Finding> {
    let mut findings = Vec::new();
    for script in inline_scripts {
        for sink in DOM_SINKS {
            if script.contains(sink) {
                findings.push(Finding::new(
                    "Potential DOM XSS",
                    Category::Xss,
                    Severity::High,
                    format!("Inline script writes to {sink}, a sink that executes \
                             attacker-controllable markup"),
                    page_url.to_string(),
                    "If the written value derives from the URL or other user input, \
                     arbitrary script runs in the victim's browser.",
                ));
            }
        }
    }
    findings
}

/// Header and body leaks visible in the unprovoked response.
pub fn disclosure_findings(page_url: &str, response: &FetchResponse) -> Vec<Finding> {
    let mut findings = Vec::new();

    if let Some(server) = response.headers.get("server") {
        findings.push(Finding::new(
            "Server Header Disclosure",
            Category::InformationDisclosure,
            Severity::Low,
            format!("The Server header reveals the software in use: {server}"),
            "HTTP Headers".to_string(),
            "Version strings let attackers match the server against known \
             vulnerability databases.",
        ));
    }

    if let Some(fingerprint) = match_sql_error(&response.body) {
        findings.push(Finding::new(
            "Database Error Disclosure",
            Category::InformationDisclosure,
            Severity::Medium,
            format!("The page body contains a raw database error ({fingerprint}) \
                     without any injection being attempted"),
            page_url.to_string(),
            "Raw database errors expose schema details and signal a fragile \
             query layer.",
        ));
    }

    findings
}

fn is_sensitive(input: &FormInput) -> bool {
    if input.kind == "password" {
        return true;
    }
    let name = input.name.to_lowercase();
    name.contains("password") || name.contains("email")
}

fn is_csrf_token(input: &FormInput) -> bool {
    if input.kind != "hidden" {
        return false;
    }
    let name = input.name.to_lowercase();
    name.contains("csrf") || name.contains("token")
}
