//! Error-based SQL injection probes: form inputs and URL query parameters.

use url::Url;

use super::payloads::{match_sql_error, SQL_PAYLOADS};
use super::{probe_url, query_param_names, submit_form, ProbeOutcome};
use crate::crawler::Fetcher;
use crate::models::{Category, Finding, Page, Severity};

const IMPACT: &str = "An attacker can read or modify database contents, bypass \
authentication, or take over the backing data store.";

/// Fuzz every non-hidden form input with the SQL corpus. Sibling inputs are
/// filled with `"1"` so numeric contexts still parse; detection is a database
/// error fingerprint in the response.
pub async fn probe_forms(page: &Page, fetcher: &Fetcher) -> ProbeOutcome {
    let mut outcome = ProbeOutcome::default();

    for form in &page.forms {
        let fuzzable: Vec<&str> = form
            .inputs
            .iter()
            .filter(|input| input.kind != "hidden")
            .map(|input| input.name.as_str())
            .collect();
        if fuzzable.is_empty() {
            continue;
        }

        for target in fuzzable {
            for payload in SQL_PAYLOADS {
                let params: Vec<(String, String)> = form
                    .inputs
                    .iter()
                    .map(|input| {
                        let value = if input.name == target {
                            payload.to_string()
                        } else {
                            "1".to_string()
                        };
                        (input.name.clone(), value)
                    })
                    .collect();

                outcome.endpoints_tested += 1;
                match submit_form(fetcher, form, &params).await {
                    Ok(response) => {
                        if let Some(fingerprint) = match_sql_error(&response.body) {
                            outcome.findings.push(Finding::new(
                                "SQL Injection",
                                Category::SqlInjection,
                                Severity::Critical,
                                format!(
                                    "Form input '{target}' triggers a database error \
                                     ({fingerprint}) when sent {payload}"
                                ),
                                format!("{} {}", form.method.as_str(), form.action),
                                IMPACT,
                            ));
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::debug!(action = %form.action, error = %e, "SQLi probe failed");
                    }
                }
            }
        }
    }

    outcome
}

/// Probe each query parameter with a single quote and watch for a database
/// error fingerprint.
pub async fn probe_url_params(page: &Page, fetcher: &Fetcher) -> ProbeOutcome {
    let mut outcome = ProbeOutcome::default();
    let Ok(url) = Url::parse(&page.url) else {
        return outcome;
    };

    for param in query_param_names(&url) {
        let probe = probe_url(&url, &param, "'");
        outcome.endpoints_tested += 1;
        match fetcher.get(&probe).await {
            Ok(response) => {
                if let Some(fingerprint) = match_sql_error(&response.body) {
                    outcome.findings.push(Finding::new(
                        "SQL Injection (URL)",
                        Category::SqlInjection,
                        Severity::Critical,
                        format!(
                            "Query parameter '{param}' triggers a database error \
                             ({fingerprint}) when sent a single quote"
                        ),
                        format!("GET {probe}"),
                        IMPACT,
                    ));
                }
            }
            Err(e) => {
                tracing::debug!(url = %probe, error = %e, "SQLi URL probe failed");
            }
        }
    }

    outcome
}
