//! Reflected XSS probes: form inputs and URL query parameters.

use url::Url;

use super::payloads::{contains_ignore_case, XSS_PAYLOADS};
use super::{probe_url, query_param_names, submit_form, ProbeOutcome};
use crate::crawler::Fetcher;
use crate::models::{Category, Finding, Page, Severity};

const IMPACT: &str = "An attacker can execute arbitrary JavaScript in the victim's \
browser, steal session data, or deface the page.";

/// Fuzz every non-hidden input of every form. Sibling inputs are filled with
/// the sentinel `"test"`; the probed input carries each payload in corpus
/// order until one reflects, then the next input is tried.
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
            for payload in XSS_PAYLOADS {
                let params: Vec<(String, String)> = form
                    .inputs
                    .iter()
                    .map(|input| {
                        let value = if input.name == target {
                            payload.to_string()
                        } else {
                            "test".to_string()
                        };
                        (input.name.clone(), value)
                    })
                    .collect();

                outcome.endpoints_tested += 1;
                match submit_form(fetcher, form, &params).await {
                    Ok(response) if contains_ignore_case(&response.body, payload) => {
                        outcome.findings.push(Finding::new(
                            "Reflected XSS",
                            Category::Xss,
                            Severity::High,
                            format!(
                                "Form input '{target}' reflects the payload {payload} \
                                 back into the response without encoding"
                            ),
                            format!("{} {}", form.method.as_str(), form.action),
                            IMPACT,
                        ));
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::debug!(action = %form.action, error = %e, "XSS probe failed");
                    }
                }
            }
        }
    }

    outcome
}

/// Probe each query parameter of the page URL with the canonical payload,
/// leaving the other parameters untouched.
pub async fn probe_url_params(page: &Page, fetcher: &Fetcher) -> ProbeOutcome {
    let mut outcome = ProbeOutcome::default();
    let Ok(url) = Url::parse(&page.url) else {
        return outcome;
    };

    let payload = XSS_PAYLOADS[0];
    for param in query_param_names(&url) {
        let probe = probe_url(&url, &param, payload);
        outcome.endpoints_tested += 1;
        match fetcher.get(&probe).await {
            Ok(response) if contains_ignore_case(&response.body, payload) => {
                outcome.findings.push(Finding::new(
                    "Reflected XSS (URL)",
                    Category::Xss,
                    Severity::High,
                    format!(
                        "Query parameter '{param}' reflects the payload {payload} \
                         back into the response without encoding"
                    ),
                    format!("GET {probe}"),
                    IMPACT,
                ));
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(url = %probe, error = %e, "XSS URL probe failed");
            }
        }
    }

    outcome
}
