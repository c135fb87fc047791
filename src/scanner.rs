use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

use crate::crawler::{Fetcher, Parser};
use crate::detectors::{passive, sqli, xss};
use crate::models::{Finding, Page, ScanTask, TaskFailure, TaskKind, TaskOutput};
use crate::pool::TaskRunner;

/// Applies the full detector battery to one page.
///
/// Passive checks run first against the page's initial response, then the
/// active probes, XSS before SQLi, all sequential. Every HTTP request goes
/// through the shared fetcher and therefore through the global rate limit.
pub struct PageScanner {
    fetcher: Arc<Fetcher>,
}

impl PageScanner {
    pub fn new(fetcher: Arc<Fetcher>) -> Self {
        PageScanner { fetcher }
    }

    pub async fn scan(&self, page: &Page) -> TaskOutput {
        let mut findings: Vec<Finding> = Vec::new();
        let mut endpoints_tested = 0u32;

        // One initial fetch supplies the response material for the passive
        // checks. It is not a payload attempt, so it does not count as an
        // endpoint test.
        let initial = self.fetcher.get(&page.url).await;

        findings.extend(passive::csrf_findings(page));
        match &initial {
            Ok(response) => {
                let scripts = Parser::inline_scripts(&response.body);
                findings.extend(passive::dom_sink_findings(&page.url, &scripts));
                findings.extend(passive::disclosure_findings(&page.url, response));
            }
            Err(e) => {
                tracing::debug!(url = %page.url, error = %e,
                    "initial fetch failed; skipping response-based passive checks");
            }
        }

        let outcome = xss::probe_forms(page, &self.fetcher).await;
        findings.extend(outcome.findings);
        endpoints_tested += outcome.endpoints_tested;

        let outcome = xss::probe_url_params(page, &self.fetcher).await;
        findings.extend(outcome.findings);
        endpoints_tested += outcome.endpoints_tested;

        let outcome = sqli::probe_forms(page, &self.fetcher).await;
        findings.extend(outcome.findings);
        endpoints_tested += outcome.endpoints_tested;

        let outcome = sqli::probe_url_params(page, &self.fetcher).await;
        findings.extend(outcome.findings);
        endpoints_tested += outcome.endpoints_tested;

        TaskOutput {
            findings: dedupe_findings(findings),
            forms_found: page.forms.len() as u32,
            endpoints_tested,
            page_url: page.url.clone(),
        }
    }
}

/// Drop repeat findings within one page's results, keeping the first of each
/// (name, location, description) triple. Descriptions name the probed input,
/// so retried probes collapse while distinct inputs stay distinct.
pub fn dedupe_findings(findings: Vec<Finding>) -> Vec<Finding> {
    let mut seen = HashSet::new();
    findings
        .into_iter()
        .filter(|finding| {
            seen.insert((
                finding.name.clone(),
                finding.location.clone(),
                finding.description.clone(),
            ))
        })
        .collect()
}

/// The pool-facing runner used for real scans.
pub struct ScanTaskRunner {
    scanner: PageScanner,
}

impl ScanTaskRunner {
    pub fn new(fetcher: Arc<Fetcher>) -> Self {
        ScanTaskRunner {
            scanner: PageScanner::new(fetcher),
        }
    }
}

#[async_trait]
impl TaskRunner for ScanTaskRunner {
    async fn run(&self, task: &ScanTask) -> Result<TaskOutput, TaskFailure> {
        match task.kind {
            TaskKind::Scan => Ok(self.scanner.scan(&task.page).await),
            // Init tasks exist for queue warm-up; nothing to probe.
            TaskKind::Init => Ok(TaskOutput {
                findings: Vec::new(),
                forms_found: 0,
                endpoints_tested: 0,
                page_url: task.page.url.clone(),
            }),
        }
    }
}
