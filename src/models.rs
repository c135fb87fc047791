use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Crawl output ---

/// One discovered page: canonical URL, parse results, and the depth at
/// which the crawler reached it (seed = 0).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub url: String,
    pub title: String,
    pub depth: u32,
    pub links: Vec<String>,
    pub forms: Vec<Form>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Form {
    /// Absolute URL, resolved against the page URL.
    pub action: String,
    pub method: FormMethod,
    /// Only inputs with a non-empty `name` survive parsing.
    pub inputs: Vec<FormInput>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormMethod {
    #[serde(rename = "GET")]
    Get,
    #[serde(rename = "POST")]
    Post,
}

impl FormMethod {
    /// Anything that is not POST is coerced to GET.
    pub fn from_attr(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("post") {
            FormMethod::Post
        } else {
            FormMethod::Get
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FormMethod::Get => "GET",
            FormMethod::Post => "POST",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormInput {
    pub name: String,
    /// Lower-cased `type` attribute; missing defaults to `"text"`.
    #[serde(rename = "type")]
    pub kind: String,
    pub required: bool,
    pub value: String,
}

// --- Findings ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "SQL Injection")]
    SqlInjection,
    #[serde(rename = "XSS")]
    Xss,
    #[serde(rename = "CSRF")]
    Csrf,
    #[serde(rename = "API Issues")]
    ApiIssues,
    #[serde(rename = "Load Testing")]
    LoadTesting,
    #[serde(rename = "Information Disclosure")]
    InformationDisclosure,
}

/// A single reported vulnerability instance, the user-visible unit of
/// scan output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    pub name: String,
    pub category: Category,
    pub severity: Severity,
    pub description: String,
    /// Typically `"<METHOD> <url>"`, or `"HTTP Headers"` for header findings.
    pub location: String,
    pub impact: String,
}

impl Finding {
    pub fn new(
        name: &str,
        category: Category,
        severity: Severity,
        description: String,
        location: String,
        impact: &str,
    ) -> Self {
        Finding {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            category,
            severity,
            description,
            location,
            impact: impact.to_string(),
        }
    }
}

// --- Worker pool tasks ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Scan,
    Init,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanTask {
    pub task_id: String,
    pub scan_id: String,
    pub kind: TaskKind,
    pub page: Page,
    pub priority: u8,
}

impl ScanTask {
    /// Scan task for one page, with the conventional `<scan_id>::page-<index>` id.
    pub fn scan(scan_id: &str, index: usize, page: Page) -> Self {
        ScanTask {
            task_id: format!("{scan_id}::page-{index}"),
            scan_id: scan_id.to_string(),
            kind: TaskKind::Scan,
            page,
            priority: 1,
        }
    }
}

/// What a completed page scan produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutput {
    pub findings: Vec<Finding>,
    pub forms_found: u32,
    pub endpoints_tested: u32,
    pub page_url: String,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TaskFailure {
    #[error("worker crashed while running the task")]
    WorkerCrashed,
    #[error("failed to hand the task to a worker: {0}")]
    Dispatch(String),
    #[error("task failed: {0}")]
    Failed(String),
    #[error("worker pool is shutting down")]
    Shutdown,
}

/// Result of one task, reported by the pool. `worker_id` is `None` when the
/// task was rejected before any worker held it.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerResult {
    pub task_id: String,
    pub worker_id: Option<usize>,
    pub outcome: Result<TaskOutput, TaskFailure>,
}

// --- Scan lifecycle ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Pending,
    Crawling,
    Scanning,
    Completed,
    Failed,
}

impl ScanStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanStatus::Completed | ScanStatus::Failed)
    }
}

/// Crawl statistics persisted with the scan record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlStatsRecord {
    pub total_pages: u32,
    pub total_forms: u32,
    pub total_links: u32,
    pub visited_urls: u32,
    pub max_depth_reached: u32,
}

/// The persisted scan, as exposed over the API and handed to the storage
/// collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRecord {
    pub id: String,
    pub url: String,
    pub status: ScanStatus,
    pub vulnerabilities: Vec<Finding>,
    pub pages_scanned: u32,
    pub forms_found: u32,
    pub endpoints_tested: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crawl_stats: Option<CrawlStatsRecord>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ScanRecord {
    pub fn new(id: String, url: String) -> Self {
        ScanRecord {
            id,
            url,
            status: ScanStatus::Pending,
            vulnerabilities: Vec::new(),
            pages_scanned: 0,
            forms_found: 0,
            endpoints_tested: 0,
            crawl_stats: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

// --- Progress stream ---

/// Snapshot broadcast to observers after every aggregation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanProgress {
    pub scan_id: String,
    pub status: ScanStatus,
    /// 0..=100; the crawl phase owns the first 30 points.
    pub progress: u8,
    pub pages_scanned: u32,
    pub total_pages: u32,
    pub vulnerabilities_found: u32,
    pub forms_found: u32,
    pub endpoints_tested: u32,
    /// Seconds; 0 while there is no basis for an estimate.
    pub estimated_time_remaining: u64,
    pub start_time: DateTime<Utc>,
    pub current_stage: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vulnerabilities: Option<Vec<Finding>>,
}

/// Event fanned out on the progress bus and over the WebSocket, in
/// `{"event": ..., "data": ...}` envelope form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ProgressEvent {
    #[serde(rename = "scan-progress")]
    Progress(ScanProgress),
    #[serde(rename = "scan-error")]
    #[serde(rename_all = "camelCase")]
    Error { scan_id: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_wire_labels() {
        assert_eq!(
            serde_json::to_string(&Category::SqlInjection).unwrap(),
            "\"SQL Injection\""
        );
        assert_eq!(serde_json::to_string(&Category::Xss).unwrap(), "\"XSS\"");
        assert_eq!(
            serde_json::to_string(&Category::InformationDisclosure).unwrap(),
            "\"Information Disclosure\""
        );
        assert_eq!(
            serde_json::to_string(&Severity::Critical).unwrap(),
            "\"Critical\""
        );
    }

    #[test]
    fn test_form_method_coercion() {
        assert_eq!(FormMethod::from_attr("post"), FormMethod::Post);
        assert_eq!(FormMethod::from_attr("POST"), FormMethod::Post);
        assert_eq!(FormMethod::from_attr("get"), FormMethod::Get);
        assert_eq!(FormMethod::from_attr("dialog"), FormMethod::Get);
        assert_eq!(FormMethod::from_attr(""), FormMethod::Get);
    }

    #[test]
    fn test_scan_task_id_convention() {
        let page = Page {
            url: "https://example.com/".to_string(),
            title: String::new(),
            depth: 0,
            links: vec![],
            forms: vec![],
        };
        let task = ScanTask::scan("abc", 3, page);
        assert_eq!(task.task_id, "abc::page-3");
        assert_eq!(task.kind, TaskKind::Scan);
        assert_eq!(task.priority, 1);
    }

    #[test]
    fn test_scan_record_serializes_camel_case() {
        let record = ScanRecord::new("s1".to_string(), "https://example.com".to_string());
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status"], "pending");
        assert!(json.get("pagesScanned").is_some());
        assert!(json.get("formsFound").is_some());
        assert!(json.get("endpointsTested").is_some());
        assert!(json.get("createdAt").is_some());
        // Unset optionals stay off the wire.
        assert!(json.get("completedAt").is_none());
        assert!(json.get("crawlStats").is_none());
    }

    #[test]
    fn test_progress_event_envelope() {
        let event = ProgressEvent::Error {
            scan_id: "s1".to_string(),
            message: "boom".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "scan-error");
        assert_eq!(json["data"]["scanId"], "s1");
        assert_eq!(json["data"]["message"], "boom");
    }
}
