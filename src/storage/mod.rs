//! The persistence collaborator. The scanner core only ever talks to the
//! `ScanStore` trait; real deployments put a database behind it, tests and
//! the default binary use the in-memory implementation.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::models::ScanRecord;

#[async_trait]
pub trait ScanStore: Send + Sync {
    /// Insert or replace a record. Each scan has a single writer (its
    /// coordinator), so last-write-wins is safe.
    async fn upsert(&self, record: ScanRecord);

    async fn get(&self, id: &str) -> Option<ScanRecord>;

    /// All records, newest first.
    async fn list(&self) -> Vec<ScanRecord>;
}

#[derive(Default)]
pub struct MemoryScanStore {
    records: RwLock<HashMap<String, ScanRecord>>,
}

impl MemoryScanStore {
    pub fn new() -> Self {
        MemoryScanStore::default()
    }
}

#[async_trait]
impl ScanStore for MemoryScanStore {
    async fn upsert(&self, record: ScanRecord) {
        self.records.write().await.insert(record.id.clone(), record);
    }

    async fn get(&self, id: &str) -> Option<ScanRecord> {
        self.records.read().await.get(id).cloned()
    }

    async fn list(&self) -> Vec<ScanRecord> {
        let mut records: Vec<ScanRecord> = self.records.read().await.values().cloned().collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScanStatus;

    #[tokio::test]
    async fn test_upsert_get_list() {
        let store = MemoryScanStore::new();
        assert!(store.get("missing").await.is_none());

        let mut record = ScanRecord::new("s1".to_string(), "https://a.example".to_string());
        store.upsert(record.clone()).await;
        assert_eq!(store.get("s1").await.unwrap().status, ScanStatus::Pending);

        record.status = ScanStatus::Crawling;
        store.upsert(record).await;
        assert_eq!(store.get("s1").await.unwrap().status, ScanStatus::Crawling);

        let later = ScanRecord::new("s2".to_string(), "https://b.example".to_string());
        store.upsert(later).await;
        let all = store.list().await;
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, "s2");
    }
}
