use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Fingerprints, MediaCatalog, MediaRecord};
use crate::error::Result;

/// 内存中的媒体目录
#[derive(Default)]
pub struct MemoryCatalog {
    records: RwLock<Vec<MediaRecord>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<MediaRecord>) -> Self {
        Self { records: RwLock::new(records) }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl MediaCatalog for MemoryCatalog {
    async fn find_all_with_descriptors(&self) -> Result<Vec<MediaRecord>> {
        let records = self.records.read().await;
        Ok(records.iter().filter(|r| r.descriptors.is_some()).cloned().collect())
    }

    async fn find_all_with_perceptual_hash(&self) -> Result<Vec<MediaRecord>> {
        let records = self.records.read().await;
        Ok(records.iter().filter(|r| r.perceptual_hash.is_some()).cloned().collect())
    }

    async fn insert(&self, title: &str, fingerprints: &Fingerprints) -> Result<i64> {
        let mut records = self.records.write().await;
        let id = records.iter().map(|r| r.id).max().unwrap_or(0) + 1;
        records.push(MediaRecord {
            id,
            title: title.to_string(),
            descriptors: Some(fingerprints.descriptors.clone()),
            perceptual_hash: fingerprints.perceptual_hash.clone(),
        });
        Ok(id)
    }

    async fn replace_fingerprints(&self, id: i64, fingerprints: &Fingerprints) -> Result<bool> {
        let mut records = self.records.write().await;
        let Some(record) = records.iter_mut().find(|r| r.id == id) else {
            return Ok(false);
        };
        record.descriptors = Some(fingerprints.descriptors.clone());
        record.perceptual_hash = fingerprints.perceptual_hash.clone();
        Ok(true)
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| r.id != id);
        Ok(records.len() != before)
    }
}
