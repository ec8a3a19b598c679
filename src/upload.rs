use std::path::Path;

use log::{info, warn};
use serde::Serialize;

use crate::catalog::{Fingerprints, MediaCatalog, MediaRecord};
use crate::config::ScreeningOptions;
use crate::descriptor::BackendKind;
use crate::error::Result;
use crate::orchestrator::BackendOrchestrator;
use crate::phash::PerceptualHashService;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    IdenticalPerceptualHash,
    SimilarPerceptualHash,
    DescriptorMatch,
}

/// 上传的扫描图与已有媒体重复
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateRejection {
    pub id: i64,
    pub title: String,
    pub similarity: f32,
    pub kind: RejectionKind,
    pub backend: Option<BackendKind>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum ScreeningOutcome {
    Accepted(Fingerprints),
    Rejected(DuplicateRejection),
}

/// 上传扫描图前的重复筛查
///
/// 先比较感知哈希，再用特征描述符扫描整个目录，任意一步命中即拒绝。
pub struct UploadScreener<'a> {
    orchestrator: &'a BackendOrchestrator,
    opts: ScreeningOptions,
}

impl<'a> UploadScreener<'a> {
    pub fn new(orchestrator: &'a BackendOrchestrator, opts: ScreeningOptions) -> Self {
        Self { orchestrator, opts }
    }

    pub async fn screen(&self, path: &Path, catalog: &dyn MediaCatalog) -> Result<ScreeningOutcome> {
        self.screen_excluding(path, catalog, None).await
    }

    /// 筛查并在通过后新增记录，返回新记录的 ID
    pub async fn admit(
        &self,
        path: &Path,
        title: &str,
        catalog: &dyn MediaCatalog,
    ) -> Result<std::result::Result<i64, DuplicateRejection>> {
        match self.screen(path, catalog).await? {
            ScreeningOutcome::Accepted(fingerprints) => {
                let id = catalog.insert(title, &fingerprints).await?;
                info!("已添加媒体 {}: {}", id, title);
                Ok(Ok(id))
            }
            ScreeningOutcome::Rejected(rejection) => Ok(Err(rejection)),
        }
    }

    /// 替换记录 `id` 的扫描图，筛查时忽略该记录自身
    pub async fn replace(
        &self,
        id: i64,
        path: &Path,
        catalog: &dyn MediaCatalog,
    ) -> Result<ScreeningOutcome> {
        let outcome = self.screen_excluding(path, catalog, Some(id)).await?;
        if let ScreeningOutcome::Accepted(fingerprints) = &outcome {
            if !catalog.replace_fingerprints(id, fingerprints).await? {
                warn!("媒体 {} 不存在，指纹未更新", id);
            }
        }
        Ok(outcome)
    }

    async fn screen_excluding(
        &self,
        path: &Path,
        catalog: &dyn MediaCatalog,
        exclude: Option<i64>,
    ) -> Result<ScreeningOutcome> {
        let backend = self.orchestrator.probe().await?;
        let extraction = backend.extract(path).await?;

        let perceptual_hash =
            match PerceptualHashService::generate_hash_async(path, self.opts.phash_size).await {
                Ok(hash) => Some(hash),
                Err(e) => {
                    warn!("无法生成 {} 的感知哈希，跳过哈希比较: {}", path.display(), e);
                    None
                }
            };

        if let Some(hash) = &perceptual_hash {
            let mut records = catalog.find_all_with_perceptual_hash().await?;
            records.retain(|r| Some(r.id) != exclude);
            if let Some(rejection) = phash_rejection(hash, &records, self.opts.phash_threshold) {
                info!("感知哈希与媒体 {} 相近，拒绝上传", rejection.id);
                return Ok(ScreeningOutcome::Rejected(rejection));
            }
        }

        let mut records = catalog.find_all_with_descriptors().await?;
        records.retain(|r| Some(r.id) != exclude);
        let verdict = self
            .orchestrator
            .check_for_duplicates(path, &records, Some(self.opts.descriptor_threshold))
            .await?;
        if let (true, Some(matched)) = (verdict.is_duplicate, verdict.matched) {
            return Ok(ScreeningOutcome::Rejected(DuplicateRejection {
                id: matched.id,
                title: matched.title,
                similarity: verdict.similarity,
                kind: RejectionKind::DescriptorMatch,
                backend: Some(verdict.backend),
            }));
        }

        Ok(ScreeningOutcome::Accepted(Fingerprints {
            descriptors: extraction.descriptors,
            perceptual_hash,
        }))
    }
}

/// 完全相同的哈希优先，其次取距离最小的；距离相同时取目录中靠前的
fn phash_rejection(hash: &str, records: &[MediaRecord], threshold: u32) -> Option<DuplicateRejection> {
    let similar = PerceptualHashService::find_similar(hash, records, threshold);
    let mut best: Option<(&MediaRecord, u32)> = None;
    for (record, distance) in similar {
        if best.is_none_or(|(_, d)| distance < d) {
            best = Some((record, distance));
        }
    }
    let (record, distance) = best?;
    let bits = (hash.trim().len() * 4) as f32;
    Some(DuplicateRejection {
        id: record.id,
        title: record.title.clone(),
        similarity: 1. - distance as f32 / bits,
        kind: match distance {
            0 => RejectionKind::IdenticalPerceptualHash,
            _ => RejectionKind::SimilarPerceptualHash,
        },
        backend: None,
    })
}
