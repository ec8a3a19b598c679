mod fallback;
mod native;
#[cfg(feature = "opencv")]
mod orb;
mod remote;

use std::path::Path;

use async_trait::async_trait;
use futures::{FutureExt, StreamExt, stream};
use log::{debug, warn};
use serde::Serialize;

pub use self::fallback::*;
pub use self::native::*;
#[cfg(feature = "opencv")]
pub use self::orb::*;
pub use self::remote::*;
use crate::cache::CacheStats;
use crate::catalog::MediaRecord;
use crate::descriptor::{BackendKind, DescriptorSet, Extraction};
use crate::error::Result;
use crate::matcher::{self, MatchResult};

/// 特征提取与匹配后端
#[async_trait]
pub trait FeatureBackend: Send + Sync {
    /// 后端标识
    fn kind(&self) -> BackendKind;

    /// 原始距离达到该值时相似度为 0
    fn distance_scale(&self) -> f32;

    /// 原始距离映射到 0~1 的相似度
    fn similarity(&self, score: f32) -> f32 {
        matcher::similarity_from_distance(score, self.distance_scale())
    }

    /// 后端当前是否可用
    async fn is_healthy(&self) -> bool;

    /// 提取图片的特征描述符
    async fn extract(&self, path: &Path) -> Result<Extraction>;

    /// 比较两组描述符
    async fn match_descriptors(
        &self,
        query: &DescriptorSet,
        stored: &DescriptorSet,
    ) -> Result<MatchResult>;

    /// 将一张图片与多条媒体记录比较
    ///
    /// 默认实现先提取查询图片特征，再逐条调用 [`FeatureBackend::match_descriptors`]。
    /// `min_similarity` 仅供能在服务端筛选的后端使用，调用方仍需自行按阈值判断。
    async fn compare(
        &self,
        path: &Path,
        records: &[MediaRecord],
        _min_similarity: f32,
        fan_out: usize,
    ) -> Result<Comparison> {
        let query = self.extract(path).await?;
        Ok(scan_candidates(self, &query, records, fan_out).await)
    }

    fn clear_cache(&self) {}

    fn cache_stats(&self) -> CacheStats {
        CacheStats::empty(Some(self.kind()))
    }
}

/// 单条媒体记录的比较结果
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CandidateMatch {
    pub id: i64,
    #[serde(flatten)]
    pub result: MatchResult,
}

/// 一张查询图片与一批媒体记录的比较结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    pub backend: BackendKind,
    /// 查询图片的特征点数量，后端不返回时为 `None`
    pub feature_count: Option<usize>,
    /// 所有成功比较的记录，顺序与输入一致
    pub matches: Vec<CandidateMatch>,
    /// 比较失败而被跳过的记录数量
    pub failed: usize,
}

impl Comparison {
    pub fn empty(backend: BackendKind, feature_count: Option<usize>) -> Self {
        Self { backend, feature_count, matches: vec![], failed: 0 }
    }

    /// 分数最低的可比较记录，分数相同时取先出现的
    pub fn best(&self) -> Option<&CandidateMatch> {
        let mut best: Option<&CandidateMatch> = None;
        for m in self.matches.iter().filter(|m| m.result.is_comparable()) {
            if best.is_none_or(|b| m.result.score < b.result.score) {
                best = Some(m);
            }
        }
        best
    }
}

/// 将查询描述符与所有带描述符的记录比较
///
/// 最多同时进行 `fan_out` 个比较，结果保持输入顺序。
/// 单条记录比较失败只记录日志并跳过，不会中断整个扫描。
pub async fn scan_candidates<B>(
    backend: &B,
    query: &Extraction,
    records: &[MediaRecord],
    fan_out: usize,
) -> Comparison
where
    B: FeatureBackend + ?Sized,
{
    let kind = backend.kind();
    if query.feature_count == 0 || query.descriptors.is_empty() {
        debug!("查询图片没有特征点，跳过比较");
        return Comparison::empty(kind, Some(0));
    }

    let mut pending = Vec::with_capacity(records.len());
    for record in records {
        let Some(stored) = record.descriptors.as_ref().filter(|d| !d.is_empty()) else {
            continue;
        };
        let id = record.id;
        pending.push(
            async move {
                if stored.backend.is_none() {
                    debug!("media {} has untagged descriptors, comparing on {}", id, kind);
                }
                let result = match stored.ensure_comparable(kind) {
                    Ok(()) => backend.match_descriptors(&query.descriptors, stored).await,
                    Err(e) => Err(e),
                };
                (id, result)
            }
            .boxed(),
        );
    }

    let results = stream::iter(pending).buffered(fan_out.max(1)).collect::<Vec<_>>().await;

    let mut comparison = Comparison::empty(kind, Some(query.feature_count));
    for (id, result) in results {
        match result {
            Ok(result) => comparison.matches.push(CandidateMatch { id, result }),
            Err(e) => {
                warn!("与媒体 {} 比较失败，已跳过: {}", id, e);
                comparison.failed += 1;
            }
        }
    }
    comparison
}
