use std::path::Path;
use std::time::Instant;

use log::{debug, info};
use serde::Serialize;

use super::MediaRef;
use crate::backend::{Comparison, FeatureBackend};
use crate::catalog::MediaRecord;
use crate::descriptor::BackendKind;
use crate::error::Result;
use crate::matcher::NO_MATCH_SCORE;
use crate::metrics;

/// 重复检测的结论
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateVerdict {
    pub is_duplicate: bool,
    /// 最相似的媒体，不论是否超过阈值
    pub matched: Option<MediaRef>,
    pub score: f32,
    pub similarity: f32,
    pub match_count: usize,
    pub backend: BackendKind,
    pub threshold: f32,
}

impl DuplicateVerdict {
    /// 根据比较结果得出结论，没有可比较的记录时不是重复
    pub fn from_comparison(comparison: &Comparison, records: &[MediaRecord], threshold: f32) -> Self {
        let Some(best) = comparison.best() else {
            return Self {
                is_duplicate: false,
                matched: None,
                score: NO_MATCH_SCORE,
                similarity: 0.,
                match_count: 0,
                backend: comparison.backend,
                threshold,
            };
        };
        Self {
            is_duplicate: best.result.similarity >= threshold,
            matched: Some(MediaRef::lookup(records, best.id)),
            score: best.result.score,
            similarity: best.result.similarity,
            match_count: best.result.match_count,
            backend: comparison.backend,
            threshold,
        }
    }
}

/// 检查新上传的扫描图是否与已有媒体重复
pub struct DuplicateDetector<'a> {
    backend: &'a dyn FeatureBackend,
    threshold: f32,
    fan_out: usize,
}

impl<'a> DuplicateDetector<'a> {
    pub fn new(backend: &'a dyn FeatureBackend, threshold: f32, fan_out: usize) -> Self {
        Self { backend, threshold, fan_out }
    }

    /// 查询图片特征提取失败时返回错误，调用方应中止上传
    pub async fn check(&self, path: &Path, records: &[MediaRecord]) -> Result<DuplicateVerdict> {
        let start = Instant::now();
        let comparison = self.backend.compare(path, records, self.threshold, self.fan_out).await?;
        metrics::inc_scan(
            comparison.backend,
            "duplicate",
            start.elapsed().as_secs_f32(),
            comparison.failed,
        );
        debug!(
            "duplicate scan: {} compared, {} skipped on {}",
            comparison.matches.len(),
            comparison.failed,
            comparison.backend
        );

        let verdict = DuplicateVerdict::from_comparison(&comparison, records, self.threshold);
        if verdict.matched.is_some() {
            metrics::observe_best_similarity(verdict.backend, "duplicate", verdict.similarity);
        }
        if let (true, Some(matched)) = (verdict.is_duplicate, &verdict.matched) {
            info!(
                "检测到重复: 媒体 {} ({}), 相似度 {:.2}",
                matched.id, matched.title, verdict.similarity
            );
        }
        Ok(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CandidateMatch;
    use crate::matcher::MatchResult;

    fn record(id: i64) -> MediaRecord {
        MediaRecord { id, title: format!("media {}", id), descriptors: None, perceptual_hash: None }
    }

    fn candidate(id: i64, score: f32, similarity: f32, match_count: usize) -> CandidateMatch {
        CandidateMatch {
            id,
            result: MatchResult { score, match_count, similarity, backend: BackendKind::Native },
        }
    }

    #[test]
    fn test_verdict_picks_lowest_score() {
        let records = vec![record(1), record(2), record(3)];
        let comparison = Comparison {
            backend: BackendKind::Native,
            feature_count: Some(10),
            matches: vec![candidate(1, 40., 0.6, 5), candidate(2, 10., 0.9, 5), candidate(3, 10., 0.9, 5)],
            failed: 0,
        };
        let verdict = DuplicateVerdict::from_comparison(&comparison, &records, 0.5);
        assert!(verdict.is_duplicate);
        // 分数相同时取先出现的
        assert_eq!(verdict.matched, Some(MediaRef { id: 2, title: "media 2".into() }));
        assert_eq!(verdict.score, 10.);
    }

    #[test]
    fn test_verdict_below_threshold() {
        let comparison = Comparison {
            backend: BackendKind::Native,
            feature_count: Some(10),
            matches: vec![candidate(1, 80., 0.2, 5)],
            failed: 1,
        };
        let verdict = DuplicateVerdict::from_comparison(&comparison, &[record(1)], 0.5);
        assert!(!verdict.is_duplicate);
        assert_eq!(verdict.matched.map(|m| m.id), Some(1));
    }

    #[test]
    fn test_zero_match_count_never_duplicate() {
        let comparison = Comparison {
            backend: BackendKind::Fallback,
            feature_count: Some(10),
            matches: vec![candidate(1, 0., 1., 0)],
            failed: 0,
        };
        let verdict = DuplicateVerdict::from_comparison(&comparison, &[record(1)], 0.);
        assert!(!verdict.is_duplicate);
        assert_eq!(verdict.matched, None);
        assert_eq!(verdict.score, NO_MATCH_SCORE);
    }
}
