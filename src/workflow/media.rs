use std::path::Path;
use std::time::Instant;

use serde::Serialize;

use super::{MediaRef, SimilarityTier};
use crate::backend::{Comparison, FeatureBackend};
use crate::catalog::MediaRecord;
use crate::descriptor::BackendKind;
use crate::error::Result;
use crate::metrics;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchedMedia {
    pub media: MediaRef,
    pub similarity: f32,
    pub match_count: usize,
    pub tier: SimilarityTier,
}

/// 拍摄画面的匹配结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaMatch {
    /// 超过阈值的最佳匹配
    pub matched: Option<MatchedMedia>,
    pub backend: BackendKind,
    pub threshold: f32,
}

impl MediaMatch {
    pub fn from_comparison(comparison: &Comparison, records: &[MediaRecord], threshold: f32) -> Self {
        let matched = comparison
            .best()
            .filter(|best| best.result.similarity >= threshold)
            .map(|best| MatchedMedia {
                media: MediaRef::lookup(records, best.id),
                similarity: best.result.similarity,
                match_count: best.result.match_count,
                tier: SimilarityTier::from_similarity(best.result.similarity),
            });
        Self { matched, backend: comparison.backend, threshold }
    }
}

/// 根据拍摄画面查找对应的媒体
pub struct MediaMatcher<'a> {
    backend: &'a dyn FeatureBackend,
    threshold: f32,
    fan_out: usize,
}

impl<'a> MediaMatcher<'a> {
    pub fn new(backend: &'a dyn FeatureBackend, threshold: f32, fan_out: usize) -> Self {
        Self { backend, threshold, fan_out }
    }

    pub async fn find(&self, path: &Path, records: &[MediaRecord]) -> Result<MediaMatch> {
        let start = Instant::now();
        let comparison = self.backend.compare(path, records, self.threshold, self.fan_out).await?;
        metrics::inc_scan(comparison.backend, "match", start.elapsed().as_secs_f32(), comparison.failed);
        if let Some(best) = comparison.best() {
            metrics::observe_best_similarity(comparison.backend, "match", best.result.similarity);
        }
        Ok(MediaMatch::from_comparison(&comparison, records, self.threshold))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CandidateMatch;
    use crate::matcher::MatchResult;

    #[test]
    fn test_media_match_threshold_and_tier() {
        let records = vec![MediaRecord {
            id: 7,
            title: "poster".into(),
            descriptors: None,
            perceptual_hash: None,
        }];
        let comparison = Comparison {
            backend: BackendKind::Remote,
            feature_count: None,
            matches: vec![CandidateMatch {
                id: 7,
                result: MatchResult {
                    score: 35.,
                    match_count: 12,
                    similarity: 0.65,
                    backend: BackendKind::Remote,
                },
            }],
            failed: 0,
        };

        let found = MediaMatch::from_comparison(&comparison, &records, 0.4);
        let matched = found.matched.unwrap();
        assert_eq!(matched.media.title, "poster");
        assert_eq!(matched.tier, SimilarityTier::High);

        let missed = MediaMatch::from_comparison(&comparison, &records, 0.7);
        assert!(missed.matched.is_none());
    }
}
