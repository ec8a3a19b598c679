use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use log::debug;

use super::FeatureBackend;
use crate::cache::{CacheStats, DescriptorCache};
use crate::config::OrbOptions;
use crate::descriptor::{BackendKind, DescriptorSet, Extraction};
use crate::error::{Result, VisionError};
use crate::matcher::{self, MatchResult};

/// 同步的特征点检测器，运行在阻塞线程池中
pub trait KeypointDetector: Send + Sync {
    /// 读取图片并返回每个特征点的描述符
    fn detect(&self, path: &Path) -> Result<Vec<Vec<u8>>>;
}

/// 进程内视觉库后端
///
/// 检测器在创建时加载，加载失败后在整个进程生命周期内都不可用，不会重试。
pub struct NativeVisionBinding {
    detector: Option<Arc<dyn KeypointDetector>>,
    cache: DescriptorCache,
    distance_scale: f32,
}

impl NativeVisionBinding {
    pub fn new(detector: Option<Arc<dyn KeypointDetector>>, distance_scale: f32) -> Self {
        Self { detector, cache: DescriptorCache::new(BackendKind::Native), distance_scale }
    }

    /// 尝试加载 OpenCV ORB 检测器
    #[cfg(feature = "opencv")]
    pub fn load(opts: &OrbOptions, distance_scale: f32) -> Self {
        let detector: Option<Arc<dyn KeypointDetector>> =
            match super::OrbDetector::create(opts.clone()) {
                Ok(detector) => Some(Arc::new(detector)),
                Err(e) => {
                    log::warn!("加载 OpenCV ORB 失败，本地视觉后端不可用: {}", e);
                    None
                }
            };
        Self::new(detector, distance_scale)
    }

    #[cfg(not(feature = "opencv"))]
    pub fn load(opts: &OrbOptions, distance_scale: f32) -> Self {
        log::info!("未启用 opencv 特性，本地视觉后端不可用 (nfeatures={})", opts.orb_nfeatures);
        Self::new(None, distance_scale)
    }

    /// 不加载任何检测器，始终不可用
    pub fn unavailable(distance_scale: f32) -> Self {
        Self::new(None, distance_scale)
    }
}

#[async_trait]
impl FeatureBackend for NativeVisionBinding {
    fn kind(&self) -> BackendKind {
        BackendKind::Native
    }

    fn distance_scale(&self) -> f32 {
        self.distance_scale
    }

    async fn is_healthy(&self) -> bool {
        self.detector.is_some()
    }

    async fn extract(&self, path: &Path) -> Result<Extraction> {
        let Some(detector) = self.detector.clone() else {
            return Err(VisionError::Extraction("native vision library is not available".into()));
        };

        if let Some(cached) = self.cache.get(path) {
            debug!("native: cache hit for {}", path.display());
            return Ok(cached);
        }

        let owned: PathBuf = path.to_path_buf();
        let rows = tokio::task::spawn_blocking(move || detector.detect(&owned))
            .await
            .map_err(|e| VisionError::Extraction(format!("detector task failed: {}", e)))??;

        let extraction = Extraction::new(BackendKind::Native, rows);
        debug!("native: {} features from {}", extraction.feature_count, path.display());
        self.cache.insert(path.to_path_buf(), extraction.clone());
        Ok(extraction)
    }

    async fn match_descriptors(
        &self,
        query: &DescriptorSet,
        stored: &DescriptorSet,
    ) -> Result<MatchResult> {
        if self.detector.is_none() {
            return Err(VisionError::Matching("native vision library is not available".into()));
        }
        query.validate()?;
        stored.validate()?;
        if query.width().is_some() && stored.width().is_some() && query.width() != stored.width()
        {
            return Err(VisionError::Matching(format!(
                "descriptor width mismatch: {:?} vs {:?}",
                query.width(),
                stored.width()
            )));
        }

        let (score, match_count) = matcher::cross_check_hamming(query, stored);
        Ok(MatchResult {
            score,
            match_count,
            similarity: match match_count {
                0 => 0.,
                _ => self.similarity(score),
            },
            backend: BackendKind::Native,
        })
    }

    fn clear_cache(&self) {
        self.cache.clear();
    }

    fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}
