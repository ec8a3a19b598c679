use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};

use crate::backend::{
    ContentHashFallback, FeatureBackend, NativeVisionBinding, RemoteVisionService,
};
use crate::cache::CacheStats;
use crate::catalog::MediaRecord;
use crate::config::{BackendOptions, BackendTuning};
use crate::descriptor::{BackendKind, DescriptorSet, Extraction};
use crate::error::{Result, VisionError};
use crate::matcher::MatchResult;
use crate::metrics;
use crate::workflow::{DuplicateDetector, DuplicateVerdict, MediaMatch, MediaMatcher};

/// 后端绑定状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BindState {
    Uninitialized,
    Probing,
    Bound(usize),
}

/// 单个后端最近一次探测的结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendHealth {
    pub backend: BackendKind,
    pub available: bool,
    /// 从未探测过时为 `None`
    pub last_probed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceInfo {
    pub current: Option<BackendKind>,
    pub state: BindState,
    pub fallback_active: bool,
    pub backends: Vec<BackendHealth>,
    pub tuning: Option<BackendTuning>,
}

struct Binding {
    state: BindState,
    health: Vec<BackendHealth>,
}

/// 按优先级选择一个可用的特征后端，并把所有调用委托给它
///
/// 第一次调用时按顺序探测，绑定到第一个健康的后端。绑定之后不会自动切换，
/// 调用中途失败直接返回错误，只有 [`BackendOrchestrator::reprobe`] 会重新选择。
pub struct BackendOrchestrator {
    backends: Vec<Arc<dyn FeatureBackend>>,
    tuning: HashMap<BackendKind, BackendTuning>,
    fan_out: usize,
    binding: RwLock<Binding>,
    probe_lock: Mutex<()>,
}

impl BackendOrchestrator {
    /// `backends` 按优先级从高到低排列
    pub fn new(
        backends: Vec<Arc<dyn FeatureBackend>>,
        tuning: HashMap<BackendKind, BackendTuning>,
        fan_out: usize,
    ) -> Self {
        let health = backends
            .iter()
            .map(|b| BackendHealth { backend: b.kind(), available: false, last_probed_at: None })
            .collect();
        Self {
            backends,
            tuning,
            fan_out: fan_out.max(1),
            binding: RwLock::new(Binding { state: BindState::Uninitialized, health }),
            probe_lock: Mutex::new(()),
        }
    }

    /// 根据命令行参数构造 远程服务 -> 本地视觉库 -> 内容哈希 的后端列表
    pub fn from_options(opts: &BackendOptions) -> Result<Self> {
        let mut backends: Vec<Arc<dyn FeatureBackend>> = vec![];
        if !opts.no_remote {
            let scale = opts.tuning(BackendKind::Remote).distance_scale;
            backends.push(Arc::new(RemoteVisionService::new(&opts.remote_url, scale)?));
        }
        if !opts.no_native {
            let scale = opts.tuning(BackendKind::Native).distance_scale;
            backends.push(Arc::new(NativeVisionBinding::load(&opts.orb, scale)));
        }
        let scale = opts.tuning(BackendKind::Fallback).distance_scale;
        backends.push(Arc::new(ContentHashFallback::new(scale)));

        let tuning = [BackendKind::Remote, BackendKind::Native, BackendKind::Fallback]
            .into_iter()
            .map(|kind| (kind, opts.tuning(kind)))
            .collect();
        Ok(Self::new(backends, tuning, opts.fan_out()))
    }

    pub fn tuning_for(&self, kind: BackendKind) -> BackendTuning {
        self.tuning
            .get(&kind)
            .copied()
            .unwrap_or_else(|| BackendOptions::default().tuning(kind))
    }

    /// 确保已绑定后端，返回当前后端
    pub async fn probe(&self) -> Result<Arc<dyn FeatureBackend>> {
        if let BindState::Bound(index) = self.binding.read().await.state {
            return Ok(self.backends[index].clone());
        }

        // 同一时间只有一个探测，其他调用者等待它的结果
        let _guard = self.probe_lock.lock().await;
        if let BindState::Bound(index) = self.binding.read().await.state {
            return Ok(self.backends[index].clone());
        }
        self.run_probe().await
    }

    /// 丢弃当前绑定并重新探测
    pub async fn reprobe(&self) -> Result<Arc<dyn FeatureBackend>> {
        let _guard = self.probe_lock.lock().await;
        info!("重新探测特征后端");
        self.run_probe().await
    }

    /// 调用前必须持有 `probe_lock`
    async fn run_probe(&self) -> Result<Arc<dyn FeatureBackend>> {
        self.binding.write().await.state = BindState::Probing;

        let mut bound = None;
        let mut probed = vec![];
        for (index, backend) in self.backends.iter().enumerate() {
            let available = backend.is_healthy().await;
            metrics::inc_probe(backend.kind(), available);
            probed.push((index, available, Utc::now()));
            if available {
                bound = Some(index);
                break;
            }
            debug!("后端 {} 不可用，尝试下一个", backend.kind());
        }

        let mut binding = self.binding.write().await;
        for (index, available, at) in probed {
            binding.health[index].available = available;
            binding.health[index].last_probed_at = Some(at);
        }
        match bound {
            Some(index) => {
                let backend = self.backends[index].clone();
                if backend.kind() == BackendKind::Fallback {
                    warn!("仅内容哈希兜底可用，只能识别完全相同的文件");
                }
                info!("绑定特征后端: {}", backend.kind());
                binding.state = BindState::Bound(index);
                Ok(backend)
            }
            None => {
                warn!("没有可用的特征后端");
                binding.state = BindState::Uninitialized;
                Err(VisionError::BackendUnavailable)
            }
        }
    }

    /// 当前是否有可用的后端，必要时触发探测
    pub async fn is_healthy(&self) -> bool {
        self.probe().await.is_ok()
    }

    /// 当前绑定的后端，不触发探测
    pub async fn current(&self) -> Option<BackendKind> {
        match self.binding.read().await.state {
            BindState::Bound(index) => Some(self.backends[index].kind()),
            _ => None,
        }
    }

    pub async fn extract_features(&self, path: &Path) -> Result<Extraction> {
        self.probe().await?.extract(path).await
    }

    pub async fn match_features(
        &self,
        query: &DescriptorSet,
        stored: &DescriptorSet,
    ) -> Result<MatchResult> {
        let backend = self.probe().await?;
        query.ensure_comparable(backend.kind())?;
        stored.ensure_comparable(backend.kind())?;
        backend.match_descriptors(query, stored).await
    }

    /// 检查图片是否与记录中的某个媒体重复，`threshold` 为空时使用当前后端的默认阈值
    pub async fn check_for_duplicates(
        &self,
        path: &Path,
        records: &[MediaRecord],
        threshold: Option<f32>,
    ) -> Result<DuplicateVerdict> {
        let backend = self.probe().await?;
        let threshold =
            threshold.unwrap_or_else(|| self.tuning_for(backend.kind()).duplicate_threshold);
        DuplicateDetector::new(backend.as_ref(), threshold, self.fan_out).check(path, records).await
    }

    pub async fn find_matching_media(
        &self,
        path: &Path,
        records: &[MediaRecord],
        threshold: Option<f32>,
    ) -> Result<MediaMatch> {
        let backend = self.probe().await?;
        let threshold =
            threshold.unwrap_or_else(|| self.tuning_for(backend.kind()).match_threshold);
        MediaMatcher::new(backend.as_ref(), threshold, self.fan_out).find(path, records).await
    }

    /// 清空当前后端的缓存，未绑定时什么也不做
    pub async fn clear_cache(&self) {
        if let BindState::Bound(index) = self.binding.read().await.state {
            self.backends[index].clear_cache();
        }
    }

    pub async fn cache_stats(&self) -> CacheStats {
        match self.binding.read().await.state {
            BindState::Bound(index) => self.backends[index].cache_stats(),
            _ => CacheStats::empty(None),
        }
    }

    pub async fn service_info(&self) -> ServiceInfo {
        let binding = self.binding.read().await;
        let current = match binding.state {
            BindState::Bound(index) => Some(self.backends[index].kind()),
            _ => None,
        };
        ServiceInfo {
            current,
            state: binding.state,
            fallback_active: current == Some(BackendKind::Fallback),
            backends: binding.health.clone(),
            tuning: current.map(|kind| self.tuning_for(kind)),
        }
    }
}
