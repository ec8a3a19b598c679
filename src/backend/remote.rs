use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{CandidateMatch, Comparison, FeatureBackend};
use crate::catalog::MediaRecord;
use crate::descriptor::{BackendKind, DescriptorSet, Extraction};
use crate::error::{Result, VisionError};
use crate::matcher::{MatchResult, NO_MATCH_SCORE};

/// 健康检查超时
pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);
/// 提取、匹配、比较请求的超时
pub const OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct ExtractRequest<'a> {
    image_path: &'a str,
}

#[derive(Deserialize)]
struct ExtractResponse {
    success: bool,
    #[serde(default)]
    descriptors: Vec<Vec<u8>>,
    #[serde(default)]
    feature_count: Option<usize>,
    error: Option<String>,
}

#[derive(Serialize)]
struct MatchRequest<'a> {
    query_desc: &'a [Vec<u8>],
    stored_desc: &'a [Vec<u8>],
}

#[derive(Deserialize)]
struct MatchResponse {
    success: bool,
    #[serde(default)]
    score: Option<f32>,
    #[serde(default)]
    match_count: usize,
    error: Option<String>,
}

#[derive(Serialize)]
struct StoredDescriptors<'a> {
    id: i64,
    descriptors: &'a [Vec<u8>],
}

#[derive(Serialize)]
struct CompareRequest<'a> {
    query_image_path: &'a str,
    stored_descriptors: Vec<StoredDescriptors<'a>>,
    threshold: f32,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct RemoteMatch {
    id: i64,
    similarity: f32,
    #[serde(default)]
    match_count: usize,
}

/// `all_matches` 中的条目，旧版服务只返回原始分数
#[derive(Debug, Clone, Copy, Deserialize)]
struct RemoteCandidate {
    id: i64,
    #[serde(default)]
    similarity: Option<f32>,
    #[serde(default)]
    score: Option<f32>,
    #[serde(default)]
    match_count: usize,
}

#[derive(Deserialize)]
struct CompareResponse {
    success: bool,
    best_match: Option<RemoteMatch>,
    /// 逐条解析，单个条目格式不对不影响整个响应
    #[serde(default)]
    all_matches: Vec<serde_json::Value>,
    error: Option<String>,
}

/// 独立进程的 HTTP 视觉服务客户端
pub struct RemoteVisionService {
    base_url: String,
    client: reqwest::Client,
    distance_scale: f32,
}

impl RemoteVisionService {
    pub fn new(base_url: impl Into<String>, distance_scale: f32) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(OPERATION_TIMEOUT).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { base_url, client, distance_scale })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint)
    }

    async fn post<Req, Resp>(&self, endpoint: &str, body: &Req) -> reqwest::Result<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        self.client.post(self.url(endpoint)).json(body).send().await?.error_for_status()?.json().await
    }

    /// 远程服务直接返回 0~1 相似度，反推出与本地后端同一量纲的原始分数
    fn to_match_result(&self, m: &RemoteMatch) -> MatchResult {
        let similarity = m.similarity.clamp(0., 1.);
        MatchResult {
            score: (1. - similarity) * self.distance_scale,
            match_count: m.match_count,
            similarity,
            backend: BackendKind::Remote,
        }
    }

    /// 既没有相似度也没有分数的条目返回 `None`
    fn candidate_result(&self, c: &RemoteCandidate) -> Option<MatchResult> {
        match (c.similarity, c.score) {
            (Some(similarity), _) => Some(self.to_match_result(&RemoteMatch {
                id: c.id,
                similarity,
                match_count: c.match_count,
            })),
            (None, Some(score)) => Some(MatchResult {
                score,
                match_count: c.match_count,
                similarity: match c.match_count {
                    0 => 0.,
                    _ => self.similarity(score),
                },
                backend: BackendKind::Remote,
            }),
            (None, None) => None,
        }
    }
}

/// 远程服务运行在另一个进程中，只接受绝对路径
fn absolute_path(path: &Path) -> Result<PathBuf> {
    Ok(std::path::absolute(path)?)
}

/// 不请求服务时也要检查查询图片可读
async fn ensure_readable(path: &Path) -> Result<()> {
    let unreadable = |e: std::io::Error| {
        VisionError::Extraction(format!("failed to read {}: {}", path.display(), e))
    };
    let file = tokio::fs::File::open(path).await.map_err(unreadable)?;
    let meta = file.metadata().await.map_err(unreadable)?;
    if !meta.is_file() {
        return Err(VisionError::Extraction(format!("{} is not a file", path.display())));
    }
    Ok(())
}

#[async_trait]
impl FeatureBackend for RemoteVisionService {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    fn distance_scale(&self) -> f32 {
        self.distance_scale
    }

    async fn is_healthy(&self) -> bool {
        let result = self.client.get(self.url("health")).timeout(HEALTH_TIMEOUT).send().await;
        match result {
            Ok(resp) if resp.status() == reqwest::StatusCode::OK => true,
            Ok(resp) => {
                warn!("remote vision service health check returned {}", resp.status());
                false
            }
            Err(e) => {
                warn!("remote vision service health check failed: {}", e);
                false
            }
        }
    }

    async fn extract(&self, path: &Path) -> Result<Extraction> {
        let absolute = absolute_path(path)?;
        let image_path = absolute.to_string_lossy();
        debug!("remote: extracting features from {}", image_path);

        let resp: ExtractResponse = self
            .post("extract", &ExtractRequest { image_path: &image_path })
            .await
            .map_err(|e| VisionError::Extraction(e.to_string()))?;
        if !resp.success {
            let message = resp.error.unwrap_or_else(|| "unknown error".to_string());
            error!("remote: feature extraction failed: {}", message);
            return Err(VisionError::Extraction(message));
        }

        let mut extraction = Extraction::new(BackendKind::Remote, resp.descriptors);
        if let Some(feature_count) = resp.feature_count {
            extraction.feature_count = feature_count;
        }
        extraction.descriptors.validate().map_err(|e| VisionError::Extraction(e.to_string()))?;
        debug!("remote: extracted {} features", extraction.feature_count);
        Ok(extraction)
    }

    async fn match_descriptors(
        &self,
        query: &DescriptorSet,
        stored: &DescriptorSet,
    ) -> Result<MatchResult> {
        query.validate()?;
        stored.validate()?;
        let resp: MatchResponse = self
            .post("match", &MatchRequest { query_desc: &query.rows, stored_desc: &stored.rows })
            .await
            .map_err(|e| VisionError::Matching(e.to_string()))?;
        if !resp.success {
            return Err(VisionError::Matching(
                resp.error.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }

        let score = resp.score.unwrap_or(NO_MATCH_SCORE);
        Ok(MatchResult {
            score,
            match_count: resp.match_count,
            similarity: match resp.match_count {
                0 => 0.,
                _ => self.similarity(score),
            },
            backend: BackendKind::Remote,
        })
    }

    /// 由远程服务一次性完成查询图片的特征提取和比较
    async fn compare(
        &self,
        path: &Path,
        records: &[MediaRecord],
        min_similarity: f32,
        _fan_out: usize,
    ) -> Result<Comparison> {
        let mut failed = 0;
        let mut stored = vec![];
        for record in records {
            let Some(descriptors) = record.descriptors.as_ref().filter(|d| !d.is_empty()) else {
                continue;
            };
            // 不合法的描述符不发送，避免整个请求失败
            if let Err(e) = descriptors.validate().and(descriptors.ensure_comparable(self.kind())) {
                warn!("与媒体 {} 比较失败，已跳过: {}", record.id, e);
                failed += 1;
                continue;
            }
            stored.push(StoredDescriptors { id: record.id, descriptors: &descriptors.rows });
        }

        let absolute = absolute_path(path)?;
        if stored.is_empty() {
            ensure_readable(&absolute).await?;
            debug!("remote: no stored descriptors to compare against");
            let mut comparison = Comparison::empty(BackendKind::Remote, None);
            comparison.failed = failed;
            return Ok(comparison);
        }

        let query_image_path = absolute.to_string_lossy();
        debug!("remote: comparing {} against {} descriptors", query_image_path, stored.len());

        let request = CompareRequest {
            query_image_path: &query_image_path,
            stored_descriptors: stored,
            threshold: min_similarity.clamp(0., 1.),
        };
        let resp: CompareResponse = self
            .post("compare", &request)
            .await
            .map_err(|e| VisionError::Matching(e.to_string()))?;
        if !resp.success {
            return Err(VisionError::Matching(
                resp.error.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }

        let mut matches = vec![];
        for value in resp.all_matches {
            let result = serde_json::from_value::<RemoteCandidate>(value.clone())
                .ok()
                .and_then(|c| Some(CandidateMatch { id: c.id, result: self.candidate_result(&c)? }));
            match result {
                Some(m) => matches.push(m),
                None => debug!("remote: ignoring malformed comparison entry {}", value),
            }
        }
        if let Some(best) = resp.best_match {
            let result = self.to_match_result(&best);
            match matches.iter_mut().find(|m| m.id == best.id) {
                Some(m) => m.result = result,
                None => matches.push(CandidateMatch { id: best.id, result }),
            }
        }

        Ok(Comparison { backend: BackendKind::Remote, feature_count: None, matches, failed })
    }
}
