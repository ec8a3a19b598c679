use std::path::Path;

use async_trait::async_trait;
use log::debug;

use super::FeatureBackend;
use crate::descriptor::{BackendKind, DescriptorSet, Extraction};
use crate::error::{Result, VisionError};
use crate::matcher::{self, MatchResult};

/// 合成描述符的行数
pub const FALLBACK_ROWS: usize = 100;
/// 合成描述符的行宽
pub const FALLBACK_WIDTH: usize = 8;

/// 基于文件内容哈希的兜底后端，始终可用
///
/// 它把文件字节的 blake3 摘要展开成固定形状的描述符，只是为了复用同一套匹配代码。
/// 只能可靠地识别逐字节相同的文件：重新编码、缩放或裁剪后的图片都会被认为完全不同。
/// 这是正确性的下限，不是相似度检测器。
pub struct ContentHashFallback {
    distance_scale: f32,
}

impl ContentHashFallback {
    pub fn new(distance_scale: f32) -> Self {
        Self { distance_scale }
    }

    /// 将 32 字节摘要展开为 [`FALLBACK_ROWS`] 行，第 `i` 行为 `(digest[i % 32] + i) mod 256`
    pub fn descriptors_from_bytes(data: &[u8]) -> Vec<Vec<u8>> {
        let digest = blake3::hash(data);
        let digest = digest.as_bytes();
        (0..FALLBACK_ROWS)
            .map(|i| {
                let value = digest[i % digest.len()].wrapping_add(i as u8);
                vec![value; FALLBACK_WIDTH]
            })
            .collect()
    }
}

#[async_trait]
impl FeatureBackend for ContentHashFallback {
    fn kind(&self) -> BackendKind {
        BackendKind::Fallback
    }

    fn distance_scale(&self) -> f32 {
        self.distance_scale
    }

    async fn is_healthy(&self) -> bool {
        true
    }

    async fn extract(&self, path: &Path) -> Result<Extraction> {
        let data = tokio::fs::read(path).await.map_err(|e| {
            VisionError::Extraction(format!("failed to read {}: {}", path.display(), e))
        })?;
        debug!("fallback: hashed {} bytes from {}", data.len(), path.display());
        Ok(Extraction::new(BackendKind::Fallback, Self::descriptors_from_bytes(&data)))
    }

    async fn match_descriptors(
        &self,
        query: &DescriptorSet,
        stored: &DescriptorSet,
    ) -> Result<MatchResult> {
        query.validate()?;
        stored.validate()?;
        let (score, match_count) = matcher::positional_l1(query, stored);
        Ok(MatchResult {
            score,
            match_count,
            similarity: match match_count {
                0 => 0.,
                _ => self.similarity(score),
            },
            backend: BackendKind::Fallback,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_temp(data: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(data).unwrap();
        file
    }

    #[tokio::test]
    async fn test_extract_is_deterministic() {
        let backend = ContentHashFallback::new(200.);
        let a = write_temp(b"marker image bytes");
        let b = write_temp(b"marker image bytes");

        let ea = backend.extract(a.path()).await.unwrap();
        let eb = backend.extract(b.path()).await.unwrap();
        assert_eq!(ea, eb);
        assert_eq!(ea.feature_count, FALLBACK_ROWS);
        assert_eq!(ea.descriptors.width(), Some(FALLBACK_WIDTH));
        assert_eq!(ea.backend(), Some(BackendKind::Fallback));
    }

    #[tokio::test]
    async fn test_identical_files_match_exactly() {
        let backend = ContentHashFallback::new(200.);
        let a = write_temp(b"same");
        let q = backend.extract(a.path()).await.unwrap();
        let r = backend.match_descriptors(&q.descriptors, &q.descriptors).await.unwrap();
        assert_eq!(r.score, 0.);
        assert_eq!(r.match_count, FALLBACK_ROWS);
        assert_eq!(r.similarity, 1.);
    }

    #[tokio::test]
    async fn test_different_files_differ() {
        let backend = ContentHashFallback::new(200.);
        let a = backend.extract(write_temp(b"first").path()).await.unwrap();
        let b = backend.extract(write_temp(b"second").path()).await.unwrap();
        let r = backend.match_descriptors(&a.descriptors, &b.descriptors).await.unwrap();
        assert!(r.score > 0.);
        assert!(r.similarity < 1.);
    }

    #[tokio::test]
    async fn test_missing_file() {
        let backend = ContentHashFallback::new(200.);
        let err = backend.extract(Path::new("/nonexistent/marker.png")).await.unwrap_err();
        assert!(matches!(err, VisionError::Extraction(_)));
    }

    #[tokio::test]
    async fn test_ragged_stored_descriptors_rejected() {
        let backend = ContentHashFallback::new(200.);
        let q = DescriptorSet::new(BackendKind::Fallback, vec![vec![0; 8]]);
        let s = DescriptorSet::new(BackendKind::Fallback, vec![vec![0; 8], vec![0; 3]]);
        assert!(backend.match_descriptors(&q, &s).await.is_err());
    }
}
