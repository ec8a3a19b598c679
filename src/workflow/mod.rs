mod duplicate;
mod media;

use std::fmt;

use serde::Serialize;

pub use self::duplicate::*;
pub use self::media::*;
use crate::catalog::MediaRecord;

/// 结果中引用的媒体
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaRef {
    pub id: i64,
    pub title: String,
}

impl MediaRef {
    /// 在记录中按 ID 查找，找不到时标题为空
    fn lookup(records: &[MediaRecord], id: i64) -> Self {
        let title = records
            .iter()
            .find(|r| r.id == id)
            .map(|r| r.title.clone())
            .unwrap_or_default();
        Self { id, title }
    }
}

/// 相似度分档
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum SimilarityTier {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl SimilarityTier {
    pub fn from_similarity(similarity: f32) -> Self {
        if similarity >= 0.8 {
            Self::VeryHigh
        } else if similarity >= 0.6 {
            Self::High
        } else if similarity >= 0.4 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl fmt::Display for SimilarityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::VeryHigh => "Very High",
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        })
    }
}
