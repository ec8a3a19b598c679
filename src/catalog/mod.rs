mod memory;
mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use self::memory::*;
pub use self::sqlite::*;
use crate::descriptor::DescriptorSet;
use crate::error::Result;

/// 媒体记录中与图像匹配相关的字段
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRecord {
    /// 媒体 ID
    pub id: i64,
    /// 标题，用于向用户提示冲突的媒体
    pub title: String,
    /// 扫描图的特征描述符
    pub descriptors: Option<DescriptorSet>,
    /// 扫描图的感知哈希
    pub perceptual_hash: Option<String>,
}

/// 上传扫描图时计算、随记录一起持久化的指纹
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fingerprints {
    pub descriptors: DescriptorSet,
    pub perceptual_hash: Option<String>,
}

/// 媒体目录
///
/// 指纹只在创建记录或替换扫描图时写入，删除记录时一并删除
#[async_trait]
pub trait MediaCatalog: Send + Sync {
    /// 所有带描述符的记录
    async fn find_all_with_descriptors(&self) -> Result<Vec<MediaRecord>>;

    /// 所有带感知哈希的记录
    async fn find_all_with_perceptual_hash(&self) -> Result<Vec<MediaRecord>>;

    /// 新增一条记录，返回其 ID
    async fn insert(&self, title: &str, fingerprints: &Fingerprints) -> Result<i64>;

    /// 替换扫描图后更新指纹，记录不存在时返回 `false`
    async fn replace_fingerprints(&self, id: i64, fingerprints: &Fingerprints) -> Result<bool>;

    /// 删除记录，记录不存在时返回 `false`
    async fn delete(&self, id: i64) -> Result<bool>;
}
