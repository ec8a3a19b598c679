use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VisionError};

/// 特征后端标识，按优先级从高到低排列
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// 独立进程的 HTTP 视觉服务
    Remote,
    /// 进程内 OpenCV ORB
    Native,
    /// 文件内容哈希兜底
    Fallback,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Remote => "remote",
            Self::Native => "native",
            Self::Fallback => "fallback",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一组描述符，每行是一个定长字节向量
///
/// 不同后端产生的描述符形状相同，但彼此之间没有可比性，因此持久化时会带上产生它的后端。
/// 旧数据只有裸的二维数组，反序列化后 `backend` 为 `None`。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "DescriptorSetRepr")]
pub struct DescriptorSet {
    pub backend: Option<BackendKind>,
    pub rows: Vec<Vec<u8>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DescriptorSetRepr {
    Tagged { backend: Option<BackendKind>, rows: Vec<Vec<u8>> },
    Legacy(Vec<Vec<u8>>),
}

impl From<DescriptorSetRepr> for DescriptorSet {
    fn from(repr: DescriptorSetRepr) -> Self {
        match repr {
            DescriptorSetRepr::Tagged { backend, rows } => Self { backend, rows },
            DescriptorSetRepr::Legacy(rows) => Self { backend: None, rows },
        }
    }
}

impl DescriptorSet {
    pub fn new(backend: BackendKind, rows: Vec<Vec<u8>>) -> Self {
        Self { backend: Some(backend), rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 每行的宽度，空集合返回 `None`
    pub fn width(&self) -> Option<usize> {
        self.rows.first().map(Vec::len)
    }

    /// 检查所有行非空且等宽
    pub fn validate(&self) -> Result<()> {
        let Some(width) = self.width() else {
            return Ok(());
        };
        if width == 0 {
            return Err(VisionError::Matching("descriptor rows must not be empty".into()));
        }
        if let Some((i, row)) = self.rows.iter().enumerate().find(|(_, row)| row.len() != width) {
            return Err(VisionError::Matching(format!(
                "descriptor row {} has width {}, expected {}",
                i,
                row.len(),
                width
            )));
        }
        Ok(())
    }

    /// 检查存储的描述符能否与 `active` 后端产生的查询描述符比较
    ///
    /// 未标记后端的旧数据放行
    pub fn ensure_comparable(&self, active: BackendKind) -> Result<()> {
        match self.backend {
            Some(stored) if stored != active => {
                Err(VisionError::IncomparableBackends { stored, active })
            }
            _ => Ok(()),
        }
    }
}

/// 单张图片的特征提取结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Extraction {
    pub descriptors: DescriptorSet,
    pub feature_count: usize,
}

impl Extraction {
    pub fn new(backend: BackendKind, rows: Vec<Vec<u8>>) -> Self {
        let feature_count = rows.len();
        Self { descriptors: DescriptorSet::new(backend, rows), feature_count }
    }

    pub fn backend(&self) -> Option<BackendKind> {
        self.descriptors.backend
    }
}
