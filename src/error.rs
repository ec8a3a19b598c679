use thiserror::Error;

use crate::descriptor::BackendKind;

#[derive(Error, Debug)]
pub enum VisionError {
    /// 图片无法读取、已损坏，或后端不可达
    #[error("feature extraction failed: {0}")]
    Extraction(String),

    /// 描述符形状不合法，或后端匹配调用出错
    #[error("feature matching failed: {0}")]
    Matching(String),

    #[error("no feature backend is available, please try again later")]
    BackendUnavailable,

    #[error("descriptors produced by {stored} cannot be compared on {active}")]
    IncomparableBackends { stored: BackendKind, active: BackendKind },

    #[error("invalid perceptual hash: {0:?}")]
    InvalidHash(String),

    #[error("perceptual hash length mismatch: {0} vs {1}")]
    HashLengthMismatch(usize, usize),

    #[error("perceptual hash size must be an even number >= 2, got {0}")]
    InvalidHashSize(u32),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Catalog error: {0}")]
    Catalog(#[from] sqlx::Error),

    #[error("Catalog migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, VisionError>;
