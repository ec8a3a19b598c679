pub mod backend;
pub mod cache;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod hamming;
pub mod matcher;
pub mod metrics;
pub mod orchestrator;
pub mod phash;
pub mod upload;
pub mod utils;
pub mod workflow;

pub use config::Opts;
pub use error::{Result, VisionError};
pub use orchestrator::BackendOrchestrator;
pub use phash::PerceptualHashService;
pub use upload::UploadScreener;
