use std::path::PathBuf;

use clap::Parser;

use crate::cli::SubCommandExtend;
use crate::config::Opts;
use crate::phash::{DEFAULT_HASH_SIZE, PerceptualHashService};

#[derive(Parser, Debug, Clone)]
pub struct HashCommand {
    /// 图片路径
    pub image: PathBuf,
    /// 哈希尺寸，必须为偶数
    #[arg(long, default_value_t = DEFAULT_HASH_SIZE)]
    pub size: u32,
    /// 与另一个哈希或图片比较
    #[arg(long, value_name = "HASH_OR_IMAGE")]
    pub compare: Option<String>,
}

impl SubCommandExtend for HashCommand {
    async fn run(&self, _opts: &Opts) -> anyhow::Result<()> {
        let hash = PerceptualHashService::generate_hash_async(&self.image, self.size).await?;
        println!("{}", hash);

        let Some(other) = &self.compare else {
            return Ok(());
        };
        let other = match PerceptualHashService::normalize_hash(other) {
            Some(other) => other,
            None => PerceptualHashService::generate_hash_async(other, self.size).await?,
        };
        let distance = PerceptualHashService::hamming_distance(&hash, &other)?;
        println!("{}\t{}", distance, PerceptualHashService::similarity_description(distance));
        Ok(())
    }
}
