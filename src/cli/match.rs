use std::path::PathBuf;

use clap::Parser;

use super::{open_catalog, open_orchestrator};
use crate::catalog::MediaCatalog;
use crate::cli::SubCommandExtend;
use crate::config::{Opts, parse_unit};
use crate::utils::OutputFormat;
use crate::workflow::MediaMatch;

#[derive(Parser, Debug, Clone)]
pub struct MatchCommand {
    /// 拍摄的画面
    pub image: PathBuf,
    /// 匹配的相似度阈值，默认使用当前后端的配置
    #[arg(long, value_name = "SIMILARITY", value_parser = parse_unit)]
    pub threshold: Option<f32>,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", default_value = "table")]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for MatchCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let catalog = open_catalog(opts).await?;
        let orchestrator = open_orchestrator(opts)?;
        let records = catalog.find_all_with_descriptors().await?;
        let result =
            orchestrator.find_matching_media(&self.image, &records, self.threshold).await?;
        print_result(&result, self.output_format)
    }
}

fn print_result(result: &MediaMatch, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(result)?),
        OutputFormat::Table => match &result.matched {
            Some(m) => println!("{:.2}\t{}\t{}\t{}", m.similarity, m.tier, m.media.id, m.media.title),
            None => println!("no match"),
        },
    }
    Ok(())
}
