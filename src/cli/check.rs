use std::path::PathBuf;

use clap::Parser;

use super::{open_catalog, open_orchestrator};
use crate::catalog::MediaCatalog;
use crate::cli::SubCommandExtend;
use crate::config::{Opts, parse_unit};
use crate::utils::OutputFormat;
use crate::workflow::DuplicateVerdict;

#[derive(Parser, Debug, Clone)]
pub struct CheckCommand {
    /// 待检查的扫描图
    pub image: PathBuf,
    /// 重复判定的相似度阈值，默认使用当前后端的配置
    #[arg(long, value_name = "SIMILARITY", value_parser = parse_unit)]
    pub threshold: Option<f32>,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", default_value = "table")]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for CheckCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let catalog = open_catalog(opts).await?;
        let orchestrator = open_orchestrator(opts)?;
        let records = catalog.find_all_with_descriptors().await?;
        let verdict =
            orchestrator.check_for_duplicates(&self.image, &records, self.threshold).await?;
        print_verdict(&verdict, self.output_format)
    }
}

fn print_verdict(verdict: &DuplicateVerdict, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(verdict)?),
        OutputFormat::Table => match (&verdict.matched, verdict.is_duplicate) {
            (Some(m), true) => {
                println!("duplicate\t{:.2}\t{}\t{}", verdict.similarity, m.id, m.title)
            }
            (Some(m), false) => {
                println!("unique\t{:.2}\t{}\t{}", verdict.similarity, m.id, m.title)
            }
            (None, _) => println!("unique"),
        },
    }
    Ok(())
}
