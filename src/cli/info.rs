use clap::Parser;
use log::warn;
use serde_json::json;

use super::{open_catalog, open_orchestrator};
use crate::catalog::MediaCatalog;
use crate::cli::SubCommandExtend;
use crate::config::Opts;
use crate::metrics;

#[derive(Parser, Debug, Clone)]
pub struct InfoCommand {
    /// 同时输出 Prometheus 指标
    #[arg(long)]
    pub metrics: bool,
}

impl SubCommandExtend for InfoCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let catalog = open_catalog(opts).await?;
        let orchestrator = open_orchestrator(opts)?;
        if let Err(e) = orchestrator.probe().await {
            warn!("{}", e);
        }

        let info = orchestrator.service_info().await;
        let cache = orchestrator.cache_stats().await;
        let output = json!({
            "service": info,
            "cache": cache,
            "catalog": {
                "with_descriptors": catalog.find_all_with_descriptors().await?.len(),
                "with_perceptual_hash": catalog.find_all_with_perceptual_hash().await?.len(),
            },
        });
        println!("{}", serde_json::to_string_pretty(&output)?);

        if self.metrics {
            print!("{}", metrics::gather_text());
        }
        Ok(())
    }
}
