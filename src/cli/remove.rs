use anyhow::anyhow;
use clap::Parser;

use super::open_catalog;
use crate::catalog::MediaCatalog;
use crate::cli::SubCommandExtend;
use crate::config::Opts;

#[derive(Parser, Debug, Clone)]
pub struct RemoveCommand {
    /// 媒体 ID
    pub id: i64,
}

impl SubCommandExtend for RemoveCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let catalog = open_catalog(opts).await?;
        if !catalog.delete(self.id).await? {
            return Err(anyhow!("媒体不存在: {}", self.id));
        }
        println!("[OK] Remove {}", self.id);
        Ok(())
    }
}
