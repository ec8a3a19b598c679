mod add;
mod check;
mod hash;
mod info;
mod r#match;
mod remove;

pub use add::*;
pub use check::*;
pub use hash::*;
pub use info::*;
pub use r#match::*;
pub use remove::*;

use crate::catalog::SqliteCatalog;
use crate::config::Opts;
use crate::orchestrator::BackendOrchestrator;

pub trait SubCommandExtend {
    fn run(&self, opts: &Opts) -> impl std::future::Future<Output = anyhow::Result<()>> + Send;
}

/// 打开配置目录下的媒体数据库，目录不存在时创建
async fn open_catalog(opts: &Opts) -> anyhow::Result<SqliteCatalog> {
    let conf_dir = opts.conf_dir();
    tokio::fs::create_dir_all(conf_dir.path()).await?;
    Ok(SqliteCatalog::open(conf_dir.database()).await?)
}

fn open_orchestrator(opts: &Opts) -> anyhow::Result<BackendOrchestrator> {
    Ok(BackendOrchestrator::from_options(&opts.backend)?)
}
