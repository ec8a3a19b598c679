use clap::Parser;
use scanmatch::Opts;
use scanmatch::cli::SubCommandExtend;
use scanmatch::config::SubCommand;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let opts = Opts::parse();

    match &opts.subcmd {
        SubCommand::Add(config) => config.run(&opts).await,
        SubCommand::Check(config) => config.run(&opts).await,
        SubCommand::Match(config) => config.run(&opts).await,
        SubCommand::Hash(config) => config.run(&opts).await,
        SubCommand::Info(config) => config.run(&opts).await,
        SubCommand::Remove(config) => config.run(&opts).await,
    }
}
