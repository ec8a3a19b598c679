use std::path::{Path, PathBuf};

use anyhow::anyhow;
use clap::Parser;
use indicatif::ProgressBar;
use log::info;

use super::{open_catalog, open_orchestrator};
use crate::cli::SubCommandExtend;
use crate::config::{Opts, ScreeningOptions};
use crate::upload::{DuplicateRejection, UploadScreener};
use crate::utils::{pb_style, scan_images, suffix_regex};

#[derive(Parser, Debug, Clone)]
pub struct AddCommand {
    #[command(flatten)]
    pub screening: ScreeningOptions,
    /// 扫描图路径，也可以是目录
    pub path: PathBuf,
    /// 媒体标题，默认使用文件名；添加目录时忽略
    #[arg(short, long)]
    pub title: Option<String>,
    /// 扫描的文件后缀名，多个后缀用逗号分隔
    #[arg(short, long, default_value = "jpg,png")]
    pub suffix: String,
}

impl SubCommandExtend for AddCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let re_suf = suffix_regex(&self.suffix)?;
        let catalog = open_catalog(opts).await?;
        let orchestrator = open_orchestrator(opts)?;
        let screener = UploadScreener::new(&orchestrator, self.screening.clone());

        if self.path.is_file() {
            let title = self.title.clone().unwrap_or_else(|| default_title(&self.path));
            return match screener.admit(&self.path, &title, &catalog).await? {
                Ok(id) => {
                    println!("[OK] Add {} {}", id, self.path.display());
                    Ok(())
                }
                Err(rejection) => {
                    println!("{}", rejection_line(&self.path, &rejection));
                    Ok(())
                }
            };
        }
        if !self.path.is_dir() {
            return Err(anyhow!("路径不存在: {}", self.path.display()));
        }

        info!("开始扫描目录: {}", self.path.display());
        let entries = scan_images(&self.path, &re_suf);
        info!("扫描完成，共 {} 张图片", entries.len());

        let pb = ProgressBar::new(entries.len() as u64).with_style(pb_style());
        let (mut added, mut rejected) = (0, 0);
        for entry in entries {
            match screener.admit(&entry, &default_title(&entry), &catalog).await {
                Ok(Ok(id)) => {
                    added += 1;
                    pb.set_message(format!("{} {}", id, entry.display()));
                }
                Ok(Err(rejection)) => {
                    rejected += 1;
                    pb.println(rejection_line(&entry, &rejection));
                }
                Err(e) => pb.println(format!("[ERR] {}: {}", entry.display(), e)),
            }
            pb.inc(1);
        }
        pb.finish_with_message(format!("添加 {} 张，重复 {} 张", added, rejected));

        Ok(())
    }
}

fn default_title(path: &Path) -> String {
    path.file_stem().unwrap_or(path.as_os_str()).to_string_lossy().to_string()
}

fn rejection_line(path: &Path, rejection: &DuplicateRejection) -> String {
    format!(
        "[DUP] {}: {} ({}) {:.2} {:?}",
        path.display(),
        rejection.title,
        rejection.id,
        rejection.similarity,
        rejection.kind
    )
}
