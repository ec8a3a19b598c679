use std::path::{Path, PathBuf};

use clap::ValueEnum;
use indicatif::ProgressStyle;
use regex::Regex;
use walkdir::WalkDir;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Table,
}

pub fn pb_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

/// 由逗号分隔的后缀名列表构造忽略大小写的正则
pub fn suffix_regex(suffix: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^(?i)({})$", suffix.replace(',', "|")))
}

/// 如果 `path` 是文件则直接返回，否则递归扫描目录中后缀匹配的文件
pub fn scan_images(path: &Path, re_suf: &Regex) -> Vec<PathBuf> {
    if path.is_file() {
        return vec![path.to_path_buf()];
    }
    let mut entries = WalkDir::new(path)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.is_file()
                && path.extension().is_some_and(|ext| re_suf.is_match(&ext.to_string_lossy()))
        })
        .collect::<Vec<_>>();
    entries.sort();
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_images() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        for name in ["a.JPG", "b.png", "c.txt", "sub/d.jpg", "e.jpeg"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }

        let re = suffix_regex("jpg,png").unwrap();
        let found = scan_images(dir.path(), &re);
        let names = found
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().replace('\\', "/"))
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["a.JPG", "b.png", "sub/d.jpg"]);

        let single = dir.path().join("c.txt");
        assert_eq!(scan_images(&single, &re), vec![single]);
    }
}
