use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use clap::{Parser, Subcommand};
use directories::ProjectDirs;
use serde::Serialize;

use crate::cli::*;
use crate::descriptor::BackendKind;

static CONF_DIR: LazyLock<ConfDir> = LazyLock::new(|| {
    let path = ProjectDirs::from("", "scanmatch", "scanmatch")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".scanmatch"));
    ConfDir { path }
});

fn default_config_dir() -> String {
    CONF_DIR.path().to_string_lossy().to_string()
}

#[derive(Parser, Debug, Clone)]
pub struct OrbOptions {
    /// ORB 特征点最大保留数量
    #[arg(short = 'n', value_name = "N", long, default_value_t = 1000)]
    pub orb_nfeatures: u32,
    /// ORB 特征金字塔缩放因子
    #[arg(long, value_name = "SCALE", default_value_t = 1.2)]
    pub orb_scale_factor: f32,
    /// ORB 特征金字塔层数
    #[arg(long, value_name = "N", default_value_t = 8)]
    pub orb_nlevels: u32,
    /// ORB FAST 角点检测器阈值
    #[arg(long, value_name = "THRESHOLD", default_value_t = 20)]
    pub orb_fast_threshold: u32,
    /// 图片最长边的最大尺寸，超过时等比缩小
    #[arg(long, value_name = "PIXELS", default_value_t = 800)]
    pub max_dimension: u32,
}

impl Default for OrbOptions {
    fn default() -> Self {
        Self {
            orb_nfeatures: 1000,
            orb_scale_factor: 1.2,
            orb_nlevels: 8,
            orb_fast_threshold: 20,
            max_dimension: 800,
        }
    }
}

/// 单个后端的分数映射与阈值
///
/// 不同后端的原始距离量纲不同，先用 `distance_scale` 映射到 0~1 的相似度，再与阈值比较
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BackendTuning {
    /// 原始距离达到该值时相似度为 0
    pub distance_scale: f32,
    /// 相似度不低于该值时判定为重复
    pub duplicate_threshold: f32,
    /// 相似度不低于该值时判定为匹配
    pub match_threshold: f32,
}

#[derive(Parser, Debug, Clone)]
pub struct BackendOptions {
    /// 远程视觉服务地址
    #[arg(long, value_name = "URL", env = "VISION_SERVICE_URL", default_value = "http://127.0.0.1:5001")]
    pub remote_url: String,
    /// 不使用远程视觉服务
    #[arg(long)]
    pub no_remote: bool,
    /// 不加载本地视觉库
    #[arg(long)]
    pub no_native: bool,
    /// 远程服务原始距离的映射尺度
    #[arg(long, value_name = "DISTANCE", default_value_t = 100.)]
    pub remote_distance_scale: f32,
    /// 本地视觉库原始距离的映射尺度
    #[arg(long, value_name = "DISTANCE", default_value_t = 100.)]
    pub native_distance_scale: f32,
    /// 内容哈希兜底原始距离的映射尺度
    #[arg(long, value_name = "DISTANCE", default_value_t = 200.)]
    pub fallback_distance_scale: f32,
    /// 重复判定的相似度阈值，范围 0~1
    #[arg(long, value_name = "SIMILARITY", default_value_t = 0.5, value_parser = parse_unit)]
    pub duplicate_threshold: f32,
    /// 匹配判定的相似度阈值，范围 0~1
    #[arg(long, value_name = "SIMILARITY", default_value_t = 0.4, value_parser = parse_unit)]
    pub match_threshold: f32,
    /// 同时进行的描述符比较数量，默认为 CPU 核心数
    #[arg(long, value_name = "N")]
    pub fan_out: Option<usize>,
    #[command(flatten)]
    pub orb: OrbOptions,
}

impl BackendOptions {
    pub fn tuning(&self, kind: BackendKind) -> BackendTuning {
        let distance_scale = match kind {
            BackendKind::Remote => self.remote_distance_scale,
            BackendKind::Native => self.native_distance_scale,
            BackendKind::Fallback => self.fallback_distance_scale,
        };
        BackendTuning {
            distance_scale,
            duplicate_threshold: self.duplicate_threshold,
            match_threshold: self.match_threshold,
        }
    }

    pub fn fan_out(&self) -> usize {
        self.fan_out.unwrap_or_else(num_cpus::get).max(1)
    }
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            remote_url: "http://127.0.0.1:5001".to_string(),
            no_remote: false,
            no_native: false,
            remote_distance_scale: 100.,
            native_distance_scale: 100.,
            fallback_distance_scale: 200.,
            duplicate_threshold: 0.5,
            match_threshold: 0.4,
            fan_out: None,
            orb: OrbOptions::default(),
        }
    }
}

#[derive(Parser, Debug, Clone)]
pub struct ScreeningOptions {
    /// 感知哈希尺寸，必须为偶数
    #[arg(long, value_name = "SIZE", default_value_t = 8)]
    pub phash_size: u32,
    /// 感知哈希距离不超过该值时视为非常相似
    #[arg(long, value_name = "DISTANCE", default_value_t = 2)]
    pub phash_threshold: u32,
    /// 上传时特征描述符的重复阈值，比普通查重更严格
    #[arg(long, value_name = "SIMILARITY", default_value_t = 0.7, value_parser = parse_unit)]
    pub descriptor_threshold: f32,
}

impl Default for ScreeningOptions {
    fn default() -> Self {
        Self { phash_size: 8, phash_threshold: 2, descriptor_threshold: 0.7 }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "scanmatch", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    /// scanmatch 配置文件目录
    #[arg(short, long, global = true, default_value_t = default_config_dir())]
    pub conf_dir: String,
    #[command(flatten)]
    pub backend: BackendOptions,
}

impl Opts {
    pub fn conf_dir(&self) -> ConfDir {
        ConfDir::from_str(&self.conf_dir).unwrap_or_else(|e| match e {})
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 检查并添加扫描图到媒体目录
    Add(AddCommand),
    /// 检查扫描图是否与已有媒体重复
    Check(CheckCommand),
    /// 查找与拍摄画面匹配的媒体
    Match(MatchCommand),
    /// 计算或比较感知哈希
    Hash(HashCommand),
    /// 显示后端状态与缓存信息
    Info(InfoCommand),
    /// 从媒体目录中删除记录
    Remove(RemoveCommand),
}

#[derive(Debug, Clone)]
pub struct ConfDir {
    path: PathBuf,
}

impl ConfDir {
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// 返回数据库文件的路径
    pub fn database(&self) -> PathBuf {
        self.path.join("scanmatch.db")
    }
}

impl FromStr for ConfDir {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self { path: PathBuf::from(s) })
    }
}

pub(crate) fn parse_unit(s: &str) -> Result<f32, String> {
    let value: f32 = s.parse().map_err(|e| format!("无效的数值 {}: {}", s, e))?;
    if !(0. ..=1.).contains(&value) {
        return Err(format!("阈值必须在 0~1 之间: {}", s));
    }
    Ok(value)
}
