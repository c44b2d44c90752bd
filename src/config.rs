use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use clap::{Parser, Subcommand, ValueEnum};
use directories::ProjectDirs;

use crate::cli::*;
use crate::face::Backend;

static CONF_DIR: LazyLock<ConfDir> = LazyLock::new(|| {
    let path = ProjectDirs::from("", "facesearch", "facesearch")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."));
    ConfDir { path }
});

fn default_config_dir() -> &'static str {
    CONF_DIR.path().to_str().unwrap_or(".")
}

#[derive(Parser, Debug, Clone)]
pub struct ExtractorOptions {
    /// 模型目录，默认为配置目录下的 models
    #[arg(long, value_name = "DIR")]
    pub models_dir: Option<PathBuf>,
    /// /detect 使用的人脸检测模型
    #[arg(long, value_enum, value_name = "BACKEND", default_value_t = Backend::Fast)]
    pub detect_backend: Backend,
    /// 提取特征时使用的人脸检测模型
    #[arg(long, value_enum, value_name = "BACKEND", default_value_t = Backend::Accurate)]
    pub embed_backend: Backend,
    /// ArcFace 模型文件名
    #[arg(long, value_name = "FILE", default_value = "w600k_r50.onnx")]
    pub recognizer_model: String,
    /// 特征向量维度
    #[arg(long, value_name = "N", default_value_t = 512)]
    pub dimension: usize,
    /// 人脸检测置信度阈值
    #[arg(long, value_name = "SCORE", default_value_t = 0.5)]
    pub confidence: f32,
    /// 每个模型的推理线程数
    #[arg(long, value_name = "N", default_value_t = 2)]
    pub threads: usize,
}

impl ExtractorOptions {
    pub fn models_dir(&self, conf_dir: &ConfDir) -> PathBuf {
        self.models_dir.clone().unwrap_or_else(|| conf_dir.models())
    }
}

impl Default for ExtractorOptions {
    fn default() -> Self {
        Self {
            models_dir: None,
            detect_backend: Backend::Fast,
            embed_backend: Backend::Accurate,
            recognizer_model: "w600k_r50.onnx".to_string(),
            dimension: 512,
            confidence: 0.5,
            threads: 2,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    /// Qdrant 向量数据库
    Qdrant,
    /// 进程内索引，重启后丢失
    Memory,
}

#[derive(Parser, Debug, Clone)]
pub struct IndexOptions {
    /// 向量索引类型
    #[arg(long, value_enum, default_value_t = IndexKind::Qdrant)]
    pub index: IndexKind,
    /// Qdrant 服务地址
    #[arg(long, value_name = "URL", default_value = "http://localhost:6333")]
    pub qdrant_url: String,
    /// Qdrant collection 名称
    #[arg(long, value_name = "NAME", default_value = "faces")]
    pub collection: String,
    /// Qdrant 请求超时，单位为秒
    #[arg(long, value_name = "SECS", default_value_t = 10)]
    pub timeout: u64,
    /// 识别结果的最低相似度，低于该值视为没有匹配
    #[arg(long, value_name = "SCORE")]
    pub min_score: Option<f32>,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            index: IndexKind::Qdrant,
            qdrant_url: "http://localhost:6333".to_string(),
            collection: "faces".to_string(),
            timeout: 10,
            min_score: None,
        }
    }
}

#[derive(Parser, Debug, Clone, Default)]
pub struct ArtifactOptions {
    /// 上传图片的临时目录，默认为系统临时目录下的 facesearch
    #[arg(long, value_name = "DIR")]
    pub artifact_dir: Option<PathBuf>,
}

impl ArtifactOptions {
    pub fn dir(&self) -> PathBuf {
        self.artifact_dir.clone().unwrap_or_else(|| std::env::temp_dir().join("facesearch"))
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "facesearch", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    /// facesearch 配置文件目录
    #[arg(short, long, default_value = default_config_dir())]
    pub conf_dir: ConfDir,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 启动 HTTP 服务
    Server(ServerCommand),
    /// 在 Qdrant 中创建 collection
    Init(InitCommand),
    /// 检测图片中的人脸
    Detect(DetectCommand),
    /// 提取图片中第一张人脸的特征向量
    Encode(EncodeCommand),
}

#[derive(Debug, Clone)]
pub struct ConfDir {
    path: PathBuf,
}

impl ConfDir {
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// 返回默认的模型目录
    pub fn models(&self) -> PathBuf {
        self.path.join("models")
    }
}

impl FromStr for ConfDir {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self { path: PathBuf::from(s) })
    }
}
