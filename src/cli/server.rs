use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use log::{error, info, warn};
use prometheus::{BasicAuthentication, labels};
use tokio::net::TcpListener;
use tokio::task::spawn_blocking;
use tokio::time::{Duration, sleep};

use crate::artifact::ArtifactStore;
use crate::cli::SubCommandExtend;
use crate::config::{ArtifactOptions, ExtractorOptions, IndexKind, IndexOptions};
use crate::extractor::FeatureExtractor;
use crate::face::OnnxAnalyzer;
use crate::index::{IndexBackend, MemoryIndex, QdrantIndex, VectorIndex};
use crate::pipeline::{Pipeline, PipelineOptions};
use crate::{Opts, server};

#[derive(Parser, Debug, Clone)]
pub struct ServerCommand {
    #[command(flatten)]
    pub extractor: ExtractorOptions,
    #[command(flatten)]
    pub index: IndexOptions,
    #[command(flatten)]
    pub artifact: ArtifactOptions,
    /// 监听地址
    #[arg(long, default_value = "127.0.0.1:8000")]
    pub addr: String,
    /// 上传大小限制，单位为 MiB
    #[arg(long, value_name = "MIB", default_value_t = 10)]
    pub body_limit: usize,
    /// prometheus 主动推送地址
    #[arg(long, value_name = "URL")]
    pub prometheus_push: Option<String>,
    /// 自定义 instance 标签值
    #[arg(long, value_name = "NAME")]
    pub prometheus_instance: Option<String>,
    /// prometheus 认证信息，格式为 username:password
    #[arg(long, value_name = "AUTH")]
    pub prometheus_auth: Option<PushAuth>,
}

/// prometheus 推送的认证信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushAuth {
    pub username: String,
    pub password: String,
}

impl FromStr for PushAuth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((username, password)) => {
                Ok(Self { username: username.to_string(), password: password.to_string() })
            }
            None => Err("expected username:password".to_string()),
        }
    }
}

/// 按配置打开向量索引
pub async fn open_index(opts: &IndexOptions, dimension: usize) -> anyhow::Result<IndexBackend> {
    let index = match opts.index {
        IndexKind::Qdrant => IndexBackend::Qdrant(QdrantIndex::connect(opts).await?),
        IndexKind::Memory => {
            info!("使用进程内索引，重启后数据会丢失");
            IndexBackend::Memory(MemoryIndex::new(dimension))
        }
    };
    if index.dimension() != dimension {
        warn!(
            "索引维度 {} 与特征维度 {dimension} 不一致，录入与识别都会失败",
            index.dimension()
        );
    }
    Ok(index)
}

impl SubCommandExtend for ServerCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let models_dir = self.extractor.models_dir(&opts.conf_dir);
        info!("模型目录: {}", models_dir.display());
        let analyzer = OnnxAnalyzer::new(models_dir, self.extractor.clone());
        analyzer.preload(&[self.extractor.detect_backend, self.extractor.embed_backend])?;

        let index = open_index(&self.index, self.extractor.dimension).await?;

        let artifact_dir = self.artifact.dir();
        let store = ArtifactStore::open(&artifact_dir)
            .with_context(|| format!("无法创建临时目录 {}", artifact_dir.display()))?;
        info!("临时目录: {}", artifact_dir.display());

        let pipeline = Pipeline::new(
            store,
            FeatureExtractor::new(Arc::new(analyzer)),
            index,
            PipelineOptions {
                detect_backend: self.extractor.detect_backend,
                embed_backend: self.extractor.embed_backend,
                min_score: self.index.min_score,
            },
        );

        // 创建应用状态
        let state = server::AppState::new(pipeline, self.body_limit * 1024 * 1024);

        // 创建应用
        let app = server::create_app(state);

        if let Some(url) = self.prometheus_push.clone() {
            let instance = self.prometheus_instance.clone().unwrap_or_else(|| self.addr.clone());
            let auth = self.prometheus_auth.clone();
            tokio::spawn(async move {
                loop {
                    let metric_families = prometheus::gather();
                    let url = url.clone();
                    let instance = instance.clone();
                    let auth = auth.clone();
                    let r = spawn_blocking(move || {
                        prometheus::push_metrics(
                            "facesearch",
                            labels! {
                                "instance".to_string() => instance,
                            },
                            &url,
                            metric_families,
                            auth.map(|PushAuth { username, password }| BasicAuthentication {
                                username,
                                password,
                            }),
                        )
                    })
                    .await;
                    match r {
                        Ok(Err(e)) => error!("推送指标失败: {e}"),
                        Err(e) => error!("推送任务异常退出: {e}"),
                        Ok(Ok(())) => {}
                    }
                    sleep(Duration::from_secs(30)).await;
                }
            });
        }

        // 启动服务器
        info!("服务器启动：http://{}", &self.addr);
        let listener = TcpListener::bind(&self.addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_push_auth() {
        let auth: PushAuth = "user:p:ss".parse().unwrap();
        assert_eq!(auth, PushAuth { username: "user".into(), password: "p:ss".into() });
        assert!("nocolon".parse::<PushAuth>().is_err());
    }

    #[tokio::test]
    async fn memory_index_uses_extractor_dimension() {
        let opts = IndexOptions { index: IndexKind::Memory, ..Default::default() };
        let index = open_index(&opts, 128).await.unwrap();
        assert_eq!(index.dimension(), 128);
        assert!(matches!(index, IndexBackend::Memory(_)));
    }
}
