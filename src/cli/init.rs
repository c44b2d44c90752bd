use clap::Parser;
use log::info;

use crate::cli::SubCommandExtend;
use crate::config::{IndexKind, IndexOptions, Opts};
use crate::index::QdrantIndex;

#[derive(Parser, Debug, Clone)]
pub struct InitCommand {
    #[command(flatten)]
    pub index: IndexOptions,
    /// 特征向量维度，需要与识别模型一致
    #[arg(long, value_name = "N", default_value_t = 512)]
    pub dimension: usize,
}

impl SubCommandExtend for InitCommand {
    async fn run(&self, _opts: &Opts) -> anyhow::Result<()> {
        if self.index.index != IndexKind::Qdrant {
            anyhow::bail!("only the qdrant index needs to be initialized");
        }
        let index = QdrantIndex::new(&self.index)?;
        index.ensure_collection(self.dimension).await?;
        info!("collection `{}` 已就绪", self.index.collection);
        println!("{}", self.index.collection);
        Ok(())
    }
}
