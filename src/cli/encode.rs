use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use crate::cli::{OutputFormat, SubCommandExtend};
use crate::config::{ExtractorOptions, Opts};
use crate::extractor::FeatureExtractor;
use crate::face::{Embedding, OnnxAnalyzer};

#[derive(Parser, Debug, Clone)]
pub struct EncodeCommand {
    #[command(flatten)]
    pub extractor: ExtractorOptions,
    /// 图片路径
    pub image: PathBuf,
    /// 输出格式
    #[arg(long, value_enum, value_name = "FORMAT", default_value_t = OutputFormat::Json)]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for EncodeCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let analyzer =
            OnnxAnalyzer::new(self.extractor.models_dir(&opts.conf_dir), self.extractor.clone());
        let extractor = FeatureExtractor::new(Arc::new(analyzer));
        let embedding = extractor.embed(&self.image, self.extractor.embed_backend)?;
        print_result(&embedding, self.output_format)
    }
}

fn print_result(embedding: &Embedding, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string(embedding)?)
        }
        OutputFormat::Table => {
            for v in embedding.as_slice() {
                println!("{v:.6}");
            }
        }
    }
    Ok(())
}
