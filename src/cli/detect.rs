use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use serde::Serialize;

use crate::cli::{OutputFormat, SubCommandExtend};
use crate::config::{ExtractorOptions, Opts};
use crate::extractor::FeatureExtractor;
use crate::face::{DetectedFace, FacialArea, OnnxAnalyzer};

#[derive(Parser, Debug, Clone)]
pub struct DetectCommand {
    #[command(flatten)]
    pub extractor: ExtractorOptions,
    /// 图片路径
    pub image: PathBuf,
    /// 输出格式
    #[arg(long, value_enum, value_name = "FORMAT", default_value_t = OutputFormat::Table)]
    pub output_format: OutputFormat,
}

/// 命令行只输出位置信息，不输出像素
#[derive(Serialize)]
struct FaceSummary {
    facial_area: FacialArea,
    confidence: f32,
    landmarks: Option<[(f32, f32); 5]>,
}

impl From<DetectedFace> for FaceSummary {
    fn from(face: DetectedFace) -> Self {
        Self { facial_area: face.facial_area, confidence: face.confidence, landmarks: face.landmarks }
    }
}

impl SubCommandExtend for DetectCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let analyzer =
            OnnxAnalyzer::new(self.extractor.models_dir(&opts.conf_dir), self.extractor.clone());
        let extractor = FeatureExtractor::new(Arc::new(analyzer));
        let faces = extractor.detect(&self.image, self.extractor.detect_backend)?;
        let faces: Vec<FaceSummary> = faces.into_iter().map(FaceSummary::from).collect();
        print_result(&faces, self.output_format)
    }
}

fn print_result(faces: &[FaceSummary], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(faces)?)
        }
        OutputFormat::Table => {
            for face in faces {
                let FacialArea { x, y, w, h } = face.facial_area;
                println!("{:.2}\t{x}\t{y}\t{w}\t{h}", face.confidence);
            }
        }
    }
    Ok(())
}
