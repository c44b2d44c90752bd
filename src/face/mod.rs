//! 人脸分析
//!
//! [`FaceAnalyzer`] 是人脸检测与特征提取的边界，[`OnnxAnalyzer`] 使用 SCRFD 检测人脸，
//! 使用 ArcFace 提取特征，二者均通过 ONNX Runtime 在 CPU 上推理。

mod alignment;
mod detector;
mod onnx;
mod recognizer;

use std::path::Path;

use clap::ValueEnum;
use serde::Serialize;
use utoipa::ToSchema;

pub use self::detector::{DetectorError, FaceDetector};
pub use self::onnx::OnnxAnalyzer;
pub use self::recognizer::{FaceRecognizer, RecognizerError};
use crate::error::Result;

/// 人脸检测模型
///
/// 两种模型的处理流程完全相同，只有模型文件与输入尺寸不同
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// SCRFD-500M，320x320 输入，速度优先
    Fast,
    /// SCRFD-10G，640x640 输入，精度优先
    Accurate,
}

impl Backend {
    pub fn name(self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Accurate => "accurate",
        }
    }

    /// 模型文件名，位于模型目录下
    pub fn model_file(self) -> &'static str {
        match self {
            Self::Fast => "det_500m.onnx",
            Self::Accurate => "det_10g.onnx",
        }
    }

    /// 模型输入的边长
    pub fn input_size(self) -> usize {
        match self {
            Self::Fast => 320,
            Self::Accurate => 640,
        }
    }
}

/// 人脸在原图中的位置
#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct FacialArea {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

/// 裁剪出的人脸，`H x W x RGB`，取值范围 [0, 1]
pub type FacePixels = Vec<Vec<[f32; 3]>>;

/// 检测到的人脸
#[derive(Debug, Clone, Serialize)]
pub struct DetectedFace {
    pub face: FacePixels,
    pub facial_area: FacialArea,
    pub confidence: f32,
    /// 五点关键点：左眼、右眼、鼻尖、左嘴角、右嘴角
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// 人脸特征向量
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(transparent)]
pub struct Embedding(pub Vec<f32>);

impl Embedding {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// 点积，对于归一化的向量即余弦相似度
    pub fn dot(&self, other: &[f32]) -> f32 {
        self.0.iter().zip(other).map(|(a, b)| a * b).sum()
    }
}

/// 一张人脸的特征
#[derive(Debug, Clone, Serialize)]
pub struct Representation {
    pub embedding: Embedding,
    pub facial_area: FacialArea,
    pub face_confidence: f32,
}

/// 人脸分析库
///
/// 两个方法都按置信度从高到低返回人脸，没有人脸时返回空列表
pub trait FaceAnalyzer: Send + Sync {
    /// 检测并裁剪图片中的所有人脸
    fn extract_faces(&self, path: &Path, backend: Backend) -> Result<Vec<DetectedFace>>;

    /// 提取置信度最高的至多 `max_faces` 张人脸的特征向量
    fn represent(
        &self,
        path: &Path,
        backend: Backend,
        max_faces: usize,
    ) -> Result<Vec<Representation>>;
}
