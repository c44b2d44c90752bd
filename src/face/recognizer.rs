//! ArcFace 人脸特征提取

use std::path::Path;

use image::RgbImage;
use log::info;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use thiserror::Error;

use super::alignment::{self, ALIGNED_SIZE};
use super::detector::BoundingBox;

const ARCFACE_MEAN: f32 = 127.5;
// ArcFace 使用对称归一化，与 SCRFD 的 128 不同
const ARCFACE_STD: f32 = 127.5;

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("face has no landmarks")]
    NoLandmarks,
    #[error("expected {expected}-dim embedding, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

pub struct FaceRecognizer {
    session: Session,
    dimension: usize,
}

impl FaceRecognizer {
    /// 加载 ArcFace 模型，`dimension` 为期望的特征维度
    pub fn load(model_path: &Path, dimension: usize, threads: usize) -> Result<Self, RecognizerError> {
        if !model_path.exists() {
            return Err(RecognizerError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(threads)?
            .commit_from_file(model_path)?;

        info!("加载 ArcFace 模型: {}，特征维度 {dimension}", model_path.display());

        Ok(Self { session, dimension })
    }

    /// 用空白人脸跑一次推理，确认模型输出与配置的维度一致
    pub fn verify(&mut self) -> Result<(), RecognizerError> {
        let blank = RgbImage::new(ALIGNED_SIZE, ALIGNED_SIZE);
        self.infer(&blank).map(|_| ())
    }

    /// 对齐人脸并提取 L2 归一化的特征向量
    pub fn extract(&mut self, image: &RgbImage, face: &BoundingBox) -> Result<Vec<f32>, RecognizerError> {
        let landmarks = face.landmarks.as_ref().ok_or(RecognizerError::NoLandmarks)?;
        let aligned = alignment::align_face(image, landmarks);
        self.infer(&aligned)
    }

    fn infer(&mut self, aligned: &RgbImage) -> Result<Vec<f32>, RecognizerError> {
        let input = preprocess(aligned);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, raw) = outputs[0].try_extract_tensor::<f32>().map_err(|e| {
            RecognizerError::InferenceFailed(format!("embedding extraction: {e}"))
        })?;
        check_dimension(self.dimension, raw.len())?;
        Ok(l2_normalize(raw.to_vec()))
    }
}

fn check_dimension(expected: usize, actual: usize) -> Result<(), RecognizerError> {
    if actual != expected {
        return Err(RecognizerError::DimensionMismatch { expected, actual });
    }
    Ok(())
}

fn preprocess(aligned: &RgbImage) -> Array4<f32> {
    let size = ALIGNED_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in aligned.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = (pixel[c] as f32 - ARCFACE_MEAN) / ARCFACE_STD;
        }
    }
    tensor
}

fn l2_normalize(mut values: Vec<f32>) -> Vec<f32> {
    let norm = values.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        values.iter_mut().for_each(|x| *x /= norm);
    }
    values
}
