use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use image::imageops;
use image::{ImageReader, RgbImage};
use log::debug;

use super::detector::{BoundingBox, DetectorError, FaceDetector};
use super::recognizer::{FaceRecognizer, RecognizerError};
use super::{Backend, DetectedFace, Embedding, FaceAnalyzer, FacialArea, Representation};
use crate::config::ExtractorOptions;
use crate::error::{FaceError, Result};

/// 基于 ONNX Runtime 的人脸分析
///
/// 模型在第一次使用时加载，之后复用。ONNX 会话推理需要独占访问，因此每个会话都有自己的锁
pub struct OnnxAnalyzer {
    models_dir: PathBuf,
    opts: ExtractorOptions,
    detectors: Mutex<HashMap<Backend, Arc<Mutex<FaceDetector>>>>,
    recognizer: Mutex<Option<FaceRecognizer>>,
}

impl OnnxAnalyzer {
    pub fn new(models_dir: PathBuf, opts: ExtractorOptions) -> Self {
        Self {
            models_dir,
            opts,
            detectors: Mutex::new(HashMap::new()),
            recognizer: Mutex::new(None),
        }
    }

    /// 提前加载指定的检测模型与特征模型，模型缺失或特征维度与配置不符时尽早报错
    pub fn preload(&self, backends: &[Backend]) -> Result<()> {
        for &backend in backends {
            self.detector(backend)?;
        }
        Ok(self.with_recognizer(FaceRecognizer::verify)??)
    }

    fn detector(&self, backend: Backend) -> Result<Arc<Mutex<FaceDetector>>> {
        let mut detectors = self.detectors.lock().map_err(poisoned)?;
        if let Some(detector) = detectors.get(&backend) {
            return Ok(detector.clone());
        }
        let detector = FaceDetector::load(
            &self.models_dir.join(backend.model_file()),
            backend.input_size(),
            self.opts.confidence,
            self.opts.threads,
        )
        .map_err(|e| FaceError::ModelUnavailable(e.to_string()))?;
        let detector = Arc::new(Mutex::new(detector));
        detectors.insert(backend, detector.clone());
        Ok(detector)
    }

    fn with_recognizer<R>(&self, f: impl FnOnce(&mut FaceRecognizer) -> R) -> Result<R> {
        let mut recognizer = self.recognizer.lock().map_err(poisoned)?;
        if recognizer.is_none() {
            let loaded = FaceRecognizer::load(
                &self.models_dir.join(&self.opts.recognizer_model),
                self.opts.dimension,
                self.opts.threads,
            )
            .map_err(|e| FaceError::ModelUnavailable(e.to_string()))?;
            *recognizer = Some(loaded);
        }
        match recognizer.as_mut() {
            Some(recognizer) => Ok(f(recognizer)),
            None => Err(FaceError::ModelUnavailable("recognizer not loaded".to_string())),
        }
    }

    fn detect(&self, image: &RgbImage, backend: Backend) -> Result<Vec<BoundingBox>> {
        let detector = self.detector(backend)?;
        let mut detector = detector.lock().map_err(poisoned)?;
        let boxes = detector.detect(image)?;
        debug!("{} 检测到 {} 张人脸", backend.name(), boxes.len());
        Ok(boxes)
    }
}

impl FaceAnalyzer for OnnxAnalyzer {
    fn extract_faces(&self, path: &Path, backend: Backend) -> Result<Vec<DetectedFace>> {
        let image = decode(path)?;
        let boxes = self.detect(&image, backend)?;
        Ok(boxes
            .into_iter()
            .filter_map(|b| {
                let area = facial_area(&image, &b)?;
                Some(DetectedFace {
                    face: crop(&image, area),
                    facial_area: area,
                    confidence: b.confidence,
                    landmarks: b.landmarks,
                })
            })
            .collect())
    }

    fn represent(
        &self,
        path: &Path,
        backend: Backend,
        max_faces: usize,
    ) -> Result<Vec<Representation>> {
        let image = decode(path)?;
        let boxes = self.detect(&image, backend)?;
        self.with_recognizer(|recognizer| {
            boxes
                .iter()
                .filter_map(|b| Some((b, facial_area(&image, b)?)))
                .take(max_faces)
                .map(|(b, area)| {
                    let values = recognizer.extract(&image, b)?;
                    Ok(Representation {
                        embedding: Embedding(values),
                        facial_area: area,
                        face_confidence: b.confidence,
                    })
                })
                .collect::<Result<Vec<_>>>()
        })?
    }
}

/// 模型在运行期的错误都是服务端的问题，与上传的图片无关
impl From<DetectorError> for FaceError {
    fn from(e: DetectorError) -> Self {
        match e {
            DetectorError::ModelNotFound(_) => Self::ModelUnavailable(e.to_string()),
            DetectorError::InferenceFailed(_) | DetectorError::Ort(_) => {
                Self::Inference(e.to_string())
            }
        }
    }
}

impl From<RecognizerError> for FaceError {
    fn from(e: RecognizerError) -> Self {
        match e {
            RecognizerError::ModelNotFound(_) => Self::ModelUnavailable(e.to_string()),
            RecognizerError::DimensionMismatch { expected, actual } => {
                Self::DimensionMismatch { expected, actual }
            }
            RecognizerError::InferenceFailed(_)
            | RecognizerError::NoLandmarks
            | RecognizerError::Ort(_) => Self::Inference(e.to_string()),
        }
    }
}

fn poisoned<T>(_: PoisonError<T>) -> FaceError {
    FaceError::ModelUnavailable("model session lock poisoned".to_string())
}

/// 按内容识别格式并解码为 RGB
fn decode(path: &Path) -> Result<RgbImage> {
    let image = ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(|e| FaceError::Extraction(e.to_string()))?
        .decode()
        .map_err(|e| FaceError::Extraction(e.to_string()))?;
    Ok(image.to_rgb8())
}

/// 将检测框裁剪到图片范围内，完全在图片外时返回 `None`
fn facial_area(image: &RgbImage, b: &BoundingBox) -> Option<FacialArea> {
    let (width, height) = image.dimensions();
    let x1 = b.x.max(0.0).floor() as u32;
    let y1 = b.y.max(0.0).floor() as u32;
    let x2 = ((b.x + b.width).ceil().max(0.0) as u32).min(width);
    let y2 = ((b.y + b.height).ceil().max(0.0) as u32).min(height);
    (x2 > x1 && y2 > y1).then(|| FacialArea { x: x1, y: y1, w: x2 - x1, h: y2 - y1 })
}

fn crop(image: &RgbImage, area: FacialArea) -> Vec<Vec<[f32; 3]>> {
    let face = imageops::crop_imm(image, area.x, area.y, area.w, area.h).to_image();
    face.rows()
        .map(|row| row.map(|p| [p[0] as f32 / 255., p[1] as f32 / 255., p[2] as f32 / 255.]).collect())
        .collect()
}
