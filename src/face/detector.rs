//! SCRFD 人脸检测
//!
//! 三个 stride 的 anchor-free 解码加 NMS 后处理。模型输入为 RGB，letterbox 缩放到正方形。

use std::path::Path;

use image::RgbImage;
use image::imageops::{self, FilterType};
use log::{debug, info};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use thiserror::Error;

const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// 检测框，坐标为原图坐标
#[derive(Debug, Clone)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// letterbox 缩放信息，用于把检测结果映射回原图
struct LetterboxInfo {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

/// 单个 stride 的输出下标：(score, bbox, kps)
type StrideOutputIndices = (usize, usize, usize);

pub struct FaceDetector {
    session: Session,
    input_size: usize,
    confidence: f32,
    stride_indices: [StrideOutputIndices; 3],
}

impl FaceDetector {
    /// 加载 SCRFD 模型
    ///
    /// # Arguments
    ///
    /// * `model_path` - ONNX 模型路径
    /// * `input_size` - 模型输入边长，必须是 32 的倍数
    /// * `confidence` - 置信度阈值
    /// * `threads` - 推理线程数
    pub fn load(
        model_path: &Path,
        input_size: usize,
        confidence: f32,
        threads: usize,
    ) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(threads)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> =
            session.outputs().iter().map(|o| o.name().to_string()).collect();
        if output_names.len() < 9 {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model requires 9 outputs, got {}",
                output_names.len()
            )));
        }

        let stride_indices = discover_output_indices(&output_names);
        info!("加载 SCRFD 模型: {}，输入尺寸 {input_size}", model_path.display());
        debug!("SCRFD 输出映射: {stride_indices:?}");

        Ok(Self { session, input_size, confidence, stride_indices })
    }

    /// 检测人脸，按置信度从高到低返回
    pub fn detect(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, DetectorError> {
        let (input, letterbox) = preprocess(image, self.input_size);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut all_detections = Vec::new();
        for (stride_pos, &stride) in SCRFD_STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx, kps_idx) = self.stride_indices[stride_pos];

            let (_, scores) = outputs[score_idx].try_extract_tensor::<f32>().map_err(|e| {
                DetectorError::InferenceFailed(format!("scores stride {stride}: {e}"))
            })?;
            let (_, bboxes) = outputs[bbox_idx].try_extract_tensor::<f32>().map_err(|e| {
                DetectorError::InferenceFailed(format!("bboxes stride {stride}: {e}"))
            })?;
            let (_, kps) = outputs[kps_idx].try_extract_tensor::<f32>().map_err(|e| {
                DetectorError::InferenceFailed(format!("kps stride {stride}: {e}"))
            })?;

            all_detections.extend(decode_stride(
                scores,
                bboxes,
                kps,
                stride,
                self.input_size,
                &letterbox,
                self.confidence,
            ));
        }

        // nms 的结果已经按置信度排序
        Ok(nms(all_detections, SCRFD_NMS_THRESHOLD))
    }
}

/// 将图片等比缩放并居中填充为 NCHW 张量，填充值归一化后为 0
fn preprocess(image: &RgbImage, input_size: usize) -> (Array4<f32>, LetterboxInfo) {
    let (width, height) = image.dimensions();
    let scale = (input_size as f32 / width as f32).min(input_size as f32 / height as f32);

    let new_w = ((width as f32 * scale).round() as u32).clamp(1, input_size as u32);
    let new_h = ((height as f32 * scale).round() as u32).clamp(1, input_size as u32);
    let pad_x = (input_size as u32 - new_w) / 2;
    let pad_y = (input_size as u32 - new_h) / 2;

    let resized = imageops::resize(image, new_w, new_h, FilterType::Triangle);

    let mut tensor = Array4::<f32>::zeros((1, 3, input_size, input_size));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let (tx, ty) = ((x + pad_x) as usize, (y + pad_y) as usize);
        for c in 0..3 {
            tensor[[0, c, ty, tx]] = (pixel[c] as f32 - SCRFD_MEAN) / SCRFD_STD;
        }
    }

    (tensor, LetterboxInfo { scale, pad_x: pad_x as f32, pad_y: pad_y as f32 })
}

/// 根据输出名称确定张量顺序
///
/// 部分导出的模型输出名为 `score_8`、`bbox_16` 这种格式，否则按标准顺序：
/// [0-2] 为 score，[3-5] 为 bbox，[6-8] 为 kps
fn discover_output_indices(names: &[String]) -> [StrideOutputIndices; 3] {
    let find = |prefix: &str, stride: usize| -> Option<usize> {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| n == &target)
    };

    let named: Option<Vec<StrideOutputIndices>> = SCRFD_STRIDES
        .iter()
        .map(|&stride| Some((find("score", stride)?, find("bbox", stride)?, find("kps", stride)?)))
        .collect();

    match named {
        Some(indices) => [indices[0], indices[1], indices[2]],
        None => [(0, 3, 6), (1, 4, 7), (2, 5, 8)],
    }
}

/// 解码单个 stride 的检测结果
fn decode_stride(
    scores: &[f32],
    bboxes: &[f32],
    kps: &[f32],
    stride: usize,
    input_size: usize,
    letterbox: &LetterboxInfo,
    threshold: f32,
) -> Vec<BoundingBox> {
    let grid = input_size / stride;
    let num_anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;
    let s = stride as f32;

    // letterbox 坐标 -> 原图坐标
    let unmap = |x: f32, y: f32| {
        ((x - letterbox.pad_x) / letterbox.scale, (y - letterbox.pad_y) / letterbox.scale)
    };

    let mut detections = Vec::new();
    for idx in 0..num_anchors {
        let score = scores.get(idx).copied().unwrap_or(0.0);
        if score <= threshold {
            continue;
        }

        let bbox_off = idx * 4;
        if bbox_off + 3 >= bboxes.len() {
            continue;
        }

        let cell = idx / SCRFD_ANCHORS_PER_CELL;
        let anchor_x = (cell % grid) as f32 * s;
        let anchor_y = (cell / grid) as f32 * s;

        let (x1, y1) =
            unmap(anchor_x - bboxes[bbox_off] * s, anchor_y - bboxes[bbox_off + 1] * s);
        let (x2, y2) =
            unmap(anchor_x + bboxes[bbox_off + 2] * s, anchor_y + bboxes[bbox_off + 3] * s);

        let kps_off = idx * 10;
        let landmarks = (kps_off + 9 < kps.len()).then(|| {
            std::array::from_fn(|i| {
                unmap(anchor_x + kps[kps_off + i * 2] * s, anchor_y + kps[kps_off + i * 2 + 1] * s)
            })
        });

        detections.push(BoundingBox {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
            confidence: score,
            landmarks,
        });
    }

    detections
}

/// 非极大值抑制
fn nms(mut detections: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<BoundingBox> = Vec::new();
    for det in detections {
        if keep.iter().all(|k| iou(k, &det) <= iou_threshold) {
            keep.push(det);
        }
    }
    keep
}

fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);

    let inter_area = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union_area = a.width * a.height + b.width * b.height - inter_area;

    if union_area > 0.0 { inter_area / union_area } else { 0.0 }
}
