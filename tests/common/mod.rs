#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use facesearch::FaceError;
use facesearch::artifact::ArtifactStore;
use facesearch::extractor::FeatureExtractor;
use facesearch::face::{
    Backend, DetectedFace, Embedding, FaceAnalyzer, FacialArea, Representation,
};
use facesearch::index::VectorIndex;
use facesearch::pipeline::{Pipeline, PipelineOptions};
use tempfile::TempDir;

pub const DIM: usize = 8;

const AREA: FacialArea = FacialArea { x: 4, y: 4, w: 2, h: 3 };

/// 以文件内容代替真实图片：`face:<id>` 包含一张人脸，`corrupt` 是损坏的图片，其他内容没有人脸
pub struct FakeAnalyzer;

impl FakeAnalyzer {
    fn read(path: &Path) -> facesearch::Result<Option<Vec<u8>>> {
        let data = std::fs::read(path).map_err(|e| FaceError::Extraction(e.to_string()))?;
        if data == b"corrupt" {
            return Err(FaceError::Extraction("unsupported image format".to_string()));
        }
        Ok(data.strip_prefix(b"face:").map(|id| id.to_vec()))
    }
}

/// 同一个 id 总是得到同一个归一化向量，不同 id 的向量由哈希生成，彼此相似度不高
pub fn embedding_of(id: &[u8]) -> Vec<f32> {
    let mut h = id
        .iter()
        .fold(0xcbf29ce484222325u64, |h, &b| (h ^ b as u64).wrapping_mul(0x100000001b3));
    let raw: Vec<f32> = (0..DIM)
        .map(|_| {
            h = h.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (h >> 40) as f32 / (1u64 << 24) as f32 - 0.5
        })
        .collect();
    let norm = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
    raw.into_iter().map(|x| x / norm).collect()
}

impl FaceAnalyzer for FakeAnalyzer {
    fn extract_faces(&self, path: &Path, _backend: Backend) -> facesearch::Result<Vec<DetectedFace>> {
        Ok(Self::read(path)?
            .map(|_| DetectedFace {
                face: vec![vec![[0.25, 0.5, 0.75]; AREA.w as usize]; AREA.h as usize],
                facial_area: AREA,
                confidence: 0.98,
                landmarks: None,
            })
            .into_iter()
            .collect())
    }

    fn represent(
        &self,
        path: &Path,
        _backend: Backend,
        max_faces: usize,
    ) -> facesearch::Result<Vec<Representation>> {
        Ok(Self::read(path)?
            .map(|id| Representation {
                embedding: Embedding(embedding_of(&id)),
                facial_area: AREA,
                face_confidence: 0.98,
            })
            .into_iter()
            .take(max_faces)
            .collect())
    }
}

/// 使用 [`FakeAnalyzer`] 的流水线，临时目录随返回值一起释放
pub fn pipeline<I: VectorIndex>(index: I) -> (Pipeline<I>, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(
        ArtifactStore::open(dir.path()).unwrap(),
        FeatureExtractor::new(Arc::new(FakeAnalyzer)),
        index,
        PipelineOptions::default(),
    );
    (pipeline, dir)
}

pub fn count_files(dir: &Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}
