use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use log::debug;
use tokio::task::block_in_place;

use crate::error::{FaceError, Result};
use crate::face::{Backend, DetectedFace, Embedding, FaceAnalyzer};
use crate::metrics;

/// 人脸分析库的调用点
///
/// 没有检测到人脸时返回 [`FaceError::NoFaceDetected`]，多张人脸时只取置信度最高的一张
#[derive(Clone)]
pub struct FeatureExtractor {
    analyzer: Arc<dyn FaceAnalyzer>,
}

impl FeatureExtractor {
    pub fn new(analyzer: Arc<dyn FaceAnalyzer>) -> Self {
        Self { analyzer }
    }

    /// 检测图片中的所有人脸
    pub fn detect(&self, path: &Path, backend: Backend) -> Result<Vec<DetectedFace>> {
        let start = Instant::now();
        let faces = block_in_place(|| self.analyzer.extract_faces(path, backend))?;
        metrics::inc_extract_duration("detect", backend.name(), start.elapsed().as_secs_f32());
        debug!("检测到 {} 张人脸: {}", faces.len(), path.display());

        if faces.is_empty() {
            return Err(FaceError::NoFaceDetected);
        }
        Ok(faces)
    }

    /// 提取第一张人脸的特征向量
    pub fn embed(&self, path: &Path, backend: Backend) -> Result<Embedding> {
        let start = Instant::now();
        let representations = block_in_place(|| self.analyzer.represent(path, backend, 1))?;
        metrics::inc_extract_duration("embed", backend.name(), start.elapsed().as_secs_f32());

        let first = representations.into_iter().next().ok_or(FaceError::NoFaceDetected)?;
        if first.embedding.is_empty() {
            return Err(FaceError::Extraction("empty embedding".to_string()));
        }
        Ok(first.embedding)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::face::{FacialArea, Representation};

    /// 按调用顺序返回预设结果
    struct ScriptedAnalyzer {
        faces: usize,
        calls: Mutex<Vec<Backend>>,
        max_faces: Mutex<Vec<usize>>,
    }

    impl ScriptedAnalyzer {
        fn area(i: usize) -> FacialArea {
            FacialArea { x: i as u32 * 10, y: 0, w: 10, h: 10 }
        }
    }

    impl FaceAnalyzer for ScriptedAnalyzer {
        fn extract_faces(&self, _path: &Path, backend: Backend) -> Result<Vec<DetectedFace>> {
            self.calls.lock().unwrap().push(backend);
            Ok((0..self.faces)
                .map(|i| DetectedFace {
                    face: vec![vec![[0.0; 3]; 10]; 10],
                    facial_area: Self::area(i),
                    confidence: 1.0 - i as f32 * 0.1,
                    landmarks: None,
                })
                .collect())
        }

        fn represent(
            &self,
            _path: &Path,
            backend: Backend,
            max_faces: usize,
        ) -> Result<Vec<Representation>> {
            self.calls.lock().unwrap().push(backend);
            self.max_faces.lock().unwrap().push(max_faces);
            Ok((0..self.faces.min(max_faces))
                .map(|i| Representation {
                    embedding: Embedding(vec![i as f32; 4]),
                    facial_area: Self::area(i),
                    face_confidence: 1.0 - i as f32 * 0.1,
                })
                .collect())
        }
    }

    fn extractor(faces: usize) -> (FeatureExtractor, Arc<ScriptedAnalyzer>) {
        let analyzer = Arc::new(ScriptedAnalyzer {
            faces,
            calls: Mutex::new(vec![]),
            max_faces: Mutex::new(vec![]),
        });
        (FeatureExtractor::new(analyzer.clone()), analyzer)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn no_face_is_an_error() {
        let (extractor, _) = extractor(0);
        let path = Path::new("blank.png");
        assert!(matches!(extractor.detect(path, Backend::Fast), Err(FaceError::NoFaceDetected)));
        assert!(matches!(extractor.embed(path, Backend::Fast), Err(FaceError::NoFaceDetected)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn embed_uses_first_face() {
        let (extractor, analyzer) = extractor(3);
        let embedding = extractor.embed(Path::new("group.png"), Backend::Accurate).unwrap();
        assert_eq!(embedding, Embedding(vec![0.0; 4]));
        // 合影中只有第一张人脸需要提取特征
        assert_eq!(*analyzer.max_faces.lock().unwrap(), vec![1]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn detect_returns_all_faces() {
        let (extractor, _) = extractor(2);
        let faces = extractor.detect(Path::new("pair.png"), Backend::Fast).unwrap();
        assert_eq!(faces.len(), 2);
        assert_eq!(faces[1].facial_area.x, 10);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn backend_is_passed_through() {
        let (extractor, analyzer) = extractor(1);
        extractor.detect(Path::new("a.png"), Backend::Fast).unwrap();
        extractor.embed(Path::new("a.png"), Backend::Accurate).unwrap();
        assert_eq!(*analyzer.calls.lock().unwrap(), vec![Backend::Fast, Backend::Accurate]);
    }
}
