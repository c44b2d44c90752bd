//! 请求流水线
//!
//! 每个请求依次经过：写入临时文件 -> 人脸检测/特征提取 -> 写入或查询向量索引 -> 生成响应。
//! 临时文件在创建时即绑定删除动作，任何阶段失败都不会遗留文件。

use std::time::Instant;

use log::{debug, info, warn};

use crate::artifact::{Artifact, ArtifactStore, UploadedImage};
use crate::error::{FaceError, Result};
use crate::extractor::FeatureExtractor;
use crate::face::{Backend, DetectedFace, Embedding};
use crate::index::{FaceRecord, SearchResult, VectorIndex};
use crate::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Detect,
    Encode,
    AddFace,
    Recognize,
}

impl Endpoint {
    pub fn name(self) -> &'static str {
        match self {
            Self::Detect => "detect",
            Self::Encode => "encode",
            Self::AddFace => "add_face",
            Self::Recognize => "recognize",
        }
    }
}

/// 单次请求所处的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    ArtifactCreated,
    Extracted,
    IndexWritten,
    IndexQueried,
    Responding,
    Failed,
}

/// 一次流水线运行，记录阶段变化与耗时
struct Run {
    endpoint: Endpoint,
    stage: Stage,
    start: Instant,
}

impl Run {
    fn new(endpoint: Endpoint) -> Self {
        Self { endpoint, stage: Stage::Received, start: Instant::now() }
    }

    fn advance(&mut self, stage: Stage) {
        debug!("{}: {:?} -> {:?}", self.endpoint.name(), self.stage, stage);
        self.stage = stage;
    }

    fn finish<T>(mut self, result: Result<T>) -> Result<T> {
        let elapsed = self.start.elapsed().as_secs_f32();
        let outcome = match &result {
            Ok(_) => {
                self.advance(Stage::Responding);
                info!("{} 完成，耗时 {:.3}s", self.endpoint.name(), elapsed);
                "ok"
            }
            Err(e) => {
                warn!("{} 在 {:?} 阶段失败: {e}", self.endpoint.name(), self.stage);
                self.advance(Stage::Failed);
                e.kind()
            }
        };
        metrics::inc_request(self.endpoint.name(), outcome, elapsed);
        result
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    /// /detect 使用的检测模型
    pub detect_backend: Backend,
    /// 提取特征时使用的检测模型
    pub embed_backend: Backend,
    /// 识别结果的最低相似度
    pub min_score: Option<f32>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self { detect_backend: Backend::Fast, embed_backend: Backend::Accurate, min_score: None }
    }
}

pub struct Pipeline<I> {
    store: ArtifactStore,
    extractor: FeatureExtractor,
    index: I,
    opts: PipelineOptions,
}

impl<I: VectorIndex> Pipeline<I> {
    pub fn new(
        store: ArtifactStore,
        extractor: FeatureExtractor,
        index: I,
        opts: PipelineOptions,
    ) -> Self {
        Self { store, extractor, index, opts }
    }

    pub fn index(&self) -> &I {
        &self.index
    }

    async fn create_artifact(&self, run: &mut Run, image: &UploadedImage) -> Result<Artifact> {
        if image.bytes.is_empty() {
            return Err(FaceError::InvalidRequest("uploaded file is empty".to_string()));
        }
        let artifact = self.store.create(image).await?;
        run.advance(Stage::ArtifactCreated);
        Ok(artifact)
    }

    async fn embed(&self, run: &mut Run, image: &UploadedImage) -> Result<Embedding> {
        let artifact = self.create_artifact(run, image).await?;
        let embedding = self.extractor.embed(artifact.path(), self.opts.embed_backend)?;
        run.advance(Stage::Extracted);
        Ok(embedding)
    }

    /// 返回第一张人脸
    pub async fn detect(&self, image: &UploadedImage) -> Result<DetectedFace> {
        let mut run = Run::new(Endpoint::Detect);
        let result = async {
            let artifact = self.create_artifact(&mut run, image).await?;
            let faces = self.extractor.detect(artifact.path(), self.opts.detect_backend)?;
            run.advance(Stage::Extracted);
            faces.into_iter().next().ok_or(FaceError::NoFaceDetected)
        }
        .await;
        run.finish(result)
    }

    /// 返回第一张人脸的特征向量
    pub async fn encode(&self, image: &UploadedImage) -> Result<Embedding> {
        let mut run = Run::new(Endpoint::Encode);
        let result = self.embed(&mut run, image).await;
        run.finish(result)
    }

    /// 录入人脸，返回新记录的 ID
    pub async fn add_face(&self, image: &UploadedImage, name: &str) -> Result<FaceRecord> {
        let mut run = Run::new(Endpoint::AddFace);
        let result = async {
            let name = name.trim();
            if name.is_empty() {
                return Err(FaceError::InvalidRequest("name must not be empty".to_string()));
            }
            let embedding = self.embed(&mut run, image).await?;
            let record = FaceRecord::new(embedding, name);
            self.index.upsert(&record).await?;
            run.advance(Stage::IndexWritten);
            info!("录入人脸: {} ({})", record.label, record.id);
            Ok(record)
        }
        .await;
        run.finish(result)
    }

    /// 返回最相似的已录入人脸，索引为空或相似度过低时返回 `None`
    pub async fn recognize(&self, image: &UploadedImage) -> Result<Option<SearchResult>> {
        let mut run = Run::new(Endpoint::Recognize);
        let result = async {
            let embedding = self.embed(&mut run, image).await?;
            let results = self.index.query(&embedding, 1).await?;
            run.advance(Stage::IndexQueried);

            let Some(best) = results.into_iter().next() else {
                debug!("索引中没有任何人脸");
                return Ok(None);
            };
            metrics::inc_search_max_score(best.score);
            match self.opts.min_score {
                Some(min) if best.score < min => {
                    debug!("最佳匹配 {} 相似度 {:.3} 低于阈值 {min}", best.label, best.score);
                    Ok(None)
                }
                _ => Ok(Some(best)),
            }
        }
        .await;
        run.finish(result)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::face::{FaceAnalyzer, FacialArea, Representation};
    use crate::index::MemoryIndex;

    const DIM: usize = 8;

    /// 内容为 `face:<id>` 的文件视为包含一张人脸，`corrupt` 视为损坏的图片
    #[derive(Default)]
    struct FakeAnalyzer {
        calls: AtomicUsize,
    }

    impl FakeAnalyzer {
        fn read(&self, path: &Path) -> Result<Option<Vec<u8>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let data = std::fs::read(path).map_err(|e| FaceError::Extraction(e.to_string()))?;
            if data == b"corrupt" {
                return Err(FaceError::Extraction("unsupported image format".to_string()));
            }
            Ok(data.strip_prefix(b"face:").map(|id| id.to_vec()))
        }
    }

    /// 由 id 的哈希生成伪随机的归一化向量，不同 id 之间相似度不高
    fn embedding_of(id: &[u8]) -> Vec<f32> {
        let mut h = id.iter().fold(0xcbf29ce484222325u64, |h, &b| {
            (h ^ b as u64).wrapping_mul(0x100000001b3)
        });
        let raw: Vec<f32> = (0..DIM)
            .map(|_| {
                h = h.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                (h >> 40) as f32 / (1u64 << 24) as f32 - 0.5
            })
            .collect();
        let norm = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
        raw.into_iter().map(|x| x / norm).collect()
    }

    const AREA: FacialArea = FacialArea { x: 0, y: 0, w: 2, h: 2 };

    impl FaceAnalyzer for FakeAnalyzer {
        fn extract_faces(&self, path: &Path, _backend: Backend) -> Result<Vec<DetectedFace>> {
            Ok(self
                .read(path)?
                .map(|_| DetectedFace {
                    face: vec![vec![[0.5; 3]; 2]; 2],
                    facial_area: AREA,
                    confidence: 0.99,
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
        ) -> Result<Vec<Representation>> {
            Ok(self
                .read(path)?
                .map(|id| Representation {
                    embedding: Embedding(embedding_of(&id)),
                    facial_area: AREA,
                    face_confidence: 0.99,
                })
                .into_iter()
                .take(max_faces)
                .collect())
        }
    }

    struct Fixture {
        pipeline: Pipeline<MemoryIndex>,
        analyzer: Arc<FakeAnalyzer>,
        dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new(dimension: usize, opts: PipelineOptions) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let analyzer = Arc::new(FakeAnalyzer::default());
            let pipeline = Pipeline::new(
                ArtifactStore::open(dir.path()).unwrap(),
                FeatureExtractor::new(analyzer.clone()),
                MemoryIndex::new(dimension),
                opts,
            );
            Self { pipeline, analyzer, dir }
        }

        fn leftover_artifacts(&self) -> usize {
            std::fs::read_dir(self.dir.path()).unwrap().count()
        }
    }

    fn image(data: &'static [u8]) -> UploadedImage {
        UploadedImage::new(data).with_content_type("image/png")
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn encode_has_fixed_length() {
        let f = Fixture::new(DIM, PipelineOptions::default());
        for data in [&b"face:alice"[..], &b"face:bob"[..], &b"face:x"[..]] {
            let embedding = f.pipeline.encode(&image(data)).await.unwrap();
            assert_eq!(embedding.len(), DIM);
        }
        assert_eq!(f.leftover_artifacts(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn no_face_fails_every_endpoint() {
        let f = Fixture::new(DIM, PipelineOptions::default());
        let blank = image(b"solid white");

        assert!(matches!(f.pipeline.detect(&blank).await, Err(FaceError::NoFaceDetected)));
        assert!(matches!(f.pipeline.encode(&blank).await, Err(FaceError::NoFaceDetected)));
        assert!(matches!(
            f.pipeline.add_face(&blank, "alice").await,
            Err(FaceError::NoFaceDetected)
        ));
        assert!(matches!(f.pipeline.recognize(&blank).await, Err(FaceError::NoFaceDetected)));
        assert!(f.pipeline.index().is_empty());
        assert_eq!(f.leftover_artifacts(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn add_then_recognize() {
        let f = Fixture::new(DIM, PipelineOptions::default());
        f.pipeline.add_face(&image(b"face:alice"), "Alice").await.unwrap();
        f.pipeline.add_face(&image(b"face:bob"), "Bob").await.unwrap();

        let best = f.pipeline.recognize(&image(b"face:alice")).await.unwrap().unwrap();
        assert_eq!(best.label, "Alice");
        assert!((best.score - 1.0).abs() < 1e-5);

        let best = f.pipeline.recognize(&image(b"face:bob")).await.unwrap().unwrap();
        assert_eq!(best.label, "Bob");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn recognize_empty_index_is_no_match() {
        let f = Fixture::new(DIM, PipelineOptions::default());
        let result = f.pipeline.recognize(&image(b"face:alice")).await.unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn min_score_filters_weak_match() {
        // alice 与 bob 的相似度约为 0.56
        let loose = Fixture::new(DIM, PipelineOptions::default());
        loose.pipeline.add_face(&image(b"face:alice"), "Alice").await.unwrap();
        let weak = loose.pipeline.recognize(&image(b"face:bob")).await.unwrap().unwrap();
        assert_eq!(weak.label, "Alice");
        assert!(weak.score > 0.5 && weak.score < 0.6, "{}", weak.score);

        let opts = PipelineOptions { min_score: Some(0.9), ..Default::default() };
        let f = Fixture::new(DIM, opts);
        f.pipeline.add_face(&image(b"face:alice"), "Alice").await.unwrap();

        assert!(f.pipeline.recognize(&image(b"face:bob")).await.unwrap().is_none());
        assert!(f.pipeline.recognize(&image(b"face:zzz")).await.unwrap().is_none());
        let best = f.pipeline.recognize(&image(b"face:alice")).await.unwrap().unwrap();
        assert_eq!(best.label, "Alice");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn detect_returns_first_face() {
        let f = Fixture::new(DIM, PipelineOptions::default());
        let face = f.pipeline.detect(&image(b"face:alice")).await.unwrap();
        assert_eq!(face.facial_area, AREA);
        assert_eq!(face.face.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn extraction_error_still_cleans_up() {
        let f = Fixture::new(DIM, PipelineOptions::default());
        let err = f.pipeline.encode(&image(b"corrupt")).await.unwrap_err();
        assert!(matches!(err, FaceError::Extraction(_)));
        assert_eq!(f.leftover_artifacts(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn index_error_still_cleans_up() {
        // 索引维度与特征维度不一致
        let f = Fixture::new(DIM + 1, PipelineOptions::default());
        let err = f.pipeline.add_face(&image(b"face:alice"), "Alice").await.unwrap_err();
        assert!(matches!(err, FaceError::DimensionMismatch { .. }));
        let err = f.pipeline.recognize(&image(b"face:alice")).await.unwrap_err();
        assert!(matches!(err, FaceError::DimensionMismatch { .. }));
        assert_eq!(f.leftover_artifacts(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn storage_error_skips_extraction() {
        let f = Fixture::new(DIM, PipelineOptions::default());
        std::fs::remove_dir(f.dir.path()).unwrap();

        let err = f.pipeline.encode(&image(b"face:alice")).await.unwrap_err();
        assert!(matches!(err, FaceError::StorageWrite(_)));
        assert_eq!(f.analyzer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn blank_name_is_rejected_early() {
        let f = Fixture::new(DIM, PipelineOptions::default());
        let err = f.pipeline.add_face(&image(b"face:alice"), "  ").await.unwrap_err();
        assert!(matches!(err, FaceError::InvalidRequest(_)));
        assert_eq!(f.analyzer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_requests_leave_nothing_behind() {
        let f = Arc::new(Fixture::new(DIM, PipelineOptions::default()));
        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let f = f.clone();
                tokio::spawn(async move {
                    let data: &'static [u8] = if i % 3 == 0 { b"nothing here" } else { b"face:carol" };
                    let _ = f.pipeline.add_face(&image(data), "Carol").await;
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(f.leftover_artifacts(), 0);
        assert_eq!(f.pipeline.index().len(), 10);
    }
}
