//! 向量索引
//!
//! 记录写入后不再修改，以随机生成的 ID 区分，因此并发的写入与查询不需要额外加锁

mod memory;
mod qdrant;

use std::future::Future;

use serde::Serialize;
use uuid::Uuid;

pub use self::memory::MemoryIndex;
pub use self::qdrant::QdrantIndex;
use crate::error::{FaceError, Result};
use crate::face::Embedding;

/// 一条已录入的人脸
#[derive(Debug, Clone)]
pub struct FaceRecord {
    pub id: Uuid,
    pub vector: Embedding,
    pub label: String,
}

impl FaceRecord {
    /// 创建记录并生成新的 ID
    pub fn new(vector: Embedding, label: impl Into<String>) -> Self {
        Self { id: Uuid::new_v4(), vector, label: label.into() }
    }
}

/// 查询结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub label: String,
    pub score: f32,
}

pub trait VectorIndex: Send + Sync {
    /// 索引中向量的维度
    fn dimension(&self) -> usize;

    /// 写入一条记录，写入被确认后才返回
    fn upsert(&self, record: &FaceRecord) -> impl Future<Output = Result<()>> + Send;

    /// 按相似度从高到低返回最多 `top_k` 条结果，索引为空时返回空列表
    fn query(
        &self,
        vector: &Embedding,
        top_k: usize,
    ) -> impl Future<Output = Result<Vec<SearchResult>>> + Send;
}

/// 服务实际使用的索引
pub enum IndexBackend {
    Qdrant(QdrantIndex),
    Memory(MemoryIndex),
}

impl VectorIndex for IndexBackend {
    fn dimension(&self) -> usize {
        match self {
            Self::Qdrant(index) => index.dimension(),
            Self::Memory(index) => index.dimension(),
        }
    }

    async fn upsert(&self, record: &FaceRecord) -> Result<()> {
        match self {
            Self::Qdrant(index) => index.upsert(record).await,
            Self::Memory(index) => index.upsert(record).await,
        }
    }

    async fn query(&self, vector: &Embedding, top_k: usize) -> Result<Vec<SearchResult>> {
        match self {
            Self::Qdrant(index) => index.query(vector, top_k).await,
            Self::Memory(index) => index.query(vector, top_k).await,
        }
    }
}

fn check_dimension(expected: usize, vector: &Embedding) -> Result<()> {
    if vector.len() != expected {
        return Err(FaceError::DimensionMismatch { expected, actual: vector.len() });
    }
    Ok(())
}

fn check_top_k(top_k: usize) -> Result<()> {
    if top_k == 0 {
        return Err(FaceError::InvalidRequest("top_k must be at least 1".to_string()));
    }
    Ok(())
}
