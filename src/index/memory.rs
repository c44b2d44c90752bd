use std::sync::RwLock;

use super::{FaceRecord, SearchResult, VectorIndex, check_dimension, check_top_k};
use crate::error::{FaceError, Result};
use crate::face::Embedding;

/// 进程内的向量索引，使用点积作为相似度
pub struct MemoryIndex {
    dimension: usize,
    records: RwLock<Vec<FaceRecord>>,
}

impl MemoryIndex {
    pub fn new(dimension: usize) -> Self {
        Self { dimension, records: RwLock::new(Vec::new()) }
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl VectorIndex for MemoryIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn upsert(&self, record: &FaceRecord) -> Result<()> {
        check_dimension(self.dimension, &record.vector)?;
        let mut records =
            self.records.write().map_err(|e| FaceError::IndexWrite(e.to_string()))?;
        match records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record.clone(),
            None => records.push(record.clone()),
        }
        Ok(())
    }

    async fn query(&self, vector: &Embedding, top_k: usize) -> Result<Vec<SearchResult>> {
        check_dimension(self.dimension, vector)?;
        check_top_k(top_k)?;
        let records = self.records.read().map_err(|e| FaceError::IndexQuery(e.to_string()))?;

        let mut results: Vec<SearchResult> = records
            .iter()
            .map(|r| SearchResult { label: r.label.clone(), score: vector.dot(r.vector.as_slice()) })
            .collect();
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(top_k);
        Ok(results)
    }
}
