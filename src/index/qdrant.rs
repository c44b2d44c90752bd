use std::time::Duration;

use log::{debug, info};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{FaceRecord, SearchResult, VectorIndex, check_dimension, check_top_k};
use crate::config::IndexOptions;
use crate::error::{FaceError, Result};
use crate::face::Embedding;

/// 通过 REST API 访问 Qdrant
pub struct QdrantIndex {
    client: Client,
    url: String,
    collection: String,
    dimension: usize,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    points: Vec<PointStruct<'a>>,
}

#[derive(Serialize)]
struct PointStruct<'a> {
    id: String,
    vector: &'a [f32],
    payload: Payload,
}

#[derive(Serialize)]
struct Payload {
    name: String,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    vector: &'a [f32],
    limit: usize,
    with_payload: bool,
}

#[derive(Serialize)]
struct CreateCollection {
    vectors: VectorParams,
}

#[derive(Serialize, Deserialize)]
struct VectorParams {
    size: usize,
    distance: String,
}

#[derive(Deserialize)]
struct QdrantResponse<T> {
    result: T,
}

#[derive(Deserialize)]
struct UpdateResult {
    status: String,
}

#[derive(Deserialize)]
struct ScoredPoint {
    score: f32,
    payload: Option<ScoredPayload>,
}

#[derive(Deserialize)]
struct ScoredPayload {
    name: Option<String>,
}

#[derive(Deserialize)]
struct CollectionInfo {
    config: CollectionConfig,
}

#[derive(Deserialize)]
struct CollectionConfig {
    params: CollectionParams,
}

#[derive(Deserialize)]
struct CollectionParams {
    vectors: VectorParams,
}

impl QdrantIndex {
    /// 连接 Qdrant，并以 collection 的向量维度作为索引维度
    pub async fn connect(opts: &IndexOptions) -> Result<Self> {
        let mut index = Self::new(opts)?;
        match index.collection_dimension().await? {
            Some(dimension) => {
                info!("连接 Qdrant: {}/{}，向量维度 {dimension}", index.url, index.collection);
                index.dimension = dimension;
                Ok(index)
            }
            None => Err(FaceError::IndexQuery(format!(
                "collection `{}` does not exist, run `facesearch init` first",
                index.collection
            ))),
        }
    }

    /// 创建客户端，不访问网络
    pub fn new(opts: &IndexOptions) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(opts.timeout))
            .build()
            .map_err(|e| FaceError::IndexQuery(e.to_string()))?;
        Ok(Self {
            client,
            url: opts.qdrant_url.trim_end_matches('/').to_string(),
            collection: opts.collection.clone(),
            dimension: 0,
        })
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.url, self.collection)
    }

    /// 读取 collection 的向量维度，collection 不存在时返回 `None`
    pub async fn collection_dimension(&self) -> Result<Option<usize>> {
        let response = self
            .client
            .get(self.collection_url())
            .send()
            .await
            .map_err(|e| FaceError::IndexQuery(e.to_string()))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let info: CollectionInfo = parse(response, FaceError::IndexQuery).await?;
        Ok(Some(info.config.params.vectors.size))
    }

    /// 创建使用点积相似度的 collection
    ///
    /// 已存在且维度相同时直接返回，维度不同时报错
    pub async fn ensure_collection(&self, dimension: usize) -> Result<()> {
        if let Some(existing) = self.collection_dimension().await? {
            if existing != dimension {
                return Err(FaceError::DimensionMismatch { expected: existing, actual: dimension });
            }
            info!("collection `{}` 已存在", self.collection);
            return Ok(());
        }

        let body = CreateCollection { vectors: VectorParams { size: dimension, distance: "Dot".to_string() } };
        let response = self
            .client
            .put(self.collection_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| FaceError::IndexWrite(e.to_string()))?;
        let _: bool = parse(response, FaceError::IndexWrite).await?;
        info!("创建 collection `{}`，向量维度 {dimension}", self.collection);
        Ok(())
    }
}

impl VectorIndex for QdrantIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn upsert(&self, record: &FaceRecord) -> Result<()> {
        check_dimension(self.dimension, &record.vector)?;

        let body = UpsertRequest {
            points: vec![PointStruct {
                id: record.id.to_string(),
                vector: record.vector.as_slice(),
                payload: Payload { name: record.label.clone() },
            }],
        };
        let response = self
            .client
            .put(format!("{}/points?wait=true", self.collection_url()))
            .json(&body)
            .send()
            .await
            .map_err(|e| FaceError::IndexWrite(e.to_string()))?;

        let result: UpdateResult = parse(response, FaceError::IndexWrite).await?;
        if result.status != "completed" {
            return Err(FaceError::IndexWrite(format!("write not acknowledged: {}", result.status)));
        }
        debug!("写入 Qdrant: {} ({})", record.id, record.label);
        Ok(())
    }

    async fn query(&self, vector: &Embedding, top_k: usize) -> Result<Vec<SearchResult>> {
        check_dimension(self.dimension, vector)?;
        check_top_k(top_k)?;

        let body = SearchRequest { vector: vector.as_slice(), limit: top_k, with_payload: true };
        let response = self
            .client
            .post(format!("{}/points/search", self.collection_url()))
            .json(&body)
            .send()
            .await
            .map_err(|e| FaceError::IndexQuery(e.to_string()))?;

        let points: Vec<ScoredPoint> = parse(response, FaceError::IndexQuery).await?;
        // 每个结果都必须带有 name
        let mut results = points
            .into_iter()
            .map(|p| match p.payload.and_then(|payload| payload.name) {
                Some(label) => Ok(SearchResult { label, score: p.score }),
                None => Err(FaceError::IndexQuery("search hit without `name` payload".to_string())),
            })
            .collect::<Result<Vec<_>>>()?;
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(results)
    }
}

/// 检查状态码并解析 `result` 字段
async fn parse<T: DeserializeOwned>(response: Response, err: fn(String) -> FaceError) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(err(format!("qdrant returned {status}: {text}")));
    }
    let body: QdrantResponse<T> = response.json().await.map_err(|e| err(e.to_string()))?;
    Ok(body.result)
}
