//! LanceDB Vector Index - 제품별 로컬 벡터 인덱스
//!
//! 한 제품의 청크 텍스트, 메타데이터(JSON), 임베딩을 하나의 LanceDB
//! 테이블에 저장합니다. 인덱스 디렉토리 전체가 원격 버킷으로 업로드되는
//! 단위입니다.
//! ref: https://lancedb.github.io/lancedb/

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::table::Table;

use super::document::{KnowledgeDocument, Metadata};
use super::vector::{Retriever, SearchResult};
use crate::embedding::EmbeddingProvider;

/// 벡터 테이블 이름
const TABLE_NAME: &str = "vectors";

/// 임베딩 API 배치 크기
const EMBED_BATCH_SIZE: usize = 100;

// ============================================================================
// VectorIndex
// ============================================================================

/// 제품 벡터 인덱스
pub struct VectorIndex {
    table: Table,
    path: PathBuf,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("path", &self.path)
            .field("embedder", &self.embedder.name())
            .finish()
    }
}

impl VectorIndex {
    /// 문서 목록으로 새 인덱스 생성
    ///
    /// 문서가 없으면 스키마만 있는 빈 테이블을 만듭니다.
    ///
    /// # Arguments
    /// * `path` - 인덱스 디렉토리
    /// * `documents` - 청킹된 문서
    /// * `embedder` - 임베딩 프로바이더 (검색 시에도 사용)
    pub async fn create(
        path: &Path,
        documents: &[KnowledgeDocument],
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        tokio::fs::create_dir_all(path)
            .await
            .with_context(|| format!("Failed to create index directory {:?}", path))?;

        let db = connect(path).await?;
        let schema = Arc::new(create_schema(embedder.dimension())?);

        let table = if documents.is_empty() {
            tracing::debug!("No documents, creating empty index at {:?}", path);
            db.create_empty_table(TABLE_NAME, schema)
                .execute()
                .await
                .context("Failed to create empty table")?
        } else {
            let mut batches = Vec::new();
            for (i, docs) in documents.chunks(EMBED_BATCH_SIZE).enumerate() {
                tracing::debug!(
                    "Embedding batch {}/{} ({} chunks)",
                    i + 1,
                    documents.len().div_ceil(EMBED_BATCH_SIZE),
                    docs.len()
                );
                let texts: Vec<String> = docs.iter().map(|d| d.text.clone()).collect();
                let embeddings = embedder.embed_batch(&texts).await?;
                batches.push(documents_to_batch(
                    docs,
                    &embeddings,
                    embedder.dimension(),
                    schema.clone(),
                )?);
            }

            let batches = RecordBatchIterator::new(batches.into_iter().map(Ok), schema);
            db.create_table(TABLE_NAME, batches)
                .execute()
                .await
                .context("Failed to create table")?
        };

        tracing::debug!("Created index at {:?} ({} chunks)", path, documents.len());

        Ok(Self {
            table,
            path: path.to_path_buf(),
            embedder,
        })
    }

    /// 기존 인덱스 열기
    pub async fn open(path: &Path, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        if !path.is_dir() {
            anyhow::bail!("Index directory not found: {:?}", path);
        }

        let db = connect(path).await?;

        let names = db
            .table_names()
            .execute()
            .await
            .context("Failed to list tables")?;
        if !names.iter().any(|n| n == TABLE_NAME) {
            anyhow::bail!("Index at {:?} has no '{}' table", path, TABLE_NAME);
        }

        let table = db
            .open_table(TABLE_NAME)
            .execute()
            .await
            .context("Failed to open table")?;

        Ok(Self {
            table,
            path: path.to_path_buf(),
            embedder,
        })
    }

    /// 인덱스 디렉토리
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 저장된 청크 수
    pub async fn count(&self) -> Result<usize> {
        self.table
            .count_rows(None)
            .await
            .context("Failed to count rows")
    }

    /// 질의와 가까운 상위 k개 청크
    pub async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        if k == 0 || self.count().await? == 0 {
            return Ok(vec![]);
        }

        let query_embedding = self.embedder.embed(query).await?;

        let stream = self
            .table
            .vector_search(query_embedding)
            .context("Failed to create vector search")?
            .limit(k)
            .execute()
            .await
            .context("Failed to execute vector search")?;

        let batches: Vec<RecordBatch> = stream.try_collect().await?;

        let mut results = Vec::new();
        for batch in batches {
            let texts = string_column(&batch, "text")?;
            let metadata = string_column(&batch, "metadata")?;

            // _distance 컬럼 (LanceDB가 자동 추가)
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| anyhow::anyhow!("Missing _distance column"))?;

            for i in 0..batch.num_rows() {
                let metadata: Metadata = serde_json::from_str(metadata.value(i)).unwrap_or_default();
                results.push(SearchResult {
                    text: texts.value(i).to_string(),
                    metadata,
                    // 거리를 유사도로 변환
                    similarity: 1.0 / (1.0 + distances.value(i)),
                });
            }
        }

        results.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        results.truncate(k);
        Ok(results)
    }
}

async fn connect(path: &Path) -> Result<Connection> {
    let path_str = path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid path encoding"))?;

    lancedb::connect(path_str)
        .execute()
        .await
        .context("Failed to connect to LanceDB")
}

/// 벡터 테이블 스키마 생성
fn create_schema(dimension: usize) -> Result<Schema> {
    let dimension = i32::try_from(dimension).context("Embedding dimension too large")?;

    Ok(Schema::new(vec![
        Field::new("text", DataType::Utf8, false),
        Field::new("metadata", DataType::Utf8, false),
        Field::new(
            "embedding",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                dimension,
            ),
            false,
        ),
    ]))
}

/// 문서와 임베딩을 Arrow RecordBatch로 변환
fn documents_to_batch(
    documents: &[KnowledgeDocument],
    embeddings: &[Vec<f32>],
    dimension: usize,
    schema: SchemaRef,
) -> Result<RecordBatch> {
    if documents.len() != embeddings.len() {
        anyhow::bail!(
            "Embedding count mismatch: {} documents, {} embeddings",
            documents.len(),
            embeddings.len()
        );
    }
    if let Some(bad) = embeddings.iter().find(|e| e.len() != dimension) {
        anyhow::bail!(
            "Embedding dimension mismatch: expected {}, got {}",
            dimension,
            bad.len()
        );
    }

    let texts: Vec<&str> = documents.iter().map(|d| d.text.as_str()).collect();
    let metadata = documents
        .iter()
        .map(|d| serde_json::to_string(&d.metadata))
        .collect::<serde_json::Result<Vec<_>>>()
        .context("Failed to serialize metadata")?;

    let values = Float32Array::from(embeddings.concat());
    let field = Arc::new(Field::new("item", DataType::Float32, true));
    let embedding_list = FixedSizeListArray::try_new(
        field,
        i32::try_from(dimension).context("Embedding dimension too large")?,
        Arc::new(values) as Arc<dyn Array>,
        None,
    )
    .context("Failed to create embedding array")?;

    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(StringArray::from(texts)),
            Arc::new(StringArray::from(metadata)),
            Arc::new(embedding_list),
        ],
    )
    .context("Failed to create RecordBatch")
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| anyhow::anyhow!("Missing {} column", name))
}

// ============================================================================
// IndexRetriever
// ============================================================================

/// 벡터 인덱스 기반 리트리버 (상위 k개)
#[derive(Debug, Clone)]
pub struct IndexRetriever {
    index: Arc<VectorIndex>,
    k: usize,
}

impl IndexRetriever {
    pub fn new(index: Arc<VectorIndex>, k: usize) -> Self {
        Self { index, k }
    }
}

#[async_trait]
impl Retriever for IndexRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<SearchResult>> {
        let results = self.index.similarity_search(query, self.k).await?;
        tracing::debug!("Retrieved {} passages", results.len());
        Ok(results)
    }
}

// ============================================================================
// Tests
// ============================================================================
