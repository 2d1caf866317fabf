//! Retrieval - 검색 결과 타입 및 리트리버 트레이트
//!
//! 대화 오케스트레이터는 `Retriever`만 알고, 실제 인덱스(LanceDB)는
//! `IndexRetriever`가 감쌉니다.

use anyhow::Result;
use async_trait::async_trait;

use super::document::Metadata;

// ============================================================================
// Types
// ============================================================================

/// 검색 결과
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// 청크 텍스트
    pub text: String,
    /// 청크 메타데이터 (source, page, start_index ...)
    pub metadata: Metadata,
    /// 유사도 스코어 (0.0 ~ 1.0)
    pub similarity: f32,
}

// ============================================================================
// Retriever Trait
// ============================================================================

/// 리트리버 트레이트 (async)
///
/// 질의 문자열에 대해 유사도 순으로 정렬된 상위 결과를 반환합니다.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str) -> Result<Vec<SearchResult>>;
}

/// 검색 결과를 하나의 컨텍스트 문자열로 결합 (빈 줄 구분)
pub fn join_passages(results: &[SearchResult]) -> String {
    results
        .iter()
        .map(|r| r.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

// ============================================================================
// Tests
// ============================================================================
