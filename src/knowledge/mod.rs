//! Knowledge 모듈 - 제품 지식 인덱스
//!
//! - Document: 로더가 만든 정규화 문서와 메타데이터
//! - Chunker: 재귀 문자 분할 (1000자 / 200자 오버랩)
//! - Index: LanceDB 기반 제품별 벡터 인덱스
//! - Retriever: 대화 오케스트레이터가 쓰는 검색 인터페이스

mod chunker;
mod document;
mod index;
mod vector;

// Re-exports
pub use chunker::{recursive_chunker, ChunkConfig, Chunker, RecursiveCharacterChunker};
pub use document::{filter_complex_metadata, KnowledgeDocument, Metadata};
pub use index::{IndexRetriever, VectorIndex};
pub use vector::{join_passages, Retriever, SearchResult};
