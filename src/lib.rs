//! palank-chatbot - 제품 지식 풀 기반 RAG 챗봇
//!
//! 제품별 문서 폴더로 LanceDB 벡터 인덱스를 만들어 원격 버킷과 동기화하고,
//! 그 인덱스 위에서 대화 기록을 반영한 질의응답을 스트리밍합니다.

pub mod chatbot;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod knowledge;
pub mod llm;
pub mod loader;
pub mod storage;
pub mod sync;

#[cfg(test)]
mod testing;

// Re-exports
pub use chatbot::{AnswerStream, ChatBot, ChatError, ChatHistory, ChatTurn, HistoryStore, IndexSource};
pub use config::{get_api_key, has_api_key, Settings};
pub use embedding::{EmbeddingProvider, OpenAiEmbedding};
pub use knowledge::{
    recursive_chunker, ChunkConfig, Chunker, IndexRetriever, KnowledgeDocument,
    Metadata, Retriever, SearchResult, VectorIndex,
};
pub use llm::{ChatMessage, ChatModel, OpenAiChat, Role};
pub use loader::{DocumentLoader, FileType, LoaderError};
pub use storage::{FsObjectStore, MemoryObjectStore, ObjectStore, RetryPolicy, StorageError};
pub use sync::{SyncError, VectorStoreSync};
