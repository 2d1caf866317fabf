//! Storage 모듈 - 원격 오브젝트 버킷
//!
//! 벡터 인덱스 파일을 `{prefix}/{product_id}/{relative-path}` 키로 보관하는
//! 내구성 있는 버킷에 대한 얇은 CRUD 인터페이스입니다.
//!
//! - `FsObjectStore`: 디렉토리(마운트된 공유 스토리지 등)를 버킷으로 사용
//! - `MemoryObjectStore`: 프로세스 내 버킷 (장애 주입 지원)
//! - `RetryPolicy`: 원격 호출 재시도 정책

mod fs;
mod memory;
mod retry;

use async_trait::async_trait;
use thiserror::Error;

pub use fs::FsObjectStore;
pub use memory::MemoryObjectStore;
pub use retry::RetryPolicy;

// ============================================================================
// Errors
// ============================================================================

/// 버킷 연산 에러
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Object not found: {0}")]
    NotFound(String),
    #[error("Invalid object key: {0}")]
    InvalidKey(String),
    #[error("Injected failure: {0}")]
    Injected(String),
}

// ============================================================================
// ObjectStore Trait
// ============================================================================

/// 원격 오브젝트 버킷 트레이트 (async)
///
/// 키는 `/`로 구분된 상대 경로입니다.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// prefix로 시작하는 모든 키 (정렬됨)
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// 오브젝트 저장 (덮어쓰기)
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), StorageError>;

    /// 오브젝트 읽기
    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// 여러 오브젝트 삭제 (없는 키는 무시)
    async fn delete_many(&self, keys: &[String]) -> Result<(), StorageError>;

    /// 버킷 이름
    fn bucket(&self) -> &str;
}

// ============================================================================
// Key Helpers
// ============================================================================

/// 오브젝트 키 검증
///
/// 빈 키, 절대 경로, `..` / 빈 세그먼트를 거부합니다.
pub fn validate_key(key: &str) -> Result<(), StorageError> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("Empty key".to_string()));
    }

    if key.starts_with('/') || key.contains('\\') {
        return Err(StorageError::InvalidKey(format!(
            "Key must be a relative '/'-separated path: {}",
            key
        )));
    }

    if key
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(StorageError::InvalidKey(format!(
            "Key contains an empty or relative segment: {}",
            key
        )));
    }

    Ok(())
}
