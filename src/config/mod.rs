//! 설정 모듈
//!
//! 경로, 원격 버킷 위치, 재시도/청킹 정책, 모델 이름, 디버그 플래그를
//! 하나의 `Settings`로 묶어 각 컴포넌트 생성자에 전달합니다.
//!
//! 기본 레이아웃:
//! - `./productKnowledgePool/{id}/*` - 제품별 원본 문서
//! - `./vectorStore/{id}/*` - 로컬 벡터 인덱스
//! - `{remote_root}/{bucket}/vectorstores/{id}/*` - 원격 사본

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};

use crate::knowledge::ChunkConfig;
use crate::storage::RetryPolicy;

// ============================================================================
// Defaults
// ============================================================================

pub const DEFAULT_KNOWLEDGE_POOL_DIR: &str = "./productKnowledgePool";
pub const DEFAULT_VECTOR_STORE_DIR: &str = "./vectorStore";
pub const DEFAULT_REMOTE_ROOT: &str = "./remoteStorage";
pub const DEFAULT_REMOTE_PREFIX: &str = "vectorstores";
pub const DEFAULT_TOP_K: usize = 15;
pub const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo-0125";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

// ============================================================================
// Settings
// ============================================================================

/// 프로세스 설정
#[derive(Debug, Clone)]
pub struct Settings {
    /// 제품별 원본 문서 루트
    pub knowledge_pool_dir: PathBuf,
    /// 로컬 벡터 인덱스 루트
    pub vector_store_dir: PathBuf,
    /// 버킷 디렉토리들의 루트 (`FsObjectStore`)
    pub remote_root: PathBuf,
    /// 원격 키 prefix
    pub remote_prefix: String,
    /// 원격 호출 재시도 정책
    pub retry: RetryPolicy,
    /// 청킹 설정
    pub chunk: ChunkConfig,
    /// 검색 결과 수
    pub top_k: usize,
    /// 채팅 모델
    pub chat_model: String,
    /// 임베딩 모델
    pub embedding_model: String,
    /// OpenAI 호환 API 주소
    pub openai_base_url: String,
    /// 진단 로그 출력
    pub debug: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            knowledge_pool_dir: PathBuf::from(DEFAULT_KNOWLEDGE_POOL_DIR),
            vector_store_dir: PathBuf::from(DEFAULT_VECTOR_STORE_DIR),
            remote_root: PathBuf::from(DEFAULT_REMOTE_ROOT),
            remote_prefix: DEFAULT_REMOTE_PREFIX.to_string(),
            retry: RetryPolicy::default(),
            chunk: ChunkConfig::default(),
            top_k: DEFAULT_TOP_K,
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            debug: false,
        }
    }
}

impl Settings {
    /// 환경변수로 기본값 덮어쓰기
    ///
    /// - `PALANK_KNOWLEDGE_POOL`, `PALANK_VECTOR_STORE`, `PALANK_REMOTE_ROOT`
    /// - `PALANK_RETRY_ATTEMPTS`, `PALANK_RETRY_DELAY_MS`, `PALANK_DEBUG`
    /// - `OPENAI_CHAT_MODEL`, `OPENAI_EMBEDDING_MODEL`, `OPENAI_BASE_URL`
    pub fn from_env() -> Result<Self> {
        let mut settings = Self::default();

        if let Some(dir) = env_value("PALANK_KNOWLEDGE_POOL") {
            settings.knowledge_pool_dir = PathBuf::from(dir);
        }
        if let Some(dir) = env_value("PALANK_VECTOR_STORE") {
            settings.vector_store_dir = PathBuf::from(dir);
        }
        if let Some(dir) = env_value("PALANK_REMOTE_ROOT") {
            settings.remote_root = PathBuf::from(dir);
        }
        if let Some(attempts) = env_value("PALANK_RETRY_ATTEMPTS") {
            settings.retry.max_attempts = attempts
                .parse()
                .with_context(|| format!("Invalid PALANK_RETRY_ATTEMPTS: {}", attempts))?;
        }
        if let Some(delay) = env_value("PALANK_RETRY_DELAY_MS") {
            let millis: u64 = delay
                .parse()
                .with_context(|| format!("Invalid PALANK_RETRY_DELAY_MS: {}", delay))?;
            settings.retry.delay = Duration::from_millis(millis);
        }
        if let Some(flag) = env_value("PALANK_DEBUG") {
            settings.debug = matches!(flag.as_str(), "1" | "true" | "yes" | "on");
        }
        if let Some(model) = env_value("OPENAI_CHAT_MODEL") {
            settings.chat_model = model;
        }
        if let Some(model) = env_value("OPENAI_EMBEDDING_MODEL") {
            settings.embedding_model = model;
        }
        if let Some(url) = env_value("OPENAI_BASE_URL") {
            settings.openai_base_url = url.trim_end_matches('/').to_string();
        }

        Ok(settings)
    }

    /// 모든 경로를 지정된 루트 아래로 (테스트/임시 작업용)
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            knowledge_pool_dir: root.join("productKnowledgePool"),
            vector_store_dir: root.join("vectorStore"),
            remote_root: root.join("remoteStorage"),
            ..Self::default()
        }
    }

    /// 디버그 모드 설정
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = self.debug || debug;
        self
    }

    /// 기본 로그 레벨 (`debug`면 DEBUG, 아니면 INFO)
    pub fn log_level(&self) -> tracing::Level {
        if self.debug {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    /// 제품 문서 폴더
    pub fn product_pool_dir(&self, product_id: &str) -> PathBuf {
        self.knowledge_pool_dir.join(product_id)
    }

    /// 제품 로컬 인덱스 폴더
    pub fn local_index_dir(&self, product_id: &str) -> PathBuf {
        self.vector_store_dir.join(product_id)
    }

    /// 제품 원격 키 prefix (`vectorstores/{id}/`)
    pub fn remote_index_prefix(&self, product_id: &str) -> String {
        format!("{}/{}/", self.remote_prefix, product_id)
    }

    /// 문서/인덱스 루트 디렉토리 생성
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [&self.knowledge_pool_dir, &self.vector_store_dir] {
            if !dir.exists() {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create directory {:?}", dir))?;
                tracing::debug!("Created directory {:?}", dir);
            }
        }
        Ok(())
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

// ============================================================================
// API Key Management
// ============================================================================

/// API 키 로드 (`OPENAI_API_KEY`)
pub fn get_api_key() -> Result<String> {
    if let Some(key) = env_value("OPENAI_API_KEY") {
        tracing::debug!("Using API key from OPENAI_API_KEY");
        return Ok(key);
    }

    anyhow::bail!(
        "API key not found. Set the OPENAI_API_KEY environment variable.\n\
         Get your API key at: https://platform.openai.com/api-keys"
    )
}

/// API 키 존재 여부 확인
pub fn has_api_key() -> bool {
    env_value("OPENAI_API_KEY").is_some()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_follow_layout() {
        let settings = Settings::default();
        assert_eq!(settings.top_k, 15);
        assert_eq!(settings.retry.max_attempts, 3);
        assert_eq!(settings.retry.delay, Duration::from_secs(3));
        assert_eq!(settings.chunk.chunk_size, 1000);
        assert_eq!(settings.chunk.chunk_overlap, 200);
        assert_eq!(
            settings.local_index_dir("p1"),
            PathBuf::from("./vectorStore").join("p1")
        );
        assert_eq!(settings.remote_index_prefix("p1"), "vectorstores/p1/");
    }

    #[test]
    fn test_with_debug_is_sticky() {
        let settings = Settings::default().with_debug(true).with_debug(false);
        assert!(settings.debug);
    }

    #[test]
    fn test_log_level_follows_debug_flag() {
        assert_eq!(Settings::default().log_level(), tracing::Level::INFO);
        assert_eq!(
            Settings::default().with_debug(true).log_level(),
            tracing::Level::DEBUG
        );
    }

    #[test]
    fn test_ensure_directories() {
        let temp_dir = TempDir::new().unwrap();
        let settings = Settings::rooted_at(temp_dir.path());

        settings.ensure_directories().unwrap();
        assert!(settings.knowledge_pool_dir.is_dir());
        assert!(settings.vector_store_dir.is_dir());
    }
}
