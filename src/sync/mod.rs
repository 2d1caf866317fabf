//! Vector Store Synchronizer
//!
//! 제품별 벡터 인덱스를 로컬 디렉토리와 원격 버킷 사이에서 동기화합니다.
//!
//! - build: 지식 풀 → 청킹 → 임베딩 → 로컬 인덱스 → 업로드 → 로컬 삭제
//! - get: 로컬 삭제 → 다운로드 → 인덱스 열기
//! - exists / delete: 원격 prefix 조회 / 삭제
//! - delete_local: 로컬 디렉토리 삭제
//!
//! 원격 호출은 모두 `RetryPolicy`로 감싸며, 재시도를 모두 소진한 실패는
//! `false`/`None` 결과로 바뀝니다. 같은 제품 id에 대한 로컬 디렉토리
//! 작업은 id별 async 락으로 직렬화됩니다.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use thiserror::Error;
use walkdir::WalkDir;

use crate::config::Settings;
use crate::embedding::EmbeddingProvider;
use crate::knowledge::{filter_complex_metadata, recursive_chunker, Chunker, VectorIndex};
use crate::loader::{DocumentLoader, LoaderError};
use crate::storage::{FsObjectStore, ObjectStore, StorageError};

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Remote storage not initialized, call init_remote_storage(bucket) first")]
    NotInitialized,

    #[error("Invalid product id: {0:?}")]
    InvalidProductId(String),

    #[error(transparent)]
    Loader(#[from] LoaderError),

    #[error("Failed to build vector index for {id}: {reason:#}")]
    Index { id: String, reason: anyhow::Error },

    #[error("Remote storage error: {0}")]
    Storage(#[from] StorageError),
}

/// 제품 id 검증 (경로 구성 요소 하나여야 함)
fn validate_product_id(id: &str) -> Result<(), SyncError> {
    if id.is_empty() || id == "." || id == ".." || id.contains(&['/', '\\'][..]) {
        return Err(SyncError::InvalidProductId(id.to_string()));
    }
    Ok(())
}

// ============================================================================
// VectorStoreSync
// ============================================================================

/// 벡터 인덱스 동기화기
pub struct VectorStoreSync {
    settings: Settings,
    loader: DocumentLoader,
    chunker: Box<dyn Chunker>,
    embedder: Arc<dyn EmbeddingProvider>,
    remote: RwLock<Option<Arc<dyn ObjectStore>>>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl VectorStoreSync {
    /// # Arguments
    /// * `settings` - 경로, 재시도, 청킹 설정
    /// * `embedder` - 인덱스 생성과 검색에 쓰일 임베딩 프로바이더
    pub fn new(settings: Settings, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            loader: DocumentLoader::new(settings.knowledge_pool_dir.clone()),
            chunker: recursive_chunker(settings.chunk.clone()),
            settings,
            embedder,
            remote: RwLock::new(None),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn embedder(&self) -> Arc<dyn EmbeddingProvider> {
        self.embedder.clone()
    }

    /// 원격 버킷 초기화 (`{remote_root}/{bucket}` 디렉토리)
    pub fn init_remote_storage(&self, bucket: &str) -> Result<(), SyncError> {
        crate::storage::validate_key(bucket)?;
        if bucket.contains('/') {
            return Err(StorageError::InvalidKey(format!("Bucket name: {}", bucket)).into());
        }

        let store = FsObjectStore::open(self.settings.remote_root.join(bucket), bucket)?;
        tracing::info!("Remote storage initialized (bucket: {})", bucket);
        self.set_remote_store(Arc::new(store));
        Ok(())
    }

    /// 임의의 버킷 구현 주입
    pub fn set_remote_store(&self, store: Arc<dyn ObjectStore>) {
        *self.remote.write().unwrap_or_else(PoisonError::into_inner) = Some(store);
    }

    fn remote(&self) -> Result<Arc<dyn ObjectStore>, SyncError> {
        self.remote
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(SyncError::NotInitialized)
    }

    /// 제품 id별 락
    fn lock_for(&self, id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(id.to_string()).or_default().clone()
    }

    // ========================================================================
    // Public Operations
    // ========================================================================

    /// 인덱스를 만들어 업로드
    ///
    /// 업로드가 어느 파일에서든 실패하면 원격과 로컬을 모두 지우고
    /// `Ok(false)`를 반환합니다. 성공 시에도 로컬 사본은 삭제됩니다.
    pub async fn build(&self, id: &str) -> Result<bool, SyncError> {
        validate_product_id(id)?;
        let remote = self.remote()?;

        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        tracing::info!("Building vector store for {}", id);
        self.remove_local(id).await;

        let index_dir = match self.build_local(id).await {
            Ok(dir) => dir,
            Err(e) => {
                self.remove_local(id).await;
                return Err(e);
            }
        };

        let uploaded = self.upload(remote.as_ref(), id, &index_dir).await;
        self.remove_local(id).await;

        if uploaded {
            tracing::info!("Vector store for {} uploaded", id);
        } else {
            tracing::warn!("Vector store for {} could not be uploaded", id);
        }
        Ok(uploaded)
    }

    /// 원격 인덱스를 내려받아 열기
    ///
    /// 원격 사본이 없거나 다운로드/열기에 실패하면 `Ok(None)`.
    pub async fn get(&self, id: &str) -> Result<Option<VectorIndex>, SyncError> {
        validate_product_id(id)?;
        let remote = self.remote()?;

        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        if !self.download(remote.as_ref(), id).await {
            return Ok(None);
        }
        Ok(self.open_local(id).await)
    }

    /// 로컬 인덱스만 열기 (원격 동기화 없음, 디버그용)
    pub async fn get_local(&self, id: &str) -> Result<Option<VectorIndex>, SyncError> {
        validate_product_id(id)?;

        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        tracing::debug!("Opening local vector store for {} (debug only, use remote in production)", id);
        Ok(self.open_local(id).await)
    }

    /// 원격 인덱스 존재 여부
    pub async fn exists(&self, id: &str) -> Result<bool, SyncError> {
        validate_product_id(id)?;
        let remote = self.remote()?;
        let remote = remote.as_ref();
        let prefix = self.settings.remote_index_prefix(id);
        let prefix = prefix.as_str();

        let listed = self
            .settings
            .retry
            .run("List vector store", move || remote.list(prefix))
            .await;

        Ok(matches!(listed, Ok(keys) if !keys.is_empty()))
    }

    /// 원격 인덱스 삭제 (없으면 성공)
    pub async fn delete(&self, id: &str) -> Result<bool, SyncError> {
        validate_product_id(id)?;
        let remote = self.remote()?;

        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        Ok(self.clear_remote(remote.as_ref(), id).await)
    }

    /// 로컬 인덱스 디렉토리 삭제
    ///
    /// `VectorIndex` 핸들은 호출자가 소유하며 여기서 추적하지 않습니다.
    /// 열린 핸들이 있어도 디렉토리는 지워지고, 그 핸들로는 더 이상 검색할 수
    /// 없습니다. `ChatBot::close`는 핸들을 먼저 놓은 뒤 이 함수를 부릅니다.
    pub async fn delete_local(&self, id: &str) -> Result<bool, SyncError> {
        validate_product_id(id)?;

        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        Ok(self.remove_local(id).await)
    }

    // ========================================================================
    // Steps (호출자가 id 락을 잡고 있어야 함)
    // ========================================================================

    /// 지식 풀에서 로컬 인덱스 생성
    async fn build_local(&self, id: &str) -> Result<PathBuf, SyncError> {
        let documents = self.loader.load(id).await?;
        if documents.is_empty() {
            tracing::debug!("No documents found!");
        }

        let chunks = filter_complex_metadata(self.chunker.split_documents(&documents));
        tracing::debug!(
            "{} documents split into {} chunks ({})",
            documents.len(),
            chunks.len(),
            self.chunker.name()
        );

        let path = self.settings.local_index_dir(id);
        VectorIndex::create(&path, &chunks, self.embedder.clone())
            .await
            .map_err(|reason| SyncError::Index {
                id: id.to_string(),
                reason,
            })?;

        Ok(path)
    }

    /// 로컬 인덱스 열기 (실패 시 None)
    async fn open_local(&self, id: &str) -> Option<VectorIndex> {
        let path = self.settings.local_index_dir(id);
        if !path.exists() {
            return None;
        }

        match VectorIndex::open(&path, self.embedder.clone()).await {
            Ok(index) => Some(index),
            Err(e) => {
                tracing::debug!("Vector store could not be loaded: {:#}", e);
                None
            }
        }
    }

    /// 로컬 디렉토리 삭제
    async fn remove_local(&self, id: &str) -> bool {
        let path = self.settings.local_index_dir(id);
        if !path.exists() {
            return true;
        }

        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => {
                tracing::debug!("Deleted local vector store {:?}", path);
                true
            }
            Err(e) => {
                tracing::debug!("ERROR: failed to delete {:?}: {}", path, e);
                false
            }
        }
    }

    /// 원격 prefix 아래 모든 오브젝트 삭제 (재시도 포함)
    async fn clear_remote(&self, remote: &dyn ObjectStore, id: &str) -> bool {
        let prefix = self.settings.remote_index_prefix(id);
        let prefix = prefix.as_str();

        self.settings
            .retry
            .run("Delete vector store", move || delete_prefix(remote, prefix))
            .await
            .is_ok()
    }

    /// 로컬 인덱스 트리를 원격으로 업로드
    ///
    /// 기존 원격 사본을 먼저 지우고 파일 단위로 올립니다.
    async fn upload(&self, remote: &dyn ObjectStore, id: &str, dir: &Path) -> bool {
        if !self.clear_remote(remote, id).await {
            tracing::debug!("Could not clear previous vector store for {}", id);
            return false;
        }

        let prefix = self.settings.remote_index_prefix(id);
        tracing::debug!("Uploading vector store for {} to {}/{}", id, remote.bucket(), prefix);
        let files = match relative_files(dir).await {
            Ok(files) => files,
            Err(e) => {
                tracing::debug!("ERROR: {}", e);
                return false;
            }
        };

        for (path, relative) in files {
            let key = format!("{}{}", prefix, relative);
            tracing::debug!("Uploading {:?} to {}", path, key);

            let uploaded = match tokio::fs::read(&path).await {
                Ok(data) => {
                    let key = key.as_str();
                    let data = &data;
                    self.settings
                        .retry
                        .run("Upload", move || remote.put(key, data.clone()))
                        .await
                        .is_ok()
                }
                Err(e) => {
                    tracing::debug!("ERROR: failed to read {:?}: {}", path, e);
                    false
                }
            };

            if !uploaded {
                tracing::debug!(
                    "Failed to upload {}, causing the whole vectorstore to fail",
                    relative
                );
                tracing::debug!("Deleting vectorstore {} for both local and remote storage", id);
                self.clear_remote(remote, id).await;
                self.remove_local(id).await;
                return false;
            }
        }

        true
    }

    /// 원격 인덱스를 로컬로 다운로드
    ///
    /// 시작 전과 모든 시도 실패 후에 로컬 사본을 지웁니다.
    async fn download(&self, remote: &dyn ObjectStore, id: &str) -> bool {
        self.remove_local(id).await;

        let prefix = self.settings.remote_index_prefix(id);
        let prefix = prefix.as_str();
        let local_dir = self.settings.local_index_dir(id);
        let local_dir = local_dir.as_path();

        let result = self
            .settings
            .retry
            .run("Download vector store", move || {
                download_prefix(remote, prefix, local_dir)
            })
            .await;

        match result {
            Ok(true) => true,
            Ok(false) => {
                tracing::debug!("No vectorstore found for {}, cannot download", id);
                false
            }
            Err(_) => {
                tracing::debug!("Failed to download vectorstore, deleting local copy");
                self.remove_local(id).await;
                false
            }
        }
    }
}

// ============================================================================
// Remote Helpers (단일 시도)
// ============================================================================

async fn delete_prefix(remote: &dyn ObjectStore, prefix: &str) -> Result<(), StorageError> {
    let keys = remote.list(prefix).await?;
    if keys.is_empty() {
        tracing::debug!("No vectorstore found under {}, nothing to delete", prefix);
        return Ok(());
    }

    for key in &keys {
        tracing::debug!("Deleting {}", key);
    }
    remote.delete_many(&keys).await
}

/// prefix 아래 오브젝트를 로컬 디렉토리에 같은 트리로 기록
///
/// 원격에 아무것도 없으면 `Ok(false)`.
async fn download_prefix(
    remote: &dyn ObjectStore,
    prefix: &str,
    local_dir: &Path,
) -> Result<bool, StorageError> {
    let keys = remote.list(prefix).await?;
    if keys.is_empty() {
        return Ok(false);
    }

    for key in &keys {
        let relative = key.strip_prefix(prefix).unwrap_or(key);
        let target = relative
            .split('/')
            .filter(|s| !s.is_empty())
            .fold(local_dir.to_path_buf(), |path, seg| path.join(seg));

        tracing::debug!("Downloading {} to {:?}", key, target);
        let data = remote.get(key).await?;

        let io_error = |source: std::io::Error| StorageError::Io {
            key: key.clone(),
            source,
        };
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
        }
        tokio::fs::write(&target, data).await.map_err(io_error)?;
    }

    Ok(true)
}

/// 디렉토리 아래 모든 파일과 `/`로 연결한 상대 경로 (정렬됨)
async fn relative_files(dir: &Path) -> anyhow::Result<Vec<(PathBuf, String)>> {
    let dir = dir.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let mut files = Vec::new();
        for entry in WalkDir::new(&dir).min_depth(1).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&dir)?
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            files.push((entry.path().to_path_buf(), relative));
        }
        Ok::<_, anyhow::Error>(files)
    })
    .await?
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryObjectStore, RetryPolicy};
    use crate::testing::StubEmbedding;
    use tempfile::TempDir;

    struct Fixture {
        _temp_dir: TempDir,
        sync: VectorStoreSync,
        store: Arc<MemoryObjectStore>,
    }

    fn fixture() -> Fixture {
        let temp_dir = TempDir::new().unwrap();
        let mut settings = Settings::rooted_at(temp_dir.path());
        settings.retry = RetryPolicy::immediate(3);

        let pool = settings.product_pool_dir("p1");
        std::fs::create_dir_all(&pool).unwrap();
        let text = (0..400)
            .map(|i| format!("Sentence {} about the pump.", i))
            .collect::<Vec<_>>()
            .join(" ");
        std::fs::write(pool.join("notes.txt"), text).unwrap();
        std::fs::write(pool.join("faq.txt"), "Returns are accepted for 30 days.").unwrap();

        let sync = VectorStoreSync::new(settings, Arc::new(StubEmbedding::new()));
        let store = Arc::new(MemoryObjectStore::new("test"));
        sync.set_remote_store(store.clone());

        Fixture {
            _temp_dir: temp_dir,
            sync,
            store,
        }
    }

    #[tokio::test]
    async fn test_never_built_is_absent() {
        let f = fixture();
        assert!(!f.sync.exists("p1").await.unwrap());
        assert!(f.sync.get("p1").await.unwrap().is_none());
        assert!(!f.sync.settings().local_index_dir("p1").exists());
    }

    #[tokio::test]
    async fn test_build_exists_delete() {
        let f = fixture();

        assert!(f.sync.build("p1").await.unwrap());
        assert!(f.sync.exists("p1").await.unwrap());
        assert!(!f.store.is_empty().await);

        // 업로드 후 로컬 사본은 남지 않음
        assert!(!f.sync.settings().local_index_dir("p1").exists());

        assert!(f.sync.delete("p1").await.unwrap());
        assert!(!f.sync.exists("p1").await.unwrap());
        assert!(f.store.is_empty().await);
    }

    #[tokio::test]
    async fn test_delete_missing_is_success() {
        let f = fixture();
        assert!(f.sync.delete("never-built").await.unwrap());
    }

    #[tokio::test]
    async fn test_upload_failure_leaves_nothing_behind() {
        let f = fixture();
        f.store.fail_puts_after(1).await;

        assert!(!f.sync.build("p1").await.unwrap());

        f.store.clear_failures().await;
        assert!(!f.sync.exists("p1").await.unwrap());
        assert!(f.store.is_empty().await);
        assert!(!f.sync.settings().local_index_dir("p1").exists());

        // 1번 성공 + 실패한 파일 3회 시도
        assert_eq!(f.store.put_calls(), 4);
    }

    #[tokio::test]
    async fn test_get_downloads_and_opens() {
        let f = fixture();
        assert!(f.sync.build("p1").await.unwrap());

        let index = f.sync.get("p1").await.unwrap().unwrap();
        assert!(index.count().await.unwrap() > 1);
        assert!(f.sync.settings().local_index_dir("p1").is_dir());

        let results = index
            .similarity_search("Returns are accepted for 30 days.", 3)
            .await
            .unwrap();
        assert_eq!(results[0].text, "Returns are accepted for 30 days.");

        drop(index);
        assert!(f.sync.delete_local("p1").await.unwrap());
        assert!(!f.sync.settings().local_index_dir("p1").exists());
    }

    #[tokio::test]
    async fn test_delete_local_with_open_handle() {
        let f = fixture();
        assert!(f.sync.build("p1").await.unwrap());

        let index = f.sync.get("p1").await.unwrap().unwrap();
        assert!(f.sync.delete_local("p1").await.unwrap());
        assert!(!index.path().exists());
        drop(index);

        // 원격 사본은 그대로이므로 다시 내려받을 수 있음
        let index = f.sync.get("p1").await.unwrap().unwrap();
        assert!(index.count().await.unwrap() > 1);
    }

    #[tokio::test]
    async fn test_get_local_without_remote() {
        let f = fixture();
        assert!(f.sync.get_local("p1").await.unwrap().is_none());

        assert!(f.sync.build("p1").await.unwrap());
        assert!(f.sync.get("p1").await.unwrap().is_some());
        assert!(f.sync.get_local("p1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_exists_retries_list_failures() {
        let f = fixture();
        assert!(f.sync.build("p1").await.unwrap());

        let before = f.store.list_calls();
        f.store.fail_next_lists(2).await;
        assert!(f.sync.exists("p1").await.unwrap());
        assert_eq!(f.store.list_calls() - before, 3);

        let before = f.store.list_calls();
        f.store.fail_next_lists(3).await;
        assert!(!f.sync.exists("p1").await.unwrap());
        assert_eq!(f.store.list_calls() - before, 3);
    }

    #[tokio::test]
    async fn test_get_failure_cleans_local_copy() {
        let f = fixture();
        assert!(f.sync.build("p1").await.unwrap());

        f.store.fail_next_lists(3).await;
        assert!(f.sync.get("p1").await.unwrap().is_none());
        assert!(!f.sync.settings().local_index_dir("p1").exists());
    }

    #[tokio::test]
    async fn test_not_initialized() {
        let temp_dir = TempDir::new().unwrap();
        let sync = VectorStoreSync::new(
            Settings::rooted_at(temp_dir.path()),
            Arc::new(StubEmbedding::new()),
        );

        assert!(matches!(sync.exists("p1").await, Err(SyncError::NotInitialized)));
        assert!(matches!(sync.build("p1").await, Err(SyncError::NotInitialized)));
        assert!(matches!(sync.get("p1").await, Err(SyncError::NotInitialized)));
        assert!(matches!(sync.delete("p1").await, Err(SyncError::NotInitialized)));

        // 로컬 전용 연산은 원격 없이 동작
        assert!(sync.delete_local("p1").await.unwrap());
    }

    #[tokio::test]
    async fn test_invalid_product_ids() {
        let f = fixture();
        for id in ["", "..", "a/b", "a\\b"] {
            assert!(matches!(
                f.sync.exists(id).await,
                Err(SyncError::InvalidProductId(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_build_missing_pool() {
        let f = fixture();
        let result = f.sync.build("no-pool").await;
        assert!(matches!(
            result,
            Err(SyncError::Loader(LoaderError::PoolNotFound { .. }))
        ));
        assert!(!f.sync.settings().local_index_dir("no-pool").exists());
    }

    #[tokio::test]
    async fn test_build_empty_pool() {
        let f = fixture();
        std::fs::create_dir_all(f.sync.settings().product_pool_dir("empty")).unwrap();

        assert!(f.sync.build("empty").await.unwrap());
        let index = f.sync.get("empty").await.unwrap().unwrap();
        assert_eq!(index.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_builds_same_id() {
        let f = fixture();

        let (a, b) = tokio::join!(f.sync.build("p1"), f.sync.build("p1"));
        assert!(a.unwrap());
        assert!(b.unwrap());

        assert!(f.sync.exists("p1").await.unwrap());
        assert!(f.sync.get("p1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_init_remote_storage_uses_bucket_directory() {
        let f = fixture();
        f.sync.init_remote_storage("products").unwrap();

        assert!(f.sync.build("p1").await.unwrap());

        let bucket_dir = f.sync.settings().remote_root.join("products");
        assert!(bucket_dir.join("vectorstores").join("p1").is_dir());
        assert!(f.sync.exists("p1").await.unwrap());

        assert!(f.sync.init_remote_storage("a/b").is_err());
    }
}
