//! 디렉토리 기반 버킷
//!
//! `{root}/{key}` 파일로 오브젝트를 저장합니다. 쓰기는 임시 파일에
//! 기록한 뒤 rename 하므로 중간 상태의 오브젝트가 노출되지 않습니다.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use walkdir::WalkDir;

use super::{validate_key, ObjectStore, StorageError};

/// 임시 파일 접미사 (list에서 제외)
const TEMP_SUFFIX: &str = ".partial";

/// 디렉토리 기반 오브젝트 버킷
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
    bucket: String,
}

impl FsObjectStore {
    /// 버킷 열기 (디렉토리가 없으면 생성)
    ///
    /// # Arguments
    /// * `root` - 버킷 디렉토리
    /// * `bucket` - 버킷 이름
    pub fn open(root: impl Into<PathBuf>, bucket: impl Into<String>) -> Result<Self, StorageError> {
        let root = root.into();
        let bucket = bucket.into();

        std::fs::create_dir_all(&root).map_err(|source| StorageError::Io {
            key: bucket.clone(),
            source,
        })?;

        tracing::debug!("Opened bucket '{}' at {:?}", bucket, root);
        Ok(Self { root, bucket })
    }

    /// 버킷 디렉토리
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(key.split('/').fold(self.root.clone(), |path, seg| path.join(seg)))
    }

    /// 비어있는 상위 디렉토리 정리 (버킷 루트 전까지)
    fn prune_empty_parents(&self, path: &Path) {
        let mut current = path.parent();
        while let Some(dir) = current {
            if dir == self.root || !dir.starts_with(&self.root) {
                break;
            }
            // 비어있지 않으면 실패하므로 그대로 중단
            if std::fs::remove_dir(dir).is_err() {
                break;
            }
            current = dir.parent();
        }
    }
}

fn io_error(key: &str, source: std::io::Error) -> StorageError {
    if source.kind() == std::io::ErrorKind::NotFound {
        StorageError::NotFound(key.to_string())
    } else {
        StorageError::Io {
            key: key.to_string(),
            source,
        }
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let root = self.root.clone();
        let prefix = prefix.to_string();

        let keys = tokio::task::spawn_blocking(move || {
            let mut keys = Vec::new();
            for entry in WalkDir::new(&root).min_depth(1) {
                let entry = entry.map_err(|e| StorageError::Io {
                    key: prefix.clone(),
                    source: e.into(),
                })?;

                if !entry.file_type().is_file() {
                    continue;
                }

                let Ok(relative) = entry.path().strip_prefix(&root) else {
                    continue;
                };

                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");

                if key.ends_with(TEMP_SUFFIX) {
                    continue;
                }

                if key.starts_with(&prefix) {
                    keys.push(key);
                }
            }
            keys.sort();
            Ok::<_, StorageError>(keys)
        })
        .await
        .map_err(|e| StorageError::Io {
            key: self.bucket.clone(),
            source: std::io::Error::new(std::io::ErrorKind::Other, e),
        })??;

        Ok(keys)
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), StorageError> {
        let path = self.object_path(key)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(key, e))?;
        }

        let mut temp = path.clone().into_os_string();
        temp.push(TEMP_SUFFIX);
        let temp = PathBuf::from(temp);

        tokio::fs::write(&temp, &data)
            .await
            .map_err(|e| io_error(key, e))?;
        tokio::fs::rename(&temp, &path)
            .await
            .map_err(|e| io_error(key, e))?;

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.object_path(key)?;
        tokio::fs::read(&path).await.map_err(|e| io_error(key, e))
    }

    async fn delete_many(&self, keys: &[String]) -> Result<(), StorageError> {
        for key in keys {
            let path = self.object_path(key)?;
            match tokio::fs::remove_file(&path).await {
                Ok(()) => self.prune_empty_parents(&path),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(io_error(key, e)),
            }
        }
        Ok(())
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }
}
