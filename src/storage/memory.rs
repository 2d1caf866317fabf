//! 프로세스 내 버킷
//!
//! 테스트와 드라이런용 버킷입니다. 장애 주입으로 업로드 중간 실패나
//! 일시적인 list 실패를 재현할 수 있습니다.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{validate_key, ObjectStore, StorageError};

/// 장애 주입 설정
#[derive(Debug, Default)]
struct FailurePlan {
    /// 이 횟수만큼 put이 성공한 뒤부터 모든 put 실패
    puts_before_failure: Option<usize>,
    /// 남은 list 실패 횟수
    failing_lists: usize,
}

/// 메모리 버킷
#[derive(Debug)]
pub struct MemoryObjectStore {
    bucket: String,
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    plan: Mutex<FailurePlan>,
    successful_puts: AtomicUsize,
    put_calls: AtomicUsize,
    list_calls: AtomicUsize,
}

impl MemoryObjectStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: Mutex::new(BTreeMap::new()),
            plan: Mutex::new(FailurePlan::default()),
            successful_puts: AtomicUsize::new(0),
            put_calls: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
        }
    }

    /// `n`번의 put 성공 이후 모든 put을 실패시킴
    pub async fn fail_puts_after(&self, n: usize) {
        self.plan.lock().await.puts_before_failure = Some(n);
    }

    /// 다음 `times`번의 list를 실패시킴
    pub async fn fail_next_lists(&self, times: usize) {
        self.plan.lock().await.failing_lists = times;
    }

    /// 장애 주입 해제
    pub async fn clear_failures(&self) {
        *self.plan.lock().await = FailurePlan::default();
    }

    /// 저장된 오브젝트 수
    pub async fn len(&self) -> usize {
        self.objects.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.lock().await.is_empty()
    }

    /// put 호출 횟수 (실패 포함)
    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    /// list 호출 횟수 (실패 포함)
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        {
            let mut plan = self.plan.lock().await;
            if plan.failing_lists > 0 {
                plan.failing_lists -= 1;
                return Err(StorageError::Injected(format!("list {}", prefix)));
            }
        }

        let objects = self.objects.lock().await;
        Ok(objects
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), StorageError> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        validate_key(key)?;

        if let Some(limit) = self.plan.lock().await.puts_before_failure {
            if self.successful_puts.load(Ordering::SeqCst) >= limit {
                return Err(StorageError::Injected(format!("put {}", key)));
            }
        }

        self.objects.lock().await.insert(key.to_string(), data);
        self.successful_puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        validate_key(key)?;
        self.objects
            .lock()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn delete_many(&self, keys: &[String]) -> Result<(), StorageError> {
        let mut objects = self.objects.lock().await;
        for key in keys {
            objects.remove(key);
        }
        Ok(())
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_failure_injection() {
        let store = MemoryObjectStore::new("test");
        store.fail_puts_after(1).await;

        assert!(store.put("k/1", vec![1]).await.is_ok());
        assert!(matches!(
            store.put("k/2", vec![2]).await,
            Err(StorageError::Injected(_))
        ));
        assert_eq!(store.len().await, 1);
        assert_eq!(store.put_calls(), 2);

        store.clear_failures().await;
        assert!(store.put("k/2", vec![2]).await.is_ok());
    }

    #[tokio::test]
    async fn test_list_failure_injection() {
        let store = MemoryObjectStore::new("test");
        store.put("k/1", vec![1]).await.unwrap();
        store.fail_next_lists(2).await;

        assert!(store.list("k/").await.is_err());
        assert!(store.list("k/").await.is_err());
        assert_eq!(store.list("k/").await.unwrap(), vec!["k/1".to_string()]);
        assert_eq!(store.list_calls(), 3);
    }
}
