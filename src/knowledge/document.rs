//! Knowledge Document - 청킹 전 정규화된 문서 단위

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 문서 메타데이터 (source, page, start_index ...)
pub type Metadata = Map<String, Value>;

/// 정규화된 문서 (페이지, 문단, 시트 등)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeDocument {
    /// 본문 텍스트
    pub text: String,
    /// 메타데이터
    pub metadata: Metadata,
}

impl KnowledgeDocument {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            metadata: Metadata::new(),
        }
    }

    /// 메타데이터 추가 (builder)
    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// 원본 파일 경로
    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").and_then(Value::as_str)
    }

    /// 원본 문서 내 시작 오프셋 (문자 단위)
    pub fn start_index(&self) -> Option<i64> {
        self.metadata.get("start_index").and_then(Value::as_i64)
    }
}

/// 인덱스가 저장할 수 없는 메타데이터 제거
///
/// 문자열, 숫자, 불리언만 남기고 null, 배열, 객체 값은 버립니다.
pub fn filter_complex_metadata(documents: Vec<KnowledgeDocument>) -> Vec<KnowledgeDocument> {
    documents
        .into_iter()
        .map(|mut doc| {
            doc.metadata.retain(|key, value| {
                let keep = matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_));
                if !keep {
                    tracing::debug!("Dropping unsupported metadata '{}'", key);
                }
                keep
            });
            doc
        })
        .collect()
}
