//! Conversational RAG ChatBot
//!
//! 제품 하나의 벡터 인덱스에 대해 대화형 질의응답을 수행합니다.
//!
//! 1. 질문 재작성: 이전 대화가 있으면 최신 질문을 독립 질문으로 바꿈
//! 2. 검색 + 답변: 재작성된 질문으로 상위 k개 청크를 찾고, 그 컨텍스트로
//!    답변을 스트리밍
//!
//! 인덱스 정리는 명시적 호출로만 일어납니다.
//! - `close`: 핸들 해제 + 내려받은 로컬 사본 삭제
//! - `teardown`: 원격과 로컬 인덱스 모두 삭제

mod history;
mod prompts;

use std::pin::Pin;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use thiserror::Error;

use crate::knowledge::{join_passages, IndexRetriever, Retriever, VectorIndex};
use crate::llm::ChatModel;
use crate::sync::{SyncError, VectorStoreSync};

pub use history::{ChatHistory, ChatTurn, HistoryStore, DEFAULT_SESSION};
pub use prompts::{CONTEXTUALIZE_SYSTEM_PROMPT, QA_SYSTEM_PROMPT};

// ============================================================================
// Types
// ============================================================================

/// 인덱스를 가져올 위치
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexSource {
    /// 원격 버킷에서 내려받기 (운영)
    #[default]
    Remote,
    /// 로컬 디렉토리만 사용 (디버그)
    Local,
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Vector store could not be loaded for {0}")]
    IndexUnavailable(String),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("Retrieval failed: {0:#}")]
    Retrieval(anyhow::Error),

    #[error("Generation failed: {0:#}")]
    Generation(anyhow::Error),
}

/// 답변 조각 스트림
pub type AnswerStream = Pin<Box<dyn Stream<Item = Result<String, ChatError>> + Send>>;

// ============================================================================
// ChatBot
// ============================================================================

pub struct ChatBot {
    product_id: String,
    retriever: Arc<dyn Retriever>,
    llm: Arc<dyn ChatModel>,
    history: HistoryStore,
    index: Option<Arc<VectorIndex>>,
    sync: Option<Arc<VectorStoreSync>>,
    source: IndexSource,
}

impl ChatBot {
    /// 제품 인덱스를 가져와 챗봇 생성
    ///
    /// 인덱스를 얻지 못하면 `ChatError::IndexUnavailable`.
    pub async fn connect(
        sync: Arc<VectorStoreSync>,
        llm: Arc<dyn ChatModel>,
        product_id: &str,
        source: IndexSource,
    ) -> Result<Self, ChatError> {
        let index = match source {
            IndexSource::Remote => sync.get(product_id).await?,
            IndexSource::Local => {
                tracing::warn!("Using local vector store, this is only for debug purposes");
                sync.get_local(product_id).await?
            }
        };

        let Some(index) = index else {
            tracing::warn!("Vector store could not be loaded for {}", product_id);
            return Err(ChatError::IndexUnavailable(product_id.to_string()));
        };

        let index = Arc::new(index);
        let retriever = Arc::new(IndexRetriever::new(index.clone(), sync.settings().top_k));
        tracing::info!("ChatBot ready for {} ({})", product_id, llm.name());

        Ok(Self {
            product_id: product_id.to_string(),
            retriever,
            llm,
            history: HistoryStore::new(),
            index: Some(index),
            sync: Some(sync),
            source,
        })
    }

    /// 임의의 리트리버로 생성 (인덱스 수명 관리 없음)
    pub fn with_retriever(
        product_id: &str,
        retriever: Arc<dyn Retriever>,
        llm: Arc<dyn ChatModel>,
    ) -> Self {
        Self {
            product_id: product_id.to_string(),
            retriever,
            llm,
            history: HistoryStore::new(),
            index: None,
            sync: None,
            source: IndexSource::Local,
        }
    }

    pub fn product_id(&self) -> &str {
        &self.product_id
    }

    /// 세션 기록 스냅샷
    pub fn history(&self, session_id: &str) -> ChatHistory {
        self.history.get(session_id)
    }

    /// 기본 세션으로 질문
    pub async fn ask(&self, question: &str) -> Result<AnswerStream, ChatError> {
        self.ask_in_session(DEFAULT_SESSION, question).await
    }

    /// 지정 세션으로 질문
    ///
    /// 스트림에는 최종 답변 조각만 흐르며, 스트림이 끝까지 소비되면
    /// 해당 턴이 세션 기록에 추가됩니다.
    pub async fn ask_in_session(
        &self,
        session_id: &str,
        question: &str,
    ) -> Result<AnswerStream, ChatError> {
        let history = self.history.get(session_id).to_messages();

        let query = if history.is_empty() {
            question.to_string()
        } else {
            let rewritten = self
                .llm
                .complete(&prompts::contextualize_messages(&history, question))
                .await
                .map_err(ChatError::Generation)?;
            let rewritten = rewritten.trim();
            tracing::debug!("Rewrote {:?} as {:?}", question, rewritten);
            if rewritten.is_empty() {
                question.to_string()
            } else {
                rewritten.to_string()
            }
        };

        let passages = self
            .retriever
            .retrieve(&query)
            .await
            .map_err(ChatError::Retrieval)?;
        let context = join_passages(&passages);

        let mut tokens = self
            .llm
            .stream(&prompts::answer_messages(&context, &history, question))
            .await
            .map_err(ChatError::Generation)?;

        let store = self.history.clone();
        let session_id = session_id.to_string();
        let question = question.to_string();

        let stream = async_stream::stream! {
            let mut answer = String::new();
            let mut failed = false;

            while let Some(token) = tokens.next().await {
                match token {
                    Ok(token) => {
                        answer.push_str(&token);
                        yield Ok::<String, ChatError>(token);
                    }
                    Err(e) => {
                        failed = true;
                        yield Err(ChatError::Generation(e));
                        break;
                    }
                }
            }

            if !failed {
                store.append(&session_id, ChatTurn::new(question, answer));
            }
        };

        Ok(Box::pin(stream))
    }

    /// 세션 종료: 인덱스 핸들을 놓고 내려받은 로컬 사본 삭제
    ///
    /// 로컬 전용(`IndexSource::Local`) 인덱스는 지우지 않습니다.
    pub async fn close(self) -> Result<bool, ChatError> {
        let ChatBot {
            product_id,
            retriever,
            index,
            sync,
            source,
            ..
        } = self;
        drop(retriever);
        drop(index);

        match (sync, source) {
            (Some(sync), IndexSource::Remote) => {
                let removed = sync.delete_local(&product_id).await?;
                tracing::debug!("Closed ChatBot for {} (local copy removed: {})", product_id, removed);
                Ok(removed)
            }
            _ => Ok(true),
        }
    }

    /// 제품 인덱스 완전 삭제 (원격 + 로컬)
    pub async fn teardown(self) -> Result<bool, ChatError> {
        let ChatBot {
            product_id,
            retriever,
            index,
            sync,
            ..
        } = self;
        drop(retriever);
        drop(index);

        let Some(sync) = sync else {
            return Ok(true);
        };

        let remote_deleted = sync.delete(&product_id).await?;
        let local_deleted = sync.delete_local(&product_id).await?;
        tracing::info!(
            "Deleted vector store for {} (remote: {}, local: {})",
            product_id,
            remote_deleted,
            local_deleted
        );
        Ok(remote_deleted && local_deleted)
    }
}

// ============================================================================
// Tests
// ============================================================================
