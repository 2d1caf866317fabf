//! 세션별 대화 기록
//!
//! 세션 id → `ChatHistory` 매핑을 메모리에만 보관합니다. 프로세스가
//! 종료되면 기록도 사라집니다.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};

use crate::llm::ChatMessage;

/// 세션 id를 지정하지 않을 때 쓰는 세션
pub const DEFAULT_SESSION: &str = "default";

/// 질문/답변 한 턴
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub question: String,
    pub answer: String,
    pub asked_at: DateTime<Utc>,
}

impl ChatTurn {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            asked_at: Utc::now(),
        }
    }
}

/// 한 세션의 대화 기록
#[derive(Debug, Clone, Default)]
pub struct ChatHistory {
    turns: Vec<ChatTurn>,
}

impl ChatHistory {
    pub fn push(&mut self, turn: ChatTurn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// user/assistant 메시지 쌍으로 변환
    pub fn to_messages(&self) -> Vec<ChatMessage> {
        self.turns
            .iter()
            .flat_map(|turn| {
                [
                    ChatMessage::user(turn.question.clone()),
                    ChatMessage::assistant(turn.answer.clone()),
                ]
            })
            .collect()
    }
}

/// 세션별 기록 저장소 (복제본은 같은 저장소를 공유)
#[derive(Debug, Clone, Default)]
pub struct HistoryStore {
    sessions: Arc<Mutex<HashMap<String, ChatHistory>>>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 세션 기록 스냅샷 (없는 세션은 빈 기록, 저장소는 바뀌지 않음)
    pub fn get(&self, session_id: &str) -> ChatHistory {
        let sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions.get(session_id).cloned().unwrap_or_default()
    }

    pub fn append(&self, session_id: &str, turn: ChatTurn) {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions.entry(session_id.to_string()).or_default().push(turn);
    }

    /// 알려진 세션 id (정렬됨)
    pub fn sessions(&self) -> Vec<String> {
        let sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<String> = sessions.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sessions_are_isolated() {
        let store = HistoryStore::new();
        store.append("a", ChatTurn::new("q1", "a1"));
        store.append("a", ChatTurn::new("q2", "a2"));
        store.append("b", ChatTurn::new("q3", "a3"));

        assert_eq!(store.get("a").len(), 2);
        assert_eq!(store.get("b").len(), 1);
        assert_eq!(store.sessions(), vec!["a", "b"]);
    }

    #[test]
    fn test_reading_unknown_session_does_not_create_it() {
        let store = HistoryStore::new();
        assert!(store.get("c").is_empty());
        assert!(store.get(DEFAULT_SESSION).is_empty());
        assert!(store.sessions().is_empty());

        store.append("c", ChatTurn::new("q", "a"));
        assert_eq!(store.sessions(), vec!["c"]);
    }

    #[test]
    fn test_to_messages_alternates_roles() {
        let mut history = ChatHistory::default();
        history.push(ChatTurn::new("What is the return policy?", "30 days."));

        assert_eq!(
            history.to_messages(),
            vec![
                ChatMessage::user("What is the return policy?"),
                ChatMessage::assistant("30 days."),
            ]
        );
    }

    #[test]
    fn test_clones_share_sessions() {
        let store = HistoryStore::new();
        let clone = store.clone();
        clone.append(DEFAULT_SESSION, ChatTurn::new("q", "a"));
        assert_eq!(store.get(DEFAULT_SESSION).len(), 1);
    }
}
