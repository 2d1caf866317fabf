//! 프롬프트 템플릿
//!
//! 두 단계 모두 `system → 이전 대화 → 현재 질문` 순서로 메시지를 구성합니다.

use crate::llm::ChatMessage;

/// 질문 재작성 시스템 프롬프트
pub const CONTEXTUALIZE_SYSTEM_PROMPT: &str = "Given a chat history and the latest user question \
which might reference context in the chat history, \
formulate a standalone question which can be understood \
without the chat history. Do NOT answer the question, \
just reformulate it if needed and otherwise return it as is.";

/// 답변 생성 시스템 프롬프트 (`{context}` 자리에 검색 결과)
pub const QA_SYSTEM_PROMPT: &str = "You are an assistant for question-answering tasks. \
Use the following pieces of retrieved context to answer \
the question. If you don't know the answer, say that you \
don't know. Use three sentences maximum and keep the \
answer concise.\n\n{context}";

/// 독립 질문 재작성 요청 메시지
pub fn contextualize_messages(history: &[ChatMessage], question: &str) -> Vec<ChatMessage> {
    with_history(ChatMessage::system(CONTEXTUALIZE_SYSTEM_PROMPT), history, question)
}

/// 컨텍스트 기반 답변 요청 메시지
pub fn answer_messages(context: &str, history: &[ChatMessage], question: &str) -> Vec<ChatMessage> {
    let system = QA_SYSTEM_PROMPT.replace("{context}", context);
    with_history(ChatMessage::system(system), history, question)
}

fn with_history(system: ChatMessage, history: &[ChatMessage], question: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(system);
    messages.extend_from_slice(history);
    messages.push(ChatMessage::user(question));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;

    #[test]
    fn test_answer_messages_layout() {
        let history = vec![
            ChatMessage::user("What is the return policy?"),
            ChatMessage::assistant("30 days."),
        ];
        let messages = answer_messages("Returns: 30 days.", &history, "And for electronics?");

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.ends_with("concise.\n\nReturns: 30 days."));
        assert_eq!(messages[1..3], history[..]);
        assert_eq!(messages[3], ChatMessage::user("And for electronics?"));
    }

    #[test]
    fn test_contextualize_messages_without_history() {
        let messages = contextualize_messages(&[], "Hi");
        assert_eq!(messages.len(), 2);
        assert!(messages[0].content.starts_with("Given a chat history"));
    }
}
