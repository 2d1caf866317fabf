//! Text Chunking Module
//!
//! 재귀 문자 분할을 제공합니다.
//! 문단 → 줄 → 단어 → 문자 순서로 구분자를 낮춰가며 최대 크기 이하의
//! 청크를 만들고, 인접 청크 사이에 오버랩을 둡니다.
//! 길이는 모두 문자(char) 수 기준입니다.

use std::collections::VecDeque;

use super::document::KnowledgeDocument;

/// 구분자 우선순위
const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkConfig {
    /// 최대 청크 크기 (문자 수)
    pub chunk_size: usize,
    /// 오버랩 크기 (문자 수)
    pub chunk_overlap: usize,
    /// 원본 내 시작 오프셋을 `start_index` 메타데이터로 기록
    pub add_start_index: bool,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            add_start_index: true,
        }
    }
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크로 분할
    fn chunk(&self, text: &str) -> Vec<String>;

    /// 청커 설정
    fn config(&self) -> &ChunkConfig;

    /// 청커 이름
    fn name(&self) -> &'static str;

    /// 문서 목록 분할
    ///
    /// 각 청크는 원본 메타데이터를 복사하고, 설정에 따라 원본 텍스트 내
    /// 시작 위치(`start_index`, 찾지 못하면 -1)를 추가합니다.
    fn split_documents(&self, documents: &[KnowledgeDocument]) -> Vec<KnowledgeDocument> {
        let config = self.config();
        let mut result = Vec::new();

        for doc in documents {
            let mut index: usize = 0;
            let mut previous_len: usize = 0;

            for chunk in self.chunk(&doc.text) {
                let mut metadata = doc.metadata.clone();

                if config.add_start_index {
                    let offset = (index + previous_len).saturating_sub(config.chunk_overlap);
                    match find_char_index(&doc.text, &chunk, offset) {
                        Some(start) => {
                            index = start;
                            metadata.insert("start_index".to_string(), (start as i64).into());
                        }
                        None => {
                            metadata.insert("start_index".to_string(), (-1i64).into());
                        }
                    }
                    previous_len = char_len(&chunk);
                }

                result.push(KnowledgeDocument {
                    text: chunk,
                    metadata,
                });
            }
        }

        result
    }
}

// ============================================================================
// RecursiveCharacterChunker
// ============================================================================

/// 재귀 문자 청커
pub struct RecursiveCharacterChunker {
    config: ChunkConfig,
    separators: Vec<String>,
}

impl RecursiveCharacterChunker {
    /// 설정으로 생성
    pub fn new(config: ChunkConfig) -> Self {
        Self {
            config,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// 기본 설정으로 생성 (1000 / 200)
    pub fn with_defaults() -> Self {
        Self::new(ChunkConfig::default())
    }

    /// 텍스트에 존재하는 가장 높은 우선순위 구분자로 분할 후 재귀
    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let mut final_chunks = Vec::new();

        let mut separator = separators.last().map(String::as_str).unwrap_or("");
        let mut next_separators: &[String] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                separator = sep;
                break;
            }
            if text.contains(sep.as_str()) {
                separator = sep;
                next_separators = &separators[i + 1..];
                break;
            }
        }

        let mut good_splits: Vec<String> = Vec::new();

        for split in split_keep_separator(text, separator) {
            if char_len(&split) < self.config.chunk_size {
                good_splits.push(split);
                continue;
            }

            if !good_splits.is_empty() {
                final_chunks.extend(self.merge_splits(&good_splits));
                good_splits.clear();
            }

            if next_separators.is_empty() {
                final_chunks.push(split);
            } else {
                final_chunks.extend(self.split_recursive(&split, next_separators));
            }
        }

        if !good_splits.is_empty() {
            final_chunks.extend(self.merge_splits(&good_splits));
        }

        final_chunks
    }

    /// 작은 조각들을 최대 크기까지 이어붙이고, 다음 청크는 오버랩만큼 뒤로 물려 시작
    fn merge_splits(&self, splits: &[String]) -> Vec<String> {
        let chunk_size = self.config.chunk_size;
        let overlap = self.config.chunk_overlap;

        let mut chunks = Vec::new();
        let mut current: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0;

        for split in splits {
            let len = char_len(split);

            if total + len > chunk_size {
                if total > chunk_size {
                    tracing::warn!(
                        "Created a chunk of size {}, which is longer than the specified {}",
                        total,
                        chunk_size
                    );
                }

                if !current.is_empty() {
                    push_joined(&current, &mut chunks);

                    // 오버랩 이하로, 그리고 다음 조각이 들어갈 때까지 앞에서 제거
                    while total > overlap || (total + len > chunk_size && total > 0) {
                        match current.pop_front() {
                            Some((_, front_len)) => total -= front_len,
                            None => break,
                        }
                    }
                }
            }

            current.push_back((split.as_str(), len));
            total += len;
        }

        push_joined(&current, &mut chunks);
        chunks
    }
}

impl Chunker for RecursiveCharacterChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return vec![];
        }
        self.split_recursive(text, &self.separators)
    }

    fn config(&self) -> &ChunkConfig {
        &self.config
    }

    fn name(&self) -> &'static str {
        "RecursiveCharacterChunker"
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

#[inline]
fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// 구분자를 다음 조각의 앞에 붙여서 분할 (빈 조각 제거)
fn split_keep_separator(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        return text.chars().map(String::from).collect();
    }

    let mut parts = text.split(separator);
    let mut splits = Vec::new();

    if let Some(first) = parts.next() {
        splits.push(first.to_string());
    }
    for part in parts {
        splits.push(format!("{}{}", separator, part));
    }

    splits.retain(|s| !s.is_empty());
    splits
}

fn push_joined(current: &VecDeque<(&str, usize)>, chunks: &mut Vec<String>) {
    let joined: String = current.iter().map(|(s, _)| *s).collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

/// `from_char` 문자 위치부터 `pattern`을 찾아 문자 인덱스로 반환
fn find_char_index(text: &str, pattern: &str, from_char: usize) -> Option<usize> {
    let from_byte = text
        .char_indices()
        .nth(from_char)
        .map(|(b, _)| b)
        .unwrap_or(text.len());

    text[from_byte..]
        .find(pattern)
        .map(|b| text[..from_byte + b].chars().count())
}

// ============================================================================
// Factory Functions
// ============================================================================

/// 청커 생성 (설정 지정)
pub fn recursive_chunker(config: ChunkConfig) -> Box<dyn Chunker> {
    Box::new(RecursiveCharacterChunker::new(config))
}

// ============================================================================
// Tests
// ============================================================================
