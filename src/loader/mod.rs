//! 문서 로더 모듈
//!
//! 제품 지식 풀 폴더(`{pool}/{id}/`)의 파일을 확장자별 파서로 읽어
//! `KnowledgeDocument` 목록으로 정규화합니다.
//! - Word (.docx, .doc): 파일당 문서 1개
//! - Spreadsheet (.xlsx, .xls): 시트당 문서 1개
//! - PDF: 페이지당 문서 1개
//! - Text (.txt): 파일당 문서 1개
//!
//! 알 수 없는 확장자와 파싱 실패 파일은 건너뛰고 로그만 남깁니다.

mod office;
mod pdf;

use std::path::{Path, PathBuf};

use anyhow::Context;
use thiserror::Error;

use crate::knowledge::KnowledgeDocument;

// ============================================================================
// File Types
// ============================================================================

/// 지원하는 파일 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// Word 문서
    Word,
    /// 스프레드시트
    Spreadsheet,
    /// PDF 파일
    Pdf,
    /// 텍스트 파일
    Text,
}

impl FileType {
    /// 확장자로 파일 타입 결정
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.to_lowercase();
        match ext.as_str() {
            "docx" | "doc" => Some(FileType::Word),
            "xlsx" | "xls" => Some(FileType::Spreadsheet),
            "pdf" => Some(FileType::Pdf),
            "txt" => Some(FileType::Text),
            _ => None,
        }
    }

    /// 파일 경로에서 타입 결정
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    fn parser_name(&self) -> &'static str {
        match self {
            FileType::Word => "docx",
            FileType::Spreadsheet => "excel",
            FileType::Pdf => "pdf",
            FileType::Text => "txt",
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error(
        "Product knowledge pool for {id} does not exist at {path:?}, \
         set up the knowledge pool for this product id first"
    )]
    PoolNotFound { id: String, path: PathBuf },

    #[error("Failed to read knowledge pool {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// ============================================================================
// Document Loader
// ============================================================================

/// 제품 지식 풀 로더
#[derive(Debug, Clone)]
pub struct DocumentLoader {
    pool_dir: PathBuf,
}

impl DocumentLoader {
    /// # Arguments
    /// * `pool_dir` - 제품별 폴더를 담고 있는 지식 풀 루트
    pub fn new(pool_dir: impl Into<PathBuf>) -> Self {
        Self {
            pool_dir: pool_dir.into(),
        }
    }

    pub fn pool_dir(&self) -> &Path {
        &self.pool_dir
    }

    /// 제품의 모든 문서 로드
    ///
    /// 폴더 바로 아래 파일만 이름순으로 읽습니다.
    pub async fn load(&self, product_id: &str) -> Result<Vec<KnowledgeDocument>, LoaderError> {
        let folder = self.pool_dir.join(product_id);
        if !folder.is_dir() {
            return Err(LoaderError::PoolNotFound {
                id: product_id.to_string(),
                path: folder,
            });
        }

        let files = list_files(&folder).await?;
        tracing::debug!(
            "Knowledge pool for {}: {:?}",
            product_id,
            files
                .iter()
                .filter_map(|p| p.file_name())
                .collect::<Vec<_>>()
        );

        let mut documents = Vec::new();

        for path in files {
            let Some(file_type) = FileType::from_path(&path) else {
                tracing::debug!(
                    "{:?} could not be loaded because of unknown file type (not .docx, .doc, .xlsx, .xls, .pdf, .txt)",
                    path.file_name().unwrap_or_default()
                );
                continue;
            };

            match load_file(&path, file_type).await {
                Ok(docs) => {
                    tracing::debug!(
                        "{:?} loaded with {} parser, elements count: {}",
                        path.file_name().unwrap_or_default(),
                        file_type.parser_name(),
                        docs.len()
                    );
                    documents.extend(docs);
                }
                Err(e) => {
                    tracing::warn!("Skipping {:?}: {:#}", path, e);
                }
            }
        }

        if documents.is_empty() {
            tracing::warn!("No documents found for {}", product_id);
        }
        tracing::debug!("Total number of documents: {}", documents.len());

        Ok(documents)
    }
}

/// 폴더 바로 아래의 일반 파일 (이름순)
async fn list_files(folder: &Path) -> Result<Vec<PathBuf>, LoaderError> {
    let io_error = |source: std::io::Error| LoaderError::Io {
        path: folder.to_path_buf(),
        source,
    };

    let mut entries = tokio::fs::read_dir(folder).await.map_err(io_error)?;
    let mut files = Vec::new();

    while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
        let file_type = entry.file_type().await.map_err(io_error)?;
        if file_type.is_file() {
            files.push(entry.path());
        }
    }

    files.sort();
    Ok(files)
}

/// 파일 하나를 타입별 파서로 읽기
///
/// 파서는 CPU 바운드이므로 spawn_blocking에서 실행합니다.
pub async fn load_file(path: &Path, file_type: FileType) -> anyhow::Result<Vec<KnowledgeDocument>> {
    let source = path.to_string_lossy().to_string();
    let owned = path.to_path_buf();

    let documents = match file_type {
        FileType::Text => {
            let text = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read text file: {:?}", path))?;
            vec![KnowledgeDocument::new(text).with_meta("source", source)]
        }
        FileType::Word => {
            let text = tokio::task::spawn_blocking(move || office::extract_docx(&owned))
                .await
                .context("Word extraction task failed")??;
            vec![KnowledgeDocument::new(text).with_meta("source", source)]
        }
        FileType::Spreadsheet => {
            let sheets = tokio::task::spawn_blocking(move || office::extract_sheets(&owned))
                .await
                .context("Spreadsheet extraction task failed")??;
            sheets
                .into_iter()
                .map(|sheet| {
                    KnowledgeDocument::new(sheet.text)
                        .with_meta("source", source.clone())
                        .with_meta("page_name", sheet.name)
                        .with_meta("page_number", sheet.number)
                })
                .collect()
        }
        FileType::Pdf => {
            let pages = tokio::task::spawn_blocking(move || pdf::extract_pages(&owned))
                .await
                .context("PDF extraction task failed")??;
            pages
                .into_iter()
                .enumerate()
                .map(|(page, text)| {
                    KnowledgeDocument::new(text)
                        .with_meta("source", source.clone())
                        .with_meta("page", page)
                })
                .collect()
        }
    };

    Ok(documents)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{write_docx, write_pdf};
    use tempfile::TempDir;

    #[test]
    fn test_file_type_from_extension() {
        assert_eq!(FileType::from_extension("DOCX"), Some(FileType::Word));
        assert_eq!(FileType::from_extension("doc"), Some(FileType::Word));
        assert_eq!(FileType::from_extension("xls"), Some(FileType::Spreadsheet));
        assert_eq!(FileType::from_extension("pdf"), Some(FileType::Pdf));
        assert_eq!(FileType::from_extension("txt"), Some(FileType::Text));
        assert_eq!(FileType::from_extension("md"), None);
        assert_eq!(FileType::from_path(Path::new("notes")), None);
    }

    #[tokio::test]
    async fn test_load_skips_unknown_types() {
        let temp_dir = TempDir::new().unwrap();
        let folder = temp_dir.path().join("p1");
        std::fs::create_dir_all(&folder).unwrap();

        std::fs::write(folder.join("notes.txt"), "The pump runs at 3000 rpm.").unwrap();
        std::fs::write(folder.join("blob.bin"), [0u8, 1, 2, 3]).unwrap();
        write_pdf(&folder.join("manual.pdf"), &["Replace the filter"]);

        let loader = DocumentLoader::new(temp_dir.path());
        let documents = loader.load("p1").await.unwrap();

        let sources: Vec<&str> = documents.iter().filter_map(|d| d.source()).collect();
        assert!(sources.iter().any(|s| s.ends_with("notes.txt")));
        assert!(sources.iter().any(|s| s.ends_with("manual.pdf")));
        assert!(sources.iter().all(|s| !s.ends_with("blob.bin")));

        let pdf_page = documents
            .iter()
            .find(|d| d.source().is_some_and(|s| s.ends_with("manual.pdf")))
            .unwrap();
        assert_eq!(pdf_page.metadata.get("page"), Some(&serde_json::json!(0)));
    }

    #[tokio::test]
    async fn test_load_docx_and_broken_files() {
        let temp_dir = TempDir::new().unwrap();
        let folder = temp_dir.path().join("p2");
        std::fs::create_dir_all(&folder).unwrap();

        write_docx(&folder.join("warranty.docx"), &["Warranty covers two years."]);
        std::fs::write(folder.join("broken.xlsx"), b"garbage").unwrap();

        let loader = DocumentLoader::new(temp_dir.path());
        let documents = loader.load("p2").await.unwrap();

        assert_eq!(documents.len(), 1);
        assert!(documents[0].text.contains("Warranty covers two years."));
        assert!(documents[0].source().unwrap().ends_with("warranty.docx"));
    }

    #[tokio::test]
    async fn test_missing_pool_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let loader = DocumentLoader::new(temp_dir.path());

        let result = loader.load("missing").await;
        assert!(matches!(result, Err(LoaderError::PoolNotFound { ref id, .. }) if id == "missing"));
    }

    #[tokio::test]
    async fn test_empty_pool_yields_no_documents() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir_all(temp_dir.path().join("empty")).unwrap();

        let loader = DocumentLoader::new(temp_dir.path());
        assert!(loader.load("empty").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_subdirectories_are_ignored() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("p3").join("archive");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("old.txt"), "old").unwrap();

        let loader = DocumentLoader::new(temp_dir.path());
        assert!(loader.load("p3").await.unwrap().is_empty());
    }
}
