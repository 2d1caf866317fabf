//! PDF 텍스트 추출 모듈
//!
//! pdf-extract 크레이트로 페이지별 텍스트를 추출합니다.

use std::path::Path;

use anyhow::{Context, Result};

/// PDF에서 페이지별 텍스트 추출
///
/// 페이지 순서대로 텍스트를 반환합니다. 텍스트가 없는 페이지도 자리를
/// 유지하므로 인덱스가 곧 0부터 시작하는 페이지 번호입니다.
pub fn extract_pages(path: &Path) -> Result<Vec<String>> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read PDF: {:?}", path))?;

    let pages = pdf_extract::extract_text_from_mem_by_pages(&bytes)
        .with_context(|| format!("Failed to extract text from PDF: {:?}", path))?;

    if pages.iter().all(|p| p.trim().is_empty()) {
        tracing::warn!(
            "No text extracted from PDF: {:?}. It might be a scanned document.",
            path
        );
    }

    Ok(pages.into_iter().map(|p| normalize_page(&p)).collect())
}

/// 페이지 텍스트 정리 (폼피드 제거, 앞뒤 공백 제거)
fn normalize_page(text: &str) -> String {
    text.replace('\x0c', "").trim().to_string()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_page() {
        assert_eq!(normalize_page("\n  Page 1 content\x0c\n"), "Page 1 content");
        assert_eq!(normalize_page("\x0c"), "");
    }

    #[test]
    fn test_extract_pages_from_generated_pdf() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("manual.pdf");
        crate::testing::write_pdf(&path, &["Pump manual", "Filter schedule"]);

        let pages = extract_pages(&path).unwrap();
        assert_eq!(pages.len(), 2);
        assert!(pages[0].contains("Pump"));
        assert!(pages[1].contains("Filter"));
    }

    #[test]
    fn test_extract_pages_rejects_garbage() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.pdf");
        std::fs::write(&path, b"not a pdf").unwrap();

        assert!(extract_pages(&path).is_err());
    }
}
