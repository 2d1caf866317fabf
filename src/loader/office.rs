//! Office 문서 추출 모듈
//!
//! - Word: `.docx` 아카이브의 `word/document.xml`에서 본문 텍스트 추출
//! - Spreadsheet: calamine으로 시트별 텍스트 추출 (행은 줄, 셀은 탭 구분)

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use calamine::{open_workbook_auto, Reader};
use regex::Regex;

// ============================================================================
// Word
// ============================================================================

/// Word 문서 본문 추출
pub fn extract_docx(path: &Path) -> Result<String> {
    let file =
        std::fs::File::open(path).with_context(|| format!("Failed to open Word file: {:?}", path))?;
    let mut archive = zip::ZipArchive::new(file)
        .with_context(|| format!("Not a Word (OOXML) archive: {:?}", path))?;

    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .with_context(|| format!("Missing word/document.xml in {:?}", path))?
        .read_to_string(&mut xml)
        .with_context(|| format!("Failed to read document body: {:?}", path))?;

    document_xml_to_text(&xml)
}

/// WordprocessingML 본문을 일반 텍스트로 변환
///
/// 문단 끝과 줄바꿈은 개행, 탭은 탭 문자로 바꾸고 나머지 태그는 버립니다.
fn document_xml_to_text(xml: &str) -> Result<String> {
    let paragraph_end = Regex::new(r"</w:p>")?;
    let line_break = Regex::new(r"<w:(?:br|cr)\b[^>]*/>")?;
    let tab = Regex::new(r"<w:tab\b[^>]*/>")?;
    let any_tag = Regex::new(r"<[^>]+>")?;

    let text = paragraph_end.replace_all(xml, "\n");
    let text = line_break.replace_all(&text, "\n");
    let text = tab.replace_all(&text, "\t");
    let text = any_tag.replace_all(&text, "");

    Ok(unescape_xml(text.trim()))
}

fn unescape_xml(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

// ============================================================================
// Spreadsheet
// ============================================================================

/// 시트 하나의 추출 결과
#[derive(Debug, Clone, PartialEq)]
pub struct SheetText {
    /// 시트 이름
    pub name: String,
    /// 시트 번호 (1부터 시작)
    pub number: usize,
    /// 본문 (행은 개행, 셀은 탭으로 구분)
    pub text: String,
}

/// 스프레드시트의 시트별 텍스트 추출 (빈 시트 제외)
pub fn extract_sheets(path: &Path) -> Result<Vec<SheetText>> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("Failed to open spreadsheet: {:?}", path))?;

    let sheet_names: Vec<String> = workbook.sheet_names().to_vec();
    let mut sheets = Vec::new();

    for (i, name) in sheet_names.into_iter().enumerate() {
        let range = match workbook.worksheet_range(&name) {
            Ok(range) => range,
            Err(e) => {
                tracing::warn!("Skipping sheet '{}' in {:?}: {}", name, path, e);
                continue;
            }
        };

        let rows: Vec<String> = range
            .rows()
            .map(|row| {
                row.iter()
                    .map(|cell| cell.to_string())
                    .collect::<Vec<_>>()
                    .join("\t")
            })
            .filter(|row| !row.trim().is_empty())
            .collect();

        if rows.is_empty() {
            continue;
        }

        sheets.push(SheetText {
            name,
            number: i + 1,
            text: rows.join("\n"),
        });
    }

    Ok(sheets)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_xml_to_text() {
        let xml = r#"<?xml version="1.0"?><w:document><w:body>
            <w:p><w:r><w:t>Return policy</w:t></w:r></w:p>
            <w:p><w:r><w:t>30 days</w:t><w:tab/><w:t>A &amp; B</w:t><w:br/><w:t>&lt;end&gt;</w:t></w:r></w:p>
            </w:body></w:document>"#;

        let text = document_xml_to_text(xml).unwrap();
        let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
        assert_eq!(lines, vec!["Return policy", "30 days\tA & B", "<end>"]);
    }

    #[test]
    fn test_extract_docx() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("warranty.docx");
        crate::testing::write_docx(&path, &["Warranty", "Two years"]);

        let text = extract_docx(&path).unwrap();
        assert!(text.contains("Warranty"));
        assert!(text.contains("Two years"));
    }

    #[test]
    fn test_extract_docx_rejects_non_archive() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("legacy.doc");
        std::fs::write(&path, b"\xd0\xcf\x11\xe0 binary word").unwrap();

        assert!(extract_docx(&path).is_err());
    }

    #[test]
    fn test_extract_sheets_rejects_garbage() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("prices.xlsx");
        std::fs::write(&path, b"not a workbook").unwrap();

        assert!(extract_sheets(&path).is_err());
    }
}
