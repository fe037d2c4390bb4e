use std::path::Path;

use anyhow::{Context, Result};
use regex::Regex;
use tokio::process::Command;

#[derive(Debug, Clone)]
pub struct PageText {
    pub page: Option<i64>,
    pub text: String,
}

/// Extracts the PDF's text one page at a time so that page numbers survive
/// into chunk metadata. Uses poppler's pdftotext when available; otherwise
/// falls back to whole-document extraction without page numbers.
pub async fn extract_pages(pdf_path: &Path) -> Result<Vec<PageText>> {
    if poppler_available().await {
        if let Ok(count) = page_count(pdf_path).await {
            let mut pages = Vec::with_capacity(count);
            for number in 1..=count {
                if let Some(text) = page_text(pdf_path, number).await? {
                    pages.push(PageText {
                        page: Some(number as i64),
                        text,
                    });
                }
            }
            if !pages.is_empty() {
                return Ok(pages);
            }
        }
    }

    whole_document_fallback(pdf_path).await
}

/// Runs pdftotext restricted to a single page. Returns None for pages that
/// yield no text (covers, image-only pages).
async fn page_text(pdf_path: &Path, number: usize) -> Result<Option<String>> {
    let page_arg = number.to_string();
    let output = Command::new("pdftotext")
        .args(["-f", &page_arg, "-l", &page_arg, "-layout", "-nopgbrk"])
        .arg(pdf_path)
        .arg("-")
        .output()
        .await
        .with_context(|| format!("failed to run pdftotext for page {number}"))?;

    if !output.status.success() {
        return Ok(None);
    }

    let text = normalize_text(&String::from_utf8_lossy(&output.stdout));
    Ok((!text.is_empty()).then_some(text))
}

async fn page_count(pdf_path: &Path) -> Result<usize> {
    let output = Command::new("pdfinfo")
        .arg(pdf_path)
        .output()
        .await
        .context("failed to run pdfinfo")?;
    if !output.status.success() {
        anyhow::bail!("pdfinfo exited with non-zero status");
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Regex::new(r"(?m)^Pages:\s+(\d+)\s*$")?
        .captures(&stdout)
        .and_then(|caps| caps[1].parse::<usize>().ok())
        .context("unable to parse page count from pdfinfo")
}

async fn whole_document_fallback(pdf_path: &Path) -> Result<Vec<PageText>> {
    let owned_path = pdf_path.to_path_buf();
    let extracted = tokio::task::spawn_blocking(move || pdf_extract::extract_text(&owned_path))
        .await
        .context("PDF extraction task panicked")?
        .context("failed to extract text from PDF")?;

    let text = normalize_text(&extracted);
    if text.is_empty() {
        anyhow::bail!("no text could be extracted from {}", pdf_path.display());
    }

    Ok(vec![PageText { page: None, text }])
}

/// True when both poppler tools the per-page path needs are on PATH.
async fn poppler_available() -> bool {
    has_command("pdftotext").await && has_command("pdfinfo").await
}

async fn has_command(binary: &str) -> bool {
    Command::new("which")
        .arg(binary)
        .output()
        .await
        .map(|out| out.status.success() && !out.stdout.is_empty())
        .unwrap_or(false)
}

/// Cleans up extracted text while keeping line structure, since the splitter
/// uses paragraph and line breaks as preferred chunk boundaries.
fn normalize_text(input: &str) -> String {
    let cleaned = input
        .replace("\r\n", "\n")
        .replace(['\u{2018}', '\u{2019}'], "'")
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace('\u{00A0}', " ");

    let mut out = String::with_capacity(cleaned.len());
    let mut blank_run = 0usize;
    for line in cleaned.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }

    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_keeps_paragraph_structure() {
        let raw = "First line.\r\nSecond line.\n\n\n\nNext paragraph.";
        let text = normalize_text(raw);
        assert_eq!(text, "First line.\nSecond line.\n\nNext paragraph.");
    }

    #[test]
    fn normalization_replaces_smart_quotes() {
        let raw = "\u{201C}annual leave\u{201D} and the employee\u{2019}s manager";
        let text = normalize_text(raw);
        assert_eq!(text, "\"annual leave\" and the employee's manager");
    }

    #[test]
    fn normalization_drops_trailing_whitespace() {
        let raw = "line with trailing spaces   \nnext\u{00A0}line";
        let text = normalize_text(raw);
        assert_eq!(text, "line with trailing spaces\nnext line");
    }
}
