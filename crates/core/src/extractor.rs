use crate::error::{RetrievalError, Result};
use crate::models::PageText;
use std::path::Path;
use tracing::debug;

const PAGE_BREAK: char = '\u{000c}';

/// Reads a plain-text export where pages are separated by form feeds, the way
/// `pdftotext` writes them. Blank pages are dropped but keep their numbering.
pub async fn read_text_pages(path: &Path) -> Result<Vec<PageText>> {
    let raw = tokio::fs::read_to_string(path).await?;
    let pages = split_pages(&raw);

    if pages.is_empty() {
        return Err(RetrievalError::validation(format!(
            "document had no readable page text: {}",
            path.display()
        )));
    }

    debug!(path = %path.display(), pages = pages.len(), "page text loaded");
    Ok(pages)
}

pub fn split_pages(raw: &str) -> Vec<PageText> {
    raw.split(PAGE_BREAK)
        .enumerate()
        .filter_map(|(index, page)| {
            let text = page.trim();
            if text.is_empty() {
                return None;
            }
            let number = u32::try_from(index + 1).ok()?;
            Some(PageText::new(number, text))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn form_feeds_delimit_pages() {
        let pages = split_pages("primeira página\n\u{000c}\u{000c}  terceira página  ");
        assert_eq!(
            pages,
            vec![
                PageText::new(1, "primeira página"),
                PageText::new(3, "terceira página"),
            ]
        );
    }

    #[test]
    fn text_without_breaks_is_one_page() {
        let pages = split_pages("contrato inteiro");
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].number, 1);
    }

    #[tokio::test]
    async fn reads_pages_from_disk() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        write!(file, "CLÁUSULA 1 - DO OBJETO\u{000c}CLÁUSULA 2 - DO PRAZO")?;

        let pages = read_text_pages(file.path()).await?;
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[1].text, "CLÁUSULA 2 - DO PRAZO");
        Ok(())
    }

    #[tokio::test]
    async fn blank_file_is_rejected() -> Result<()> {
        let file = tempfile::NamedTempFile::new()?;
        let result = read_text_pages(file.path()).await;
        assert!(result.is_err_and(|err| err.is_validation()));
        Ok(())
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let result = read_text_pages(Path::new("/definitely/not/here.txt")).await;
        assert!(matches!(result, Err(RetrievalError::Io(_))));
    }
}
