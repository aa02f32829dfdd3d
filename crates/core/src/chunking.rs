use crate::error::{RetrievalError, Result};
use crate::models::{ChunkingStrategy, DocumentChunk, PageText, SectionHeading};
use regex::Regex;
use std::collections::HashMap;
use tracing::{info, warn};

const CLAUSE_PATTERN: &str = r"(?i)^(?:CLÁUSULA|CLAUSULA)\s*(?:\d+|PRIMEIR[AO]|SEGUND[AO]|TERCEIR[AO]|QUART[AO]|QUINT[AO]|SEXT[AO]|SÉTIM[AO]|OITAV[AO]|NON[AO]|DÉCIM[AO])[.:°ª\s\-–—]*(.*)$";
const ARTICLE_PATTERN: &str = r"(?i)^(?:Art\.?|Artigo)\s*(\d+)[°º]?\s*[.:–—-]?\s*(.*)$";
const ANNEX_PATTERN: &str = r"^(?:ANEXO|Anexo)\s+([IVXLC]+|[A-Z]|\d+)\s*[.:–—-]?\s*(.*)$";
const SECTION_PATTERN: &str = r"^(\d+(?:\.\d+)*\.?|[IVXLC]+\.)\s+(.+)$";

/// Share of chunks that must carry a section title for the hybrid strategy
/// to keep the section split.
const HYBRID_SECTION_RATIO: f64 = 0.3;
/// Minimum page count before repeated header/footer lines are stripped.
const MIN_PAGES_FOR_HEADER_DETECTION: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct ChunkingConfig {
    pub strategy: ChunkingStrategy,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub detect_sections: bool,
    pub min_section_length: usize,
    pub max_section_length: usize,
    pub remove_headers_footers: bool,
    pub normalize_whitespace: bool,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            strategy: ChunkingStrategy::Hybrid,
            chunk_size: 1_000,
            chunk_overlap: 200,
            detect_sections: true,
            min_section_length: 100,
            max_section_length: 5_000,
            remove_headers_footers: true,
            normalize_whitespace: true,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<()> {
        if !(100..=10_000).contains(&self.chunk_size) {
            return Err(RetrievalError::validation(format!(
                "chunk_size must be within [100, 10000], got {}",
                self.chunk_size
            )));
        }
        if self.chunk_overlap > 500 {
            return Err(RetrievalError::validation(format!(
                "chunk_overlap must be within [0, 500], got {}",
                self.chunk_overlap
            )));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RetrievalError::validation(
                "chunk_overlap must be smaller than chunk_size",
            ));
        }
        if self.min_section_length > self.max_section_length {
            return Err(RetrievalError::validation(
                "min_section_length must not exceed max_section_length",
            ));
        }
        Ok(())
    }
}

struct SectionDetector {
    clause: Regex,
    article: Regex,
    annex: Regex,
    section: Regex,
    first_number: Regex,
}

impl SectionDetector {
    fn new() -> Result<Self> {
        Ok(Self {
            clause: Regex::new(CLAUSE_PATTERN)?,
            article: Regex::new(ARTICLE_PATTERN)?,
            annex: Regex::new(ANNEX_PATTERN)?,
            section: Regex::new(SECTION_PATTERN)?,
            first_number: Regex::new(r"\d+")?,
        })
    }

    fn detect(&self, line: &str) -> Option<SectionHeading> {
        let line = line.trim();

        if let Some(captures) = self.clause.captures(line) {
            let title = captures
                .get(1)
                .map(|m| m.as_str().trim())
                .filter(|title| !title.is_empty())
                .unwrap_or(line);
            let number = self
                .first_number
                .find(line)
                .map(|m| m.as_str())
                .unwrap_or_default();
            return Some(heading("clausula", number, title));
        }

        if let Some(captures) = self.article.captures(line) {
            return Some(heading("artigo", group(&captures, 1), group(&captures, 2)));
        }

        if let Some(captures) = self.annex.captures(line) {
            return Some(heading("anexo", group(&captures, 1), group(&captures, 2)));
        }

        if let Some(captures) = self.section.captures(line) {
            let number = group(&captures, 1).trim_end_matches('.');
            let title = group(&captures, 2);
            let looks_like_title = title.chars().next().is_some_and(char::is_uppercase)
                && title.chars().count() > 3;
            if looks_like_title {
                return Some(heading("secao", number, title));
            }
        }

        None
    }
}

fn group<'t>(captures: &regex::Captures<'t>, index: usize) -> &'t str {
    captures.get(index).map(|m| m.as_str().trim()).unwrap_or_default()
}

fn heading(kind: &str, number: &str, title: &str) -> SectionHeading {
    SectionHeading {
        kind: kind.to_string(),
        number: number.to_string(),
        title: title.to_string(),
    }
}

struct Section {
    heading: Option<SectionHeading>,
    lines: Vec<String>,
    page_start: u32,
    page_end: u32,
}

impl Section {
    fn text(&self) -> String {
        self.lines.join("\n")
    }
}

/// Splits extracted page text into [`DocumentChunk`]s.
pub struct TextChunker {
    config: ChunkingConfig,
    detector: SectionDetector,
}

impl TextChunker {
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        config.validate()?;
        info!(
            strategy = %config.strategy,
            chunk_size = config.chunk_size,
            overlap = config.chunk_overlap,
            "text chunker ready"
        );
        Ok(Self {
            config,
            detector: SectionDetector::new()?,
        })
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    pub fn chunk_text(&self, text: &str, document_id: &str, client_id: &str) -> Result<Vec<DocumentChunk>> {
        self.chunk_pages(&[PageText::new(1, text)], document_id, client_id)
    }

    pub fn chunk_pages(
        &self,
        pages: &[PageText],
        document_id: &str,
        client_id: &str,
    ) -> Result<Vec<DocumentChunk>> {
        if client_id.trim().is_empty() {
            return Err(RetrievalError::validation("client_id must not be empty"));
        }
        if pages.is_empty() {
            warn!(document_id, "no pages to chunk");
            return Ok(Vec::new());
        }

        let pages = self.prepare_pages(pages);
        let total_chars: usize = pages.iter().map(PageText::char_count).sum();
        info!(
            document_id,
            strategy = %self.config.strategy,
            pages = pages.len(),
            total_chars,
            "chunking document"
        );

        let chunks = match self.config.strategy {
            ChunkingStrategy::Page => self.chunk_by_page(&pages, document_id, client_id)?,
            ChunkingStrategy::Section => self.chunk_by_section(&pages, document_id, client_id)?,
            ChunkingStrategy::FixedSize => self.chunk_by_fixed_size(&pages, document_id, client_id)?,
            ChunkingStrategy::Hybrid => {
                let chunks = self.chunk_by_section(&pages, document_id, client_id)?;
                let titled = chunks
                    .iter()
                    .filter(|chunk| chunk.section_title.is_some())
                    .count();
                if (titled as f64) < chunks.len() as f64 * HYBRID_SECTION_RATIO {
                    info!(
                        sections_found = titled,
                        total_chunks = chunks.len(),
                        "few sections detected, falling back to page chunking"
                    );
                    self.chunk_by_page(&pages, document_id, client_id)?
                } else {
                    chunks
                }
            }
        };

        let chunks = link_chunks(chunks);
        let average = chunks
            .iter()
            .map(DocumentChunk::content_length)
            .sum::<usize>()
            .checked_div(chunks.len())
            .unwrap_or(0);
        info!(document_id, total_chunks = chunks.len(), avg_size = average, "chunking finished");

        Ok(chunks)
    }

    fn prepare_pages(&self, pages: &[PageText]) -> Vec<PageText> {
        let mut prepared: Vec<PageText> = pages
            .iter()
            .map(|page| {
                if self.config.normalize_whitespace {
                    PageText::new(page.number, normalize_whitespace(&page.text))
                } else {
                    page.clone()
                }
            })
            .collect();

        if self.config.remove_headers_footers {
            prepared = remove_repeated_edges(prepared);
        }
        prepared
    }

    fn chunk_by_page(&self, pages: &[PageText], document_id: &str, client_id: &str) -> Result<Vec<DocumentChunk>> {
        let mut chunks = Vec::new();

        for page in pages {
            if page.text.trim().is_empty() {
                continue;
            }

            let pieces = if page.char_count() > self.config.max_section_length {
                split_by_size(&page.text, self.config.chunk_size, self.config.chunk_overlap)
            } else {
                vec![page.text.clone()]
            };

            for piece in pieces {
                chunks.push(
                    DocumentChunk::new(document_id, client_id, piece)?
                        .with_page(page.number)
                        .with_strategy(ChunkingStrategy::Page),
                );
            }
        }

        Ok(chunks)
    }

    fn chunk_by_section(&self, pages: &[PageText], document_id: &str, client_id: &str) -> Result<Vec<DocumentChunk>> {
        let mut chunks = Vec::new();

        for section in self.split_into_sections(pages) {
            let text = section.text();
            if text.trim().is_empty() {
                continue;
            }

            let pieces = if text.chars().count() > self.config.max_section_length {
                split_by_size(&text, self.config.chunk_size, self.config.chunk_overlap)
            } else {
                vec![text]
            };

            for piece in pieces {
                chunks.push(
                    DocumentChunk::new(document_id, client_id, piece)?
                        .with_page_range(section.page_start, section.page_end)
                        .with_section(section.heading.as_ref())
                        .with_strategy(ChunkingStrategy::Section),
                );
            }
        }

        Ok(chunks)
    }

    fn chunk_by_fixed_size(&self, pages: &[PageText], document_id: &str, client_id: &str) -> Result<Vec<DocumentChunk>> {
        let mut full_text = String::new();
        let mut page_markers: Vec<(usize, u32)> = Vec::new();

        for page in pages.iter().filter(|page| !page.text.trim().is_empty()) {
            page_markers.push((full_text.len(), page.number));
            full_text.push_str(&page.text);
            full_text.push_str("\n\n");
        }

        let mut chunks = Vec::new();
        let mut cursor = 0usize;

        for piece in split_by_size(&full_text, self.config.chunk_size, self.config.chunk_overlap) {
            let needle: String = piece.chars().take(50).collect();
            let start = full_text[cursor..]
                .find(&needle)
                .map(|offset| cursor + offset)
                .unwrap_or(cursor);
            cursor = start;

            let page_number = page_markers
                .iter()
                .take_while(|(offset, _)| *offset <= start)
                .last()
                .map(|(_, page)| *page)
                .unwrap_or(1);

            chunks.push(
                DocumentChunk::new(document_id, client_id, piece)?
                    .with_page(page_number)
                    .with_strategy(ChunkingStrategy::FixedSize),
            );
        }

        Ok(chunks)
    }

    fn split_into_sections(&self, pages: &[PageText]) -> Vec<Section> {
        let first_page = pages.first().map(|page| page.number).unwrap_or(1);
        let mut sections = Vec::new();
        let mut current = Section {
            heading: None,
            lines: Vec::new(),
            page_start: first_page,
            page_end: first_page,
        };

        for page in pages {
            for line in page.text.split('\n') {
                let detected = if self.config.detect_sections {
                    self.detector.detect(line)
                } else {
                    None
                };

                match detected {
                    Some(heading) => {
                        let next = Section {
                            heading: Some(heading),
                            lines: vec![line.to_string()],
                            page_start: page.number,
                            page_end: page.number,
                        };
                        let finished = std::mem::replace(&mut current, next);
                        if !finished.lines.is_empty() {
                            sections.push(finished);
                        }
                    }
                    None => {
                        current.lines.push(line.to_string());
                        current.page_end = page.number;
                    }
                }
            }
        }

        if !current.lines.is_empty() {
            sections.push(current);
        }
        sections
    }
}

/// Chunks `pages` with a one-off chunker built from `config`.
pub fn chunk_document(
    pages: &[PageText],
    document_id: &str,
    client_id: &str,
    config: ChunkingConfig,
) -> Result<Vec<DocumentChunk>> {
    TextChunker::new(config)?.chunk_pages(pages, document_id, client_id)
}

fn link_chunks(mut chunks: Vec<DocumentChunk>) -> Vec<DocumentChunk> {
    let total = u32::try_from(chunks.len()).unwrap_or(u32::MAX);
    let ids: Vec<_> = chunks.iter().map(|chunk| chunk.id).collect();

    for (position, chunk) in chunks.iter_mut().enumerate() {
        chunk.chunk_index = u32::try_from(position).unwrap_or(u32::MAX);
        chunk.total_chunks = Some(total);
        chunk.previous_chunk_id = position.checked_sub(1).map(|previous| ids[previous]);
        chunk.next_chunk_id = ids.get(position + 1).copied();
    }

    chunks
}

/// Collapses runs of spaces and tabs inside each line and squeezes blank
/// lines, keeping line structure for section detection.
pub fn normalize_whitespace(text: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut previous_blank = false;

    for line in text.replace('\u{a0}', " ").lines() {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        let blank = collapsed.is_empty();
        if blank && previous_blank {
            continue;
        }
        previous_blank = blank;
        lines.push(collapsed);
    }

    lines.join("\n").trim().to_string()
}

/// Character-window split with `overlap` characters shared between
/// neighbouring pieces. Windows are cut back to the last space when possible.
pub fn split_by_size(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= chunk_size {
        return if text.trim().is_empty() {
            Vec::new()
        } else {
            vec![text.to_string()]
        };
    }

    let chunk_size = chunk_size.max(1);
    let mut pieces = Vec::new();
    let mut start = 0usize;

    while start < chars.len() {
        let mut end = (start + chunk_size).min(chars.len());
        if end < chars.len() {
            if let Some(space) = chars[start..end].iter().rposition(|ch| *ch == ' ') {
                if space > 0 {
                    end = start + space;
                }
            }
        }

        let piece: String = chars[start..end].iter().collect();
        let piece = piece.trim();
        if !piece.is_empty() {
            pieces.push(piece.to_string());
        }

        if end >= chars.len() {
            break;
        }
        let next = end.saturating_sub(overlap);
        start = if next > start { next } else { end };
    }

    pieces
}

fn remove_repeated_edges(pages: Vec<PageText>) -> Vec<PageText> {
    if pages.len() < MIN_PAGES_FOR_HEADER_DETECTION {
        return pages;
    }

    let mut edge_counts: HashMap<String, usize> = HashMap::new();
    for page in &pages {
        let mut edges: Vec<&str> = Vec::new();
        let mut non_empty = page.text.lines().map(str::trim).filter(|line| !line.is_empty());
        if let Some(first) = non_empty.next() {
            edges.push(first);
        }
        if let Some(last) = non_empty.last() {
            edges.push(last);
        }
        edges.dedup();
        for edge in edges {
            *edge_counts.entry(edge.to_string()).or_default() += 1;
        }
    }

    let threshold = pages.len().div_ceil(2);
    let repeated: Vec<String> = edge_counts
        .into_iter()
        .filter(|(_, count)| *count >= threshold)
        .map(|(line, _)| line)
        .collect();

    if repeated.is_empty() {
        return pages;
    }

    pages
        .into_iter()
        .map(|page| {
            let kept: Vec<&str> = page
                .text
                .lines()
                .filter(|line| !repeated.iter().any(|edge| edge == line.trim()))
                .collect();
            PageText::new(page.number, kept.join("\n"))
        })
        .collect()
}
