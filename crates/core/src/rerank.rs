use crate::models::SearchResult;
use std::collections::HashSet;

const TITLE_WORD_BOOST: f64 = 0.1;
const LEADING_CHUNK_BOOST: f64 = 0.05;
const LEADING_CHUNKS: u32 = 3;
const SHORT_CONTENT_CHARS: u32 = 200;
const SHORT_CONTENT_PENALTY: f64 = 0.1;

fn words(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Heuristic adjustment added to `score`.
pub fn boost(result: &SearchResult, query_words: &HashSet<String>) -> f64 {
    let mut boost = 0.0;

    if let Some(title) = &result.section_title {
        let overlap = words(title).intersection(query_words).count();
        boost += TITLE_WORD_BOOST * overlap as f64;
    }
    if result.chunk_index < LEADING_CHUNKS {
        boost += LEADING_CHUNK_BOOST * f64::from(LEADING_CHUNKS - result.chunk_index);
    }
    if result.content_length < SHORT_CONTENT_CHARS {
        boost -= SHORT_CONTENT_PENALTY;
    }

    boost
}

/// Sets `reranker_score = score + boost` on every result and orders by it,
/// descending. Ties keep their incoming order.
pub fn rerank(mut results: Vec<SearchResult>, query: &str) -> Vec<SearchResult> {
    let query_words = words(query);

    for result in &mut results {
        result.reranker_score = Some(result.score + boost(result, &query_words));
    }

    results.sort_by(|left, right| {
        let left = left.reranker_score.unwrap_or(left.score);
        let right = right.reranker_score.unwrap_or(right.score);
        right.total_cmp(&left)
    });
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: &str, score: f64) -> SearchResult {
        SearchResult {
            id: id.to_string(),
            document_id: "doc-1".to_string(),
            client_id: "t1".to_string(),
            content: "x".repeat(500),
            content_length: 500,
            page_number: Some(1),
            page_start: None,
            page_end: None,
            section_title: None,
            section_number: None,
            section_type: None,
            chunk_index: 10,
            total_chunks: Some(20),
            score,
            vector_score: Some(score),
            keyword_score: None,
            reranker_score: None,
            created_at: None,
        }
    }

    fn ids(results: &[SearchResult]) -> Vec<&str> {
        results.iter().map(|result| result.id.as_str()).collect()
    }

    #[test]
    fn matching_section_title_outranks_equal_score() {
        let plain = result("plain", 0.5);
        let mut titled = result("titled", 0.5);
        titled.section_title = Some("Prazo de Carência".to_string());

        let ranked = rerank(vec![plain, titled], "qual o prazo de carência");
        assert_eq!(ids(&ranked), vec!["titled", "plain"]);
        assert!(ranked[0].reranker_score > ranked[1].reranker_score);
        // prazo, de, carência
        assert!((ranked[0].reranker_score.unwrap_or_default() - 0.8).abs() < 1e-9);
    }

    #[test]
    fn leading_chunk_outranks_later_chunk() {
        let later = result("later", 0.5);
        let mut first = result("first", 0.5);
        first.chunk_index = 0;

        let ranked = rerank(vec![later, first], "q");
        assert_eq!(ids(&ranked), vec!["first", "later"]);
        assert!((ranked[0].reranker_score.unwrap_or_default() - 0.65).abs() < 1e-9);
        assert_eq!(ranked[1].reranker_score, Some(0.5));
    }

    #[test]
    fn short_content_is_penalized() {
        let mut short = result("short", 0.5);
        short.content_length = 150;

        let ranked = rerank(vec![short], "q");
        let reranked = ranked[0].reranker_score.unwrap_or_default();
        assert!(reranked < ranked[0].score);
        assert!((reranked - 0.4).abs() < 1e-9);
    }

    #[test]
    fn ties_keep_incoming_order() {
        let ranked = rerank(vec![result("a", 0.3), result("b", 0.3), result("c", 0.3)], "q");
        assert_eq!(ids(&ranked), vec!["a", "b", "c"]);
    }

    #[test]
    fn score_is_never_modified() {
        let mut first = result("first", 0.9);
        first.chunk_index = 1;
        let ranked = rerank(vec![first], "q");
        assert_eq!(ranked[0].score, 0.9);
        assert!(ranked[0].reranker_score.is_some_and(|score| score > 0.9));
    }
}
