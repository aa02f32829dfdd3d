use crate::error::Result;
use crate::traits::EmbeddingProvider;
use async_trait::async_trait;

const WORD_WEIGHT: f32 = 2.0;
const PAIR_WEIGHT: f32 = 1.5;
const TRIGRAM_WEIGHT: f32 = 1.0;

/// Offline embedding provider used with `--local-store`, where no inference
/// endpoint is configured.
///
/// Hashes word-level features of contract text into a fixed number of
/// buckets: whole words, adjacent word pairs ("prazo carência") and
/// trigrams of each word padded with boundary markers, so inflections such as
/// "carência"/"carências" still land close together. The result is L2
/// normalized, so cosine similarity reduces to a dot product.
#[derive(Debug, Clone, Copy)]
pub struct HashingEmbeddings {
    pub dimensions: usize,
}

impl HashingEmbeddings {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let words = words(text);

        for word in &words {
            add(&mut vector, word.as_bytes(), WORD_WEIGHT);

            let padded: Vec<char> = std::iter::once('^')
                .chain(word.chars())
                .chain(std::iter::once('$'))
                .collect();
            for window in padded.windows(3) {
                add(&mut vector, window.iter().collect::<String>().as_bytes(), TRIGRAM_WEIGHT);
            }
        }
        for pair in words.windows(2) {
            add(&mut vector, format!("{} {}", pair[0], pair[1]).as_bytes(), PAIR_WEIGHT);
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }
        vector
    }
}

/// Lowercased alphanumeric words; punctuation and clause numbering
/// separators split words.
fn words(text: &str) -> Vec<String> {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn add(vector: &mut [f32], feature: &[u8], weight: f32) {
    let bucket = (fnv1a(feature) % vector.len() as u64) as usize;
    vector[bucket] += weight;
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(0x0100_0000_01b3)
    })
}

#[async_trait]
impl EmbeddingProvider for HashingEmbeddings {
    fn name(&self) -> &str {
        "hashing"
    }

    async fn create_embeddings(&self, inputs: &[String], _model: &str) -> Result<Vec<Vec<f32>>> {
        Ok(inputs.iter().map(|input| self.embed_text(input)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::memory::cosine_similarity;

    #[test]
    fn hashing_is_deterministic() {
        let embedder = HashingEmbeddings::new(64);
        assert_eq!(embedder.embed_text("Prazo de carência"), embedder.embed_text("Prazo de carência"));
    }

    #[test]
    fn vectors_are_unit_length() {
        let embedder = HashingEmbeddings::new(32);
        let vector = embedder.embed_text("cobertura hospitalar");
        assert_eq!(vector.len(), 32);
        let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn case_and_punctuation_do_not_matter() {
        let embedder = HashingEmbeddings::new(128);
        assert_eq!(
            embedder.embed_text("CLÁUSULA 5.1 - Prazo de Carência"),
            embedder.embed_text("cláusula 5 1 prazo de carência")
        );
    }

    #[test]
    fn shared_vocabulary_scores_higher() {
        let embedder = HashingEmbeddings::new(256);
        let query = embedder.embed_text("prazo de carência para internação");
        let related = embedder.embed_text("o prazo de carência para internação hospitalar é de 180 dias");
        let unrelated = embedder.embed_text("foro da comarca de São Paulo");

        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }

    #[tokio::test]
    async fn provider_returns_one_vector_per_input() -> Result<()> {
        let embedder = HashingEmbeddings::new(16);
        let inputs = vec!["a b c".to_string(), " - ".to_string()];
        let vectors = embedder.create_embeddings(&inputs, "local").await?;
        assert_eq!(vectors.len(), 2);
        assert!(vectors[1].iter().all(|value| *value == 0.0));
        Ok(())
    }
}
