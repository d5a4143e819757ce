use std::collections::HashSet;
use rust_stemmers::{Algorithm, Stemmer};

const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for",
    "from", "has", "he", "in", "is", "it", "its", "of", "on",
    "that", "the", "to", "was", "will", "with",
];

/// Post-tokenization step of an analyzer pipeline
#[derive(Clone)]
pub enum TokenFilter {
    Lowercase,
    StopWords(HashSet<String>),
    Stemmer(Algorithm),
}

impl TokenFilter {
    pub fn english_stop_words() -> Self {
        TokenFilter::StopWords(ENGLISH_STOP_WORDS.iter().map(|w| w.to_string()).collect())
    }

    pub fn apply(&self, tokens: Vec<String>) -> Vec<String> {
        match self {
            TokenFilter::Lowercase => tokens.into_iter().map(|t| t.to_lowercase()).collect(),
            TokenFilter::StopWords(words) => {
                tokens.into_iter().filter(|t| !words.contains(t)).collect()
            }
            TokenFilter::Stemmer(algorithm) => {
                let stemmer = Stemmer::create(*algorithm);
                tokens.into_iter().map(|t| stemmer.stem(&t).into_owned()).collect()
            }
        }
    }
}
