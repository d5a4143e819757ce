use unicode_segmentation::UnicodeSegmentation;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tokenizer {
    /// Unicode word boundaries; longer tokens are dropped
    Standard { max_token_length: usize },
    Whitespace,
    /// The whole value is one token
    Keyword,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Tokenizer::Standard { max_token_length: 255 }
    }
}

impl Tokenizer {
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        match self {
            Tokenizer::Standard { max_token_length } => text
                .unicode_words()
                .filter(|word| word.len() <= *max_token_length)
                .map(String::from)
                .collect(),
            Tokenizer::Whitespace => text.split_whitespace().map(String::from).collect(),
            Tokenizer::Keyword => {
                if text.is_empty() {
                    Vec::new()
                } else {
                    vec![text.to_string()]
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_splits_on_word_boundaries() {
        let tokens = Tokenizer::default().tokenize("Hello, wide-world! 42");
        assert_eq!(tokens, vec!["Hello", "wide", "world", "42"]);
    }

    #[test]
    fn standard_drops_oversized_tokens() {
        let tokenizer = Tokenizer::Standard { max_token_length: 3 };
        assert_eq!(tokenizer.tokenize("abc abcd"), vec!["abc"]);
    }

    #[test]
    fn keyword_keeps_value_whole() {
        assert_eq!(Tokenizer::Keyword.tokenize("abc&edf Co"), vec!["abc&edf Co"]);
        assert!(Tokenizer::Keyword.tokenize("").is_empty());
    }
}
