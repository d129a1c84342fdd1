use crate::error::{Error, Result};
use serde::Serialize;
use std::fmt;
use tiktoken_rs::CoreBPE;

const SIMPLE_CHARS_PER_TOKEN: usize = 4;
const ENHANCED_WORD_MULTIPLIER: f64 = 1.3;
const ENHANCED_SPECIAL_DIVISOR: usize = 10;

/// Tokenizer used when none is requested.
pub const DEFAULT_TOKENIZER: &str = "cl100k_base";

/// Tokenizer selected by identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenizerKind {
    /// `cl100k_base` (GPT-3.5 / GPT-4)
    Cl100kBase,
    /// `o200k_base` (GPT-4o family)
    O200kBase,
    /// `p50k_base` (Codex)
    P50kBase,
    /// `p50k_edit`
    P50kEdit,
    /// `r50k_base`, also known as `gpt2`
    R50kBase,
    /// Encoding looked up from an OpenAI model name
    Model(String),
    /// Simple character-based estimate (~4 chars per token)
    Simple,
    /// Estimate blending word, character and punctuation counts
    Enhanced,
}

impl TokenizerKind {
    /// Parses a tokenizer identifier.
    ///
    /// Anything that is not a known encoding or heuristic is treated as a model
    /// name and resolved when the tokenizer is created.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Tokenizer`] for an empty identifier.
    pub fn parse(id: &str) -> Result<Self> {
        let kind = match id.trim() {
            "" => return Err(Error::tokenizer(id, "identifier is empty")),
            "cl100k_base" => Self::Cl100kBase,
            "o200k_base" => Self::O200kBase,
            "p50k_base" => Self::P50kBase,
            "p50k_edit" => Self::P50kEdit,
            "r50k_base" | "gpt2" => Self::R50kBase,
            "simple" => Self::Simple,
            "enhanced" => Self::Enhanced,
            model => Self::Model(model.to_string()),
        };
        Ok(kind)
    }

    /// Creates a new estimator of this kind.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Tokenizer`] if the encoding cannot be loaded or the
    /// model name is unknown.
    pub fn create(&self) -> Result<Box<dyn TokenEstimator>> {
        let bpe = match self {
            Self::Simple => return Ok(Box::new(SimpleTokenizer)),
            Self::Enhanced => return Ok(Box::new(EnhancedTokenizer)),
            Self::Cl100kBase => tiktoken_rs::cl100k_base(),
            Self::O200kBase => tiktoken_rs::o200k_base(),
            Self::P50kBase => tiktoken_rs::p50k_base(),
            Self::P50kEdit => tiktoken_rs::p50k_edit(),
            Self::R50kBase => tiktoken_rs::r50k_base(),
            Self::Model(model) => tiktoken_rs::get_bpe_from_model(model),
        }
        .map_err(|e| Error::tokenizer(self.to_string(), e.to_string()))?;

        Ok(Box::new(BpeTokenizer { bpe }))
    }
}

impl fmt::Display for TokenizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Cl100kBase => "cl100k_base",
            Self::O200kBase => "o200k_base",
            Self::P50kBase => "p50k_base",
            Self::P50kEdit => "p50k_edit",
            Self::R50kBase => "r50k_base",
            Self::Model(model) => model.as_str(),
            Self::Simple => "simple",
            Self::Enhanced => "enhanced",
        };
        f.write_str(name)
    }
}

/// Trait for counting tokens in text.
///
/// Implementations must be deterministic: the same text always yields the
/// same count.
pub trait TokenEstimator {
    /// Returns the number of tokens in the given text.
    fn estimate(&self, text: &str) -> usize;
}

/// Token counter bound to one identifier for the whole run.
///
/// Both the intermediate and the final count go through the same instance, so
/// they are always comparable.
pub struct Tokenizer {
    id: String,
    kind: TokenizerKind,
    estimator: Box<dyn TokenEstimator>,
}

impl Tokenizer {
    /// Resolves an identifier into a ready tokenizer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Tokenizer`] for unknown identifiers.
    pub fn from_id(id: &str) -> Result<Self> {
        let kind = TokenizerKind::parse(id)?;
        let estimator = kind.create()?;
        Ok(Self {
            id: id.trim().to_string(),
            kind,
            estimator,
        })
    }

    /// Counts tokens in `text`.
    #[must_use]
    pub fn count(&self, text: &str) -> usize {
        self.estimator.estimate(text)
    }

    /// Returns the identifier as the caller spelled it, e.g. `gpt2` rather
    /// than the `r50k_base` encoding it resolves to.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the resolved tokenizer kind.
    #[must_use]
    pub const fn kind(&self) -> &TokenizerKind {
        &self.kind
    }
}

impl fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tokenizer")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Byte-pair-encoding tokenizer backed by `tiktoken-rs`.
struct BpeTokenizer {
    bpe: CoreBPE,
}

impl TokenEstimator for BpeTokenizer {
    fn estimate(&self, text: &str) -> usize {
        // Special-token markers in source files count as ordinary text.
        self.bpe.encode_ordinary(text).len()
    }
}

/// Simple character-based tokenizer.
///
/// Uses a heuristic of approximately 4 characters per token,
/// which works reasonably well for source code.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SimpleTokenizer;

impl TokenEstimator for SimpleTokenizer {
    fn estimate(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }

        let char_count = text.chars().count();
        char_count
            .saturating_add(SIMPLE_CHARS_PER_TOKEN - 1)
            .saturating_div(SIMPLE_CHARS_PER_TOKEN)
            .max(1)
    }
}

/// Enhanced tokenizer with multiple heuristics.
///
/// This tokenizer considers:
/// - Word count (weighted by 1.3)
/// - Character count (divided by 4)
/// - Special characters (penalty factor)
#[derive(Debug, Clone, Copy)]
pub(crate) struct EnhancedTokenizer;

impl TokenEstimator for EnhancedTokenizer {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    fn estimate(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }

        let words = count_words(text);
        let chars = text.chars().count();
        let special_chars = count_special_chars(text);

        let word_estimate = (words as f64 * ENHANCED_WORD_MULTIPLIER) as usize;
        let char_estimate = chars.saturating_div(SIMPLE_CHARS_PER_TOKEN);
        let special_penalty = special_chars.saturating_div(ENHANCED_SPECIAL_DIVISOR);

        let base_estimate = word_estimate
            .saturating_add(char_estimate)
            .saturating_div(2);

        base_estimate.saturating_add(special_penalty).max(1)
    }
}

/// Counts words in text (whitespace-separated).
#[inline]
fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Counts special (non-alphanumeric) characters.
#[inline]
fn count_special_chars(text: &str) -> usize {
    text.chars()
        .filter(|c| !c.is_alphanumeric() && !c.is_whitespace())
        .count()
}

/// Size statistics for a block of text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TextStats {
    /// Number of `\n` characters
    pub lines: usize,
    /// Whitespace-separated words
    pub words: usize,
    /// Unicode scalar values
    pub chars: usize,
    /// Tokens according to the run's tokenizer
    pub tokens: usize,
}

impl TextStats {
    /// Measures `text` with the given tokenizer.
    #[must_use]
    pub fn measure(text: &str, tokenizer: &Tokenizer) -> Self {
        Self {
            lines: memchr::memchr_iter(b'\n', text.as_bytes()).count(),
            words: count_words(text),
            chars: text.chars().count(),
            tokens: tokenizer.count(text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_identifiers() {
        assert_eq!(TokenizerKind::parse("cl100k_base").unwrap(), TokenizerKind::Cl100kBase);
        assert_eq!(TokenizerKind::parse("gpt2").unwrap(), TokenizerKind::R50kBase);
        assert_eq!(TokenizerKind::parse(" simple ").unwrap(), TokenizerKind::Simple);
        assert_eq!(
            TokenizerKind::parse("gpt-4").unwrap(),
            TokenizerKind::Model("gpt-4".to_string())
        );
        assert!(TokenizerKind::parse("").is_err());
    }

    #[test]
    fn test_unknown_tokenizer_is_fatal() {
        let err = Tokenizer::from_id("definitely-not-a-model").unwrap_err();
        assert!(matches!(err, Error::Tokenizer { .. }));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_cl100k_counts() {
        let tokenizer = Tokenizer::from_id(DEFAULT_TOKENIZER).unwrap();
        assert_eq!(tokenizer.count(""), 0);
        assert_eq!(tokenizer.count("hello world"), 2);
        assert_eq!(tokenizer.id(), "cl100k_base");
    }

    #[test]
    fn test_model_name_resolves_to_encoding() {
        let by_model = Tokenizer::from_id("gpt-4").unwrap();
        let by_encoding = Tokenizer::from_id("cl100k_base").unwrap();
        let text = "fn main() { println!(\"hi\"); }";
        assert_eq!(by_model.count(text), by_encoding.count(text));
    }

    #[test]
    fn test_alias_keeps_given_identifier() {
        let alias = Tokenizer::from_id(" gpt2 ").unwrap();
        let canonical = Tokenizer::from_id("r50k_base").unwrap();

        assert_eq!(alias.id(), "gpt2");
        assert_eq!(alias.kind(), &TokenizerKind::R50kBase);
        assert_eq!(canonical.id(), "r50k_base");
        assert_eq!(alias.count("hello world"), canonical.count("hello world"));
    }

    #[test]
    fn test_special_token_text_is_counted() {
        let tokenizer = Tokenizer::from_id("cl100k_base").unwrap();
        assert!(tokenizer.count("<|endoftext|>") > 1);
    }

    #[test]
    fn test_count_is_reproducible() {
        let text = "### src/lib.rs\n```rs\npub fn add(a: i32, b: i32) -> i32 { a + b }\n```\n";
        for id in ["cl100k_base", "o200k_base", "r50k_base", "simple", "enhanced"] {
            let tokenizer = Tokenizer::from_id(id).unwrap();
            assert_eq!(tokenizer.count(text), tokenizer.count(text), "{id}");
        }
    }

    #[test]
    fn test_simple_tokenizer() {
        let tokenizer = SimpleTokenizer;
        assert_eq!(tokenizer.estimate(""), 0);
        assert_eq!(tokenizer.estimate("test"), 1);
        assert_eq!(tokenizer.estimate("hello world"), 3);
        assert_eq!(tokenizer.estimate(&"a".repeat(1000)), 250);
    }

    #[test]
    fn test_enhanced_tokenizer_code() {
        let tokenizer = EnhancedTokenizer;
        assert_eq!(tokenizer.estimate(""), 0);
        let code = r#"
            fn main() {
                println!("Hello, world!");
            }
        "#;
        let result = tokenizer.estimate(code);
        assert!(result > 5);
        assert!(result < 30);
    }

    #[test]
    fn test_count_special_chars() {
        assert_eq!(count_special_chars("hello"), 0);
        assert_eq!(count_special_chars("hello!"), 1);
        assert_eq!(count_special_chars("fn main() {}"), 4);
    }

    #[test]
    fn test_text_stats() {
        let tokenizer = Tokenizer::from_id("simple").unwrap();
        let stats = TextStats::measure("one two\nthree\n", &tokenizer);
        assert_eq!(stats.lines, 2);
        assert_eq!(stats.words, 3);
        assert_eq!(stats.chars, 14);
        assert_eq!(stats.tokens, 4);
    }
}
