//! # code2prompt
//!
//! Turns a source directory into a single prompt for a language model.
//!
//! ## Features
//!
//! - Deterministic, depth-first traversal with include/exclude globs
//! - Root `.gitignore` support, with ignored directories pruned unread
//! - Optional line numbers and fenced code blocks per file
//! - Staged, unstaged or branch-to-branch git diffs, plus a commit log
//! - Tera templates, with a built-in default
//! - Token counts from `tiktoken` encodings or fast heuristics
//!
//! ## Quick Start
//!
//! ```no_run
//! use code2prompt::{Config, Pipeline};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Config::builder()
//!     .root_dir("./my-project")
//!     .include_patterns(["*.rs", "*.toml"])
//!     .exclude_patterns(["target"])
//!     .build()?;
//!
//! let prompt = Pipeline::new(config)?.run()?;
//! println!("{} tokens", prompt.token_count());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! 1. **Scanner**: walks the root and selects files
//! 2. **Formatter**: reads, numbers and fences each file
//! 3. **Assembler**: builds the template context and counts tokens
//! 4. **Template**: renders the prompt, which is recounted
//! 5. **Writer**: sends it to stdout, a file, JSON and/or the clipboard

#![warn(
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery
)]
#![allow(clippy::module_name_repetitions)]

mod config;
mod error;
mod file;
mod filter;
mod git;
mod pipeline;
mod scanner;
mod template;
mod template_validator;
mod token;
mod tree;
mod writer;

pub use config::{Config, ConfigBuilder, OutputTarget};
pub use error::{Error, Result};
pub use file::{fence_label, format_file, number_lines, read_text, FileRecord};
pub use filter::{IgnoreRule, Pattern, PatternSet};
pub use git::{parse_branch_pair, DiffCollector, DiffMode, GitCollector, DEFAULT_DIFF_TIMEOUT};
pub use pipeline::{join_formatted, GitOutput, Pipeline, PipelineStats, Prompt, RunContext};
pub use scanner::{ScanStats, Scanner, Traversal, TraversalConfig};
pub use template::{TemplateEngine, DEFAULT_TEMPLATE};
pub use token::{TextStats, TokenEstimator, Tokenizer, TokenizerKind, DEFAULT_TOKENIZER};
pub use tree::{render_tree, TreeEntry};
#[cfg(feature = "clipboard-support")]
pub use writer::SystemClipboard;
pub use writer::{Capabilities, ClipboardSink, JsonEnvelope, Writer};

/// Generates a prompt and delivers it to the configured output.
///
/// This is the main entry point for the library.
///
/// # Errors
///
/// Returns an error if:
/// - Configuration is invalid
/// - The tokenizer or template cannot be loaded
/// - The root directory cannot be traversed
/// - The output cannot be written
///
/// # Examples
///
/// ```no_run
/// use code2prompt::{run, Config, OutputTarget};
///
/// # fn main() -> anyhow::Result<()> {
/// let config = Config::builder()
///     .root_dir(".")
///     .output(OutputTarget::File("prompt.md".into()))
///     .build()?;
///
/// let prompt = run(config)?;
/// eprintln!("Total Tokens: {}", prompt.token_count());
/// # Ok(())
/// # }
/// ```
pub fn run(config: Config) -> Result<Prompt> {
    let writer = Writer::from_config(&config);
    let prompt = Pipeline::new(config)?.run()?;
    writer.dispatch(&prompt, &Capabilities::detect())?;
    Ok(prompt)
}
