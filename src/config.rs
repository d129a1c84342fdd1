use crate::error::{Error, Result};
use crate::filter::{IgnoreRule, PatternSet};
use crate::git::{DiffMode, DEFAULT_DIFF_TIMEOUT};
use crate::scanner::TraversalConfig;
use crate::template_validator::TemplateValidator;
use crate::token::DEFAULT_TOKENIZER;
use std::path::PathBuf;
use std::time::Duration;

/// Where the rendered prompt goes.
///
/// Exactly one primary target per run; clipboard copy is configured
/// separately and combines with any of them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OutputTarget {
    /// Print the rendered prompt to standard output
    #[default]
    Stdout,
    /// Write the rendered prompt to a file
    File(PathBuf),
    /// Emit a JSON envelope, to standard output or to the given file
    Json(Option<PathBuf>),
}

/// Configuration for one prompt generation run.
///
/// Use [`Config::builder()`] to construct a new configuration.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Config {
    /// Root directory to traverse
    pub root_dir: PathBuf,

    /// Glob patterns a file must match (empty = everything)
    pub include_patterns: Vec<String>,

    /// Glob patterns that reject files and prune directories
    pub exclude_patterns: Vec<String>,

    /// Hide excluded entries from the source tree view
    pub exclude_from_tree: bool,

    /// Prefix every line with its line number
    pub line_numbers: bool,

    /// Wrap file content in fenced code blocks
    pub codeblock: bool,

    /// Tokenizer identifier used for every count in the run
    pub tokenizer: String,

    /// Path to a custom Tera template
    pub template_path: Option<PathBuf>,

    /// Which diff to embed
    pub diff_mode: DiffMode,

    /// Branch pair for the embedded commit log
    pub log_branches: Option<(String, String)>,

    /// Upper bound for each git invocation
    pub diff_timeout: Duration,

    /// Primary output target
    pub output: OutputTarget,

    /// Also copy the rendered prompt to the clipboard
    pub copy_to_clipboard: bool,
}

impl Config {
    /// Creates a new configuration builder.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use code2prompt::Config;
    ///
    /// let config = Config::builder()
    ///     .root_dir("./src")
    ///     .include_patterns(["*.rs"])
    ///     .build()
    ///     .expect("valid configuration");
    /// ```
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Splits a comma-separated pattern list, trimming and dropping blanks.
    ///
    /// # Examples
    ///
    /// ```
    /// use code2prompt::Config;
    ///
    /// assert_eq!(Config::parse_patterns("*.rs, *.toml,,"), vec!["*.rs", "*.toml"]);
    /// ```
    #[must_use]
    pub fn parse_patterns(list: &str) -> Vec<String> {
        list.split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Root directory doesn't exist or can't be listed
    /// - A pattern is not a valid glob
    /// - The tokenizer identifier is empty
    /// - The template file is missing or malformed
    pub fn validate(&self) -> Result<()> {
        if !self.root_dir.exists() {
            return Err(Error::traversal(&self.root_dir, "directory does not exist"));
        }

        if !self.root_dir.is_dir() {
            return Err(Error::traversal(&self.root_dir, "path is not a directory"));
        }

        std::fs::read_dir(&self.root_dir)
            .map_err(|e| Error::traversal(&self.root_dir, e.to_string()))?;

        PatternSet::new(&self.include_patterns, &self.exclude_patterns)?;

        if self.tokenizer.trim().is_empty() {
            return Err(Error::config("tokenizer identifier must not be empty"));
        }

        if self.diff_timeout.is_zero() {
            return Err(Error::config("diff_timeout must be greater than 0"));
        }

        if let DiffMode::Branches(from, to) = &self.diff_mode {
            if from.is_empty() || to.is_empty() {
                return Err(Error::config("diff branches must not be empty"));
            }
        }

        if let Some((from, to)) = &self.log_branches {
            if from.is_empty() || to.is_empty() {
                return Err(Error::config("log branches must not be empty"));
            }
        }

        if let Some(ref template_path) = self.template_path {
            TemplateValidator::validate_template(template_path)?;
        }

        Ok(())
    }

    /// Compiles the traversal rules for this run.
    ///
    /// Loads the root `.gitignore` once; its absence is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if a pattern fails to compile.
    pub fn traversal(&self) -> Result<TraversalConfig> {
        Ok(TraversalConfig {
            root: self.root_dir.clone(),
            patterns: PatternSet::new(&self.include_patterns, &self.exclude_patterns)?,
            ignore: IgnoreRule::from_root(&self.root_dir),
            exclude_from_tree: self.exclude_from_tree,
            line_numbers: self.line_numbers,
            codeblock: self.codeblock,
        })
    }

    /// Name of the root directory as shown in the prompt.
    #[must_use]
    pub fn directory_name(&self) -> String {
        let resolved = self
            .root_dir
            .canonicalize()
            .unwrap_or_else(|_| self.root_dir.clone());

        resolved
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| resolved.display().to_string())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("."),
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            exclude_from_tree: false,
            line_numbers: false,
            codeblock: true,
            tokenizer: DEFAULT_TOKENIZER.to_string(),
            template_path: None,
            diff_mode: DiffMode::None,
            log_branches: None,
            diff_timeout: DEFAULT_DIFF_TIMEOUT,
            output: OutputTarget::Stdout,
            copy_to_clipboard: false,
        }
    }
}

/// Builder for creating a [`Config`].
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    root_dir: Option<PathBuf>,
    include_patterns: Vec<String>,
    exclude_patterns: Vec<String>,
    exclude_from_tree: bool,
    line_numbers: bool,
    codeblock: Option<bool>,
    tokenizer: Option<String>,
    template_path: Option<PathBuf>,
    diff_mode: DiffMode,
    log_branches: Option<(String, String)>,
    diff_timeout: Option<Duration>,
    output: OutputTarget,
    copy_to_clipboard: bool,
}

impl ConfigBuilder {
    /// Sets the root directory to traverse.
    #[must_use]
    pub fn root_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.root_dir = Some(path.into());
        self
    }

    /// Sets the include patterns.
    #[must_use]
    pub fn include_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include_patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the exclude patterns.
    #[must_use]
    pub fn exclude_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Hides excluded entries from the source tree view.
    #[must_use]
    pub fn exclude_from_tree(mut self, enabled: bool) -> Self {
        self.exclude_from_tree = enabled;
        self
    }

    /// Enables or disables line numbers.
    #[must_use]
    pub fn line_numbers(mut self, enabled: bool) -> Self {
        self.line_numbers = enabled;
        self
    }

    /// Enables or disables fenced code blocks.
    #[must_use]
    pub fn codeblock(mut self, enabled: bool) -> Self {
        self.codeblock = Some(enabled);
        self
    }

    /// Sets the tokenizer identifier.
    #[must_use]
    pub fn tokenizer(mut self, id: impl Into<String>) -> Self {
        self.tokenizer = Some(id.into());
        self
    }

    /// Sets the path to an external template file.
    ///
    /// The file must exist and contain valid Tera syntax.
    #[must_use]
    pub fn template_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.template_path = Some(path.into());
        self
    }

    /// Sets the diff mode.
    #[must_use]
    pub fn diff_mode(mut self, mode: DiffMode) -> Self {
        self.diff_mode = mode;
        self
    }

    /// Embeds the commit log between two branches.
    #[must_use]
    pub fn log_branches(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.log_branches = Some((from.into(), to.into()));
        self
    }

    /// Sets the timeout for each git invocation.
    #[must_use]
    pub fn diff_timeout(mut self, timeout: Duration) -> Self {
        self.diff_timeout = Some(timeout);
        self
    }

    /// Sets the primary output target.
    #[must_use]
    pub fn output(mut self, target: OutputTarget) -> Self {
        self.output = target;
        self
    }

    /// Enables or disables copying to the clipboard.
    #[must_use]
    pub fn copy_to_clipboard(mut self, enabled: bool) -> Self {
        self.copy_to_clipboard = enabled;
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn build(self) -> Result<Config> {
        let config = Config {
            root_dir: self.root_dir.unwrap_or_else(|| PathBuf::from(".")),
            include_patterns: self.include_patterns,
            exclude_patterns: self.exclude_patterns,
            exclude_from_tree: self.exclude_from_tree,
            line_numbers: self.line_numbers,
            codeblock: self.codeblock.unwrap_or(true),
            tokenizer: self
                .tokenizer
                .unwrap_or_else(|| DEFAULT_TOKENIZER.to_string()),
            template_path: self.template_path,
            diff_mode: self.diff_mode,
            log_branches: self.log_branches,
            diff_timeout: self.diff_timeout.unwrap_or(DEFAULT_DIFF_TIMEOUT),
            output: self.output,
            copy_to_clipboard: self.copy_to_clipboard,
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    #[test]
    fn test_default_config() {
        let temp = assert_fs::TempDir::new().unwrap();
        let config = Config::builder().root_dir(temp.path()).build().unwrap();

        assert!(config.codeblock);
        assert!(!config.line_numbers);
        assert_eq!(config.tokenizer, "cl100k_base");
        assert_eq!(config.output, OutputTarget::Stdout);
        assert_eq!(config.diff_mode, DiffMode::None);
    }

    #[test]
    fn test_missing_root_is_traversal_error() {
        let result = Config::builder()
            .root_dir("/nonexistent/path/that/should/not/exist")
            .build();

        assert!(matches!(result, Err(Error::Traversal { .. })));
    }

    #[test]
    fn test_root_must_be_directory() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("file.txt");
        file.write_str("x").unwrap();

        let result = Config::builder().root_dir(file.path()).build();
        assert!(matches!(result, Err(Error::Traversal { .. })));
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let temp = assert_fs::TempDir::new().unwrap();
        let result = Config::builder()
            .root_dir(temp.path())
            .exclude_patterns(["[oops"])
            .build();

        assert!(matches!(result, Err(Error::InvalidPattern { .. })));
    }

    #[test]
    fn test_missing_template_is_rejected() {
        let temp = assert_fs::TempDir::new().unwrap();
        let result = Config::builder()
            .root_dir(temp.path())
            .template_path(temp.path().join("missing.tera"))
            .build();

        assert!(result.is_err());
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let temp = assert_fs::TempDir::new().unwrap();
        let result = Config::builder()
            .root_dir(temp.path())
            .diff_timeout(Duration::ZERO)
            .build();

        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_parse_patterns() {
        assert_eq!(Config::parse_patterns("*.go"), vec!["*.go"]);
        assert_eq!(
            Config::parse_patterns(" *.rs ,vendor/* , "),
            vec!["*.rs", "vendor/*"]
        );
        assert!(Config::parse_patterns("").is_empty());
    }

    #[test]
    fn test_directory_name() {
        let temp = assert_fs::TempDir::new().unwrap();
        let project = temp.child("my-project");
        project.create_dir_all().unwrap();

        let config = Config::builder().root_dir(project.path()).build().unwrap();
        assert_eq!(config.directory_name(), "my-project");
    }

    #[test]
    fn test_traversal_loads_gitignore() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child(".gitignore").write_str("*.md\n").unwrap();

        let config = Config::builder().root_dir(temp.path()).build().unwrap();
        let traversal = config.traversal().unwrap();
        assert!(traversal.ignore.is_some());
        assert!(traversal.codeblock);
    }
}
