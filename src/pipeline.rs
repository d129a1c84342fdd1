use crate::{
    config::Config,
    error::Result,
    file::FileRecord,
    git::{DiffCollector, GitCollector},
    scanner::Scanner,
    template::TemplateEngine,
    token::{TextStats, Tokenizer},
    tree::render_tree,
};
use serde::Serialize;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Everything the template sees.
///
/// Assembled once per run and never mutated afterwards; the final token count
/// is attached by building a new value with [`RunContext::with_token_count`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunContext {
    /// Final component of the root directory
    pub directory_name: String,
    /// Formatted files in traversal order
    pub files: Vec<FileRecord>,
    /// Diff text, empty when disabled or unavailable
    pub git_diff_output: String,
    /// One-line commit log, empty when disabled or unavailable
    pub git_log_output: String,
    /// Rendered directory tree
    pub source_tree: String,
    /// Token count
    pub token_count: usize,
}

impl RunContext {
    /// Assembles the context, counting tokens over the concatenated file
    /// records.
    #[must_use]
    pub fn assemble(
        directory_name: String,
        files: Vec<FileRecord>,
        git: GitOutput,
        source_tree: String,
        tokenizer: &Tokenizer,
    ) -> Self {
        let token_count = tokenizer.count(&join_formatted(&files));
        Self {
            directory_name,
            files,
            git_diff_output: git.diff,
            git_log_output: git.log,
            source_tree,
            token_count,
        }
    }

    /// Returns a copy of this context carrying `token_count`.
    #[must_use]
    pub fn with_token_count(self, token_count: usize) -> Self {
        Self {
            token_count,
            ..self
        }
    }

    /// Relative paths of the files in the context, in order.
    #[must_use]
    pub fn file_paths(&self) -> Vec<String> {
        self.files.iter().map(|f| f.relative_path.clone()).collect()
    }
}

/// Joins formatted records with a newline, in order.
#[must_use]
pub fn join_formatted(files: &[FileRecord]) -> String {
    files
        .iter()
        .map(|f| f.formatted_content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Version-control text collected for the prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitOutput {
    /// Diff text
    pub diff: String,
    /// Commit log text
    pub log: String,
}

/// Statistics collected during pipeline execution.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStats {
    /// Files that passed every selection rule
    pub selected_files: usize,

    /// Files that made it into the prompt
    pub formatted_files: usize,

    /// Selected files dropped as unreadable, binary or empty
    pub skipped_files: usize,

    /// Size of the rendered prompt
    pub text: TextStats,

    /// Token count embedded in the template context
    pub context_tokens: usize,

    /// Tokenizer identifier
    pub tokenizer: String,

    /// Total execution time
    pub duration: Duration,

    /// Time spent walking and formatting
    pub scan_duration: Duration,

    /// Time spent collecting git output
    pub git_duration: Duration,

    /// Time spent rendering and counting
    pub render_duration: Duration,
}

impl PipelineStats {
    /// Prints a human-readable summary to stderr.
    pub fn print_summary(&self) {
        eprintln!("\n╔═══════════════════════════════════════════════════════╗");
        eprintln!("║              Prompt Generation Summary                ║");
        eprintln!("╠═══════════════════════════════════════════════════════╣");
        eprintln!("║ Files Selected:       {:>8}                        ║", self.selected_files);
        eprintln!("║   - Included:         {:>8}                        ║", self.formatted_files);
        eprintln!("║   - Skipped:          {:>8}                        ║", self.skipped_files);
        eprintln!("║                                                       ║");
        eprintln!("║ Lines:                {:>8}                        ║", self.text.lines);
        eprintln!("║ Words:                {:>8}                        ║", self.text.words);
        eprintln!("║ Characters:           {:>8}                        ║", self.text.chars);
        eprintln!("║ Total Tokens:         {:>8}                        ║", self.text.tokens);
        eprintln!("║ Tokenizer:            {:>8}                        ║", self.tokenizer);
        eprintln!("║                                                       ║");
        eprintln!("║ Timing Breakdown:                                     ║");
        eprintln!(
            "║   - Scanning:         {:>8.2}s                     ║",
            self.scan_duration.as_secs_f64()
        );
        eprintln!(
            "║   - Git:              {:>8.2}s                     ║",
            self.git_duration.as_secs_f64()
        );
        eprintln!(
            "║   - Rendering:        {:>8.2}s                     ║",
            self.render_duration.as_secs_f64()
        );
        eprintln!(
            "║   - Total:            {:>8.2}s                     ║",
            self.duration.as_secs_f64()
        );
        eprintln!("╚═══════════════════════════════════════════════════════╝\n");
    }
}

/// Output of one run.
#[derive(Debug, Clone)]
pub struct Prompt {
    /// Rendered template output
    pub rendered: String,
    /// Context with the final token count
    pub context: RunContext,
    /// Run statistics
    pub stats: PipelineStats,
}

impl Prompt {
    /// Final token count over the rendered text.
    #[must_use]
    pub const fn token_count(&self) -> usize {
        self.context.token_count
    }
}

/// Main pipeline orchestrator for turning a directory into a prompt.
pub struct Pipeline {
    config: Config,
    tokenizer: Tokenizer,
    engine: TemplateEngine,
    collector: Box<dyn DiffCollector>,
}

impl Pipeline {
    /// Creates a new pipeline with the given configuration.
    ///
    /// The tokenizer and template are resolved here, before any file is read.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration validation fails
    /// - The tokenizer identifier is unknown
    /// - The template does not compile
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let tokenizer = Tokenizer::from_id(&config.tokenizer)?;
        let engine = TemplateEngine::new(config.template_path.as_deref())?;
        let collector = Box::new(GitCollector::new(config.diff_timeout));

        debug!(
            "Pipeline ready (tokenizer: {} via {}, template: {})",
            tokenizer.id(),
            tokenizer.kind(),
            engine.source()
        );

        Ok(Self {
            config,
            tokenizer,
            engine,
            collector,
        })
    }

    /// Replaces the git collector.
    #[must_use]
    pub fn with_collector(mut self, collector: impl DiffCollector + 'static) -> Self {
        self.collector = Box::new(collector);
        self
    }

    /// Returns the tokenizer used for every count in the run.
    #[must_use]
    pub const fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    /// Executes the pipeline and returns the rendered prompt.
    ///
    /// # Process
    ///
    /// 1. **Scan**: walk the root, select files, read and format them
    /// 2. **Git**: collect the diff and log when requested
    /// 3. **Assemble**: build the context and count tokens over the files
    /// 4. **Render**: run the template and recount over the result
    ///
    /// # Errors
    ///
    /// Returns an error if the root cannot be traversed or the template fails
    /// to render. Unreadable files and git failures are logged and skipped.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use code2prompt::{Config, Pipeline};
    ///
    /// # fn main() -> anyhow::Result<()> {
    /// let config = Config::builder().root_dir("./src").build()?;
    ///
    /// let prompt = Pipeline::new(config)?.run()?;
    /// println!("{}", prompt.rendered);
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip(self), fields(root_dir = %self.config.root_dir.display()))]
    pub fn run(&self) -> Result<Prompt> {
        let start_time = Instant::now();
        let directory_name = self.config.directory_name();

        info!("Stage 1/3: Scanning {}...", directory_name);
        let scan_start = Instant::now();
        let scanner = Scanner::new(self.config.traversal()?);
        let (traversal, files) = scanner.scan()?;
        let source_tree = render_tree(&directory_name, &traversal.tree);
        let scan_duration = scan_start.elapsed();

        let selected_files = traversal.selected.len();
        let skipped_files = selected_files - files.len();
        info!(
            "✓ Selected {} files ({} skipped) in {:.2}s",
            files.len(),
            skipped_files,
            scan_duration.as_secs_f64()
        );

        let git_start = Instant::now();
        let git = self.collect_git(&self.config.root_dir)?;
        let git_duration = git_start.elapsed();

        info!("Stage 3/3: Rendering prompt...");
        let render_start = Instant::now();
        let context = RunContext::assemble(directory_name, files, git, source_tree, &self.tokenizer);
        let context_tokens = context.token_count;

        let rendered = self.engine.render(&context)?;
        let text = TextStats::measure(&rendered, &self.tokenizer);
        let context = context.with_token_count(text.tokens);
        let render_duration = render_start.elapsed();

        info!(
            "✓ Rendered {} tokens ({} in file content) in {:.2}s",
            text.tokens,
            context_tokens,
            render_duration.as_secs_f64()
        );

        let stats = PipelineStats {
            selected_files,
            formatted_files: context.files.len(),
            skipped_files,
            text,
            context_tokens,
            tokenizer: self.tokenizer.id().to_string(),
            duration: start_time.elapsed(),
            scan_duration,
            git_duration,
            render_duration,
        };

        Ok(Prompt {
            rendered,
            context,
            stats,
        })
    }

    /// Collects diff and log text. Recoverable failures degrade to empty
    /// strings.
    fn collect_git(&self, dir: &Path) -> Result<GitOutput> {
        let mut output = GitOutput::default();

        if self.config.diff_mode.is_enabled() {
            info!("Stage 2/3: Collecting git diff...");
            output.diff = recover(self.collector.diff(dir, &self.config.diff_mode), "diff")?;
        }

        if let Some((from, to)) = &self.config.log_branches {
            info!("Stage 2/3: Collecting git log {}..{}...", from, to);
            output.log = recover(self.collector.log(dir, from, to), "log")?;
        }

        Ok(output)
    }
}

fn recover(result: Result<String>, what: &str) -> Result<String> {
    match result {
        Ok(text) => Ok(text),
        Err(e) if e.is_recoverable() => {
            warn!("Git {} unavailable, continuing without it: {}", what, e);
            Ok(String::new())
        }
        Err(e) => Err(e),
    }
}
