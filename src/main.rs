use anyhow::Context;
use clap::Parser;
use code2prompt::{
    parse_branch_pair, Capabilities, Config, DiffMode, OutputTarget, Pipeline, Writer,
    DEFAULT_TOKENIZER,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "code2prompt",
    version,
    author,
    about = "Turn a source directory into a single LLM prompt",
    long_about = "Turn a source directory into a single LLM prompt.\n\n\
    Walks the directory, keeps files matching the include/exclude globs and the root \
    .gitignore, formats each file, optionally appends a git diff, renders everything \
    through a template and reports the token count.\n\n\
    USAGE EXAMPLES:\n  \
      # Whole project to stdout\n  \
      code2prompt ./my-project\n\n  \
      # Only Go sources, skipping vendored code, saved to a file\n  \
      code2prompt ./svc --include '*.go' --exclude 'vendor/*' -o prompt.md\n\n  \
      # Staged changes, JSON envelope, token count on stderr\n  \
      code2prompt . --diff --json --tokens"
)]
struct Cli {
    /// Directory to turn into a prompt
    #[arg(value_name = "DIRECTORY")]
    directory: PathBuf,

    /// Path to a custom Tera template file
    #[arg(short, long, value_name = "FILE")]
    template: Option<PathBuf>,

    /// Comma-separated globs a file must match
    #[arg(long, value_name = "GLOBS")]
    include: Option<String>,

    /// Comma-separated globs that exclude files and directories
    #[arg(long, value_name = "GLOBS")]
    exclude: Option<String>,

    /// Also hide excluded entries from the source tree
    #[arg(long)]
    exclude_from_tree: bool,

    /// Print the token count to stderr
    #[arg(long)]
    tokens: bool,

    /// Print a run summary to stderr
    #[arg(long)]
    stats: bool,

    /// Tokenizer: an encoding (cl100k_base, o200k_base, ...), a model name,
    /// or one of the heuristics `simple` and `enhanced`
    #[arg(long, value_name = "ID", default_value = DEFAULT_TOKENIZER)]
    encoding: String,

    /// Write the output to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Emit a JSON envelope instead of the bare prompt
    #[arg(long)]
    json: bool,

    /// Include the staged git diff
    #[arg(long, conflicts_with_all = ["diff_unstaged", "git_diff_branch"])]
    diff: bool,

    /// Include the unstaged git diff
    #[arg(long, conflicts_with = "git_diff_branch")]
    diff_unstaged: bool,

    /// Include the diff between two branches
    #[arg(long, value_name = "A,B")]
    git_diff_branch: Option<String>,

    /// Include the commit log between two branches
    #[arg(long, value_name = "A,B")]
    git_log_branch: Option<String>,

    /// Timeout for each git invocation, in seconds
    #[arg(long, value_name = "SECS", default_value_t = 30)]
    diff_timeout: u64,

    /// Prefix every line with its line number
    #[arg(short = 'l', long)]
    line_number: bool,

    /// Do not wrap file contents in fenced code blocks
    #[arg(long)]
    no_codeblock: bool,

    /// Copy the prompt to the clipboard
    #[arg(short, long)]
    copy: bool,

    /// Verbose output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn diff_mode(&self) -> anyhow::Result<DiffMode> {
        if let Some(pair) = &self.git_diff_branch {
            let (from, to) = parse_branch_pair(pair).context("Invalid --git-diff-branch")?;
            return Ok(DiffMode::Branches(from, to));
        }

        Ok(if self.diff {
            DiffMode::Staged
        } else if self.diff_unstaged {
            DiffMode::Unstaged
        } else {
            DiffMode::None
        })
    }

    fn output_target(&self) -> OutputTarget {
        match (self.json, &self.output) {
            (true, path) => OutputTarget::Json(path.clone()),
            (false, Some(path)) => OutputTarget::File(path.clone()),
            (false, None) => OutputTarget::Stdout,
        }
    }

    fn into_config(self) -> anyhow::Result<Config> {
        let mut builder = Config::builder()
            .diff_mode(self.diff_mode()?)
            .output(self.output_target())
            .root_dir(self.directory)
            .exclude_from_tree(self.exclude_from_tree)
            .line_numbers(self.line_number)
            .codeblock(!self.no_codeblock)
            .tokenizer(self.encoding)
            .diff_timeout(Duration::from_secs(self.diff_timeout))
            .copy_to_clipboard(self.copy);

        if let Some(include) = &self.include {
            builder = builder.include_patterns(Config::parse_patterns(include));
        }

        if let Some(exclude) = &self.exclude {
            builder = builder.exclude_patterns(Config::parse_patterns(exclude));
        }

        if let Some(pair) = &self.git_log_branch {
            let (from, to) = parse_branch_pair(pair).context("Invalid --git-log-branch")?;
            builder = builder.log_branches(from, to);
        }

        if let Some(template_path) = self.template {
            builder = builder.template_path(template_path);
        }

        builder.build().context("Failed to build configuration")
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_tracing(cli.verbose)?;

    let show_tokens = cli.tokens;
    let show_stats = cli.stats;
    let config = cli.into_config()?;
    let writer = Writer::from_config(&config);

    let pipeline = Pipeline::new(config).context("Failed to create pipeline")?;
    let prompt = pipeline.run().context("Prompt generation failed")?;

    writer
        .dispatch(&prompt, &Capabilities::detect())
        .context("Failed to write output")?;

    if show_tokens {
        eprintln!("Total Tokens: {}", prompt.token_count());
    }

    if show_stats {
        prompt.stats.print_summary();
    }

    Ok(())
}

/// Installs a stderr logger; `RUST_LOG` takes precedence over `-v`.
fn setup_tracing(verbosity: u8) -> anyhow::Result<()> {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("code2prompt={level}")));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("code2prompt").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&["."]);
        assert_eq!(cli.encoding, "cl100k_base");
        assert_eq!(cli.diff_timeout, 30);
        assert_eq!(cli.output_target(), OutputTarget::Stdout);
        assert_eq!(cli.diff_mode().unwrap(), DiffMode::None);
    }

    #[test]
    fn test_output_targets() {
        assert_eq!(
            parse(&[".", "-o", "out.md"]).output_target(),
            OutputTarget::File(PathBuf::from("out.md"))
        );
        assert_eq!(parse(&[".", "--json"]).output_target(), OutputTarget::Json(None));
        assert_eq!(
            parse(&[".", "--json", "--output", "p.json"]).output_target(),
            OutputTarget::Json(Some(PathBuf::from("p.json")))
        );
    }

    #[test]
    fn test_diff_modes() {
        assert_eq!(parse(&[".", "--diff"]).diff_mode().unwrap(), DiffMode::Staged);
        assert_eq!(
            parse(&[".", "--diff-unstaged"]).diff_mode().unwrap(),
            DiffMode::Unstaged
        );
        assert_eq!(
            parse(&[".", "--git-diff-branch", "main,dev"]).diff_mode().unwrap(),
            DiffMode::Branches("main".into(), "dev".into())
        );
        assert!(parse(&[".", "--git-diff-branch", "main"]).diff_mode().is_err());
    }

    #[test]
    fn test_conflicting_diff_flags() {
        let result = Cli::try_parse_from(["code2prompt", ".", "--diff", "--diff-unstaged"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_into_config() {
        let temp = assert_fs::TempDir::new().unwrap();
        let root = temp.path().to_string_lossy().into_owned();
        let cli = parse(&[
            &root,
            "--include",
            "*.go, *.mod",
            "--exclude",
            "vendor/*",
            "-l",
            "--no-codeblock",
            "--git-log-branch",
            "v1,v2",
        ]);

        let config = cli.into_config().unwrap();
        assert_eq!(config.include_patterns, vec!["*.go", "*.mod"]);
        assert_eq!(config.exclude_patterns, vec!["vendor/*"]);
        assert!(config.line_numbers);
        assert!(!config.codeblock);
        assert_eq!(config.log_branches, Some(("v1".into(), "v2".into())));
    }
}
