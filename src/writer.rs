use crate::{
    config::{Config, OutputTarget},
    error::{Error, Result},
    pipeline::Prompt,
};
use serde::Serialize;
use std::{
    ffi::OsString,
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

/// JSON document emitted with `--json`.
#[derive(Debug, Serialize)]
pub struct JsonEnvelope<'a> {
    /// Rendered prompt
    pub prompt: &'a str,

    /// Root directory name
    pub directory_name: &'a str,

    /// Final token count over `prompt`
    pub token_count: usize,

    /// Tokenizer identifier used for the count
    pub tokenizer: &'a str,

    /// Relative paths of the included files, in order
    pub files: Vec<&'a str>,

    /// Generation timestamp (RFC 3339)
    pub generated_at: String,
}

impl<'a> JsonEnvelope<'a> {
    /// Builds the envelope for a finished run.
    #[must_use]
    pub fn new(prompt: &'a Prompt) -> Self {
        Self {
            prompt: &prompt.rendered,
            directory_name: &prompt.context.directory_name,
            token_count: prompt.token_count(),
            tokenizer: &prompt.stats.tokenizer,
            files: prompt
                .context
                .files
                .iter()
                .map(|f| f.relative_path.as_str())
                .collect(),
            generated_at: chrono::Local::now().to_rfc3339(),
        }
    }

    /// Serializes the envelope as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if encoding fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Destination for the optional clipboard copy.
pub trait ClipboardSink {
    /// Replaces the clipboard contents with `text`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Clipboard`] if the clipboard cannot be reached.
    fn copy(&self, text: &str) -> Result<()>;
}

/// System clipboard through the `clipboard` crate.
#[cfg(feature = "clipboard-support")]
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClipboard;

#[cfg(feature = "clipboard-support")]
impl ClipboardSink for SystemClipboard {
    fn copy(&self, text: &str) -> Result<()> {
        use clipboard::{ClipboardContext, ClipboardProvider};

        let mut ctx: ClipboardContext = ClipboardProvider::new()
            .map_err(|e| Error::clipboard(format!("failed to access clipboard: {e}")))?;
        ctx.set_contents(text.to_owned())
            .map_err(|e| Error::clipboard(format!("failed to set contents: {e}")))
    }
}

/// Optional platform services, resolved once at startup.
#[derive(Default)]
pub struct Capabilities {
    clipboard: Option<Box<dyn ClipboardSink>>,
}

impl Capabilities {
    /// Detects what this build and platform offer.
    #[must_use]
    pub fn detect() -> Self {
        Self {
            clipboard: system_clipboard(),
        }
    }

    /// No optional services.
    #[must_use]
    pub fn none() -> Self {
        Self { clipboard: None }
    }

    /// Uses `sink` as the clipboard.
    #[must_use]
    pub fn with_clipboard(mut self, sink: impl ClipboardSink + 'static) -> Self {
        self.clipboard = Some(Box::new(sink));
        self
    }

    /// Returns the clipboard sink, if any.
    #[must_use]
    pub fn clipboard(&self) -> Option<&dyn ClipboardSink> {
        self.clipboard.as_deref()
    }
}

#[cfg(feature = "clipboard-support")]
fn system_clipboard() -> Option<Box<dyn ClipboardSink>> {
    Some(Box::new(SystemClipboard))
}

#[cfg(not(feature = "clipboard-support"))]
fn system_clipboard() -> Option<Box<dyn ClipboardSink>> {
    None
}

/// Delivers a finished prompt to its target.
#[derive(Debug, Clone)]
pub struct Writer {
    target: OutputTarget,
    copy_to_clipboard: bool,
}

impl Writer {
    /// Creates a writer for `target`, optionally also copying to the clipboard.
    #[must_use]
    pub const fn new(target: OutputTarget, copy_to_clipboard: bool) -> Self {
        Self {
            target,
            copy_to_clipboard,
        }
    }

    /// Creates a writer from the run configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.output.clone(), config.copy_to_clipboard)
    }

    /// Writes the prompt to its target, with standard output as the console.
    ///
    /// # Errors
    ///
    /// See [`Writer::dispatch_to`].
    pub fn dispatch(&self, prompt: &Prompt, capabilities: &Capabilities) -> Result<()> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        self.dispatch_to(prompt, capabilities, &mut out)
    }

    /// Writes the prompt to its target, using `console` in place of standard
    /// output.
    ///
    /// The clipboard copy runs after the primary target and never fails the
    /// call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the primary target cannot be written, and
    /// [`Error::Serialization`] if the JSON envelope cannot be encoded.
    pub fn dispatch_to<W: Write>(
        &self,
        prompt: &Prompt,
        capabilities: &Capabilities,
        console: &mut W,
    ) -> Result<()> {
        match &self.target {
            OutputTarget::Stdout => write_console(console, &prompt.rendered)?,
            OutputTarget::File(path) => {
                write_file_atomic(path, &prompt.rendered)?;
                info!("Prompt written to {}", path.display());
            }
            OutputTarget::Json(dest) => {
                let json = JsonEnvelope::new(prompt).to_json()?;
                match dest {
                    Some(path) => {
                        write_file_atomic(path, &json)?;
                        info!("JSON output written to {}", path.display());
                    }
                    None => write_console(console, &json)?,
                }
            }
        }

        if self.copy_to_clipboard {
            copy_to_clipboard(capabilities, &prompt.rendered);
        }

        Ok(())
    }
}

fn copy_to_clipboard(capabilities: &Capabilities, text: &str) {
    let Some(sink) = capabilities.clipboard() else {
        warn!("Clipboard support is not available in this build; skipping copy");
        return;
    };

    match sink.copy(text) {
        Ok(()) => info!("Prompt copied to clipboard ({} bytes)", text.len()),
        Err(e) => warn!("{}", e),
    }
}

fn write_console<W: Write>(console: &mut W, text: &str) -> Result<()> {
    debug!("Writing {} bytes to stdout", text.len());
    write_terminated(console, text).map_err(|e| Error::io("<stdout>", e))
}

fn write_terminated<W: Write>(console: &mut W, text: &str) -> io::Result<()> {
    console.write_all(text.as_bytes())?;
    if !text.ends_with('\n') {
        console.write_all(b"\n")?;
    }
    console.flush()
}

/// Writes a file atomically.
///
/// # Process
///
/// 1. Creates missing parent directories
/// 2. Writes content to a sibling temporary file
/// 3. Syncs the temporary file to disk
/// 4. Renames it over the target path
fn write_file_atomic(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }

    let temp_path = temp_path_for(path);
    let mut temp_file = fs::File::create(&temp_path).map_err(|e| Error::io(&temp_path, e))?;

    temp_file
        .write_all(content.as_bytes())
        .map_err(|e| Error::io(&temp_path, e))?;
    temp_file.sync_all().map_err(|e| Error::io(&temp_path, e))?;
    drop(temp_file);

    if let Err(e) = fs::rename(&temp_path, path) {
        // Best effort; the rename error is the one worth reporting.
        let _ = fs::remove_file(&temp_path);
        return Err(Error::io(path, e));
    }

    debug!("Wrote {} bytes to {}", content.len(), path.display());
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map_or_else(|| OsString::from("output"), ToOwned::to_owned);
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::format_file;
    use crate::pipeline::{PipelineStats, RunContext};
    use crate::token::TextStats;
    use assert_fs::prelude::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    #[derive(Default, Clone)]
    struct FakeClipboard {
        copied: Rc<RefCell<Vec<String>>>,
    }

    impl ClipboardSink for FakeClipboard {
        fn copy(&self, text: &str) -> Result<()> {
            self.copied.borrow_mut().push(text.to_string());
            Ok(())
        }
    }

    struct BrokenClipboard;

    impl ClipboardSink for BrokenClipboard {
        fn copy(&self, _text: &str) -> Result<()> {
            Err(Error::clipboard("no display"))
        }
    }

    fn prompt() -> Prompt {
        let context = RunContext {
            directory_name: "proj".to_string(),
            files: vec![format_file("main.go", "package main\n", false, true)],
            git_diff_output: String::new(),
            git_log_output: String::new(),
            source_tree: String::new(),
            token_count: 17,
        };

        Prompt {
            rendered: "# Codebase: proj\n### main.go\n".to_string(),
            context,
            stats: PipelineStats {
                selected_files: 1,
                formatted_files: 1,
                skipped_files: 0,
                text: TextStats::default(),
                context_tokens: 5,
                tokenizer: "cl100k_base".to_string(),
                duration: Duration::ZERO,
                scan_duration: Duration::ZERO,
                git_duration: Duration::ZERO,
                render_duration: Duration::ZERO,
            },
        }
    }

    #[test]
    fn test_stdout_target() {
        let mut out = Vec::new();
        Writer::new(OutputTarget::Stdout, false)
            .dispatch_to(&prompt(), &Capabilities::none(), &mut out)
            .unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), "# Codebase: proj\n### main.go\n");
    }

    #[test]
    fn test_file_target_writes_atomically() {
        let temp = assert_fs::TempDir::new().unwrap();
        let target = temp.child("nested/out.md");
        let mut out = Vec::new();

        Writer::new(OutputTarget::File(target.path().to_path_buf()), false)
            .dispatch_to(&prompt(), &Capabilities::none(), &mut out)
            .unwrap();

        assert_eq!(
            fs::read_to_string(target.path()).unwrap(),
            "# Codebase: proj\n### main.go\n"
        );
        assert!(!temp.child("nested/out.md.tmp").exists());
        assert!(out.is_empty());
    }

    #[test]
    fn test_file_target_overwrites() {
        let temp = assert_fs::TempDir::new().unwrap();
        let target = temp.child("out.md");
        target.write_str("stale content that is longer than the prompt").unwrap();

        Writer::new(OutputTarget::File(target.path().to_path_buf()), false)
            .dispatch_to(&prompt(), &Capabilities::none(), &mut Vec::new())
            .unwrap();

        assert_eq!(
            fs::read_to_string(target.path()).unwrap(),
            "# Codebase: proj\n### main.go\n"
        );
    }

    #[test]
    fn test_json_envelope_to_console() {
        let mut out = Vec::new();
        Writer::new(OutputTarget::Json(None), false)
            .dispatch_to(&prompt(), &Capabilities::none(), &mut out)
            .unwrap();

        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["prompt"], "# Codebase: proj\n### main.go\n");
        assert_eq!(value["directory_name"], "proj");
        assert_eq!(value["token_count"], 17);
        assert_eq!(value["tokenizer"], "cl100k_base");
        assert_eq!(value["files"], serde_json::json!(["main.go"]));
        assert!(value["generated_at"].is_string());
    }

    #[test]
    fn test_json_envelope_to_file() {
        let temp = assert_fs::TempDir::new().unwrap();
        let target = temp.child("prompt.json");
        let mut out = Vec::new();

        Writer::new(OutputTarget::Json(Some(target.path().to_path_buf())), false)
            .dispatch_to(&prompt(), &Capabilities::none(), &mut out)
            .unwrap();

        assert!(out.is_empty());
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(target.path()).unwrap()).unwrap();
        assert_eq!(value["token_count"], 17);
    }

    #[test]
    fn test_clipboard_receives_rendered_prompt() {
        let clipboard = FakeClipboard::default();
        let copied = Rc::clone(&clipboard.copied);
        let capabilities = Capabilities::none().with_clipboard(clipboard);

        Writer::new(OutputTarget::Stdout, true)
            .dispatch_to(&prompt(), &capabilities, &mut Vec::new())
            .unwrap();

        assert_eq!(*copied.borrow(), vec!["# Codebase: proj\n### main.go\n".to_string()]);
    }

    #[test]
    fn test_clipboard_not_used_unless_requested() {
        let clipboard = FakeClipboard::default();
        let copied = Rc::clone(&clipboard.copied);
        let capabilities = Capabilities::none().with_clipboard(clipboard);

        Writer::new(OutputTarget::Stdout, false)
            .dispatch_to(&prompt(), &capabilities, &mut Vec::new())
            .unwrap();

        assert!(copied.borrow().is_empty());
    }

    #[test]
    fn test_clipboard_failure_is_not_fatal() {
        let capabilities = Capabilities::none().with_clipboard(BrokenClipboard);
        let mut out = Vec::new();

        Writer::new(OutputTarget::Stdout, true)
            .dispatch_to(&prompt(), &capabilities, &mut out)
            .unwrap();
        assert!(!out.is_empty());

        Writer::new(OutputTarget::Stdout, true)
            .dispatch_to(&prompt(), &Capabilities::none(), &mut Vec::new())
            .unwrap();
    }

    #[test]
    fn test_unwritable_file_is_error() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("blocker").write_str("file, not a dir").unwrap();
        let target = temp.path().join("blocker/out.md");

        let err = Writer::new(OutputTarget::File(target), false)
            .dispatch_to(&prompt(), &Capabilities::none(), &mut Vec::new())
            .unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn test_temp_path_is_sibling() {
        assert_eq!(
            temp_path_for(Path::new("/a/b/prompt")),
            PathBuf::from("/a/b/prompt.tmp")
        );
        assert_eq!(
            temp_path_for(Path::new("out.md")),
            PathBuf::from("out.md.tmp")
        );
    }
}
