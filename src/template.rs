use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tera::{Context, Tera, Value};
use tracing::debug;

/// Template used when no custom template is given.
pub const DEFAULT_TEMPLATE: &str = include_str!("../templates/default.tera");

/// Name under which the active template is registered.
const TEMPLATE_NAME: &str = "prompt";

const DEFAULT_TRUNCATE_LINES: usize = 1000;

/// Renders the prompt context through a single Tera template.
///
/// The template is registered under a name without an `.html` suffix, so no
/// autoescaping is applied to file contents.
pub struct TemplateEngine {
    tera: Tera,
    source: String,
}

impl TemplateEngine {
    /// Creates an engine from a template file, or the built-in template.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or does not compile.
    pub fn new(template_path: Option<&Path>) -> Result<Self> {
        match template_path {
            Some(path) => Self::from_file(path),
            None => Self::builtin(),
        }
    }

    /// Creates an engine with the built-in template.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Template`] if the built-in template fails to compile.
    pub fn builtin() -> Result<Self> {
        Self::from_source("default", DEFAULT_TEMPLATE)
    }

    /// Creates an engine from a template file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read, and
    /// [`Error::Template`] on a syntax error.
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading template from {}", path.display());
        let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::from_source(path.display().to_string(), &content)
    }

    /// Creates an engine from template text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Template`] on a syntax error.
    pub fn from_source(source: impl Into<String>, content: &str) -> Result<Self> {
        let source = source.into();
        let mut tera = Tera::default();
        tera.add_raw_template(TEMPLATE_NAME, content)
            .map_err(|e| Error::template(source.as_str(), e))?;
        Self::register_filters(&mut tera);

        Ok(Self { tera, source })
    }

    /// Renders `context`, whose serialized fields become template variables.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Template`] if the context cannot be converted or the
    /// template fails at render time (e.g. an undefined variable).
    pub fn render<C: Serialize>(&self, context: &C) -> Result<String> {
        let context =
            Context::from_serialize(context).map_err(|e| Error::template(self.source.as_str(), e))?;

        self.tera
            .render(TEMPLATE_NAME, &context)
            .map_err(|e| Error::template(self.source.as_str(), e))
    }

    /// Where the template came from: `default` or the file path.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Registers custom Tera filters.
    fn register_filters(tera: &mut Tera) {
        tera.register_filter("truncate_lines", truncate_lines_filter);
        tera.register_filter("language", language_filter);
    }
}

/// `{{ text | truncate_lines(max=N) }}`: keeps the first N lines.
fn truncate_lines_filter(value: &Value, args: &HashMap<String, Value>) -> tera::Result<Value> {
    let max_lines = args
        .get("max")
        .and_then(Value::as_u64)
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or(DEFAULT_TRUNCATE_LINES);

    let Some(text) = value.as_str() else {
        return Ok(value.clone());
    };

    let total = text.lines().count();
    if total <= max_lines {
        return Ok(value.clone());
    }

    let kept: Vec<&str> = text.lines().take(max_lines).collect();
    Ok(Value::String(format!(
        "{}\n... ({} more lines omitted)",
        kept.join("\n"),
        total - max_lines
    )))
}

/// `{{ file.path | language }}`: language name for a path's extension.
fn language_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    let ext = value
        .as_str()
        .and_then(|path| Path::new(path).extension())
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let language = match ext.as_str() {
        "rs" => "rust",
        "py" => "python",
        "js" | "mjs" | "cjs" => "javascript",
        "ts" => "typescript",
        "jsx" => "jsx",
        "tsx" => "tsx",
        "go" => "go",
        "java" => "java",
        "c" | "h" => "c",
        "cpp" | "cc" | "cxx" | "hpp" | "hh" | "hxx" => "cpp",
        "cs" => "csharp",
        "rb" => "ruby",
        "php" => "php",
        "swift" => "swift",
        "kt" => "kotlin",
        "scala" => "scala",
        "sh" | "bash" => "bash",
        "html" | "htm" => "html",
        "css" => "css",
        "json" => "json",
        "yaml" | "yml" => "yaml",
        "toml" => "toml",
        "md" | "markdown" => "markdown",
        "sql" => "sql",
        "proto" => "protobuf",
        _ => "",
    };

    Ok(Value::String(language.to_string()))
}
