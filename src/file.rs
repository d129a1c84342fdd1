use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

static BINARY_EXTENSIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "exe", "dll", "so", "dylib", "a", "o", "obj", "png", "jpg", "jpeg", "gif", "bmp", "ico",
        "webp", "mp3", "mp4", "avi", "mkv", "mov", "wav", "flac", "pdf", "doc", "docx", "xls",
        "xlsx", "ppt", "pptx", "zip", "tar", "gz", "bz2", "xz", "7z", "rar", "wasm", "pyc",
        "class",
    ]
    .into_iter()
    .collect()
});

const SNIFF_SIZE: usize = 8192;

/// A selected file, read and formatted for the prompt.
///
/// Serialized into the template context as `{ path, content, formatted_content }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    /// Path relative to the traversal root, `/`-separated
    #[serde(rename = "path")]
    pub relative_path: String,

    /// Content as read (with line numbers when enabled)
    #[serde(rename = "content")]
    pub raw_content: String,

    /// Heading plus content, fenced when enabled
    pub formatted_content: String,
}

impl FileRecord {
    /// Returns the number of lines in the raw content.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.raw_content.lines().count()
    }
}

/// Formats one file's content.
///
/// Line numbers are applied first, then the optional fence labelled with the
/// file extension. The result always starts with a `### <path>` heading.
#[must_use]
pub fn format_file(
    relative_path: &str,
    raw_content: &str,
    line_numbers: bool,
    codeblock: bool,
) -> FileRecord {
    let content = if line_numbers {
        number_lines(raw_content)
    } else {
        raw_content.to_string()
    };

    let formatted_content = if codeblock {
        format!(
            "### {relative_path}\n```{}\n{content}\n```\n",
            fence_label(relative_path)
        )
    } else {
        format!("### {relative_path}\n{content}\n")
    };

    FileRecord {
        relative_path: relative_path.to_string(),
        raw_content: content,
        formatted_content,
    }
}

/// Prefixes every line with `"<n>: "`, keeping line terminators intact.
#[must_use]
pub fn number_lines(content: &str) -> String {
    let mut numbered = String::with_capacity(content.len() + content.len() / 8);
    for (idx, line) in content.split_inclusive('\n').enumerate() {
        numbered.push_str(&(idx + 1).to_string());
        numbered.push_str(": ");
        numbered.push_str(line);
    }
    numbered
}

/// Fence label for a path: its extension without the dot, or empty.
#[must_use]
pub fn fence_label(path: &str) -> &str {
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
}

/// Reads a file as UTF-8 text.
///
/// The handle is scoped to this call and released on every exit path.
///
/// # Errors
///
/// - [`Error::InvalidUtf8`] for binary-looking or undecodable files
/// - [`Error::FileRead`] when the file cannot be opened or read
pub fn read_text(path: &Path) -> Result<String> {
    if has_binary_extension(path) {
        return Err(Error::invalid_utf8(path));
    }

    let file = File::open(path).map_err(|e| Error::file_read(path, &e))?;
    let mut reader = BufReader::new(file);
    let mut bytes = Vec::new();
    reader
        .read_to_end(&mut bytes)
        .map_err(|e| Error::file_read(path, &e))?;

    let sample = &bytes[..bytes.len().min(SNIFF_SIZE)];
    if memchr::memchr(0, sample).is_some() {
        return Err(Error::invalid_utf8(path));
    }

    String::from_utf8(bytes).map_err(|_| Error::invalid_utf8(path))
}

/// Checks if a file extension suggests a binary file.
#[must_use]
pub(crate) fn has_binary_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| BINARY_EXTENSIONS.contains(ext.to_ascii_lowercase().as_str()))
}
