//! Path selection rules.
//!
//! Two independent predicates decide whether a path takes part in a run:
//! the user's include/exclude globs ([`PatternSet`]) and the repository's
//! `.gitignore` ([`IgnoreRule`]).

use crate::error::{Error, Result};
use globset::{GlobBuilder, GlobMatcher};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::{Component, Path};
use tracing::{debug, warn};

/// How a compiled pattern lines up against a relative path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Anchor {
    /// Match against the last `n` path segments.
    Suffix(usize),
    /// Match against the whole root-relative path.
    Full,
}

/// A single shell-style glob.
///
/// `*`, `?` and `[...]` never cross a `/`. Relative patterns are matched from
/// the right, so `vendor/*` matches `a/vendor/x.go` and `*.go` matches any Go
/// file at any depth. A leading `/` anchors the pattern to the traversal root,
/// and `**` always matches against the full path.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    matcher: GlobMatcher,
    anchor: Anchor,
}

impl Pattern {
    /// Compiles a pattern.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPattern`] if the glob syntax is invalid or the
    /// pattern is empty.
    pub fn new(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let body = trimmed.trim_end_matches('/');

        let (body, anchor) = if let Some(rest) = body.strip_prefix('/') {
            (rest, Anchor::Full)
        } else if body.contains("**") {
            (body, Anchor::Full)
        } else {
            (body, Anchor::Suffix(body.split('/').count()))
        };

        if body.is_empty() {
            return Err(Error::invalid_pattern(raw, "pattern is empty"));
        }

        let glob = GlobBuilder::new(body)
            .literal_separator(true)
            .build()
            .map_err(|e| Error::invalid_pattern(raw, e.kind().to_string()))?;

        Ok(Self {
            source: trimmed.to_string(),
            matcher: glob.compile_matcher(),
            anchor,
        })
    }

    /// Returns the pattern as written by the user.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Tests a root-relative path against this pattern.
    #[must_use]
    pub fn matches(&self, path: &Path) -> bool {
        let segments = segments(path);

        match self.anchor {
            Anchor::Full => self.matcher.is_match(segments.join("/")),
            Anchor::Suffix(n) => {
                if segments.len() < n {
                    return false;
                }
                self.matcher.is_match(segments[segments.len() - n..].join("/"))
            }
        }
    }
}

/// Splits a relative path into its normal segments, dropping `.` prefixes.
fn segments(path: &Path) -> Vec<String> {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect()
}

/// Include and exclude globs for one run.
///
/// An empty include list matches everything. Excludes always win: a path
/// matched by both lists is rejected.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    includes: Vec<Pattern>,
    excludes: Vec<Pattern>,
}

impl PatternSet {
    /// Compiles include and exclude lists.
    ///
    /// # Errors
    ///
    /// Returns the first [`Error::InvalidPattern`] encountered.
    pub fn new<I, E, S, T>(includes: I, excludes: E) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        E: IntoIterator<Item = T>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        let includes = includes
            .into_iter()
            .map(|p| Pattern::new(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        let excludes = excludes
            .into_iter()
            .map(|p| Pattern::new(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { includes, excludes })
    }

    /// True if `includes` is empty or any include pattern matches.
    #[must_use]
    pub fn is_included(&self, path: &Path) -> bool {
        self.includes.is_empty() || self.includes.iter().any(|p| p.matches(path))
    }

    /// True if any exclude pattern matches.
    #[must_use]
    pub fn is_excluded(&self, path: &Path) -> bool {
        self.excludes.iter().any(|p| p.matches(path))
    }

    /// A file is selected iff it is included and not excluded.
    #[must_use]
    pub fn is_selected(&self, path: &Path) -> bool {
        self.is_included(path) && !self.is_excluded(path)
    }

    /// Returns true when no patterns are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.includes.is_empty() && self.excludes.is_empty()
    }
}

/// Predicate compiled from the root `.gitignore`.
///
/// Built once before traversal and never modified afterwards.
#[derive(Debug, Clone)]
pub struct IgnoreRule {
    matcher: Gitignore,
}

impl IgnoreRule {
    /// Name of the ignore file looked up at the traversal root.
    pub const FILE_NAME: &'static str = ".gitignore";

    /// Loads `<root>/.gitignore`.
    ///
    /// Returns `None` when the file does not exist. Unparseable lines are
    /// logged and skipped; the rest of the file still applies.
    #[must_use]
    pub fn from_root(root: &Path) -> Option<Self> {
        let path = root.join(Self::FILE_NAME);
        if !path.is_file() {
            debug!("No {} at {}", Self::FILE_NAME, root.display());
            return None;
        }

        let mut builder = GitignoreBuilder::new(root);
        if let Some(err) = builder.add(&path) {
            warn!("Problem parsing {}: {}", path.display(), err);
        }

        match builder.build() {
            Ok(matcher) => {
                debug!(
                    "Loaded {} rules from {}",
                    matcher.num_ignores() + matcher.num_whitelists(),
                    path.display()
                );
                Some(Self { matcher })
            }
            Err(err) => {
                warn!("Ignoring unusable {}: {}", path.display(), err);
                None
            }
        }
    }

    /// Builds a rule set from in-memory gitignore lines.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPattern`] for a line that is not valid
    /// gitignore syntax.
    pub fn from_lines<'a>(root: &Path, lines: impl IntoIterator<Item = &'a str>) -> Result<Self> {
        let mut builder = GitignoreBuilder::new(root);
        for line in lines {
            builder
                .add_line(None, line)
                .map_err(|e| Error::invalid_pattern(line, e.to_string()))?;
        }

        let matcher = builder
            .build()
            .map_err(|e| Error::invalid_pattern(Self::FILE_NAME, e.to_string()))?;
        Ok(Self { matcher })
    }

    /// True if the root-relative `path` is ignored.
    #[must_use]
    pub fn is_ignored(&self, path: &Path, is_dir: bool) -> bool {
        self.matcher.matched(path, is_dir).is_ignore()
    }
}
