use crate::{
    error::{Error, Result},
    file::{format_file, read_text, FileRecord},
    filter::{IgnoreRule, PatternSet},
    tree::TreeEntry,
};
use std::cmp::Ordering;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, trace, warn};
use walkdir::{DirEntry, WalkDir};

/// Version-control metadata directory, never part of a prompt.
const VCS_DIR: &str = ".git";

/// Immutable settings for one traversal.
#[derive(Debug, Clone)]
pub struct TraversalConfig {
    /// Directory to walk
    pub root: PathBuf,
    /// Include/exclude globs
    pub patterns: PatternSet,
    /// Rules from the root `.gitignore`, if present
    pub ignore: Option<IgnoreRule>,
    /// Hide excluded entries from the tree view
    pub exclude_from_tree: bool,
    /// Number lines when formatting
    pub line_numbers: bool,
    /// Fence content when formatting
    pub codeblock: bool,
}

impl TraversalConfig {
    /// Creates a configuration with no patterns, no ignore rules and default
    /// formatting.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            patterns: PatternSet::default(),
            ignore: None,
            exclude_from_tree: false,
            line_numbers: false,
            codeblock: true,
        }
    }
}

/// Counters collected during a walk.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanStats {
    /// Files seen (after directory pruning)
    pub visited_files: usize,
    /// Files that passed every rule
    pub selected_files: usize,
    /// Files and directories rejected by `.gitignore`
    pub ignored: usize,
    /// Files and directories rejected by exclude patterns
    pub excluded: usize,
    /// Files not matching any include pattern
    pub not_included: usize,
    /// Unreadable entries below the root
    pub errors: usize,
}

/// Result of a walk: selected files in traversal order plus the tree view.
#[derive(Debug, Default, Clone)]
pub struct Traversal {
    /// Root-relative paths of selected files, in traversal order
    pub selected: Vec<PathBuf>,
    /// Entries for the source tree view
    pub tree: Vec<TreeEntry>,
    /// Walk counters
    pub stats: ScanStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Keep,
    Ignored,
    Excluded,
    NotIncluded,
    Vcs,
}

/// Walks a directory tree and selects files for the prompt.
#[derive(Debug, Clone)]
pub struct Scanner {
    config: TraversalConfig,
}

impl Scanner {
    /// Creates a new scanner.
    #[must_use]
    pub const fn new(config: TraversalConfig) -> Self {
        Self { config }
    }

    /// Walks the root depth-first.
    ///
    /// Within each directory, entries are sorted files first, then by name, so
    /// a directory's files are selected before any subdirectory is entered.
    /// Ignored and excluded directories are pruned without being read.
    /// Symlinked directories are not followed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Traversal`] if the root cannot be read. Errors below
    /// the root are logged and skipped.
    pub fn walk(&self) -> Result<Traversal> {
        let root = &self.config.root;
        let mut traversal = Traversal::default();

        debug!("Walking {}", root.display());
        if self.config.patterns.is_empty() {
            debug!("No include or exclude patterns, selecting every file not ignored");
        }

        let mut walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by(files_first)
            .into_iter();

        loop {
            let entry = match walker.next() {
                None => break,
                Some(Ok(entry)) => entry,
                Some(Err(err)) if err.depth() == 0 => {
                    return Err(Error::traversal(root, err.to_string()));
                }
                Some(Err(err)) => {
                    warn!("Skipping unreadable entry: {}", err);
                    traversal.stats.errors += 1;
                    continue;
                }
            };

            if entry.depth() == 0 {
                continue;
            }

            let Some(relative) = pathdiff::diff_paths(entry.path(), root) else {
                continue;
            };
            let rel = to_slash(&relative);

            if entry.file_type().is_dir() {
                let verdict = self.judge_dir(&entry, &relative);
                if verdict != Verdict::Keep {
                    trace!("Pruning {} ({:?})", rel, verdict);
                    walker.skip_current_dir();
                }
                self.record(&mut traversal, verdict, TreeEntry::dir(rel));
                continue;
            }

            if !is_regular_file(&entry) {
                trace!("Skipping non-file entry: {}", rel);
                continue;
            }

            traversal.stats.visited_files += 1;
            let verdict = self.judge_file(&relative);
            if verdict == Verdict::Keep {
                traversal.selected.push(relative);
            }
            self.record(&mut traversal, verdict, TreeEntry::file(rel));
        }

        traversal.stats.selected_files = traversal.selected.len();
        debug!(
            "Walk complete: {} visited, {} selected, {} ignored, {} excluded, {} errors",
            traversal.stats.visited_files,
            traversal.stats.selected_files,
            traversal.stats.ignored,
            traversal.stats.excluded,
            traversal.stats.errors
        );

        Ok(traversal)
    }

    /// Reads and formats selected files, preserving their order.
    ///
    /// Unreadable, undecodable and empty files are skipped with a log entry.
    ///
    /// # Errors
    ///
    /// Propagates any read error that is not recoverable.
    pub fn collect(&self, selected: &[PathBuf]) -> Result<Vec<FileRecord>> {
        let mut records = Vec::with_capacity(selected.len());

        for relative in selected {
            let path = self.config.root.join(relative);
            let rel = to_slash(relative);

            match read_text(&path) {
                Ok(content) if content.is_empty() => {
                    debug!("Skipping empty file: {}", rel);
                }
                Ok(content) => {
                    let record = format_file(
                        &rel,
                        &content,
                        self.config.line_numbers,
                        self.config.codeblock,
                    );
                    trace!("Formatted {} ({} lines)", rel, record.line_count());
                    records.push(record);
                }
                Err(e) if e.is_recoverable() => warn!("Skipping {}: {}", rel, e),
                Err(e) => return Err(e),
            }
        }

        Ok(records)
    }

    /// Walks and formats in one call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Traversal`] if the root cannot be read, or any
    /// non-recoverable read error.
    pub fn scan(&self) -> Result<(Traversal, Vec<FileRecord>)> {
        let traversal = self.walk()?;
        let records = self.collect(&traversal.selected)?;
        Ok((traversal, records))
    }

    fn judge_dir(&self, entry: &DirEntry, relative: &Path) -> Verdict {
        if entry.file_name() == VCS_DIR {
            return Verdict::Vcs;
        }
        if self.is_ignored(relative, true) {
            return Verdict::Ignored;
        }
        if self.config.patterns.is_excluded(relative) {
            return Verdict::Excluded;
        }
        Verdict::Keep
    }

    fn judge_file(&self, relative: &Path) -> Verdict {
        if relative == Path::new(IgnoreRule::FILE_NAME) {
            return Verdict::Vcs;
        }
        if self.is_ignored(relative, false) {
            return Verdict::Ignored;
        }
        if self.config.patterns.is_excluded(relative) {
            return Verdict::Excluded;
        }
        if !self.config.patterns.is_included(relative) {
            return Verdict::NotIncluded;
        }
        Verdict::Keep
    }

    fn is_ignored(&self, relative: &Path, is_dir: bool) -> bool {
        self.config
            .ignore
            .as_ref()
            .is_some_and(|rule| rule.is_ignored(relative, is_dir))
    }

    fn record(&self, traversal: &mut Traversal, verdict: Verdict, entry: TreeEntry) {
        match verdict {
            Verdict::Keep => traversal.tree.push(entry),
            Verdict::NotIncluded => {
                traversal.stats.not_included += 1;
                traversal.tree.push(entry);
            }
            Verdict::Excluded => {
                traversal.stats.excluded += 1;
                if !self.config.exclude_from_tree {
                    traversal.tree.push(entry);
                }
            }
            Verdict::Ignored => traversal.stats.ignored += 1,
            Verdict::Vcs => {}
        }
    }
}

/// Orders files before directories, then by name.
fn files_first(a: &DirEntry, b: &DirEntry) -> Ordering {
    a.file_type()
        .is_dir()
        .cmp(&b.file_type().is_dir())
        .then_with(|| a.file_name().cmp(b.file_name()))
}

/// Regular files, and symlinks that resolve to regular files.
fn is_regular_file(entry: &DirEntry) -> bool {
    let file_type = entry.file_type();
    file_type.is_file() || (file_type.is_symlink() && entry.path().is_file())
}

/// Renders a relative path with `/` separators.
pub(crate) fn to_slash(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    fn scanner(root: &Path, includes: &[&str], excludes: &[&str]) -> Scanner {
        let mut config = TraversalConfig::new(root);
        config.patterns = PatternSet::new(includes, excludes).unwrap();
        config.ignore = IgnoreRule::from_root(root);
        Scanner::new(config)
    }

    fn selected(traversal: &Traversal) -> Vec<String> {
        traversal.selected.iter().map(|p| to_slash(p)).collect()
    }

    fn tree_paths(traversal: &Traversal) -> Vec<String> {
        traversal.tree.iter().map(|e| e.path.clone()).collect()
    }

    #[test]
    fn test_gitignore_excludes_markdown() {
        let temp = assert_fs::TempDir::new().unwrap();
        let ten_lines: String = (1..=10).map(|i| format!("x = {i}\n")).collect();
        let five_lines: String = (1..=5).map(|i| format!("line {i}\n")).collect();
        temp.child("a.py").write_str(&ten_lines).unwrap();
        temp.child("b.md").write_str(&five_lines).unwrap();
        temp.child(".gitignore").write_str("*.md\n").unwrap();

        let traversal = scanner(temp.path(), &[], &[]).walk().unwrap();

        assert_eq!(selected(&traversal), vec!["a.py"]);
        assert_eq!(tree_paths(&traversal), vec!["a.py"]);
        assert_eq!(traversal.stats.ignored, 1);
    }

    #[test]
    fn test_root_gitignore_is_never_selected() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child(".gitignore").write_str("build/\n").unwrap();
        temp.child("main.c").write_str("int main(void) { return 0; }\n").unwrap();
        temp.child("docs/.gitignore").write_str("*.html\n").unwrap();

        let traversal = scanner(temp.path(), &[], &[]).walk().unwrap();

        // only the root rule file is metadata; nested ones are ordinary files
        assert_eq!(selected(&traversal), vec!["main.c", "docs/.gitignore"]);
        assert!(!tree_paths(&traversal).contains(&".gitignore".to_string()));
    }

    #[test]
    fn test_include_go_exclude_vendor() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("main.go").write_str("package main\n").unwrap();
        temp.child("vendor/x.go").write_str("package x\n").unwrap();

        let traversal = scanner(temp.path(), &["*.go"], &["vendor/*"]).walk().unwrap();
        assert_eq!(selected(&traversal), vec!["main.go"]);
    }

    #[test]
    fn test_files_before_subdirectories_sorted() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("b/inner.txt").write_str("1").unwrap();
        temp.child("z.txt").write_str("1").unwrap();
        temp.child("a/deep/leaf.txt").write_str("1").unwrap();
        temp.child("a/top.txt").write_str("1").unwrap();
        temp.child("m.txt").write_str("1").unwrap();

        let traversal = scanner(temp.path(), &[], &[]).walk().unwrap();
        assert_eq!(
            selected(&traversal),
            vec!["m.txt", "z.txt", "a/top.txt", "a/deep/leaf.txt", "b/inner.txt"]
        );
    }

    #[test]
    fn test_order_is_deterministic() {
        let temp = assert_fs::TempDir::new().unwrap();
        for name in ["q.rs", "c.rs", "src/x.rs", "src/a.rs", "docs/readme.md"] {
            temp.child(name).write_str("fn f() {}").unwrap();
        }

        let s = scanner(temp.path(), &[], &[]);
        let first = selected(&s.walk().unwrap());
        let second = selected(&s.walk().unwrap());
        assert_eq!(first, second);
    }

    #[test]
    fn test_excluded_directory_is_pruned() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("keep.rs").write_str("fn a() {}").unwrap();
        temp.child("node_modules/pkg/index.js").write_str("x").unwrap();
        temp.child("node_modules/pkg/lib/deep.rs").write_str("x").unwrap();

        let traversal = scanner(temp.path(), &["*.rs", "*.js"], &["node_modules"])
            .walk()
            .unwrap();

        assert_eq!(selected(&traversal), vec!["keep.rs"]);
        assert!(selected(&traversal)
            .iter()
            .all(|p| !p.starts_with("node_modules/")));
        // pruned directories are never read, so their files are never visited
        assert_eq!(traversal.stats.visited_files, 1);
    }

    #[test]
    fn test_ignored_directory_is_pruned() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child(".gitignore").write_str("target/\n").unwrap();
        temp.child("src/main.rs").write_str("fn main() {}").unwrap();
        temp.child("target/debug/build.rs").write_str("x").unwrap();

        let traversal = scanner(temp.path(), &[], &[]).walk().unwrap();
        let paths = selected(&traversal);

        assert!(paths.contains(&"src/main.rs".to_string()));
        assert!(paths.iter().all(|p| !p.starts_with("target/")));
        assert!(tree_paths(&traversal).iter().all(|p| !p.starts_with("target")));
    }

    #[test]
    fn test_git_directory_is_skipped() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child(".git/HEAD").write_str("ref: refs/heads/main\n").unwrap();
        temp.child("lib.rs").write_str("pub fn x() {}").unwrap();

        let traversal = scanner(temp.path(), &[], &[]).walk().unwrap();
        assert_eq!(selected(&traversal), vec!["lib.rs"]);
        assert_eq!(tree_paths(&traversal), vec!["lib.rs"]);
    }

    #[test]
    fn test_exclude_from_tree_only_affects_tree() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("main.go").write_str("package main").unwrap();
        temp.child("notes.txt").write_str("notes").unwrap();
        temp.child("vendor/x.go").write_str("package x").unwrap();

        let mut shown = scanner(temp.path(), &[], &["*.txt", "vendor"]);
        let traversal = shown.walk().unwrap();
        assert_eq!(selected(&traversal), vec!["main.go"]);
        assert_eq!(tree_paths(&traversal), vec!["main.go", "notes.txt", "vendor"]);

        shown.config.exclude_from_tree = true;
        let hidden = shown.walk().unwrap();
        assert_eq!(selected(&hidden), vec!["main.go"]);
        assert_eq!(tree_paths(&hidden), vec!["main.go"]);
    }

    #[test]
    fn test_missing_root_is_fatal() {
        let temp = assert_fs::TempDir::new().unwrap();
        let s = Scanner::new(TraversalConfig::new(temp.path().join("gone")));
        assert!(matches!(s.walk(), Err(Error::Traversal { .. })));
    }

    #[test]
    fn test_collect_skips_binary_and_empty() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("a.rs").write_str("fn a() {}\n").unwrap();
        temp.child("blob.bin").write_binary(&[0, 159, 146, 150]).unwrap();
        temp.child("empty.txt").touch().unwrap();

        let s = scanner(temp.path(), &[], &[]);
        let (traversal, records) = s.scan().unwrap();

        assert_eq!(traversal.selected.len(), 3);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].relative_path, "a.rs");
        assert_eq!(records[0].formatted_content, "### a.rs\n```rs\nfn a() {}\n\n```\n");
    }

    #[test]
    fn test_collect_applies_formatting_flags() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("src/x.py").write_str("a\nb").unwrap();

        let mut config = TraversalConfig::new(temp.path());
        config.line_numbers = true;
        config.codeblock = false;
        let s = Scanner::new(config);

        let (_, records) = s.scan().unwrap();
        assert_eq!(records[0].relative_path, "src/x.py");
        assert_eq!(records[0].formatted_content, "### src/x.py\n1: a\n2: b\n");
    }

    #[test]
    fn test_collect_skips_missing_file() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("kept.rs").write_str("fn k() {}").unwrap();

        let s = scanner(temp.path(), &[], &[]);
        let records = s
            .collect(&[PathBuf::from("vanished.rs"), PathBuf::from("kept.rs")])
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].relative_path, "kept.rs");
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_directory_not_followed() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("real/file.rs").write_str("fn f() {}").unwrap();
        std::os::unix::fs::symlink(temp.path().join("real"), temp.path().join("link")).unwrap();

        let traversal = scanner(temp.path(), &[], &[]).walk().unwrap();
        assert_eq!(selected(&traversal), vec!["real/file.rs"]);
    }
}
