//! Directory listing rendered into the prompt's `source_tree`.
//!
//! The tree is a view only; it never influences which files are selected.

use serde::Serialize;

/// One entry of the source tree, relative to the traversal root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeEntry {
    /// `/`-separated relative path
    pub path: String,
    /// Whether the entry is a directory
    pub is_dir: bool,
}

impl TreeEntry {
    /// Creates a file entry.
    #[must_use]
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_dir: false,
        }
    }

    /// Creates a directory entry.
    #[must_use]
    pub fn dir(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_dir: true,
        }
    }
}

#[derive(Debug)]
struct Node<'a> {
    name: &'a str,
    is_dir: bool,
    children: Vec<Node<'a>>,
}

impl<'a> Node<'a> {
    fn insert(&mut self, segments: &[&'a str], is_dir: bool) {
        let Some((first, rest)) = segments.split_first() else {
            return;
        };

        let idx = match self.children.iter().position(|c| c.name == *first) {
            Some(idx) => idx,
            None => {
                self.children.push(Node {
                    name: *first,
                    is_dir: is_dir || !rest.is_empty(),
                    children: Vec::new(),
                });
                self.children.len() - 1
            }
        };
        self.children[idx].insert(rest, is_dir);
    }

    fn render(&self, prefix: &str, out: &mut String) {
        let count = self.children.len();
        for (i, child) in self.children.iter().enumerate() {
            let last = i + 1 == count;
            out.push_str(prefix);
            out.push_str(if last { "└── " } else { "├── " });
            out.push_str(child.name);
            if child.is_dir {
                out.push('/');
            }
            out.push('\n');

            let child_prefix = format!("{prefix}{}", if last { "    " } else { "│   " });
            child.render(&child_prefix, out);
        }
    }
}

/// Renders entries as an indented tree headed by `root_name`.
///
/// Entries keep the order they were given in; parents missing from the list
/// are created implicitly.
#[must_use]
pub fn render_tree(root_name: &str, entries: &[TreeEntry]) -> String {
    let mut root = Node {
        name: root_name,
        is_dir: true,
        children: Vec::new(),
    };

    for entry in entries {
        let segments: Vec<&str> = entry.path.split('/').filter(|s| !s.is_empty()).collect();
        root.insert(&segments, entry.is_dir);
    }

    let mut out = format!("{root_name}\n");
    root.render("", &mut out);
    out
}
