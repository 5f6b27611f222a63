//! Path resolution and page listings over a library's tree.
//!
//! Paths are slash-delimited child keys relative to the library root. `/` (or
//! an empty path) addresses the root page itself.
//!
//! Listings are built from an [`EssenceNode`] view of the tree, which keeps
//! only pages flagged as relevant plus the pages needed to reach them.

use crate::cache::LibraryCache;
use crate::docs_tree::{DocNode, Library, MarkdownLevel};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use thiserror::Error;

pub const ROOT_PATH: &str = "/";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("Unknown library: {0}")]
    UnknownLibrary(String),

    #[error("Library not found: {0}")]
    LibraryNotFound(String),

    #[error("Page not found in {library} at path {path}")]
    PageNotFound { library: String, path: String },

    #[error("Page {path} in {library} has no {level} content")]
    MissingLevel {
        library: String,
        path: String,
        level: MarkdownLevel,
    },
}

/// Canonical form of a page path: `/` for the root, `/a/b` otherwise.
pub fn normalize_path(path: Option<&str>) -> String {
    let trimmed = path.unwrap_or_default().trim_matches('/');
    if trimmed.is_empty() {
        ROOT_PATH.to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// Descends from `root` by exact key match on every path segment.
pub fn resolve_node<'a>(root: &'a DocNode, path: &str) -> Option<&'a DocNode> {
    let path = normalize_path(Some(path));
    if path == ROOT_PATH {
        return Some(root);
    }
    path[1..]
        .split('/')
        .try_fold(root, |node, segment| node.child(segment))
}

/// The markdown of the page at `path`, if both the page and the level exist.
///
/// `Some("")` is a generated but empty page.
pub fn get_markdown<'a>(library: &'a Library, path: &str, level: MarkdownLevel) -> Option<&'a str> {
    resolve_node(&library.tree, path)?.markdown.get(level)
}

/// Pruned, borrowed view of a page tree carrying only essences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EssenceNode<'a> {
    pub essence: Option<&'a str>,
    pub children: Vec<(&'a str, EssenceNode<'a>)>,
}

/// Keeps `node` and each descendant that is relevant or leads to a relevant
/// page. Returns `None` when nothing under `node` is relevant.
pub fn build_essence_subtree(node: &DocNode) -> Option<EssenceNode<'_>> {
    let children: Vec<_> = node
        .children
        .iter()
        .filter_map(|(key, child)| build_essence_subtree(child).map(|sub| (key.as_str(), sub)))
        .collect();

    if !node.relevant && children.is_empty() {
        return None;
    }

    Some(EssenceNode {
        essence: node.markdown.get(MarkdownLevel::Essence),
        children,
    })
}

/// One item of a page listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageEntry {
    /// A leaf page, rendered as its bare key.
    Key(String),
    /// A page with sub-pages: `{key: [...]}`.
    Nested(String, Vec<PageEntry>),
    /// A leaf page with its essence: `{key: essence}`.
    Essence(String, Option<String>),
    /// A page with sub-pages and its essence: `{key: {essence, children: [...]}}`.
    Described {
        key: String,
        essence: Option<String>,
        children: Vec<PageEntry>,
    },
}

impl PageEntry {
    pub fn key(&self) -> &str {
        match self {
            PageEntry::Key(key) | PageEntry::Nested(key, _) | PageEntry::Essence(key, _) => key,
            PageEntry::Described { key, .. } => key,
        }
    }

    pub fn children(&self) -> &[PageEntry] {
        match self {
            PageEntry::Nested(_, children) | PageEntry::Described { children, .. } => children,
            PageEntry::Key(_) | PageEntry::Essence(..) => &[],
        }
    }
}

impl Serialize for PageEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Body<'a> {
            #[serde(skip_serializing_if = "Option::is_none")]
            essence: Option<&'a str>,
            children: &'a [PageEntry],
        }

        match self {
            PageEntry::Key(key) => serializer.serialize_str(key),
            PageEntry::Nested(key, children) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(key, children)?;
                map.end()
            }
            PageEntry::Essence(key, essence) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(key, essence)?;
                map.end()
            }
            PageEntry::Described { key, essence, children } => {
                let body = Body {
                    essence: essence.as_deref(),
                    children,
                };
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(key, &body)?;
                map.end()
            }
        }
    }
}

/// Lists the children of `node`, recursively, in tree order.
///
/// Non-verbose listings name pages only; verbose listings attach each page's essence.
pub fn render_nested(node: &EssenceNode<'_>, verbose: bool) -> Vec<PageEntry> {
    node.children
        .iter()
        .map(|(key, child)| {
            let key = key.to_string();
            let essence = child.essence.map(str::to_string);
            match (verbose, child.children.is_empty()) {
                (false, true) => PageEntry::Key(key),
                (false, false) => PageEntry::Nested(key, render_nested(child, false)),
                (true, true) => PageEntry::Essence(key, essence),
                (true, false) => PageEntry::Described {
                    key,
                    essence,
                    children: render_nested(child, true),
                },
            }
        })
        .collect()
}

/// Every path named by a listing, starting with the root.
pub fn flatten_page_paths(entries: &[PageEntry]) -> Vec<String> {
    fn visit(entries: &[PageEntry], prefix: &str, paths: &mut Vec<String>) {
        for entry in entries {
            let path = format!("{prefix}/{}", entry.key());
            paths.push(path.clone());
            visit(entry.children(), &path, paths);
        }
    }

    let mut paths = vec![ROOT_PATH.to_string()];
    visit(entries, "", &mut paths);
    paths
}

/// Listing of a whole library. `tree` is `None` when no page is relevant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PageIndex {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tree: Option<Vec<PageEntry>>,
}

/// A page's text, plus its sub-page listing for the navigable levels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<PageEntry>>,
}

pub fn get_page_index(
    libraries: &LibraryCache,
    key: &str,
    verbose: bool,
) -> Result<PageIndex, QueryError> {
    let library = libraries
        .get(key)
        .ok_or_else(|| QueryError::UnknownLibrary(key.to_string()))?;

    let tree = build_essence_subtree(&library.tree).map(|root| render_nested(&root, verbose));
    Ok(PageIndex { tree })
}

/// Fetches one page at `level` (digest when unspecified).
pub fn get_page(
    libraries: &LibraryCache,
    key: &str,
    path: Option<&str>,
    level: Option<MarkdownLevel>,
) -> Result<Page, QueryError> {
    let library = libraries
        .get(key)
        .ok_or_else(|| QueryError::LibraryNotFound(key.to_string()))?;
    let level = level.unwrap_or_default();
    let path = normalize_path(path);

    let node = resolve_node(&library.tree, &path).ok_or_else(|| QueryError::PageNotFound {
        library: key.to_string(),
        path: path.clone(),
    })?;
    let text = node.markdown.get(level).ok_or_else(|| QueryError::MissingLevel {
        library: key.to_string(),
        path: path.clone(),
        level,
    })?;

    let children = if level.lists_children() {
        build_essence_subtree(node).map(|subtree| render_nested(&subtree, false))
    } else {
        None
    };

    Ok(Page {
        text: text.to_string(),
        children,
    })
}
