//! On-disk documentation trees.
//!
//! Every library lives in its own directory holding an `index.json` manifest.
//! The manifest describes the page tree; each page has a directory of its own
//! (the library root for the top page, `parent/key` for children) containing
//! up to four markdown files, one per [`MarkdownLevel`].
//!
//! [`load_library`] turns such a directory into an in-memory [`Library`].

use rmcp::schemars;
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tokio::fs;

/// Name of the manifest file at the root of every library directory.
pub const MANIFEST_FILE: &str = "index.json";

#[derive(Debug, Error)]
pub enum ManifestParseError {
    #[error("Manifest not found: {0}")]
    Missing(PathBuf),

    #[error("Failed to read manifest {path}: {source}")]
    Io {
        path: PathBuf,
        source: io::Error,
    },

    #[error("Invalid manifest {path}: {source}")]
    Invalid {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Invalid level: {0}. Must be one of: fulltext, digest, short_digest, essence")]
pub struct InvalidLevel(pub String);

/// Granularity of a page's markdown.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum MarkdownLevel {
    /// Full original content
    Fulltext,
    /// Condensed version, the usual default
    #[default]
    Digest,
    /// Very short summary
    ShortDigest,
    /// One-line gist
    Essence,
}

impl MarkdownLevel {
    pub const ALL: [MarkdownLevel; 4] = [
        MarkdownLevel::Fulltext,
        MarkdownLevel::Digest,
        MarkdownLevel::ShortDigest,
        MarkdownLevel::Essence,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MarkdownLevel::Fulltext => "fulltext",
            MarkdownLevel::Digest => "digest",
            MarkdownLevel::ShortDigest => "short_digest",
            MarkdownLevel::Essence => "essence",
        }
    }

    /// Levels worth navigating further from carry a sub-page listing.
    pub fn lists_children(self) -> bool {
        matches!(self, MarkdownLevel::Digest | MarkdownLevel::Fulltext)
    }

    fn file_name(self) -> String {
        format!("{}.md", self.as_str())
    }
}

impl fmt::Display for MarkdownLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MarkdownLevel {
    type Err = InvalidLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MarkdownLevel::ALL
            .into_iter()
            .find(|level| level.as_str() == s)
            .ok_or_else(|| InvalidLevel(s.to_string()))
    }
}

/// The markdown generated for one page.
///
/// `None` means the variant was never generated; `Some("")` is a generated but
/// empty page. Callers must not conflate the two.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkdownVariants {
    pub fulltext: Option<String>,
    pub digest: Option<String>,
    pub short_digest: Option<String>,
    pub essence: Option<String>,
}

impl MarkdownVariants {
    pub fn get(&self, level: MarkdownLevel) -> Option<&str> {
        match level {
            MarkdownLevel::Fulltext => self.fulltext.as_deref(),
            MarkdownLevel::Digest => self.digest.as_deref(),
            MarkdownLevel::ShortDigest => self.short_digest.as_deref(),
            MarkdownLevel::Essence => self.essence.as_deref(),
        }
    }

    pub fn set(&mut self, level: MarkdownLevel, text: impl Into<String>) {
        let slot = match level {
            MarkdownLevel::Fulltext => &mut self.fulltext,
            MarkdownLevel::Digest => &mut self.digest,
            MarkdownLevel::ShortDigest => &mut self.short_digest,
            MarkdownLevel::Essence => &mut self.essence,
        };
        *slot = Some(text.into());
    }

    /// Levels present for this page, in [`MarkdownLevel::ALL`] order.
    pub fn levels(&self) -> impl Iterator<Item = MarkdownLevel> + '_ {
        MarkdownLevel::ALL
            .into_iter()
            .filter(|level| self.get(*level).is_some())
    }
}

/// Advisory token estimates per level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCounts {
    pub fulltext: Option<u64>,
    pub digest: Option<u64>,
    pub short_digest: Option<u64>,
}

/// Generation cost metadata, passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input: u64,
    pub output: u64,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}

/// A page in a library's tree. Each node owns its children, kept in manifest order.
#[derive(Debug, Clone, PartialEq)]
pub struct DocNode {
    pub display_name: String,
    /// Path in the original documentation; not used for navigation.
    pub orig_path: String,
    pub relevant: bool,
    pub token_counts: Option<TokenCounts>,
    pub usage: Option<Usage>,
    pub markdown: MarkdownVariants,
    pub children: Vec<(String, DocNode)>,
}

impl DocNode {
    pub fn new(display_name: impl Into<String>, relevant: bool) -> Self {
        Self {
            display_name: display_name.into(),
            orig_path: String::new(),
            relevant,
            token_counts: None,
            usage: None,
            markdown: MarkdownVariants::default(),
            children: Vec::new(),
        }
    }

    pub fn with_markdown(mut self, level: MarkdownLevel, text: impl Into<String>) -> Self {
        self.markdown.set(level, text);
        self
    }

    pub fn with_child(mut self, key: impl Into<String>, child: DocNode) -> Self {
        self.children.push((key.into(), child));
        self
    }

    /// Child by exact key.
    pub fn child(&self, key: &str) -> Option<&DocNode> {
        self.children
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, node)| node)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibrarySource {
    pub name: String,
    pub doc_dir: Option<String>,
    pub repo: Option<String>,
    pub commit: Option<String>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Git,
    Web,
}

/// One documentation corpus.
#[derive(Debug, Clone, PartialEq)]
pub struct Library {
    /// Directory name the library was loaded from; the cache key.
    pub key: String,
    pub name: String,
    pub source: LibrarySource,
    pub source_type: SourceType,
    pub date: String,
    pub model: String,
    pub commit: String,
    pub ecosystems: Vec<String>,
    pub tree: DocNode,
}

impl Library {
    /// The root page's essence.
    pub fn essence(&self) -> Option<&str> {
        self.tree.markdown.get(MarkdownLevel::Essence)
    }

    pub fn summary(&self) -> LibrarySummary {
        LibrarySummary {
            name: self.name.clone(),
            source: self.source.clone(),
            source_type: self.source_type,
            ecosystems: self.ecosystems.clone(),
            essence: self.essence().map(str::to_string),
        }
    }
}

/// A [`Library`] without its page tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LibrarySummary {
    pub name: String,
    pub source: LibrarySource,
    pub source_type: SourceType,
    pub ecosystems: Vec<String>,
    pub essence: Option<String>,
}

// Manifest schema. Optional fields accept both `null` and absence.

#[derive(Debug, Deserialize)]
struct Manifest {
    name: String,
    map: ManifestNode,
    source: LibrarySource,
    source_type: SourceType,
    date: String,
    model: String,
    commit: String,
    ecosystems: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct ManifestNode {
    #[serde(rename = "displayName")]
    display_name: String,
    #[serde(rename = "origPath")]
    orig_path: String,
    relevant: bool,
    usage: Option<Usage>,
    token_counts: Option<TokenCounts>,
    children: Option<ManifestChildren>,
}

/// Child descriptors in the order they appear in the manifest.
///
/// Keys are unique. A repeated key keeps its first position and its last
/// descriptor, the way a JSON object parses.
#[derive(Debug, Default)]
struct ManifestChildren(Vec<(String, ManifestNode)>);

/// A child key names exactly one directory below its parent.
fn is_valid_child_key(key: &str) -> bool {
    !key.is_empty() && key != "." && key != ".." && !key.contains(['/', '\\'])
}

impl<'de> Deserialize<'de> for ManifestChildren {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ChildrenVisitor;

        impl<'de> Visitor<'de> for ChildrenVisitor {
            type Value = ManifestChildren;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of child page descriptors")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut children: Vec<(String, ManifestNode)> =
                    Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((key, node)) = map.next_entry::<String, ManifestNode>()? {
                    if !is_valid_child_key(&key) {
                        return Err(de::Error::invalid_value(
                            de::Unexpected::Str(&key),
                            &"a single path segment",
                        ));
                    }
                    match children.iter_mut().find(|(existing, _)| *existing == key) {
                        Some((_, slot)) => *slot = node,
                        None => children.push((key, node)),
                    }
                }
                Ok(ManifestChildren(children))
            }
        }

        deserializer.deserialize_map(ChildrenVisitor)
    }
}

/// Loads the library rooted at `root`, keyed by `key`.
///
/// Fails only when the manifest is missing, unreadable, or invalid. A markdown
/// file that exists but cannot be read is logged and treated as not generated.
pub async fn load_library(
    root: &Path,
    key: impl Into<String>,
) -> Result<Library, ManifestParseError> {
    let key = key.into();
    let manifest_path = root.join(MANIFEST_FILE);
    tracing::debug!("Loading library '{}' from {:?}", key, root);

    let content = match fs::read_to_string(&manifest_path).await {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ManifestParseError::Missing(manifest_path));
        }
        Err(source) => {
            return Err(ManifestParseError::Io {
                path: manifest_path,
                source,
            });
        }
    };

    let manifest: Manifest =
        serde_json::from_str(&content).map_err(|source| ManifestParseError::Invalid {
            path: manifest_path.clone(),
            source,
        })?;

    let tree = build_node(root.to_path_buf(), manifest.map).await;
    tracing::debug!("Loaded {:?} -> {}", root, manifest.name);

    Ok(Library {
        key,
        name: manifest.name,
        source: manifest.source,
        source_type: manifest.source_type,
        date: manifest.date,
        model: manifest.model,
        commit: manifest.commit,
        ecosystems: manifest.ecosystems.unwrap_or_default(),
        tree,
    })
}

async fn build_node(dir: PathBuf, node: ManifestNode) -> DocNode {
    let markdown = load_markdown_variants(&dir).await;

    let descriptors = node.children.unwrap_or_default().0;
    let mut children = Vec::with_capacity(descriptors.len());
    for (key, child) in descriptors {
        let child_dir = dir.join(&key);
        let child_node = Box::pin(build_node(child_dir, child)).await;
        children.push((key, child_node));
    }

    DocNode {
        display_name: node.display_name,
        orig_path: node.orig_path,
        relevant: node.relevant,
        token_counts: node.token_counts,
        usage: node.usage,
        markdown,
        children,
    }
}

async fn load_markdown_variants(dir: &Path) -> MarkdownVariants {
    let mut variants = MarkdownVariants::default();

    for level in MarkdownLevel::ALL {
        let path = dir.join(level.file_name());
        match fs::read_to_string(&path).await {
            Ok(text) => variants.set(level, text),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!("Failed to read {:?}: {}. Treating {} as absent.", path, e, level);
            }
        }
    }

    variants
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn manifest(map: serde_json::Value) -> serde_json::Value {
        json!({
            "name": "Lib A",
            "map": map,
            "source": {
                "name": "lib-a",
                "repo": "https://example.com/lib-a",
                "doc_dir": null,
                "commit": null,
                "comment": null
            },
            "source_type": "git",
            "date": "2025-01-01",
            "model": "test-model",
            "commit": "abc123",
            "ecosystems": ["js"]
        })
    }

    fn leaf(name: &str, relevant: bool) -> serde_json::Value {
        json!({ "displayName": name, "origPath": name, "relevant": relevant, "children": {} })
    }

    async fn write_manifest(dir: &Path, value: &serde_json::Value) {
        fs::create_dir_all(dir).await.unwrap();
        fs::write(dir.join(MANIFEST_FILE), value.to_string()).await.unwrap();
    }

    #[test]
    fn test_level_parsing() {
        assert_eq!("short_digest".parse::<MarkdownLevel>(), Ok(MarkdownLevel::ShortDigest));
        assert_eq!("essence".parse::<MarkdownLevel>(), Ok(MarkdownLevel::Essence));
        assert_eq!(
            "summary".parse::<MarkdownLevel>(),
            Err(InvalidLevel("summary".to_string()))
        );
        assert_eq!(MarkdownLevel::default(), MarkdownLevel::Digest);
        assert!(MarkdownLevel::Fulltext.lists_children());
        assert!(!MarkdownLevel::Essence.lists_children());
    }

    #[tokio::test]
    async fn test_load_library_reads_variants() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("libA");
        let map = json!({
            "displayName": "Root",
            "origPath": "/",
            "relevant": false,
            "token_counts": { "digest": 12, "fulltext": null },
            "usage": { "input": 10, "output": 5, "details": null },
            "children": { "guide": leaf("Guide", true) }
        });
        write_manifest(&root, &manifest(map)).await;
        fs::write(root.join("digest.md"), "root digest").await.unwrap();
        fs::write(root.join("essence.md"), "root essence").await.unwrap();
        fs::create_dir_all(root.join("guide")).await.unwrap();
        fs::write(root.join("guide/digest.md"), "guide digest").await.unwrap();
        fs::write(root.join("guide/fulltext.md"), "").await.unwrap();

        let lib = load_library(&root, "libA").await.unwrap();

        assert_eq!(lib.key, "libA");
        assert_eq!(lib.name, "Lib A");
        assert_eq!(lib.source_type, SourceType::Git);
        assert_eq!(lib.ecosystems, vec!["js".to_string()]);
        assert_eq!(lib.essence(), Some("root essence"));
        assert_eq!(lib.tree.markdown.get(MarkdownLevel::Digest), Some("root digest"));
        assert_eq!(lib.tree.markdown.get(MarkdownLevel::Fulltext), None);
        assert_eq!(
            lib.tree.token_counts,
            Some(TokenCounts { fulltext: None, digest: Some(12), short_digest: None })
        );
        assert_eq!(lib.tree.usage.as_ref().map(|u| u.input), Some(10));

        let guide = lib.tree.child("guide").unwrap();
        assert!(guide.relevant);
        assert_eq!(guide.markdown.get(MarkdownLevel::Digest), Some("guide digest"));
        // Generated but empty is not the same as never generated.
        assert_eq!(guide.markdown.get(MarkdownLevel::Fulltext), Some(""));
        assert_eq!(guide.markdown.get(MarkdownLevel::ShortDigest), None);
        assert_eq!(
            guide.markdown.levels().collect::<Vec<_>>(),
            vec![MarkdownLevel::Fulltext, MarkdownLevel::Digest]
        );
    }

    #[tokio::test]
    async fn test_children_keep_manifest_order() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("ordered");
        let raw = r#"{
            "name": "Ordered",
            "map": {
                "displayName": "Root", "origPath": "", "relevant": true,
                "children": {
                    "zeta": {
                        "displayName": "Z", "origPath": "z", "relevant": true, "children": {}
                    },
                    "alpha": {
                        "displayName": "A", "origPath": "a", "relevant": true, "children": null
                    },
                    "mid": { "displayName": "M", "origPath": "m", "relevant": false }
                }
            },
            "source": { "name": "ordered" },
            "source_type": "web",
            "date": "2025-01-01",
            "model": "m",
            "commit": "c"
        }"#;
        fs::create_dir_all(&root).await.unwrap();
        fs::write(root.join(MANIFEST_FILE), raw).await.unwrap();

        let lib = load_library(&root, "ordered").await.unwrap();
        let keys: Vec<&str> = lib.tree.children.iter().map(|(k, _)| k.as_str()).collect();

        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
        assert!(lib.ecosystems.is_empty());
        assert_eq!(lib.source_type, SourceType::Web);
        assert!(lib.tree.markdown.levels().next().is_none());
    }

    #[tokio::test]
    async fn test_repeated_child_key_keeps_last_descriptor() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("dupes");
        let raw = r#"{
            "name": "Dupes",
            "map": {
                "displayName": "Root", "origPath": "", "relevant": true,
                "children": {
                    "a": { "displayName": "First", "origPath": "a1", "relevant": true },
                    "b": { "displayName": "B", "origPath": "b", "relevant": true },
                    "a": { "displayName": "Second", "origPath": "a2", "relevant": false }
                }
            },
            "source": { "name": "dupes" },
            "source_type": "git",
            "date": "2025-01-01",
            "model": "m",
            "commit": "c"
        }"#;
        fs::create_dir_all(&root).await.unwrap();
        fs::write(root.join(MANIFEST_FILE), raw).await.unwrap();

        let lib = load_library(&root, "dupes").await.unwrap();
        let children: Vec<(&str, &str)> = lib
            .tree
            .children
            .iter()
            .map(|(k, node)| (k.as_str(), node.display_name.as_str()))
            .collect();

        assert_eq!(children, vec![("a", "Second"), ("b", "B")]);
        assert!(!lib.tree.child("a").unwrap().relevant);
    }

    #[tokio::test]
    async fn test_child_key_must_be_one_path_segment() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("secret")).await.unwrap();
        fs::write(dir.path().join("secret/digest.md"), "outside the library").await.unwrap();

        for (name, key) in [("up", "../secret"), ("nested", "a/b"), ("blank", ""), ("dot", ".")] {
            let root = dir.path().join(name);
            let map = json!({
                "displayName": "Root", "origPath": "", "relevant": true,
                "children": { key: leaf("Child", true) }
            });
            write_manifest(&root, &manifest(map)).await;

            let result = load_library(&root, name).await;
            assert!(
                matches!(result, Err(ManifestParseError::Invalid { .. })),
                "child key {key:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_is_valid_child_key() {
        assert!(is_valid_child_key("getting started"));
        assert!(is_valid_child_key("..hidden"));
        assert!(!is_valid_child_key(".."));
        assert!(!is_valid_child_key("a\\b"));
    }

    #[tokio::test]
    async fn test_null_ecosystems_defaults_to_empty() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("nulls");
        let mut value = manifest(leaf("Root", true));
        value["ecosystems"] = serde_json::Value::Null;
        write_manifest(&root, &value).await;

        let lib = load_library(&root, "nulls").await.unwrap();
        assert!(lib.ecosystems.is_empty());
        assert_eq!(lib.source.doc_dir, None);
    }

    #[tokio::test]
    async fn test_missing_manifest() {
        let dir = tempdir().unwrap();
        let result = load_library(dir.path(), "empty").await;
        assert!(matches!(result, Err(ManifestParseError::Missing(_))));
    }

    #[tokio::test]
    async fn test_malformed_json() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(MANIFEST_FILE), "{not json").await.unwrap();
        let result = load_library(dir.path(), "broken").await;
        assert!(matches!(result, Err(ManifestParseError::Invalid { .. })));
    }

    #[tokio::test]
    async fn test_schema_violations_fail_whole_library() {
        let dir = tempdir().unwrap();

        let mut bad_type = manifest(leaf("Root", true));
        bad_type["source_type"] = json!("ftp");
        write_manifest(&dir.path().join("a"), &bad_type).await;

        let mut no_model = manifest(leaf("Root", true));
        no_model.as_object_mut().unwrap().remove("model");
        write_manifest(&dir.path().join("b"), &no_model).await;

        // A child deep in the tree missing its `relevant` flag.
        let map = json!({
            "displayName": "Root", "origPath": "", "relevant": true,
            "children": { "x": { "displayName": "X", "origPath": "x" } }
        });
        write_manifest(&dir.path().join("c"), &manifest(map)).await;

        for key in ["a", "b", "c"] {
            let result = load_library(&dir.path().join(key), key).await;
            assert!(
                matches!(result, Err(ManifestParseError::Invalid { .. })),
                "library {key} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_unreadable_markdown_is_absent() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("lib");
        write_manifest(&root, &manifest(leaf("Root", true))).await;
        fs::write(root.join("digest.md"), vec![0xff_u8, 0xfe, 0x00]).await.unwrap();
        fs::write(root.join("essence.md"), "ok").await.unwrap();

        let lib = load_library(&root, "lib").await.unwrap();
        assert_eq!(lib.tree.markdown.get(MarkdownLevel::Digest), None);
        assert_eq!(lib.essence(), Some("ok"));
    }

    #[test]
    fn test_summary_drops_tree() {
        let lib = Library {
            key: "k".to_string(),
            name: "K".to_string(),
            source: LibrarySource {
                name: "k".to_string(),
                doc_dir: None,
                repo: None,
                commit: None,
                comment: None,
            },
            source_type: SourceType::Web,
            date: String::new(),
            model: String::new(),
            commit: String::new(),
            ecosystems: vec!["python".to_string()],
            tree: DocNode::new("Root", true).with_markdown(MarkdownLevel::Essence, "gist"),
        };

        let summary = lib.summary();
        assert_eq!(summary.name, "K");
        assert_eq!(summary.essence.as_deref(), Some("gist"));
        assert_eq!(summary.ecosystems, vec!["python".to_string()]);
    }
}
