use crate::docs_tree::{Library, LibrarySummary, MANIFEST_FILE, load_library};
use std::collections::BTreeMap;
use std::collections::btree_map;
use std::io;
use std::path::Path;
use tokio::fs;

/// Every library found under a documentation root, keyed by directory name.
///
/// Built once by [`LibraryCache::scan`] and never modified afterwards; share it
/// behind an `Arc` and read it from as many tasks as needed.
#[derive(Debug, Clone, Default)]
pub struct LibraryCache {
    libraries: BTreeMap<String, Library>,
}

impl LibraryCache {
    /// Scans the immediate subdirectories of `root` for library manifests.
    ///
    /// A library that fails to load is logged and skipped. Only a failure to
    /// enumerate `root` itself is returned.
    pub async fn scan(root: &Path) -> Result<Self, io::Error> {
        tracing::debug!("Scanning libraries in {:?}", root);
        let mut libraries = BTreeMap::new();
        let mut entries = fs::read_dir(root).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !entry.file_type().await.is_ok_and(|t| t.is_dir()) {
                continue;
            }
            if !fs::try_exists(path.join(MANIFEST_FILE)).await.unwrap_or(false) {
                continue;
            }

            let Some(key) = entry.file_name().to_str().map(str::to_string) else {
                tracing::warn!("Skipping library directory with non UTF-8 name: {:?}", path);
                continue;
            };

            match load_library(&path, key.clone()).await {
                Ok(library) => {
                    libraries.insert(key, library);
                }
                Err(e) => {
                    tracing::warn!("Failed to load library {}: {}. Skipping.", key, e);
                }
            }
        }

        tracing::info!("Loaded {} libraries from {:?}", libraries.len(), root);
        Ok(Self { libraries })
    }

    pub fn get(&self, key: &str) -> Option<&Library> {
        self.libraries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.libraries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.libraries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.libraries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.libraries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Library> {
        self.libraries.iter()
    }

    /// Tree-less projections of every library, for listing and filtering.
    pub fn summaries(&self) -> BTreeMap<String, LibrarySummary> {
        self.libraries
            .iter()
            .map(|(key, library)| (key.clone(), library.summary()))
            .collect()
    }
}

impl FromIterator<Library> for LibraryCache {
    fn from_iter<I: IntoIterator<Item = Library>>(iter: I) -> Self {
        Self {
            libraries: iter
                .into_iter()
                .map(|library| (library.key.clone(), library))
                .collect(),
        }
    }
}

impl<'a> IntoIterator for &'a LibraryCache {
    type Item = (&'a String, &'a Library);
    type IntoIter = btree_map::Iter<'a, String, Library>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Convenience wrapper around [`LibraryCache::scan`].
pub async fn scan_libraries(root: &Path) -> Result<LibraryCache, io::Error> {
    LibraryCache::scan(root).await
}
