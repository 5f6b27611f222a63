//! Narrowing the visible library set by key and ecosystem tag.

use crate::docs_tree::LibrarySummary;
use clap::Args;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Include/exclude rules over library keys and ecosystem tags.
///
/// Rules apply in a fixed order: include by key, include by ecosystem, exclude
/// by key, exclude by ecosystem. Exclusions never restore anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Args, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FilterOptions {
    /// Limit to specific library keys
    #[arg(long, value_delimiter = ',', global = true)]
    pub include_libs: Vec<String>,

    /// Limit to libraries tagged with any of these ecosystems
    #[arg(long, value_delimiter = ',', global = true)]
    pub include_ecosystems: Vec<String>,

    /// Exclude specific library keys
    #[arg(long, value_delimiter = ',', global = true)]
    pub exclude_libs: Vec<String>,

    /// Exclude libraries whose ecosystems are all listed here
    #[arg(long, value_delimiter = ',', global = true)]
    pub exclude_ecosystems: Vec<String>,
}

impl FilterOptions {
    pub fn is_empty(&self) -> bool {
        self.include_libs.is_empty()
            && self.include_ecosystems.is_empty()
            && self.exclude_libs.is_empty()
            && self.exclude_ecosystems.is_empty()
    }
}

fn to_set(items: &[String]) -> HashSet<&str> {
    items.iter().map(String::as_str).collect()
}

/// Applies `options` to a set of library summaries.
pub fn filter_libraries(
    libraries: &BTreeMap<String, LibrarySummary>,
    options: &FilterOptions,
) -> BTreeMap<String, LibrarySummary> {
    let include_libs = to_set(&options.include_libs);
    let include_ecosystems = to_set(&options.include_ecosystems);
    let exclude_libs = to_set(&options.exclude_libs);
    let exclude_ecosystems = to_set(&options.exclude_ecosystems);

    libraries
        .iter()
        .filter(|(key, _)| include_libs.is_empty() || include_libs.contains(key.as_str()))
        .filter(|(_, lib)| {
            include_ecosystems.is_empty()
                || lib
                    .ecosystems
                    .iter()
                    .any(|eco| include_ecosystems.contains(eco.as_str()))
        })
        .filter(|(key, _)| !exclude_libs.contains(key.as_str()))
        .filter(|(_, lib)| {
            // Untagged libraries, and libraries with at least one tag outside
            // the exclusion list, stay.
            exclude_ecosystems.is_empty()
                || lib.ecosystems.is_empty()
                || !lib
                    .ecosystems
                    .iter()
                    .all(|eco| exclude_ecosystems.contains(eco.as_str()))
        })
        .map(|(key, lib)| (key.clone(), lib.clone()))
        .collect()
}

/// Every ecosystem tag used by at least one library.
pub fn collect_ecosystems(libraries: &BTreeMap<String, LibrarySummary>) -> BTreeSet<String> {
    libraries
        .values()
        .flat_map(|lib| lib.ecosystems.iter().cloned())
        .collect()
}

/// Applies the ecosystem rules of `options` to a set of tags. Key rules are ignored.
pub fn filter_ecosystems(
    ecosystems: &BTreeSet<String>,
    options: &FilterOptions,
) -> BTreeSet<String> {
    let include = to_set(&options.include_ecosystems);
    let exclude = to_set(&options.exclude_ecosystems);

    ecosystems
        .iter()
        .filter(|eco| include.is_empty() || include.contains(eco.as_str()))
        .filter(|eco| !exclude.contains(eco.as_str()))
        .cloned()
        .collect()
}

/// Library key to root essence, limited to one ecosystem unless `ecosystem` is
/// `None` or `"*"`.
pub fn library_index(
    libraries: &BTreeMap<String, LibrarySummary>,
    ecosystem: Option<&str>,
) -> BTreeMap<String, Option<String>> {
    let ecosystem = ecosystem.filter(|eco| *eco != "*");
    libraries
        .iter()
        .filter(|(_, lib)| ecosystem.is_none_or(|eco| lib.ecosystems.iter().any(|e| e == eco)))
        .map(|(key, lib)| (key.clone(), lib.essence.clone()))
        .collect()
}
