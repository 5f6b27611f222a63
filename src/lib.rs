//! Lovely Docs MCP Service
//!
//! This crate serves pre-generated documentation digests for software libraries
//! to MCP clients. Each library lives in its own directory under a documentation
//! root, described by an `index.json` manifest and a tree of per-page markdown
//! files at four levels of detail.
//!
//! # Features
//!
//! - Load every library under a root into an immutable, shareable cache
//! - Include/exclude libraries by key or ecosystem tag
//! - Resolve page paths and list page trees, pruned to relevant pages
//! - MCP server over stdio or SSE with tools and `lovely-docs://` resources
//!
//! # Modules
//!
//! - [`docs_tree`]: Library manifests, page trees and markdown variants
//! - [`cache`]: Scanning a documentation root into a [`cache::LibraryCache`]
//! - [`filter`]: Library and ecosystem filtering
//! - [`query`]: Path resolution, page retrieval and page listings
//! - [`mcp`]: MCP server implementation and protocol handling
//! - [`server`]: Transports and logging setup

pub mod cache;
pub mod docs_tree;
pub mod filter;
pub mod mcp;
pub mod query;
pub mod server;
