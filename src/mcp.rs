//! MCP server over the documentation cache.
//!
//! [`DocServer`] exposes the visible part of a [`LibraryCache`] to MCP clients
//! as tools and as `lovely-docs://` resources. Results are YAML text.
//!
//! # Tools
//!
//! - `list_libraries`: library keys, optionally with their essence
//! - `list_pages`: the page tree of one library
//! - `get_page`: a page's markdown at a given level, plus its sub-pages
//!
//! # Resources
//!
//! - `lovely-docs://doc-index/{ecosystem}?verbose=true`
//! - `lovely-docs://index/{library}?verbose=true`
//! - `lovely-docs://page/{library}/{path...}?level={level}`
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//! use lovely_docs_mcp::cache::LibraryCache;
//! use lovely_docs_mcp::filter::FilterOptions;
//! use lovely_docs_mcp::mcp::DocServer;
//!
//! async fn example() -> std::io::Result<()> {
//!     let cache = Arc::new(LibraryCache::scan("doc_db".as_ref()).await?);
//!     let server = DocServer::new(cache, &FilterOptions::default());
//!     Ok(())
//! }
//! ```

use itertools::Itertools;
use percent_encoding::percent_decode_str;
use rmcp::model::{
    AnnotateAble, Content, Implementation, IntoContents, ListResourceTemplatesResult,
    ListResourcesResult, PaginatedRequestParam, ProtocolVersion, RawResource, RawResourceTemplate,
    ReadResourceRequestParam, ReadResourceResult, Resource, ResourceContents, ServerCapabilities,
};
use rmcp::service::RequestContext;
use rmcp::{Error as McpError, RoleServer, ServerHandler, model::ServerInfo, schemars, tool};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use thiserror::Error;
use url::Url;

use crate::cache::LibraryCache;
use crate::docs_tree::{LibrarySummary, MarkdownLevel};
use crate::filter::{
    FilterOptions, collect_ecosystems, filter_ecosystems, filter_libraries, library_index,
};
use crate::query::{Page, PageIndex, QueryError, get_page, get_page_index};

pub const URI_SCHEME: &str = "lovely-docs";

const SUB_PAGES_HEADER: &str = "\nAvailable sub-pages:\n";

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Library not found or excluded: {0}")]
    Excluded(String),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("Failed to render YAML: {0}")]
    Render(#[from] serde_yaml::Error),
}

/// Failed tool calls are reported to the client as error content.
impl IntoContents for ToolError {
    fn into_contents(self) -> Vec<Content> {
        vec![Content::text(self.to_string())]
    }
}

/// Text result of a successful tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolText(pub String);

impl IntoContents for ToolText {
    fn into_contents(self) -> Vec<Content> {
        vec![Content::text(self.0)]
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ListLibrariesRequest {
    #[schemars(
        description = "Only list libraries tagged with this ecosystem. Omit or use * for all."
    )]
    #[serde(default)]
    pub ecosystem: Option<String>,
    #[schemars(description = "Include a short description of every library")]
    #[serde(default)]
    pub verbose: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ListPagesRequest {
    #[schemars(description = "Library key, as returned by list_libraries")]
    pub library: String,
    #[schemars(description = "Include a short description of every page")]
    #[serde(default)]
    pub verbose: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, schemars::JsonSchema)]
pub struct GetPageRequest {
    #[schemars(description = "Library key, as returned by list_libraries")]
    pub library: String,
    #[schemars(
        description = "Page path within the library, e.g. guide/routing. \
        Omit for the library's root page."
    )]
    #[serde(default)]
    pub page: Option<String>,
    #[schemars(
        description = "Detail level: fulltext, digest, short_digest or essence. Defaults to digest."
    )]
    #[serde(default)]
    pub level: Option<MarkdownLevel>,
}

/// A parsed `lovely-docs://` resource URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceRequest {
    DocIndex {
        ecosystem: Option<String>,
        verbose: bool,
    },
    PageIndex {
        library: String,
        verbose: bool,
    },
    Page {
        library: String,
        path: Option<String>,
        level: Option<MarkdownLevel>,
    },
}

impl ResourceRequest {
    pub fn parse(uri: &str) -> Result<Self, McpError> {
        let not_found =
            |message: String| McpError::resource_not_found(message, Some(json!({ "uri": uri })));

        let url = Url::parse(uri).map_err(|e| not_found(format!("Invalid resource URI: {e}")))?;
        if url.scheme() != URI_SCHEME {
            return Err(not_found(format!("Unsupported URI scheme: {}", url.scheme())));
        }

        // Keys are matched decoded, so `my%20lib` names the library `my lib`.
        let segments = url
            .path_segments()
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .map(|s| percent_decode_str(s).decode_utf8().map(|s| s.into_owned()))
            .collect::<Result<Vec<String>, _>>()
            .map_err(|e| not_found(format!("Invalid resource URI: {e}")))?;
        let query: BTreeMap<String, String> = url.query_pairs().into_owned().collect();
        let verbose = query.get("verbose").is_some_and(|v| v == "true");

        match url.host_str() {
            Some("doc-index") => Ok(ResourceRequest::DocIndex {
                ecosystem: segments.first().cloned(),
                verbose,
            }),
            Some("index") => match segments.as_slice() {
                [library] => Ok(ResourceRequest::PageIndex {
                    library: library.clone(),
                    verbose,
                }),
                _ => Err(not_found("Missing required parameter: name".to_string())),
            },
            Some("page") => {
                let Some((library, rest)) = segments.split_first() else {
                    return Err(not_found("Missing required parameter: path".to_string()));
                };
                let level = query
                    .get("level")
                    .map(|level| level.parse::<MarkdownLevel>())
                    .transpose()
                    .map_err(|e| not_found(e.to_string()))?;
                Ok(ResourceRequest::Page {
                    library: library.clone(),
                    path: (!rest.is_empty()).then(|| rest.join("/")),
                    level,
                })
            }
            _ => Err(not_found(format!("Unknown resource: {uri}"))),
        }
    }
}

fn to_yaml<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_yaml::Error> {
    Ok(serde_yaml::to_string(value)?.trim_end().to_string())
}

/// A page's text followed by its sub-page listing, if it has one.
fn render_page(page: &Page) -> Result<String, serde_yaml::Error> {
    match &page.children {
        Some(children) if !children.is_empty() => {
            Ok(format!("{}{}{}", page.text, SUB_PAGES_HEADER, to_yaml(children)?))
        }
        _ => Ok(page.text.clone()),
    }
}

fn listing_value(index: &PageIndex) -> Result<serde_yaml::Value, serde_yaml::Error> {
    match &index.tree {
        Some(tree) => serde_yaml::to_value(tree),
        None => Ok(serde_yaml::Value::Mapping(serde_yaml::Mapping::new())),
    }
}

/// MCP handler serving one filtered view of a shared [`LibraryCache`].
#[derive(Clone)]
pub struct DocServer {
    libraries: Arc<LibraryCache>,
    /// Summaries of the libraries that pass the server's filters
    visible: Arc<BTreeMap<String, LibrarySummary>>,
    ecosystems: Arc<BTreeSet<String>>,
}

impl DocServer {
    /// Creates a server exposing the libraries of `libraries` that pass `filters`.
    pub fn new(libraries: Arc<LibraryCache>, filters: &FilterOptions) -> Self {
        let summaries = libraries.summaries();
        let ecosystems = filter_ecosystems(&collect_ecosystems(&summaries), filters);
        let visible = filter_libraries(&summaries, filters);
        if !filters.is_empty() {
            tracing::info!("Applying filters: {:?}", filters);
        }
        tracing::debug!(
            "Serving {} of {} libraries, ecosystems: [{}]",
            visible.len(),
            summaries.len(),
            ecosystems.iter().join(", ")
        );

        Self {
            libraries,
            visible: Arc::new(visible),
            ecosystems: Arc::new(ecosystems),
        }
    }

    pub fn visible_libraries(&self) -> impl Iterator<Item = &str> {
        self.visible.keys().map(String::as_str)
    }

    pub fn ecosystems(&self) -> impl Iterator<Item = &str> {
        self.ecosystems.iter().map(String::as_str)
    }

    fn ensure_visible(&self, library: &str) -> Result<(), ToolError> {
        if self.visible.contains_key(library) {
            Ok(())
        } else {
            Err(ToolError::Excluded(library.to_string()))
        }
    }

    /// Keys of the visible libraries, or key to essence when `verbose`.
    pub fn library_listing(
        &self,
        ecosystem: Option<&str>,
        verbose: bool,
    ) -> Result<String, ToolError> {
        let index = library_index(&self.visible, ecosystem);
        if verbose {
            Ok(to_yaml(&index)?)
        } else {
            Ok(to_yaml(&index.keys().collect::<Vec<_>>())?)
        }
    }

    pub fn page_listing(&self, library: &str, verbose: bool) -> Result<PageIndex, ToolError> {
        self.ensure_visible(library)?;
        Ok(get_page_index(&self.libraries, library, verbose)?)
    }

    pub fn page_text(
        &self,
        library: &str,
        path: Option<&str>,
        level: Option<MarkdownLevel>,
    ) -> Result<String, ToolError> {
        self.ensure_visible(library)?;
        let page = get_page(&self.libraries, library, path, level)?;
        Ok(render_page(&page)?)
    }

    /// Text of the resource at `uri`.
    pub fn read_resource_text(&self, uri: &str) -> Result<String, McpError> {
        let not_found = |e: ToolError| {
            McpError::resource_not_found(e.to_string(), Some(json!({ "uri": uri })))
        };

        match ResourceRequest::parse(uri)? {
            ResourceRequest::DocIndex { ecosystem, verbose } => {
                self.library_listing(ecosystem.as_deref(), verbose).map_err(not_found)
            }
            ResourceRequest::PageIndex { library, verbose } => {
                let index = self.page_listing(&library, verbose).map_err(not_found)?;
                let listing = listing_value(&index).map_err(|e| not_found(e.into()))?;
                to_yaml(&BTreeMap::from([("/", listing)])).map_err(|e| not_found(e.into()))
            }
            ResourceRequest::Page { library, path, level } => {
                self.page_text(&library, path.as_deref(), level).map_err(not_found)
            }
        }
    }

    fn resource(uri: String, name: String, description: Option<String>) -> Resource {
        let mut resource = RawResource::new(uri, name);
        resource.description = description;
        resource.mime_type = Some("text/yaml".to_string());
        resource.no_annotation()
    }
}

#[tool(tool_box)]
impl DocServer {
    /// Lists the available documentation libraries.
    #[tool(description = "List available documentation libraries. \
        Optionally filter by ecosystem. Set verbose=true for descriptions.")]
    async fn list_libraries(
        &self,
        #[tool(aggr)]
        request: ListLibrariesRequest,
    ) -> Result<ToolText, ToolError> {
        self.library_listing(request.ecosystem.as_deref(), request.verbose.unwrap_or(false))
            .map(ToolText)
    }

    /// Lists the pages of one library as a nested tree.
    #[tool(description = "List documentation pages for a library. \
        Get available libraries with the list_libraries tool. \
        Set verbose=true for page descriptions.")]
    async fn list_pages(
        &self,
        #[tool(aggr)]
        request: ListPagesRequest,
    ) -> Result<ToolText, ToolError> {
        let index = self.page_listing(&request.library, request.verbose.unwrap_or(false))?;
        let text = match &index.tree {
            Some(tree) => to_yaml(tree)?,
            None => "{}".to_string(),
        };
        Ok(ToolText(text))
    }

    /// Fetches the markdown of one page.
    #[tool(description = "Get markdown content for a documentation page. \
        Provide the library key, an optional page path within the library, \
        and a detail level (fulltext, digest, short_digest, essence).")]
    async fn get_page(
        &self,
        #[tool(aggr)]
        request: GetPageRequest,
    ) -> Result<ToolText, ToolError> {
        tracing::debug!("get_page {:?}", request);
        self.page_text(&request.library, request.page.as_deref(), request.level)
            .map(ToolText)
    }
}

#[tool(tool_box)]
impl ServerHandler for DocServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::default(),
            capabilities: ServerCapabilities::builder()
                .enable_resources()
                .enable_tools()
                .build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(format!(
                "This server provides curated documentation digests for software libraries. \
                Use 'list_libraries' to discover libraries, \
                'list_pages' to browse a library's pages and 'get_page' to read one. \
                Available ecosystems: [{}].",
                self.ecosystems.iter().join(", ")
            )),
        }
    }

    async fn list_resources(
        &self,
        _request: PaginatedRequestParam,
        _: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        let mut resources = vec![Self::resource(
            format!("{URI_SCHEME}://doc-index/*"),
            "doc-index".to_string(),
            Some("Index of available libraries".to_string()),
        )];
        resources.extend(self.visible.iter().map(|(key, summary)| {
            Self::resource(
                format!("{URI_SCHEME}://index/{key}"),
                summary.name.clone(),
                summary.essence.clone(),
            )
        }));

        Ok(ListResourcesResult {
            resources,
            next_cursor: None,
        })
    }

    async fn list_resource_templates(
        &self,
        _request: PaginatedRequestParam,
        _: RequestContext<RoleServer>,
    ) -> Result<ListResourceTemplatesResult, McpError> {
        let template = |uri_template: String, name: &str, description: String| {
            RawResourceTemplate {
                uri_template,
                name: name.to_string(),
                description: Some(description),
                mime_type: Some("text/yaml".to_string()),
            }
            .no_annotation()
        };

        Ok(ListResourceTemplatesResult {
            resource_templates: vec![
                template(
                    format!("{URI_SCHEME}://doc-index/{{ecosystem}}{{?verbose}}"),
                    "doc-index",
                    format!(
                        "Index of available libraries. Ecosystems: [{}] or * for all. \
                        Set verbose=true for descriptions.",
                        self.ecosystems.iter().join(", ")
                    ),
                ),
                template(
                    format!("{URI_SCHEME}://index/{{name}}{{?verbose}}"),
                    "page-index",
                    "Index of pages for a library. Set verbose=true to include page descriptions."
                        .to_string(),
                ),
                template(
                    format!("{URI_SCHEME}://page/{{path*}}/{{?level}}"),
                    "doc-page",
                    "path: library/path/to/page, just library returns the root page. \
                    level: fulltext, digest, short_digest or essence; digest is a good default."
                        .to_string(),
                ),
            ],
            next_cursor: None,
        })
    }

    async fn read_resource(
        &self,
        ReadResourceRequestParam { uri }: ReadResourceRequestParam,
        _: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        let text = self.read_resource_text(&uri).inspect_err(|e| {
            tracing::debug!("Resource {} failed: {}", uri, e.message);
        })?;
        Ok(ReadResourceResult {
            contents: vec![ResourceContents::text(text, uri)],
        })
    }
}
