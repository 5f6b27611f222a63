use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use itertools::Itertools;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lovely_docs_mcp::cache::LibraryCache;
use lovely_docs_mcp::filter::{FilterOptions, filter_libraries};
use lovely_docs_mcp::mcp::DocServer;
use lovely_docs_mcp::query::flatten_page_paths;
use lovely_docs_mcp::server;

#[derive(Parser, Debug)]
#[command(version, about = "Lovely Docs MCP Server")]
struct Cli {
    /// Directory containing one subdirectory per library
    #[arg(long, env = "LOVELY_DOCS_DOC_DIR", default_value = "doc_db", global = true)]
    doc_dir: PathBuf,

    #[command(flatten)]
    filters: FilterOptions,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the MCP server (default)
    Serve {
        /// Type of server to run
        #[arg(short, long, value_enum, default_value_t = ServerType::Stdio)]
        server_type: ServerType,

        /// Address for the SSE server
        #[arg(short, long, default_value = "127.0.0.1:8080")]
        address: String,
    },
    /// List available libraries grouped by ecosystem
    List,
    /// List the pages of a library
    Pages {
        library: String,

        /// Print the listing with page descriptions
        #[arg(short, long)]
        verbose: bool,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ServerType {
    /// Start a stdio server
    Stdio,
    /// Start an SSE server
    Sse,
}

async fn load(doc_dir: &Path) -> Result<Arc<LibraryCache>> {
    let cache = LibraryCache::scan(doc_dir)
        .await
        .with_context(|| format!("Failed to read documentation root {}", doc_dir.display()))?;
    Ok(Arc::new(cache))
}

fn print_libraries(cache: &LibraryCache, filters: &FilterOptions) {
    let visible = filter_libraries(&cache.summaries(), filters);
    let groups = visible
        .iter()
        .flat_map(|(key, lib)| {
            let ecosystems = if lib.ecosystems.is_empty() {
                vec!["Other".to_string()]
            } else {
                lib.ecosystems.clone()
            };
            ecosystems.into_iter().map(move |eco| (eco, (key, lib)))
        })
        .into_group_map();

    for (ecosystem, libs) in groups.into_iter().sorted_by(|(a, _), (b, _)| a.cmp(b)) {
        println!("{ecosystem}:");
        for (key, lib) in libs {
            match &lib.essence {
                Some(essence) => println!("  {key}: {essence}"),
                None => println!("  {key}"),
            }
        }
    }
}

fn print_pages(server: &DocServer, library: &str, verbose: bool) -> Result<()> {
    let index = server.page_listing(library, verbose)?;
    let tree = index.tree.unwrap_or_default();
    if verbose {
        print!("{}", serde_yaml::to_string(&tree)?);
    } else {
        for path in flatten_page_paths(&tree) {
            println!("{path}");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Serve {
        server_type: ServerType::Stdio,
        address: "127.0.0.1:8080".to_string(),
    });

    match command {
        Command::Serve { server_type, address } => {
            match server_type {
                ServerType::Stdio => server::init_stderr_logging(),
                ServerType::Sse => server::init_sse_logging(),
            }
            let cache = load(&cli.doc_dir).await?;
            let doc_server = DocServer::new(cache, &cli.filters);
            match server_type {
                ServerType::Stdio => server::start_stdio_server(doc_server).await?,
                ServerType::Sse => server::start_sse_server(&address, doc_server).await?,
            }
        }
        Command::List => {
            server::init_stderr_logging();
            let cache = load(&cli.doc_dir).await?;
            print_libraries(&cache, &cli.filters);
        }
        Command::Pages { library, verbose } => {
            server::init_stderr_logging();
            let cache = load(&cli.doc_dir).await?;
            let doc_server = DocServer::new(cache, &cli.filters);
            print_pages(&doc_server, &library, verbose)?;
        }
    }

    Ok(())
}
