use rmcp::ServiceExt;
use rmcp::transport::sse_server::SseServer;
use rmcp::transport::stdio;
use tracing_subscriber::{self, EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::mcp::DocServer;

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Logs to stderr without colors, leaving stdout to the protocol.
pub fn init_stderr_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

pub fn init_sse_logging() {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer())
        .init();
}

// start sse server, one DocServer clone per connection
pub async fn start_sse_server(addr: &str, server: DocServer) -> anyhow::Result<()> {
    let ct = SseServer::serve(addr.parse()?)
        .await?
        .with_service(move || server.clone());
    tracing::info!("Serving MCP over SSE on {}", addr);

    tokio::signal::ctrl_c().await?;
    ct.cancel();
    Ok(())
}

// start stdio server
pub async fn start_stdio_server(server: DocServer) -> anyhow::Result<()> {
    tracing::info!("Starting MCP server on stdio");

    let service = server.serve(stdio()).await.inspect_err(|e| {
        tracing::error!("serving error: {:?}", e);
    })?;

    service.waiting().await?;
    Ok(())
}
