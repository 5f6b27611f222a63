//! Connects to a running SSE server, started with
//! `lovely-docs-mcp serve --server-type sse`, and browses its documentation.

use anyhow::Result;
use rmcp::ServiceExt;
use rmcp::model::{
    CallToolRequestParam, ClientCapabilities, ClientInfo, Implementation, ReadResourceRequestParam,
    ResourceContents,
};
use rmcp::transport::SseTransport;
use serde_json::json;

#[tokio::main]
async fn main() -> Result<()> {
    let server_url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "http://127.0.0.1:8080/sse".to_string());

    let transport = SseTransport::start(&server_url).await?;
    let client_info = ClientInfo {
        protocol_version: Default::default(),
        capabilities: ClientCapabilities::default(),
        client_info: Implementation {
            name: "lovely-docs demo client".to_string(),
            version: "0.0.1".to_string(),
        },
    };
    let client = client_info.serve(transport).await?;
    println!("Connected to server: {:#?}", client.peer_info().server_info);

    let tools = client.list_tools(Default::default()).await?;
    for tool in &tools.tools {
        println!("tool {}: {}", tool.name, tool.description);
    }

    let result = client
        .call_tool(CallToolRequestParam {
            name: "list_libraries".into(),
            arguments: json!({ "verbose": true }).as_object().cloned(),
        })
        .await?;
    for content in &result.content {
        if let Some(text) = content.as_text() {
            println!("Libraries:\n{}", text.text);
        }
    }

    let index = client
        .read_resource(ReadResourceRequestParam {
            uri: "lovely-docs://doc-index/*?verbose=true".to_string(),
        })
        .await?;
    for contents in &index.contents {
        if let ResourceContents::TextResourceContents { text, .. } = contents {
            println!("Doc index:\n{text}");
        }
    }

    client.cancel().await?;
    Ok(())
}
