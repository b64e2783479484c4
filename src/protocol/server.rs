//! MCP server loop with lifecycle tracking.

use crate::error::{McpError, ProtocolError, Result};
use crate::protocol::handler::{Dispatcher, Handler};
use crate::protocol::transport::{StdioTransport, Transport};
use crate::protocol::types::*;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Where the server is in the MCP handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Created,
    /// `initialize` answered, waiting for the client's confirmation.
    Initializing,
    Running,
    ShuttingDown,
    Stopped,
}

/// MCP Server.
pub struct McpServer<H: Handler> {
    info: Implementation,
    capabilities: ServerCapabilities,
    handler: Arc<H>,
    lifecycle: RwLock<Lifecycle>,
}

impl<H: Handler> McpServer<H> {
    pub fn new(handler: H, info: Implementation, capabilities: ServerCapabilities) -> Self {
        Self {
            info,
            capabilities,
            handler: Arc::new(handler),
            lifecycle: RwLock::new(Lifecycle::Created),
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.read()
    }

    pub fn capabilities(&self) -> &ServerCapabilities {
        &self.capabilities
    }

    /// Serve requests on stdin/stdout until EOF or `shutdown`.
    #[instrument(skip(self), fields(server = %self.info.name))]
    pub async fn run(&self) -> Result<()> {
        self.serve(&StdioTransport::stdio()).await
    }

    /// Serve requests on `transport` until EOF or `shutdown`.
    ///
    /// Requests are handled one at a time, in arrival order.
    pub async fn serve<T: Transport>(&self, transport: &T) -> Result<()> {
        info!("Starting MCP server: {}", self.info);
        let dispatcher = Dispatcher::new(Arc::clone(&self.handler));

        loop {
            let message = match transport.read_message().await {
                Ok(Some(message)) => message,
                Ok(None) => {
                    debug!("EOF received, shutting down");
                    break;
                }
                Err(McpError::Protocol(ProtocolError::ParseError)) => {
                    let response = JsonRpcResponse::error(None, JsonRpcError::parse_error());
                    if let Err(e) = transport.write_response(&response).await {
                        error!("Failed to send error response: {}", e);
                    }
                    continue;
                }
                Err(e) => {
                    error!("Transport error: {}", e);
                    self.set_lifecycle(Lifecycle::Stopped);
                    return Err(e);
                }
            };

            let request = match message {
                Message::Request(request) => request,
                Message::Response(response) => {
                    warn!("Unexpected response received: {:?}", response.id);
                    continue;
                }
            };

            let is_notification = request.is_notification();
            let shutdown = request.method == "shutdown";
            self.advance(&request.method);

            let response = dispatcher.dispatch(request).await;
            if !is_notification && let Err(e) = transport.write_response(&response).await {
                error!("Failed to send response: {}", e);
            }

            if shutdown {
                info!("Shutdown request received");
                break;
            }
        }

        self.set_lifecycle(Lifecycle::Stopped);
        info!("Server stopped");
        Ok(())
    }

    fn set_lifecycle(&self, next: Lifecycle) {
        *self.lifecycle.write() = next;
    }

    fn advance(&self, method: &str) {
        let mut lifecycle = self.lifecycle.write();
        match (method, *lifecycle) {
            ("initialize", Lifecycle::Created) => *lifecycle = Lifecycle::Initializing,
            ("initialized" | "notifications/initialized", Lifecycle::Initializing) => {
                *lifecycle = Lifecycle::Running;
                info!("Server initialized and running");
            }
            ("shutdown", _) => *lifecycle = Lifecycle::ShuttingDown,
            _ => {}
        }
    }
}

/// Builder for MCP Server.
pub struct McpServerBuilder<H: Handler> {
    handler: Option<H>,
    name: String,
    version: String,
    capabilities: ServerCapabilities,
}

impl<H: Handler> McpServerBuilder<H> {
    pub fn new() -> Self {
        Self {
            handler: None,
            name: env!("CARGO_PKG_NAME").into(),
            version: env!("CARGO_PKG_VERSION").into(),
            capabilities: ServerCapabilities::default(),
        }
    }

    pub fn handler(mut self, handler: H) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Advertise the tools capability. The tool list never changes at runtime.
    pub fn with_tools(mut self) -> Self {
        self.capabilities.tools = Some(ToolsCapability {
            list_changed: Some(false),
        });
        self
    }

    pub fn build(self) -> Result<McpServer<H>> {
        let handler = self.handler.ok_or_else(|| McpError::Internal {
            message: "Handler is required".into(),
        })?;

        Ok(McpServer::new(
            handler,
            Implementation::new(self.name, self.version),
            self.capabilities,
        ))
    }
}

impl<H: Handler> Default for McpServerBuilder<H> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProtocolResult;
    use crate::protocol::transport::LineTransport;
    use async_trait::async_trait;
    use serde_json::Value;

    struct EchoHandler;

    #[async_trait]
    impl Handler for EchoHandler {
        async fn initialize(&self, _params: InitializeParams) -> ProtocolResult<InitializeResult> {
            Ok(InitializeResult {
                protocol_version: MCP_VERSION.into(),
                capabilities: ServerCapabilities::default(),
                server_info: Implementation::new("echo", "1.0"),
                instructions: None,
            })
        }

        async fn initialized(&self) -> ProtocolResult<()> {
            Ok(())
        }

        async fn shutdown(&self) -> ProtocolResult<()> {
            Ok(())
        }

        async fn list_tools(&self) -> ProtocolResult<ListToolsResult> {
            Ok(ListToolsResult { tools: vec![] })
        }

        async fn call_tool(&self, params: CallToolParams) -> ProtocolResult<CallToolResult> {
            Ok(CallToolResult::text(params.name))
        }
    }

    fn server() -> McpServer<EchoHandler> {
        McpServerBuilder::new()
            .handler(EchoHandler)
            .name("test-server")
            .version("0.1.0")
            .with_tools()
            .build()
            .unwrap()
    }

    async fn run(server: &McpServer<EchoHandler>, input: &str) -> Vec<Value> {
        let transport = LineTransport::new(input.as_bytes(), Vec::new());
        server.serve(&transport).await.unwrap();
        String::from_utf8(transport.into_writer())
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn test_builder() {
        let server = server();
        assert_eq!(server.info.name, "test-server");
        assert_eq!(server.capabilities().tools.as_ref().unwrap().list_changed, Some(false));
        assert_eq!(server.lifecycle(), Lifecycle::Created);
    }

    #[tokio::test]
    async fn test_handshake_and_notifications() {
        let server = server();
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2024-11-05","capabilities":{},"clientInfo":{"name":"t","version":"1"}}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"preview_table"}}"#,
            "\n",
        );

        let responses = run(&server, input).await;
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["id"], 1);
        assert_eq!(responses[1]["result"]["content"][0]["text"], "preview_table");
        assert_eq!(server.lifecycle(), Lifecycle::Stopped);
    }

    #[tokio::test]
    async fn test_parse_error_then_continue() {
        let server = server();
        let input = "not json\n{\"jsonrpc\":\"2.0\",\"id\":3,\"method\":\"ping\"}\n";

        let responses = run(&server, input).await;
        assert_eq!(responses[0]["error"]["code"], -32700);
        assert_eq!(responses[0]["id"], Value::Null);
        assert_eq!(responses[1]["id"], 3);
    }

    #[tokio::test]
    async fn test_invalid_utf8_then_continue() {
        let server = server();
        let input: &[u8] = b"\xff\xfe garbage\n{\"jsonrpc\":\"2.0\",\"id\":4,\"method\":\"ping\"}\n";
        let transport = LineTransport::new(input, Vec::new());
        server.serve(&transport).await.unwrap();

        let responses: Vec<Value> = String::from_utf8(transport.into_writer())
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["error"]["code"], -32700);
        assert_eq!(responses[0]["id"], Value::Null);
        assert_eq!(responses[1]["id"], 4);
    }

    #[tokio::test]
    async fn test_shutdown_stops_reading() {
        let server = server();
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"shutdown"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#,
            "\n",
        );

        let responses = run(&server, input).await;
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["id"], 1);
    }
}
