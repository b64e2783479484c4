//! MCP method routing.

use crate::error::{ProtocolError, ProtocolResult};
use crate::protocol::types::*;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, instrument, warn};

/// Server-side behavior behind the MCP methods.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn initialize(&self, params: InitializeParams) -> ProtocolResult<InitializeResult>;

    /// Client confirmed initialization.
    async fn initialized(&self) -> ProtocolResult<()>;

    async fn shutdown(&self) -> ProtocolResult<()>;

    async fn list_tools(&self) -> ProtocolResult<ListToolsResult>;

    /// Run a tool. Tool failures belong in the result, not in the error.
    async fn call_tool(&self, params: CallToolParams) -> ProtocolResult<CallToolResult>;

    async fn ping(&self) -> ProtocolResult<Value> {
        Ok(serde_json::json!({}))
    }
}

/// Routes JSON-RPC requests to a [`Handler`].
pub struct Dispatcher<H: Handler> {
    handler: Arc<H>,
}

impl<H: Handler> Dispatcher<H> {
    pub fn new(handler: Arc<H>) -> Self {
        Self { handler }
    }

    /// Handle one request and build its response.
    ///
    /// The caller decides whether a notification's response is sent.
    #[instrument(skip(self, request), fields(method = %request.method))]
    pub async fn dispatch(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        debug!("Dispatching request");
        let JsonRpcRequest { id, method, params, .. } = request;

        let result = match method.as_str() {
            "initialize" => match decode::<InitializeParams>(params) {
                Ok(params) => encode(self.handler.initialize(params).await),
                Err(e) => Err(e),
            },
            "initialized" | "notifications/initialized" => {
                self.handler.initialized().await.map(|_| Value::Null)
            }
            "notifications/cancelled" => Ok(Value::Null),
            "shutdown" => self.handler.shutdown().await.map(|_| Value::Null),
            "ping" => self.handler.ping().await,
            "tools/list" => encode(self.handler.list_tools().await),
            "tools/call" => match decode::<CallToolParams>(params) {
                Ok(params) => encode(self.handler.call_tool(params).await),
                Err(e) => Err(e),
            },
            other => {
                warn!("Unknown method: {}", other);
                Err(ProtocolError::MethodNotFound(other.to_string()))
            }
        };

        if let Err(e) = &result {
            error!("Request failed: {}", e);
        }
        JsonRpcResponse::from_result(id, result)
    }
}

fn decode<T: DeserializeOwned>(params: Option<Value>) -> ProtocolResult<T> {
    let params = params.ok_or_else(|| ProtocolError::InvalidParams("Missing params".into()))?;
    serde_json::from_value(params).map_err(|e| ProtocolError::InvalidParams(e.to_string().into()))
}

fn encode<T: Serialize>(result: ProtocolResult<T>) -> ProtocolResult<Value> {
    serde_json::to_value(result?).map_err(|e| ProtocolError::InternalError(e.to_string().into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingHandler {
        initialized: AtomicUsize,
    }

    #[async_trait]
    impl Handler for CountingHandler {
        async fn initialize(&self, params: InitializeParams) -> ProtocolResult<InitializeResult> {
            Ok(InitializeResult {
                protocol_version: MCP_VERSION.into(),
                capabilities: ServerCapabilities::default(),
                server_info: Implementation::new(format!("for-{}", params.client_info.name), "0.0.1"),
                instructions: None,
            })
        }

        async fn initialized(&self) -> ProtocolResult<()> {
            self.initialized.fetch_add(1, Ordering::SeqCst);
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

    fn request(value: Value) -> JsonRpcRequest {
        serde_json::from_value(value).unwrap()
    }

    fn dispatcher() -> (Dispatcher<CountingHandler>, Arc<CountingHandler>) {
        let handler = Arc::new(CountingHandler::default());
        (Dispatcher::new(Arc::clone(&handler)), handler)
    }

    #[tokio::test]
    async fn test_initialize() {
        let (dispatcher, _) = dispatcher();
        let request = request(serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": MCP_VERSION,
                "capabilities": {},
                "clientInfo": { "name": "desktop", "version": "1.0" }
            }
        }));

        let response = dispatcher.dispatch(request).await;
        let Outcome::Result(result) = response.outcome else {
            panic!("initialize failed: {:?}", response.outcome);
        };
        assert_eq!(result["serverInfo"]["name"], "for-desktop");
        assert_eq!(result["protocolVersion"], MCP_VERSION);
    }

    #[tokio::test]
    async fn test_both_initialized_spellings() {
        let (dispatcher, handler) = dispatcher();
        for method in ["initialized", "notifications/initialized"] {
            let response = dispatcher.dispatch(request(serde_json::json!({"jsonrpc": "2.0", "method": method}))).await;
            assert_eq!(response.error_code(), None);
        }
        assert_eq!(handler.initialized.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_call_without_params_is_invalid() {
        let (dispatcher, _) = dispatcher();
        let response = dispatcher
            .dispatch(request(serde_json::json!({"jsonrpc": "2.0", "id": "a", "method": "tools/call"})))
            .await;
        assert_eq!(response.error_code(), Some(-32602));
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let (dispatcher, _) = dispatcher();
        let response = dispatcher
            .dispatch(request(serde_json::json!({"jsonrpc": "2.0", "id": 2, "method": "resources/list"})))
            .await;
        assert_eq!(response.error_code(), Some(-32601));
    }
}
