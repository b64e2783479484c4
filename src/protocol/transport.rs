//! Newline-delimited JSON-RPC transport.

use crate::error::{McpError, ProtocolError, Result};
use crate::protocol::types::{JsonRpcResponse, Message};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout};
use tokio::sync::Mutex;
use tracing::{debug, error, trace};

/// Transport trait for MCP communication.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Next message, or `None` at end of input.
    async fn read_message(&self) -> Result<Option<Message>>;
    async fn write_response(&self, response: &JsonRpcResponse) -> Result<()>;
}

/// One JSON message per line over any async reader/writer pair.
pub struct LineTransport<R, W> {
    reader: Mutex<R>,
    writer: Mutex<W>,
}

/// Transport over the process's stdin and stdout.
pub type StdioTransport = LineTransport<BufReader<Stdin>, Stdout>;

impl StdioTransport {
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> LineTransport<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
        }
    }

    /// Give back the writer, e.g. to inspect what was sent.
    pub fn into_writer(self) -> W {
        self.writer.into_inner()
    }

    /// Next non-blank line, or `None` at EOF.
    ///
    /// A line that is not valid UTF-8 is a parse error, not a transport failure.
    async fn read_line(&self) -> Result<Option<String>> {
        let mut reader = self.reader.lock().await;
        loop {
            let mut buf = Vec::new();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => return Ok(None),
                Ok(_) => {
                    let line = String::from_utf8(buf).map_err(|e| {
                        error!("Input line is not valid UTF-8: {}", e);
                        McpError::Protocol(ProtocolError::ParseError)
                    })?;
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    trace!("Received line: {}", line);
                    return Ok(Some(line.to_string()));
                }
                Err(e) => {
                    error!("Error reading input: {}", e);
                    return Err(McpError::Io(e));
                }
            }
        }
    }

    async fn write_line(&self, content: &str) -> Result<()> {
        let mut writer = self.writer.lock().await;
        trace!("Sending line: {}", content);
        writer.write_all(content.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl<R, W> Transport for LineTransport<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn read_message(&self) -> Result<Option<Message>> {
        let Some(line) = self.read_line().await? else {
            return Ok(None);
        };

        match line.parse::<Message>() {
            Ok(message) => {
                match &message {
                    Message::Request(request) => debug!("Received request: method={}", request.method),
                    Message::Response(response) => debug!("Received response: id={:?}", response.id),
                }
                Ok(Some(message))
            }
            Err(e) => {
                error!("Failed to parse message: {}", e);
                Err(McpError::Protocol(ProtocolError::ParseError))
            }
        }
    }

    async fn write_response(&self, response: &JsonRpcResponse) -> Result<()> {
        let json = serde_json::to_string(response)?;
        debug!("Sending response: id={:?}", response.id);
        self.write_line(&json).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::RequestId;

    fn transport(input: &str) -> LineTransport<&[u8], Vec<u8>> {
        LineTransport::new(input.as_bytes(), Vec::new())
    }

    #[tokio::test]
    async fn test_reads_requests_and_skips_blank_lines() {
        let t = transport("\n{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n\n");

        match t.read_message().await.unwrap() {
            Some(Message::Request(request)) => {
                assert_eq!(request.method, "ping");
                assert_eq!(request.id, Some(RequestId::Number(1)));
            }
            other => panic!("unexpected message: {:?}", other),
        }
        assert!(t.read_message().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_garbage_is_parse_error() {
        let t = transport("{not json\n");
        let err = t.read_message().await.unwrap_err();
        assert!(matches!(err, McpError::Protocol(ProtocolError::ParseError)));
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_parse_error() {
        let input: &[u8] = b"\xff\xfe garbage\n{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"ping\"}\n";
        let t = LineTransport::new(input, Vec::new());

        let err = t.read_message().await.unwrap_err();
        assert!(matches!(err, McpError::Protocol(ProtocolError::ParseError)));
        assert!(matches!(t.read_message().await.unwrap(), Some(Message::Request(_))));
    }

    #[tokio::test]
    async fn test_writes_one_line_per_response() {
        let t = transport("");
        t.write_response(&JsonRpcResponse::success(Some(RequestId::Number(7)), serde_json::json!({})))
            .await
            .unwrap();

        let written = String::from_utf8(t.into_writer()).unwrap();
        assert!(written.ends_with('\n'));
        assert_eq!(written.lines().count(), 1);
        assert!(written.contains("\"id\":7"));
    }
}
