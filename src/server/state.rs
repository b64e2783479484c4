//! Server state shared by the request handler.

use crate::config::ServerConfig;
use crate::protocol::Implementation;
use crate::session::DiscoverySession;
use crate::tools::ToolRegistry;
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

pub struct ServerState {
    pub config: ServerConfig,
    pub session: Arc<DiscoverySession>,
    pub tools: ToolRegistry,
    initialized: AtomicBool,
    client_info: RwLock<Option<Implementation>>,
    tool_calls: AtomicU64,
}

impl ServerState {
    pub fn new(config: ServerConfig, session: Arc<DiscoverySession>) -> Self {
        let tools = crate::tools::create_registry(Arc::clone(&session));
        Self {
            config,
            session,
            tools,
            initialized: AtomicBool::new(false),
            client_info: RwLock::new(None),
            tool_calls: AtomicU64::new(0),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn set_initialized(&self, client_info: Implementation) {
        *self.client_info.write() = Some(client_info);
        self.initialized.store(true, Ordering::SeqCst);
    }

    pub fn client_info(&self) -> Option<Implementation> {
        self.client_info.read().clone()
    }

    /// Count a tool call and return its sequence number.
    pub fn next_tool_call(&self) -> u64 {
        self.tool_calls.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn tool_calls(&self) -> u64 {
        self.tool_calls.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct ServerStateBuilder {
    config: Option<ServerConfig>,
    session: Option<Arc<DiscoverySession>>,
}

impl ServerStateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Use an existing session, e.g. one that was connected at startup.
    pub fn session(mut self, session: Arc<DiscoverySession>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn build(self) -> Result<ServerState, &'static str> {
        let config = self.config.ok_or("Config is required")?;
        let session = self
            .session
            .unwrap_or_else(|| Arc::new(DiscoverySession::new(config.database_type, config.query)));

        if session.engine() != config.database_type {
            return Err("Session engine does not match the configured database type");
        }

        Ok(ServerState::new(config, session))
    }
}
