//! Host command handlers.
//!
//! Each handler encodes one verb's exact request/response contract as
//! observed from the real bridge. Handlers are registered once at startup
//! in a verb-string table and invoked with the server state, the
//! connection, the resolved device (if the request was device-scoped), and
//! the remaining argument string. The returned boolean tells the dispatcher
//! whether to keep reading further requests on the same socket.

mod abb;
mod host;

use crate::device::Device;
use crate::server::{Connection, ServerState};
use async_trait::async_trait;
use fakeadb_core::BridgeResult;
use std::collections::HashMap;
use std::sync::Arc;

pub use abb::{AbbHandler, ABB_CREATE_RESPONSE, ABB_COMMIT_RESPONSE};
pub use host::{DisconnectHandler, ListForwardHandler, PairHandler, TransportHandler};

/// A named, stateless unit handling one host verb.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Handle one protocol turn. Returns whether the dispatcher should keep
    /// the connection open for further requests.
    async fn invoke(
        &self,
        state: &ServerState,
        conn: &mut Connection,
        device: Option<Arc<Device>>,
        args: &str,
    ) -> BridgeResult<bool>;
}

/// Verb-string to handler table, populated once at startup.
pub struct HandlerRegistry {
    handlers: HashMap<&'static str, Arc<dyn CommandHandler>>,
}

impl HandlerRegistry {
    /// The fixed, test-authored handler set.
    pub fn with_builtin_handlers() -> Self {
        let mut handlers: HashMap<&'static str, Arc<dyn CommandHandler>> = HashMap::new();
        handlers.insert("list-forward", Arc::new(ListForwardHandler));
        handlers.insert("pair", Arc::new(PairHandler));
        handlers.insert("disconnect", Arc::new(DisconnectHandler));
        handlers.insert("transport", Arc::new(TransportHandler));
        // The real bridge serves the binder transport under both spellings.
        handlers.insert("abb", Arc::new(AbbHandler));
        handlers.insert("abb_exec", Arc::new(AbbHandler));
        Self { handlers }
    }

    /// Exact-match lookup by verb.
    pub fn get(&self, verb: &str) -> Option<Arc<dyn CommandHandler>> {
        self.handlers.get(verb).cloned()
    }

    pub fn contains(&self, verb: &str) -> bool {
        self.handlers.contains_key(verb)
    }
}
