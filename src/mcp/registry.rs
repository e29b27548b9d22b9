//! Process-wide cache of tool-server sessions.
//!
//! Entries are keyed by [`SessionIdentity`] and live for the lifetime of the
//! registry. A failed entry is cached like a successful one: it is returned
//! on every later lookup and never retried.
//!
//! Concurrent requests for an identity that is still connecting share one
//! in-flight attempt instead of racing to create duplicate sessions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;

use super::config::{SessionIdentity, TransportKind};
use super::error::McpError;
use super::session::ToolSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Failed,
}

/// The registry's record for one identity.
#[derive(Debug)]
pub struct SessionHandle {
    identity: SessionIdentity,
    status: ConnectionStatus,
    session: Option<Arc<dyn ToolSession>>,
    tool_names: Vec<String>,
    error: Option<McpError>,
}

impl SessionHandle {
    pub fn connected(
        identity: SessionIdentity,
        session: Arc<dyn ToolSession>,
        tool_names: Vec<String>,
    ) -> Self {
        Self {
            identity,
            status: ConnectionStatus::Connected,
            session: Some(session),
            tool_names,
            error: None,
        }
    }

    pub fn failed(identity: SessionIdentity, error: McpError) -> Self {
        Self {
            identity,
            status: ConnectionStatus::Failed,
            session: None,
            tool_names: Vec::new(),
            error: Some(error),
        }
    }

    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Invocation capability; `None` unless connected.
    pub fn session(&self) -> Option<&Arc<dyn ToolSession>> {
        self.session.as_ref()
    }

    /// Tool names seen by the connection probe.
    pub fn tool_names(&self) -> &[String] {
        &self.tool_names
    }

    pub fn error(&self) -> Option<&McpError> {
        self.error.as_ref()
    }

    pub fn last_error(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }
}

pub(crate) type PendingHandle = Shared<BoxFuture<'static, Arc<SessionHandle>>>;

enum Slot {
    Pending(PendingHandle),
    Ready(Arc<SessionHandle>),
}

/// Serializable view of a registry entry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryEntry {
    pub name: String,
    pub transport: TransportKind,
    pub status: ConnectionStatus,
    pub tools: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Default)]
pub struct ConnectionRegistry {
    slots: Mutex<HashMap<SessionIdentity, Slot>>,
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("entries", &self.len())
            .finish()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<SessionIdentity, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Settled handle for `identity`, if any.
    pub fn get(&self, identity: &SessionIdentity) -> Option<Arc<SessionHandle>> {
        match self.slots().get(identity) {
            Some(Slot::Ready(handle)) => Some(Arc::clone(handle)),
            _ => None,
        }
    }

    /// Store a settled handle, replacing whatever was there.
    pub fn insert(&self, handle: Arc<SessionHandle>) {
        let identity = handle.identity().clone();
        self.slots().insert(identity, Slot::Ready(handle));
    }

    /// Return the handle for `identity`, creating it with `create` if the
    /// identity has never been seen.
    ///
    /// `create` runs at most once per identity. Callers arriving while the
    /// first attempt is in flight await that same attempt.
    pub async fn get_or_create<F>(&self, identity: &SessionIdentity, create: F) -> Arc<SessionHandle>
    where
        F: FnOnce() -> BoxFuture<'static, Arc<SessionHandle>>,
    {
        let pending = {
            let mut slots = self.slots();
            match slots.get(identity) {
                Some(Slot::Ready(handle)) => return Arc::clone(handle),
                Some(Slot::Pending(pending)) => pending.clone(),
                None => {
                    let pending = create().shared();
                    slots.insert(identity.clone(), Slot::Pending(pending.clone()));
                    pending
                }
            }
        };

        pending.await
    }

    pub fn len(&self) -> usize {
        self.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current state of every entry, ordered by identity.
    pub fn snapshot(&self) -> Vec<RegistryEntry> {
        let slots = self.slots();
        let mut entries: Vec<(&SessionIdentity, RegistryEntry)> = slots
            .iter()
            .map(|(identity, slot)| {
                let entry = match slot {
                    Slot::Pending(_) => RegistryEntry {
                        name: identity.name.clone(),
                        transport: identity.transport,
                        status: ConnectionStatus::Connecting,
                        tools: Vec::new(),
                        error: None,
                    },
                    Slot::Ready(handle) => RegistryEntry {
                        name: identity.name.clone(),
                        transport: identity.transport,
                        status: handle.status(),
                        tools: handle.tool_names().to_vec(),
                        error: handle.last_error(),
                    },
                };
                (identity, entry)
            })
            .collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries.into_iter().map(|(_, entry)| entry).collect()
    }
}
