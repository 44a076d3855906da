use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollabError {
    #[error("route table request failed: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("route table rejected {spec}: {message}")]
    Rejected { spec: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Running,
    Stopped { exit_code: i32 },
}

/// The hub's per-tenant session collaborator. `poll` yields to the
/// scheduler before answering and never fails.
#[async_trait]
pub trait SessionLifecycle: Send + Sync {
    async fn begin(&self, tenant: &str) -> Result<(), CollabError>;
    async fn poll(&self, tenant: &str) -> SessionStatus;
    async fn end(&self, tenant: &str);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteEntry {
    pub target: String,
    pub data: Value,
}

/// The hub's route-registration collaborator, keyed by route spec.
#[async_trait]
pub trait RouteTable: Send + Sync {
    async fn list_routes(&self) -> Result<BTreeMap<String, RouteEntry>, CollabError>;
    async fn add_route(&self, spec: &str, target: &str, data: Value) -> Result<(), CollabError>;
    async fn remove_route(&self, spec: &str) -> Result<(), CollabError>;
}

/// Session stand-in that starts instantly and reports running until
/// `end` has been called for the tenant. No process, no network.
#[derive(Debug, Default)]
pub struct NullSessionLifecycle {
    started: Mutex<BTreeSet<String>>,
    stopped: Mutex<BTreeSet<String>>,
}

impl NullSessionLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    fn started(&self) -> std::sync::MutexGuard<'_, BTreeSet<String>> {
        self.started.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stopped(&self) -> std::sync::MutexGuard<'_, BTreeSet<String>> {
        self.stopped.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SessionLifecycle for NullSessionLifecycle {
    async fn begin(&self, tenant: &str) -> Result<(), CollabError> {
        self.started().insert(tenant.to_string());
        Ok(())
    }

    async fn poll(&self, tenant: &str) -> SessionStatus {
        tokio::task::yield_now().await;
        if self.stopped().contains(tenant) {
            SessionStatus::Stopped { exit_code: 0 }
        } else {
            SessionStatus::Running
        }
    }

    async fn end(&self, tenant: &str) {
        self.stopped().insert(tenant.to_string());
    }
}

/// Route stand-in recording routes in memory instead of configuring a
/// real proxy.
#[derive(Debug, Default)]
pub struct InMemoryRouteTable {
    routes: Mutex<BTreeMap<String, RouteEntry>>,
}

impl InMemoryRouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn routes(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, RouteEntry>> {
        self.routes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl RouteTable for InMemoryRouteTable {
    async fn list_routes(&self) -> Result<BTreeMap<String, RouteEntry>, CollabError> {
        Ok(self.routes().clone())
    }

    async fn add_route(&self, spec: &str, target: &str, data: Value) -> Result<(), CollabError> {
        self.routes().insert(
            spec.to_string(),
            RouteEntry {
                target: target.to_string(),
                data,
            },
        );
        Ok(())
    }

    async fn remove_route(&self, spec: &str) -> Result<(), CollabError> {
        self.routes().remove(spec);
        Ok(())
    }
}
