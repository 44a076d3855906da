use std::collections::BTreeMap;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use hubbench_hub::{CollabError, RouteEntry, RouteTable};
use rand::Rng;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::StartupError;
use crate::instrument::wait_for_http_server;

pub const PROXY_COMMAND: &str = "configurable-http-proxy";
pub const PROXY_TOKEN_ENV: &str = "CONFIGPROXY_AUTH_TOKEN";
const PROXY_API_URL: &str = "http://127.0.0.1:8001";
const PROXY_READY_TIMEOUT: Duration = Duration::from_secs(10);

/// The route proxy subprocess, shared read-only infrastructure for one
/// trial: spawned once, terminated unconditionally on drop.
pub struct ProxyProcess {
    child: Child,
    auth_token: String,
    api_url: String,
}

impl ProxyProcess {
    pub fn spawn(default_target: &str) -> Result<Self, StartupError> {
        let auth_token = hex::encode(rand::thread_rng().gen::<[u8; 16]>());
        let child = Command::new(PROXY_COMMAND)
            .args([
                "--log-level",
                "error",
                "--default-target",
                default_target,
                "--api-ip",
                "127.0.0.1",
            ])
            .env(PROXY_TOKEN_ENV, &auth_token)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(StartupError::ProxySpawn)?;
        debug!(pid = child.id(), "route proxy spawned");
        Ok(Self {
            child,
            auth_token,
            api_url: PROXY_API_URL.to_string(),
        })
    }

    pub async fn wait_ready(&self, client: &reqwest::Client) -> Result<(), StartupError> {
        let url = format!("{}/api/routes", self.api_url);
        wait_for_http_server(client, &url, PROXY_READY_TIMEOUT).await
    }

    pub fn route_table(&self) -> ProxyRouteTable {
        ProxyRouteTable::new(self.api_url.clone(), self.auth_token.clone())
    }
}

impl Drop for ProxyProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// `RouteTable` backed by the proxy's REST API, the production
/// counterpart of the in-memory stand-in.
pub struct ProxyRouteTable {
    http: reqwest::Client,
    api_url: String,
    token: String,
}

impl ProxyRouteTable {
    pub fn new(api_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: api_url.into(),
            token: token.into(),
        }
    }

    fn auth(&self) -> String {
        format!("token {}", self.token)
    }

    fn route_url(&self, spec: &str) -> String {
        format!("{}/api/routes{}", self.api_url, spec)
    }
}

fn transport(err: reqwest::Error) -> CollabError {
    CollabError::Transport(Box::new(err))
}

#[async_trait]
impl RouteTable for ProxyRouteTable {
    async fn list_routes(&self) -> Result<BTreeMap<String, RouteEntry>, CollabError> {
        let response = self
            .http
            .get(format!("{}/api/routes", self.api_url))
            .header("Authorization", self.auth())
            .send()
            .await
            .map_err(transport)?;
        if !response.status().is_success() {
            return Err(CollabError::Rejected {
                spec: "/".to_string(),
                message: format!("status {}", response.status()),
            });
        }
        let body: Value = response.json().await.map_err(transport)?;
        let mut routes = BTreeMap::new();
        if let Some(map) = body.as_object() {
            for (spec, entry) in map {
                let target = entry
                    .get("target")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                routes.insert(
                    spec.clone(),
                    RouteEntry {
                        target,
                        data: entry.clone(),
                    },
                );
            }
        }
        Ok(routes)
    }

    async fn add_route(&self, spec: &str, target: &str, data: Value) -> Result<(), CollabError> {
        let mut body = match data {
            Value::Object(map) => Value::Object(map),
            Value::Null => json!({}),
            other => json!({ "data": other }),
        };
        body["target"] = json!(target);
        let response = self
            .http
            .post(self.route_url(spec))
            .header("Authorization", self.auth())
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        if !response.status().is_success() {
            return Err(CollabError::Rejected {
                spec: spec.to_string(),
                message: format!("status {}", response.status()),
            });
        }
        Ok(())
    }

    async fn remove_route(&self, spec: &str) -> Result<(), CollabError> {
        let response = self
            .http
            .delete(self.route_url(spec))
            .header("Authorization", self.auth())
            .send()
            .await
            .map_err(transport)?;
        // removing an absent route is not an error
        if !response.status().is_success() && response.status().as_u16() != 404 {
            return Err(CollabError::Rejected {
                spec: spec.to_string(),
                message: format!("status {}", response.status()),
            });
        }
        Ok(())
    }
}
