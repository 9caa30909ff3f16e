//! Kamatera コントロールプレーン用 HTTPS クライアント
//!
//! すべてのリクエストは `AuthClientId` / `AuthSecret` ヘッダーとJSONボディを持つ。
//! 繰り返しても安全な呼び出しは [`retry_with_backoff`] を通す。
//! サーバー作成とディスク追加は無条件に再送しない。

use crate::error::{ApiError, NO_SERVERS_FOUND};
use async_trait::async_trait;
use kamatera_cloud::mapper::{from_wire_state, to_wire_configure, to_wire_disk_change};
use kamatera_cloud::remote::{
    CommandId, CommandStatus, CreatedInstance, InstanceLookup, RemoteClient, RemoteResult,
};
use kamatera_cloud::retry::retry_with_backoff;
use kamatera_cloud::wire::{
    WireCapabilities, WireCommand, WireCreateNetwork, WireCreateResponse, WireCreateServer,
    WireDatacenter, WireDeleteNetwork, WireDeleteSubnet, WireImage, WireNetwork,
    WireNetworkCreated, WirePasswordChange, WirePowerOperation, WireRename, WireResEnvelope,
    WireServer, WireServerLookup, WireSubnet, WireSubnetWrite,
};
use kamatera_cloud::{
    ComputeInstanceState, InstanceId, NetworkId, PowerState, RemoteError, RetryPolicy,
    ServerOperation,
};
use kamatera_config::ProviderSettings;
use reqwest::Method;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

pub const DEFAULT_API_URL: &str = "https://cloudcli.cloudwm.com";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// [`KamateraClient`] の接続設定
#[derive(Clone)]
pub struct ClientConfig {
    pub api_url: String,
    pub client_id: String,
    pub secret: String,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl ClientConfig {
    pub fn new(client_id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            client_id: client_id.into(),
            secret: secret.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

impl From<&ProviderSettings> for ClientConfig {
    fn from(settings: &ProviderSettings) -> Self {
        Self {
            api_url: settings.api_url.clone(),
            client_id: settings.api_client_id.clone(),
            secret: settings.api_secret.clone(),
            request_timeout: Duration::from_secs(settings.request_timeout_secs),
            retry: settings.retry.to_policy(),
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_url", &self.api_url)
            .field("client_id", &self.client_id)
            .field("secret", &"[REDACTED]")
            .field("request_timeout", &self.request_timeout)
            .field("retry", &self.retry)
            .finish()
    }
}

/// [`RemoteClient`] over the Kamatera HTTPS API
#[derive(Debug, Clone)]
pub struct KamateraClient {
    http: reqwest::Client,
    config: ClientConfig,
}

impl KamateraClient {
    pub fn new(config: ClientConfig) -> crate::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_url.trim_end_matches('/'), path)
    }

    async fn send_once(&self, method: Method, path: &str, body: Option<&Value>) -> crate::Result<Value> {
        debug!(method = %method, path = %path, "kamatera request");

        let mut request = self
            .http
            .request(method, self.url(path))
            .header("AuthClientId", self.config.client_id.as_str())
            .header("AuthSecret", self.config.secret.as_str())
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        let parsed: Option<Value> = serde_json::from_str(&text).ok();

        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                message: error_message(parsed.as_ref(), &text, status.as_u16()),
            });
        }
        parsed.ok_or_else(|| ApiError::Decode(format!("{path}: {text}")))
    }

    /// 一時的な失敗時はリトライして送信
    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> RemoteResult<T> {
        let body = body.as_ref();
        let value = retry_with_backoff(&self.config.retry, path, ApiError::is_retryable, || {
            self.send_once(method.clone(), path, body)
        })
        .await
        .map_err(|e| e.into_remote(path, self.config.retry.max_attempts.max(1)))?;
        decode(path, value)
    }

    /// 1回だけ送信
    async fn call_once<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> RemoteResult<T> {
        let value = self
            .send_once(method, path, body.as_ref())
            .await
            .map_err(|e| e.into_remote(path, 1))?;
        decode(path, value)
    }

    async fn command(&self, path: &str, body: Value, retry: bool) -> RemoteResult<CommandId> {
        let ids: Vec<String> = if retry {
            self.call(Method::POST, path, Some(body)).await?
        } else {
            self.call_once(Method::POST, path, Some(body)).await?
        };
        ids.into_iter()
            .next()
            .map(CommandId)
            .ok_or_else(|| RemoteError::InvalidResponse(format!("{path}: no command id returned")))
    }

    async fn find_by_name(&self, name: &str) -> RemoteResult<Option<ComputeInstanceState>> {
        match self.read_instance(&InstanceLookup::exact_name(name)).await {
            Ok(servers) => Ok(servers.into_iter().next()),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl RemoteClient for KamateraClient {
    async fn create_instance(&self, request: &WireCreateServer) -> RemoteResult<CreatedInstance> {
        const PATH: &str = "service/server";

        if self.find_by_name(&request.name).await?.is_some() {
            return Err(RemoteError::ConflictDuplicate {
                kind: "server",
                name: request.name.clone(),
            });
        }

        let body = encode(request)?;
        let max_attempts = self.config.retry.max_attempts.max(1);
        let mut attempt = 0u32;
        loop {
            match self.send_once(Method::POST, PATH, Some(&body)).await {
                Ok(value) => {
                    let response: WireCreateResponse = decode(PATH, value)?;
                    info!(server = %request.name, commands = response.command_ids().len(), "server creation queued");
                    return Ok(CreatedInstance {
                        commands: response.command_ids().iter().cloned().map(CommandId).collect(),
                        generated_password: response.generated_password().map(str::to_string),
                        adopted: None,
                    });
                }
                Err(e) if e.is_retryable() => {
                    attempt += 1;
                    // The request may have reached the control plane before failing.
                    if let Some(existing) = self.find_by_name(&request.name).await? {
                        warn!(server = %request.name, server_id = %existing.id, error = %e, "create failed but server exists, adopting");
                        return Ok(CreatedInstance {
                            commands: Vec::new(),
                            generated_password: None,
                            adopted: Some(existing.id),
                        });
                    }
                    if attempt >= max_attempts {
                        return Err(e.into_remote(PATH, attempt));
                    }
                    let delay = self.config.retry.delay_for_attempt(attempt - 1);
                    warn!(server = %request.name, attempt, error = %e, delay_ms = delay.as_millis() as u64, "server create failed, retrying");
                    sleep(delay).await;
                }
                Err(e) => return Err(e.into_remote(PATH, attempt + 1)),
            }
        }
    }

    async fn read_instance(&self, lookup: &InstanceLookup) -> RemoteResult<Vec<ComputeInstanceState>> {
        let body = match lookup {
            InstanceLookup::Id(id) => WireServerLookup {
                id: Some(id.0.clone()),
                name: None,
            },
            InstanceLookup::NameFilter(filter) => WireServerLookup {
                id: None,
                name: Some(filter.clone()),
            },
        };
        let servers: Vec<WireServer> = self
            .call(Method::POST, "service/server/info", Some(encode(&body)?))
            .await?;
        if servers.is_empty() {
            return Err(RemoteError::NotFound(NO_SERVERS_FOUND.to_string()));
        }
        servers.into_iter().map(from_wire_state).collect()
    }

    async fn update_instance(
        &self,
        id: &InstanceId,
        operation: &ServerOperation,
    ) -> RemoteResult<CommandId> {
        match operation {
            ServerOperation::Rename { name } => {
                let body = WireRename {
                    id: id.0.clone(),
                    new_name: name.clone(),
                };
                self.command("service/server/rename", encode(&body)?, true).await
            }
            ServerOperation::ChangePassword { password } => {
                let body = WirePasswordChange {
                    id: id.0.clone(),
                    password: password.clone(),
                };
                self.command("service/server/password", encode(&body)?, true).await
            }
            ServerOperation::SetPower { state } => self.set_power(id, *state).await,
            ServerOperation::AddDisk { .. } | ServerOperation::ResizeDisk { .. } => {
                let body = to_wire_disk_change(id, operation)
                    .ok_or_else(|| unroutable(operation))?;
                // Adding is not idempotent
                let retry = matches!(operation, ServerOperation::ResizeDisk { .. });
                self.command("server/disk", encode(&body)?, retry).await
            }
            _ => {
                let body = to_wire_configure(id, operation).ok_or_else(|| unroutable(operation))?;
                self.command("server/configure", encode(&body)?, true).await
            }
        }
    }

    async fn set_power(&self, id: &InstanceId, state: PowerState) -> RemoteResult<CommandId> {
        let path = match state {
            PowerState::On => "service/server/poweron",
            PowerState::Off => "service/server/poweroff",
        };
        let body = WirePowerOperation {
            id: id.0.clone(),
            force: false,
        };
        self.command(path, encode(&body)?, true).await
    }

    async fn destroy_instance(&self, id: &InstanceId) -> RemoteResult<CommandId> {
        let body = WirePowerOperation {
            id: id.0.clone(),
            force: true,
        };
        self.command("service/server/terminate", encode(&body)?, true).await
    }

    async fn command_status(&self, id: &CommandId) -> RemoteResult<CommandStatus> {
        let path = format!("service/queue?id={id}");
        let commands: Vec<WireCommand> = self.call(Method::GET, &path, None).await?;
        let [command] = commands.as_slice() else {
            return Err(RemoteError::InvalidResponse(
                "invalid number of command responses".to_string(),
            ));
        };
        Ok(match command.status.as_deref() {
            Some("complete") => CommandStatus::Complete {
                log: command.log.clone(),
            },
            Some("error") => CommandStatus::Failed {
                log: command.log.clone(),
            },
            _ => CommandStatus::Pending,
        })
    }

    async fn list_datacenters(&self) -> RemoteResult<Vec<WireDatacenter>> {
        self.call(Method::GET, "service/server?datacenter=1", None).await
    }

    async fn list_images(&self, datacenter: &str) -> RemoteResult<Vec<WireImage>> {
        let path = format!("service/server?images=1&datacenter={datacenter}");
        self.call(Method::GET, &path, None).await
    }

    async fn capabilities(&self, datacenter: &str) -> RemoteResult<WireCapabilities> {
        let path = format!("service/server?capabilities=1&datacenter={datacenter}");
        self.call(Method::GET, &path, None).await
    }

    async fn create_network(&self, request: &WireCreateNetwork) -> RemoteResult<WireNetworkCreated> {
        const PATH: &str = "service/network/create";
        let envelope: WireResEnvelope = self.call_once(Method::POST, PATH, Some(encode(request)?)).await?;
        decode_res(PATH, &envelope)
    }

    async fn read_networks(&self, datacenter: &str) -> RemoteResult<Vec<WireNetwork>> {
        let path = format!("service/networks?datacenter={datacenter}");
        self.call(Method::GET, &path, None).await
    }

    async fn list_subnets(&self, datacenter: &str, network: NetworkId) -> RemoteResult<Vec<WireSubnet>> {
        let path = format!("service/network/subnets?datacenter={datacenter}&vlanId={network}");
        self.call(Method::GET, &path, None).await
    }

    async fn create_subnet(&self, request: &WireSubnetWrite) -> RemoteResult<u64> {
        const PATH: &str = "service/network/subnet/create";
        let envelope: WireResEnvelope = self.call_once(Method::POST, PATH, Some(encode(request)?)).await?;
        Ok(decode_res(PATH, &envelope)?.subnet_id)
    }

    async fn edit_subnet(&self, request: &WireSubnetWrite) -> RemoteResult<()> {
        let _: Value = self
            .call(Method::POST, "service/network/subnet/edit", Some(encode(request)?))
            .await?;
        Ok(())
    }

    async fn delete_subnet(&self, subnet_id: u64) -> RemoteResult<()> {
        let body = WireDeleteSubnet { subnet_id };
        let _: Value = self
            .call(Method::POST, "service/network/subnet/delete", Some(encode(&body)?))
            .await?;
        Ok(())
    }

    async fn destroy_network(&self, datacenter: &str, network_id: u64) -> RemoteResult<()> {
        let body = WireDeleteNetwork {
            datacenter: datacenter.to_string(),
            id: network_id,
        };
        let _: Value = self
            .call(Method::POST, "service/network/delete", Some(encode(&body)?))
            .await?;
        Ok(())
    }
}

fn encode<T: Serialize>(body: &T) -> RemoteResult<Value> {
    serde_json::to_value(body)
        .map_err(|e| RemoteError::InvalidResponse(format!("failed to encode request: {e}")))
}

fn decode<T: DeserializeOwned>(path: &str, value: Value) -> RemoteResult<T> {
    serde_json::from_value(value).map_err(|e| RemoteError::InvalidResponse(format!("{path}: {e}")))
}

/// Creation responses embed their identifiers as a JSON string under `res`
fn decode_res(path: &str, envelope: &WireResEnvelope) -> RemoteResult<WireNetworkCreated> {
    serde_json::from_str(&envelope.res)
        .map_err(|e| RemoteError::InvalidResponse(format!("{path}: {e}")))
}

fn unroutable(operation: &ServerOperation) -> RemoteError {
    RemoteError::InvalidResponse(format!("no endpoint for operation {}", operation.kind()))
}

/// Message of an error body: `{"message": ...}`, a bare JSON string, or the raw text
fn error_message(parsed: Option<&Value>, text: &str, status: u16) -> String {
    let message = match parsed {
        Some(Value::Object(map)) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| text.trim().to_string()),
        Some(Value::String(s)) => s.clone(),
        _ => text.trim().to_string(),
    };
    if message.is_empty() {
        format!("bad status code from Kamatera API: {status}")
    } else {
        message
    }
}
