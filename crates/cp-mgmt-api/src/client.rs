// SPDX-License-Identifier: Apache-2.0
//! Management API client.
//!
//! [`ApiClient`] verifies the server identity before every request, keeps the session id,
//! logs each exchange with secrets redacted and follows long-running tasks to completion.
//! All operations take `&self`, so one client can be shared between concurrent tasks.

use crate::config::{ClientConfig, ProxyConfig};
use crate::error::{ClientError, Result};
use crate::fingerprint::Fingerprint;
use crate::log::logged;
use crate::prompt::{FingerprintPrompt, StdinPrompt};
use crate::redact::{self, SID, SID_HEADER};
use crate::session::{LoginArgs, SessionState};
use crate::store::FingerprintStore;
use crate::task;
use crate::transport::{HttpRequest, HttpsTransport, Transport};
use crate::trust::TrustManager;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{Span, info, info_span};

/// One API command to send.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub command: String,
    /// JSON object sent as the request body.
    pub payload: Value,
    /// Session id to use instead of the stored one. It replaces the stored id.
    pub sid: Option<String>,
    /// Follow `task-id`/`tasks` in the response until the tasks finish.
    pub wait_for_task: bool,
}

impl ApiRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            payload: Value::Object(Map::new()),
            sid: None,
            wait_for_task: true,
        }
    }

    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn sid(mut self, sid: impl Into<String>) -> Self {
        self.sid = Some(sid.into());
        self
    }

    /// Return the immediate response even when it references a task.
    pub fn no_wait(mut self) -> Self {
        self.wait_for_task = false;
        self
    }
}

/// Successful API response.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse {
    pub data: Value,
    pub status_code: u16,
    pub status_text: String,
}

pub struct ApiClient {
    pub(crate) config: RwLock<ClientConfig>,
    pub(crate) session: RwLock<SessionState>,
    trust: TrustManager,
    transport: Arc<dyn Transport>,
    pub(crate) span: Span,
}

/// Builder for [`ApiClient`] with replaceable transport, prompt and span.
pub struct ApiClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
    prompt: Option<Arc<dyn FingerprintPrompt>>,
    span: Option<Span>,
}

impl ApiClientBuilder {
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn prompt(mut self, prompt: Arc<dyn FingerprintPrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    /// Span that wraps every event of the client.
    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn build(self) -> Result<ApiClient> {
        let config = self.config;

        let configured_fingerprint = config
            .fingerprint
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(Fingerprint::parse)
            .transpose()
            .map_err(|e| ClientError::config_caused("invalid configured fingerprint", e))?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpsTransport::new(config.proxy.clone())?),
        };
        let prompt = self.prompt.unwrap_or_else(|| Arc::new(StdinPrompt));
        let span = self
            .span
            .unwrap_or_else(|| info_span!("mgmt_api", server = %config.server));

        let session = SessionState {
            sid: config.sid.clone().filter(|s| !s.is_empty()),
            configured_fingerprint,
            approved_server: None,
        };
        let store = FingerprintStore::new(config.fingerprints_file.clone());

        Ok(ApiClient {
            config: RwLock::new(config),
            session: RwLock::new(session),
            trust: TrustManager::new(store, prompt),
            transport,
            span,
        })
    }
}

impl ApiClient {
    /// Client with the HTTPS transport and the stdin prompt.
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: ClientConfig) -> ApiClientBuilder {
        ApiClientBuilder {
            config,
            transport: None,
            prompt: None,
            span: None,
        }
    }

    /// Open a session. The returned `sid` is used by every later call.
    pub async fn login(&self, args: &LoginArgs) -> Result<ApiResponse> {
        logged(&self.span, "login", async {
            let payload = args.payload(self.config.read().await.is_web_api());
            self.dispatch("login", &payload, None).await
        })
        .await
    }

    /// Close the session. Pooled connections are released whether or not the call succeeded.
    pub async fn logout(&self) -> Result<ApiResponse> {
        logged(&self.span, "logout", async {
            let result = self.dispatch("logout", &Value::Object(Map::new()), None).await;
            self.transport.release().await;
            if result.is_ok() {
                self.session.write().await.sid = None;
            }
            result
        })
        .await
    }

    /// Publish the changes of the session.
    pub async fn publish(&self) -> Result<ApiResponse> {
        logged(&self.span, "publish", self.call(ApiRequest::new("publish"))).await
    }

    /// Throw away the unpublished changes of the session.
    pub async fn discard(&self) -> Result<ApiResponse> {
        logged(&self.span, "discard", self.call(ApiRequest::new("discard"))).await
    }

    /// Send `command` with `payload` using the stored session id and wait for any task it starts.
    pub async fn api_call(&self, command: &str, payload: Value) -> Result<ApiResponse> {
        logged(
            &self.span,
            "api_call",
            self.call(ApiRequest::new(command).payload(payload)),
        )
        .await
    }

    /// Send one request.
    pub async fn call(&self, request: ApiRequest) -> Result<ApiResponse> {
        let response = self
            .dispatch(&request.command, &request.payload, request.sid.as_deref())
            .await?;

        if !request.wait_for_task || task::is_task_query(&request.command) {
            return Ok(response);
        }
        if let Some(task_id) = response.data.get(task::TASK_ID).and_then(Value::as_str) {
            info!(command = %request.command, task_id, "waiting for task");
            return self.poll_tasks(task::single_task_query(task_id)).await;
        }
        if let Some(tasks) = response.data.get(task::TASKS).and_then(Value::as_array) {
            let ids = task::task_ids(tasks);
            if !ids.is_empty() {
                info!(command = %request.command, tasks = ids.len(), "waiting for tasks");
                return self.poll_tasks(task::batch_task_query(&ids)).await;
            }
        }
        Ok(response)
    }

    /// Single exchange: trust check, request, response. Never waits for tasks.
    pub(crate) async fn dispatch(
        &self,
        command: &str,
        payload: &Value,
        explicit_sid: Option<&str>,
    ) -> Result<ApiResponse> {
        let body = match payload {
            Value::Object(_) => payload.clone(),
            Value::Null => Value::Object(Map::new()),
            _ => {
                return Err(ClientError::config(format!(
                    "payload of {command} must be a JSON object"
                )));
            }
        };

        let config = self.config.read().await.clone();
        let trusted = self
            .trust
            .ensure_trusted(&config, &self.session, self.transport.as_ref())
            .await?;
        if !trusted {
            return Err(ClientError::trust("Fingerprint is not OK."));
        }

        let sid = match explicit_sid {
            Some(sid) => {
                self.session.write().await.sid = Some(sid.to_string());
                Some(sid.to_string())
            }
            None => self.session.read().await.sid.clone(),
        };

        let mut headers = vec![
            ("User-Agent".to_string(), config.user_agent.clone()),
            ("Accept".to_string(), "*/*".to_string()),
            ("Content-Type".to_string(), "application/json".to_string()),
        ];
        if let Some(sid) = sid {
            headers.push((SID_HEADER.to_string(), sid));
        }

        let request = HttpRequest {
            url: config.command_url(command),
            headers,
            body,
        };
        info!(
            parent: &self.span,
            command,
            url = %request.url,
            headers = %redact::headers_for_log(&request.headers),
            payload = %redact::payload_for_log(command, &request.body),
            "sending API request"
        );

        let reply = self.transport.post_json(request).await?;
        if !reply.is_success() {
            return Err(ClientError::status(
                reply.status,
                reply.status_text,
                reply.body,
            ));
        }

        match redact::response_for_log(command, &reply.body) {
            Some(logged) => info!(
                parent: &self.span,
                command,
                status = reply.status,
                response = %logged,
                "received API response"
            ),
            None => info!(
                parent: &self.span,
                command,
                status = reply.status,
                "received API response, content not logged"
            ),
        }

        if redact::carries_sid(command, &reply.body)
            && let Some(sid) = reply.body.get(SID).and_then(Value::as_str)
        {
            self.session.write().await.sid = Some(sid.to_string());
        }

        Ok(ApiResponse {
            data: reply.body,
            status_code: reply.status,
            status_text: reply.status_text,
        })
    }

    /// Snapshot of the current configuration.
    pub async fn config(&self) -> ClientConfig {
        self.config.read().await.clone()
    }

    pub async fn server(&self) -> String {
        self.config.read().await.server.clone()
    }

    /// Point the client at another server. Trust is established again on the next call.
    pub async fn set_server(&self, server: impl Into<String>) {
        let server = server.into();
        let mut config = self.config.write().await;
        if config.server != server {
            info!(parent: &self.span, from = %config.server, to = %server, "server changed");
            config.server = server;
            self.session.write().await.reset_approval();
        }
    }

    pub async fn port(&self) -> u16 {
        self.config.read().await.port
    }

    pub async fn set_port(&self, port: u16) {
        self.config.write().await.port = port;
    }

    pub async fn context(&self) -> String {
        self.config.read().await.context.clone()
    }

    pub async fn set_context(&self, context: impl Into<String>) {
        self.config.write().await.context = context.into();
    }

    pub async fn api_version(&self) -> Option<String> {
        self.config.read().await.api_version.clone()
    }

    pub async fn set_api_version(&self, api_version: Option<String>) {
        self.config.write().await.api_version = api_version;
    }

    pub async fn proxy(&self) -> Option<ProxyConfig> {
        self.config.read().await.proxy.clone()
    }

    /// Fingerprint the current server is expected to present.
    pub async fn fingerprint(&self) -> Option<Fingerprint> {
        self.session.read().await.configured_fingerprint
    }

    /// Pin a fingerprint. The server is verified against it on the next call.
    pub async fn set_fingerprint(&self, fingerprint: &str) -> Result<()> {
        let parsed = Fingerprint::parse(fingerprint)
            .map_err(|e| ClientError::config_caused("invalid fingerprint", e))?;
        let mut session = self.session.write().await;
        session.configured_fingerprint = Some(parsed);
        session.reset_approval();
        Ok(())
    }

    pub async fn sid(&self) -> Option<String> {
        self.session.read().await.sid.clone()
    }

    pub async fn set_sid(&self, sid: Option<String>) {
        self.session.write().await.sid = sid;
    }

    pub async fn is_unsafe(&self) -> bool {
        self.config.read().await.unsafe_mode
    }

    pub async fn set_unsafe(&self, unsafe_mode: bool) {
        self.config.write().await.unsafe_mode = unsafe_mode;
    }

    pub async fn is_unsafe_auto_accept(&self) -> bool {
        self.config.read().await.unsafe_auto_accept
    }

    pub async fn set_unsafe_auto_accept(&self, auto_accept: bool) {
        self.config.write().await.unsafe_auto_accept = auto_accept;
    }

    /// Whether the current server passed verification.
    pub async fn is_fingerprint_approved(&self) -> bool {
        let config = self.config.read().await;
        self.session.read().await.is_approved_for(&config.server)
    }

    pub fn fingerprint_store(&self) -> &FingerprintStore {
        self.trust.store()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::testing::{MockTransport, ScriptedPrompt};
    use crate::transport::HttpReply;
    use serde_json::json;
    use tempfile::TempDir;

    fn unsafe_config() -> ClientConfig {
        let mut config = ClientConfig::new("10.0.0.1");
        config.unsafe_mode = true;
        config.poll_interval_ms = 1;
        config
    }

    fn client_with(config: ClientConfig, transport: Arc<MockTransport>) -> ApiClient {
        ApiClient::builder(config)
            .transport(transport)
            .prompt(Arc::new(ScriptedPrompt::new(false)))
            .build()
            .unwrap()
    }

    fn login_handler(request: &HttpRequest, _seen: usize) -> Result<HttpReply> {
        match request.command() {
            "login" => Ok(HttpReply::ok(json!({"sid": "abc", "uid": "u-1"}))),
            _ => Ok(HttpReply::ok(json!({"name": "h1"}))),
        }
    }

    #[tokio::test]
    async fn test_login_sid_is_sent_on_next_call() {
        let transport = Arc::new(MockTransport::new(login_handler));
        let client = client_with(unsafe_config(), transport.clone());

        client
            .login(&LoginArgs::with_password("admin", "pw"))
            .await
            .unwrap();
        assert_eq!(client.sid().await.as_deref(), Some("abc"));

        client.api_call("show-host", json!({"name": "h1"})).await.unwrap();
        let requests = transport.requests();
        assert_eq!(requests[0].header(SID_HEADER), None);
        assert_eq!(
            requests[0].body,
            json!({"user": "admin", "password": "pw", "continue-last-session": false, "read-only": false})
        );
        assert_eq!(requests[1].header(SID_HEADER), Some("abc"));
        assert_eq!(requests[1].url, "https://10.0.0.1:443/web_api/show-host");
    }

    #[tokio::test]
    async fn test_request_headers() {
        let transport = Arc::new(MockTransport::ok());
        let mut config = unsafe_config();
        config.api_version = Some("1.9".to_string());
        let client = client_with(config, transport.clone());

        client.api_call("show-hosts", Value::Null).await.unwrap();
        let request = &transport.requests()[0];
        assert_eq!(request.url, "https://10.0.0.1:443/web_api/v1.9/show-hosts");
        assert_eq!(request.header("Accept"), Some("*/*"));
        assert_eq!(request.header("Content-Type"), Some("application/json"));
        assert!(request.header("User-Agent").is_some());
        assert_eq!(request.body, json!({}));
    }

    #[tokio::test]
    async fn test_explicit_sid_replaces_stored_sid() {
        let transport = Arc::new(MockTransport::ok());
        let mut config = unsafe_config();
        config.sid = Some("old".to_string());
        let client = client_with(config, transport.clone());

        client
            .call(ApiRequest::new("show-hosts").sid("fresh"))
            .await
            .unwrap();
        client.api_call("show-hosts", json!({})).await.unwrap();

        let requests = transport.requests();
        assert_eq!(requests[0].header(SID_HEADER), Some("fresh"));
        assert_eq!(requests[1].header(SID_HEADER), Some("fresh"));
    }

    #[tokio::test]
    async fn test_declined_fingerprint_sends_nothing() {
        let dir = TempDir::new().unwrap();
        let mut config = ClientConfig::new("10.0.0.1");
        config.fingerprints_file = dir.path().join("fingerprints.json");
        let transport = Arc::new(MockTransport::ok());
        let client = client_with(config, transport.clone());

        let err = client.api_call("show-hosts", json!({})).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Trust);
        assert_eq!(err.message(), "Fingerprint is not OK.");
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_configured_fingerprint_is_used() {
        let transport = Arc::new(MockTransport::ok());
        let mut config = ClientConfig::new("10.0.0.1");
        config.fingerprint = Some(transport.default_fingerprint().to_string().to_lowercase());
        let client = client_with(config, transport.clone());

        client.api_call("show-hosts", json!({})).await.unwrap();
        client.api_call("show-hosts", json!({})).await.unwrap();
        assert_eq!(transport.probes(), 1);
        assert!(client.is_fingerprint_approved().await);
    }

    #[tokio::test]
    async fn test_invalid_configured_fingerprint_is_rejected() {
        let mut config = ClientConfig::new("10.0.0.1");
        config.fingerprint = Some("not-a-fingerprint".to_string());
        let err = ApiClient::builder(config)
            .transport(Arc::new(MockTransport::ok()))
            .build()
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[tokio::test]
    async fn test_server_change_reprobes() {
        let dir = TempDir::new().unwrap();
        let mut config = ClientConfig::new("10.0.0.1");
        config.fingerprints_file = dir.path().join("fingerprints.json");
        config.unsafe_auto_accept = true;
        let transport = Arc::new(MockTransport::ok());
        let client = client_with(config, transport.clone());

        client.api_call("show-hosts", json!({})).await.unwrap();
        client.api_call("show-hosts", json!({})).await.unwrap();
        assert_eq!(transport.probes(), 1);

        client.set_server("10.0.0.1").await;
        client.api_call("show-hosts", json!({})).await.unwrap();
        assert_eq!(transport.probes(), 1);

        client.set_server("10.0.0.2").await;
        assert!(!client.is_fingerprint_approved().await);
        client.api_call("show-hosts", json!({})).await.unwrap();
        assert_eq!(transport.probes(), 2);
        assert_eq!(transport.requests()[3].url, "https://10.0.0.2:443/web_api/show-hosts");
    }

    #[tokio::test]
    async fn test_server_change_during_first_contact_checks_new_server() {
        let dir = TempDir::new().unwrap();
        let mut config = ClientConfig::new("10.0.0.1");
        config.fingerprints_file = dir.path().join("fingerprints.json");
        config.unsafe_auto_accept = true;
        let transport = Arc::new(MockTransport::ok());
        let client = client_with(config, transport.clone());

        let (first, ()) = tokio::join!(
            client.api_call("show-hosts", json!({})),
            client.set_server("10.0.0.2")
        );
        first.unwrap();
        assert_eq!(client.server().await, "10.0.0.2");
        assert!(!client.is_fingerprint_approved().await);

        client.api_call("show-hosts", json!({})).await.unwrap();
        assert_eq!(transport.probes(), 2);
        assert!(client.is_fingerprint_approved().await);
        let requests = transport.requests();
        assert_eq!(requests[0].url, "https://10.0.0.1:443/web_api/show-hosts");
        assert_eq!(requests[1].url, "https://10.0.0.2:443/web_api/show-hosts");
        assert!(client.fingerprint_store().lookup("10.0.0.2").await.is_some());
    }

    #[tokio::test]
    async fn test_http_error_is_status_error() {
        let transport = Arc::new(MockTransport::new(|_, _| {
            Ok(HttpReply {
                status: 400,
                status_text: "Bad Request".to_string(),
                body: json!({"code": "generic_err_invalid_parameter", "message": "Missing parameter: [name]"}),
            })
        }));
        let client = client_with(unsafe_config(), transport);

        let err = client.api_call("add-host", json!({})).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Status);
        assert_eq!(err.status_code(), Some(400));
        assert_eq!(err.message(), "Missing parameter: [name]");
    }

    #[tokio::test]
    async fn test_non_object_payload_is_rejected() {
        let transport = Arc::new(MockTransport::ok());
        let client = client_with(unsafe_config(), transport.clone());

        let err = client.api_call("add-host", json!(["h1"])).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_logout_releases_on_failure() {
        let transport = Arc::new(MockTransport::new(|request, _| {
            Err(crate::testing::network_error(request.command()))
        }));
        let client = client_with(unsafe_config(), transport.clone());

        assert!(client.logout().await.is_err());
        assert!(transport.released());
    }

    #[tokio::test]
    async fn test_logout_forgets_sid() {
        let transport = Arc::new(MockTransport::ok());
        let mut config = unsafe_config();
        config.sid = Some("abc".to_string());
        let client = client_with(config, transport.clone());

        client.logout().await.unwrap();
        assert_eq!(transport.requests()[0].header(SID_HEADER), Some("abc"));
        assert_eq!(client.sid().await, None);
        assert!(transport.released());
    }

    #[tokio::test]
    async fn test_task_reference_is_followed() {
        let transport = Arc::new(MockTransport::new(|request, seen| {
            match (request.command(), seen) {
                ("publish", _) => Ok(HttpReply::ok(json!({"task-id": "t1"}))),
                ("show-task", 0) => Ok(HttpReply::ok(
                    json!({"tasks": [{"task-id": "t1", "status": "in progress"}]}),
                )),
                _ => Ok(HttpReply::ok(
                    json!({"tasks": [{"task-id": "t1", "status": "succeeded"}]}),
                )),
            }
        }));
        let client = client_with(unsafe_config(), transport.clone());

        let response = client.publish().await.unwrap();
        assert_eq!(response.data["tasks"][0]["status"], "succeeded");
        assert_eq!(transport.commands(), ["publish", "show-task", "show-task"]);
        assert_eq!(
            transport.requests()[1].body,
            json!({"task-id": "t1", "details-level": "full"})
        );
    }

    #[tokio::test]
    async fn test_no_wait_returns_task_reference() {
        let transport = Arc::new(MockTransport::new(|_, _| {
            Ok(HttpReply::ok(json!({"task-id": "t1"})))
        }));
        let client = client_with(unsafe_config(), transport.clone());

        let response = client
            .call(ApiRequest::new("install-policy").no_wait())
            .await
            .unwrap();
        assert_eq!(response.data, json!({"task-id": "t1"}));
        assert_eq!(transport.commands(), ["install-policy"]);
    }

    #[tokio::test]
    async fn test_show_task_is_not_followed() {
        let transport = Arc::new(MockTransport::new(|_, _| {
            Ok(HttpReply::ok(json!({"tasks": [{"task-id": "t1", "status": "in progress"}]})))
        }));
        let client = client_with(unsafe_config(), transport.clone());

        client
            .api_call("show-task", json!({"task-id": "t1"}))
            .await
            .unwrap();
        assert_eq!(transport.commands(), ["show-task"]);
    }

    #[tokio::test]
    async fn test_setters() {
        let client = client_with(unsafe_config(), Arc::new(MockTransport::ok()));
        client.set_port(4434).await;
        client.set_context("gaia_api").await;
        client.set_api_version(Some("1.7".to_string())).await;
        client.set_unsafe(false).await;
        client.set_unsafe_auto_accept(true).await;
        client.set_sid(Some("s1".to_string())).await;

        let config = client.config().await;
        assert_eq!(
            config.command_url("show-hostname"),
            "https://10.0.0.1:4434/gaia_api/v1.7/show-hostname"
        );
        assert!(!client.is_unsafe().await);
        assert!(client.is_unsafe_auto_accept().await);
        assert_eq!(client.sid().await.as_deref(), Some("s1"));

        assert!(client.set_fingerprint("zz").await.is_err());
        client.set_fingerprint(&"ab".repeat(32)).await.unwrap();
        assert_eq!(client.fingerprint().await, Some(Fingerprint::from_bytes([0xAB; 32])));
    }
}
