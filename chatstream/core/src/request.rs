//! Request Building
//!
//! Turns a logical turn operation plus resolved credentials into a fully
//! specified HTTP request. Pure: no I/O, and identical inputs give identical
//! descriptors (the correlation id lives in the [`AuthContext`]).
//!
//! Optional body fields are omitted entirely when absent or empty. The
//! server treats the body as a partial update of the session's stored turn
//! configuration, so only included keys are touched.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::credentials::AuthContext;

/// Agent chat endpoint
pub const AGENT_CHAT_ENDPOINT: &str = "/api/v1/agent-chat";
/// Knowledge-base chat endpoint
pub const KNOWLEDGE_CHAT_ENDPOINT: &str = "/api/v1/knowledge-chat";

/// Correlation header
pub const REQUEST_ID_HEADER: &str = "X-Request-ID";
/// Cross-tenant header
pub const TENANT_ID_HEADER: &str = "X-Tenant-ID";

/// HTTP method of a turn request
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    /// Resume the stream of an existing message
    Get,
    /// Submit a new query
    #[default]
    Post,
}

impl Method {
    /// Method name as sent on the wire
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logical operation to build a request for
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnOp {
    /// Open the event stream of a turn
    StartTurn,
    /// Ask the server to stop generating a message
    StopTurn,
}

/// One chat turn, constructed once per turn
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRequest {
    /// HTTP method (fixed per call site)
    pub method: Method,
    /// Endpoint path, e.g. [`AGENT_CHAT_ENDPOINT`]
    pub endpoint: String,
    /// Chat session id
    pub session_id: String,
    /// User query; the message id for GET requests
    pub query: String,
    /// Knowledge bases to search
    pub knowledge_base_ids: Option<Vec<String>>,
    /// Agent mode (defaults to enabled)
    pub agent_enabled: Option<bool>,
    /// Web search toggle
    pub web_search_enabled: Option<bool>,
    /// Model used for summarising (non-agent mode)
    pub summary_model_id: Option<String>,
    /// MCP services available to the agent
    pub mcp_service_ids: Option<Vec<String>>,
}

impl StreamRequest {
    /// A POST turn submitting `query` to `endpoint`
    pub fn post(
        endpoint: impl Into<String>,
        session_id: impl Into<String>,
        query: impl Into<String>,
    ) -> Self {
        Self {
            method: Method::Post,
            endpoint: endpoint.into(),
            session_id: session_id.into(),
            query: query.into(),
            ..Default::default()
        }
    }

    /// A GET turn resuming the stream of `message_id`
    pub fn resume(
        endpoint: impl Into<String>,
        session_id: impl Into<String>,
        message_id: impl Into<String>,
    ) -> Self {
        Self {
            method: Method::Get,
            endpoint: endpoint.into(),
            session_id: session_id.into(),
            query: message_id.into(),
            ..Default::default()
        }
    }

    /// Set knowledge bases
    #[must_use]
    pub fn with_knowledge_bases(mut self, ids: Vec<String>) -> Self {
        self.knowledge_base_ids = Some(ids);
        self
    }

    /// Set agent mode
    #[must_use]
    pub fn with_agent(mut self, enabled: bool) -> Self {
        self.agent_enabled = Some(enabled);
        self
    }

    /// Set web search
    #[must_use]
    pub fn with_web_search(mut self, enabled: bool) -> Self {
        self.web_search_enabled = Some(enabled);
        self
    }

    /// Set summary model
    #[must_use]
    pub fn with_summary_model(mut self, model_id: impl Into<String>) -> Self {
        self.summary_model_id = Some(model_id.into());
        self
    }

    /// Set MCP services
    #[must_use]
    pub fn with_mcp_services(mut self, ids: Vec<String>) -> Self {
        self.mcp_service_ids = Some(ids);
        self
    }
}

/// A fully specified HTTP request
#[derive(Clone, Debug, PartialEq)]
pub struct RequestDescriptor {
    /// HTTP method
    pub method: Method,
    /// Absolute URL, or a path when the client is co-hosted with the server
    pub url: String,
    /// Headers in insertion order
    pub headers: Vec<(String, String)>,
    /// JSON body, absent for GET
    pub body: Option<serde_json::Value>,
}

impl RequestDescriptor {
    /// First value of a header, matched case-insensitively
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Number of headers named `name`
    #[must_use]
    pub fn header_count(&self, name: &str) -> usize {
        self.headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .count()
    }
}

/// Builds [`RequestDescriptor`]s against a base URL
#[derive(Clone, Debug, Default)]
pub struct RequestBuilder {
    base: String,
}

impl RequestBuilder {
    /// Create a builder; `base` is empty for co-hosted deployments
    pub fn new(base: impl Into<String>) -> Self {
        let mut base = base.into();
        while base.ends_with('/') {
            base.pop();
        }
        Self { base }
    }

    /// Base URL prefixed to every path
    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Build the request for `op`
    #[must_use]
    pub fn build(&self, op: TurnOp, req: &StreamRequest, auth: &AuthContext) -> RequestDescriptor {
        let (method, url, body) = match op {
            TurnOp::StartTurn => match req.method {
                Method::Post => (
                    Method::Post,
                    format!("{}{}/{}", self.base, req.endpoint, req.session_id),
                    Some(turn_body(req)),
                ),
                Method::Get => (
                    Method::Get,
                    format!(
                        "{}{}/{}?message_id={}",
                        self.base, req.endpoint, req.session_id, req.query
                    ),
                    None,
                ),
            },
            TurnOp::StopTurn => (
                Method::Post,
                format!("{}/api/v1/sessions/{}/stop", self.base, req.session_id),
                Some(serde_json::json!({ "message_id": req.query })),
            ),
        };

        RequestDescriptor {
            method,
            url,
            headers: headers(auth),
            body,
        }
    }
}

fn headers(auth: &AuthContext) -> Vec<(String, String)> {
    let mut headers = vec![
        ("Content-Type".to_string(), "application/json".to_string()),
        (
            "Authorization".to_string(),
            format!("Bearer {}", auth.bearer_token),
        ),
        (REQUEST_ID_HEADER.to_string(), auth.request_id.to_string()),
    ];
    if let Some(ref tenant) = auth.tenant_override {
        headers.push((TENANT_ID_HEADER.to_string(), tenant.clone()));
    }
    headers
}

fn turn_body(req: &StreamRequest) -> serde_json::Value {
    let mut body = serde_json::Map::new();
    body.insert("query".into(), req.query.clone().into());
    body.insert("agent_enabled".into(), req.agent_enabled.unwrap_or(true).into());

    if let Some(ids) = req.knowledge_base_ids.as_ref().filter(|ids| !ids.is_empty()) {
        body.insert("knowledge_base_ids".into(), ids.clone().into());
    }
    if let Some(enabled) = req.web_search_enabled {
        body.insert("web_search_enabled".into(), enabled.into());
    }
    if let Some(model) = req.summary_model_id.as_ref().filter(|m| !m.is_empty()) {
        body.insert("summary_model_id".into(), model.clone().into());
    }
    if let Some(ids) = req.mcp_service_ids.as_ref().filter(|ids| !ids.is_empty()) {
        body.insert("mcp_service_ids".into(), ids.clone().into());
    }

    serde_json::Value::Object(body)
}
