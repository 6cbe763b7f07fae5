use std::collections::HashMap;

/// Normalized request handed in by the HTTP layer.
///
/// The defense core never touches framework types; middlewares build one
/// of these per inbound request. Header names are stored lowercased so
/// lookups are case-insensitive.
#[derive(Debug, Clone, Default)]
pub struct ClientRequest {
    /// Transport-level peer address, if known.
    pub peer_addr: Option<String>,
    headers: HashMap<String, String>,
    pub path: String,
    pub method: String,
    /// Parsed JSON body, when the HTTP layer has one available.
    pub body: Option<serde_json::Value>,
    /// Authenticated user, when upstream auth middleware resolved one.
    pub user_id: Option<String>,
}

impl ClientRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_peer_addr(mut self, addr: impl Into<String>) -> Self {
        self.peer_addr = Some(addr.into());
        self
    }

    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.insert_header(name, value);
        self
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn insert_header(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.header("user-agent")
    }
}
