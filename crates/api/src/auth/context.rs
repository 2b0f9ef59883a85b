//! Client metadata carried alongside session operations.

use serde_json::Value;

/// Where a request came from.
///
/// Recorded on refresh-token rows at issuance and on every audit event. All
/// fields are optional; background jobs run with [`RequestContext::system`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub request_path: Option<String>,
    pub request_method: Option<String>,
    /// Opaque structured device metadata supplied by the client.
    pub device_info: Option<Value>,
}

impl RequestContext {
    /// Context for work not triggered by a client request.
    pub fn system() -> Self {
        Self {
            user_agent: Some("haven-janitor".into()),
            ..Self::default()
        }
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_device_info(mut self, device_info: Value) -> Self {
        self.device_info = Some(device_info);
        self
    }
}
