use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Network whose first address is reported as the server's IP.
pub const PUBLIC_NETWORK: &str = "public1";

// ── SSH key types ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SshKey {
    pub name: String,
    pub public_key: String,
}

// ── Server types ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecurityGroup {
    pub name: String,
}

/// Body of `POST /servers`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateServerRequest {
    #[serde(rename = "image_id")]
    pub image: String,
    #[serde(rename = "flavor_id")]
    pub flavor: String,
    #[serde(rename = "key_name")]
    pub ssh_key_name: String,
    pub name: String,
    #[serde(rename = "network_id")]
    pub network: String,
    pub security_groups: Vec<SecurityGroup>,
    /// Attach the key named by `ssh_key_name` to the server.
    #[serde(rename = "ssh_key")]
    pub attach_ssh_key: bool,
    pub count: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CreateServerResponse {
    pub data: CreatedServer,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CreatedServer {
    pub id: String,
}

/// Projection of a server as reported by `GET /servers/{id}`.
///
/// Fields missing from the response are left empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Server {
    pub id: String,
    pub ip_address: String,
    pub name: String,
    pub status: String,
}

impl Server {
    /// Project a `GET /servers/{id}` body onto a `Server`.
    ///
    /// Each field is read by path on its own. A path that is missing or has
    /// an unexpected shape yields an empty string instead of failing.
    pub fn from_body(body: &Value) -> Self {
        let public_addr = format!("/data/addresses/{PUBLIC_NETWORK}/0/addr");
        Self {
            id: text_at(body, "/data/id"),
            ip_address: text_at(body, &public_addr),
            name: text_at(body, "/data/name"),
            status: text_at(body, "/data/status"),
        }
    }
}

/// Scalar at `pointer` rendered as text. Strings come back unquoted.
fn text_at(body: &Value, pointer: &str) -> String {
    match body.pointer(pointer) {
        Some(Value::String(s)) => s.clone(),
        Some(v @ (Value::Number(_) | Value::Bool(_))) => v.to_string(),
        _ => String::new(),
    }
}
