use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

// ── Machine types ────────────────────────────────────────────────────

/// A machine as reported by `GET /backends/{index}/machines`.
#[derive(Debug, Clone, Deserialize)]
pub struct MachineItem {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "one_or_many")]
    pub public_ips: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub private_ips: Vec<String>,
    #[serde(default, deserialize_with = "image_name")]
    pub image: Option<String>,
    #[serde(default)]
    pub extra: Map<String, Value>,
    #[serde(default)]
    pub backend: Option<BackendInfo>,
    #[serde(default)]
    pub state: MachineState,
}

impl MachineItem {
    /// Provider slug carried in `backend.provider`, if the server sent one.
    pub fn provider(&self) -> Option<&str> {
        self.backend.as_ref().and_then(|b| b.provider.as_deref())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackendInfo {
    #[serde(default)]
    pub provider: Option<String>,
}

/// Machine lifecycle state.
///
/// Older servers send the numeric node state code instead of a string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineState {
    Running,
    Rebooting,
    Terminated,
    Pending,
    Stopped,
    #[default]
    Unknown,
}

impl MachineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Rebooting => "rebooting",
            Self::Terminated => "terminated",
            Self::Pending => "pending",
            Self::Stopped => "stopped",
            Self::Unknown => "unknown",
        }
    }

    pub fn parse(state: &str) -> Self {
        match state.to_ascii_lowercase().as_str() {
            "running" => Self::Running,
            "rebooting" => Self::Rebooting,
            "terminated" => Self::Terminated,
            "pending" => Self::Pending,
            "stopped" => Self::Stopped,
            _ => Self::Unknown,
        }
    }

    pub fn from_code(code: u64) -> Self {
        match code {
            0 => Self::Running,
            1 => Self::Rebooting,
            2 => Self::Terminated,
            3 => Self::Pending,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MachineState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::Number(n) => n.as_u64().map_or(Self::Unknown, Self::from_code),
            Value::String(s) => Self::parse(&s),
            _ => Self::Unknown,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CreateMachineRequest {
    pub name: String,
    pub location: Option<String>,
    pub image: String,
    pub size: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cloud_init: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(skip_serializing_if = "is_false")]
    pub monitoring: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub associate_floating_ip: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker_command: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub docker_env: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub docker_exposed_ports: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub azure_port_bindings: Vec<String>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

// ── Lenient field decoding ───────────────────────────────────────────

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

/// Addresses arrive either as a list or as a single string.
fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) if s.is_empty() => Vec::new(),
        Value::String(s) => vec![s],
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) if !s.is_empty() => Some(s),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    })
}

/// `image` is either `{"name": ..}` or a bare image id.
fn image_name<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Object(map) => ["name", "id"]
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_str).map(str::to_string)),
        _ => None,
    })
}

/// Interpret a `machine_has_key` response. The endpoint has answered with
/// bare booleans, strings, numbers and `{"has_key": ..}` objects over time.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"),
        Value::Object(map) => map.get("has_key").is_some_and(truthy),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_machine_item_lenient_fields() {
        let item: MachineItem = serde_json::from_value(json!({
            "id": 4711,
            "name": "db-1",
            "public_ips": "203.0.113.7",
            "private_ips": ["10.0.0.7", null, ""],
            "image": {"name": "ubuntu-22.04"},
            "extra": {"dns_name": "db-1.example.com", "cores": 2},
            "backend": {"provider": "linode"},
            "state": 3
        }))
        .unwrap();

        assert_eq!(item.id, "4711");
        assert_eq!(item.public_ips, vec!["203.0.113.7"]);
        assert_eq!(item.private_ips, vec!["10.0.0.7"]);
        assert_eq!(item.image.as_deref(), Some("ubuntu-22.04"));
        assert_eq!(item.provider(), Some("linode"));
        assert_eq!(item.state, MachineState::Pending);
        assert_eq!(item.extra["cores"], json!(2));
    }

    #[test]
    fn test_machine_item_minimal() {
        let item: MachineItem =
            serde_json::from_value(json!({"id": "i-1", "image": "ami-123", "state": "Stopped"}))
                .unwrap();

        assert!(item.name.is_empty());
        assert!(item.public_ips.is_empty());
        assert_eq!(item.image.as_deref(), Some("ami-123"));
        assert_eq!(item.provider(), None);
        assert_eq!(item.state, MachineState::Stopped);
    }

    #[test]
    fn test_unrecognised_state_is_unknown() {
        let item: MachineItem =
            serde_json::from_value(json!({"id": "x", "state": "hibernating"})).unwrap();
        assert_eq!(item.state, MachineState::Unknown);
    }

    #[test]
    fn test_truthy() {
        assert!(truthy(&json!(true)));
        assert!(truthy(&json!("true")));
        assert!(truthy(&json!(1)));
        assert!(truthy(&json!({"has_key": "yes"})));
        assert!(!truthy(&json!(false)));
        assert!(!truthy(&json!("false")));
        assert!(!truthy(&json!(0)));
        assert!(!truthy(&json!(null)));
    }

    #[test]
    fn test_create_request_omits_unset_extensions() {
        let req = CreateMachineRequest {
            name: "web".into(),
            location: Some("us-east-1a".into()),
            image: "ami-1".into(),
            size: "t2.micro".into(),
            ..Default::default()
        };

        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({"name": "web", "location": "us-east-1a", "image": "ami-1", "size": "t2.micro"})
        );
    }
}
