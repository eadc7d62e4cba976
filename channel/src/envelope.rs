use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wire format of every channel message: `{"type": "...", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn parse(body: &str) -> serde_json::Result<Self> {
        serde_json::from_str(body)
    }

    pub fn to_body(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn uses_type_as_discriminator() {
        let envelope = Envelope::parse(r#"{"type":"Ping","data":{"n":1}}"#).unwrap();
        assert_eq!(envelope.kind, "Ping");
        assert_eq!(envelope.data, json!({"n": 1}));
    }

    #[test]
    fn data_is_optional() {
        let envelope = Envelope::parse(r#"{"type":"Ping"}"#).unwrap();
        assert_eq!(envelope.data, Value::Null);
    }

    #[test]
    fn rejects_missing_type() {
        assert!(Envelope::parse(r#"{"data":{}}"#).is_err());
        assert!(Envelope::parse("not json").is_err());
    }
}
