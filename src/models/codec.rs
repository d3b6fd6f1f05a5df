//! Decode/encode entry points between raw JSON and the typed records.
//!
//! Decoding goes through `serde_path_to_error` so a failure names the endpoint and
//! the JSON path of the offending field. A record either decodes completely or not
//! at all.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{endpoint}: cannot decode `{path}`: {message}")]
pub struct DecodeError {
    pub endpoint: String,
    /// Dotted JSON path, `.` for the document root.
    pub path: String,
    pub message: String,
}

pub fn decode<T: DeserializeOwned>(endpoint: &str, value: &Value) -> Result<T, DecodeError> {
    serde_path_to_error::deserialize(value).map_err(|e| DecodeError {
        endpoint: endpoint.to_string(),
        path: e.path().to_string(),
        message: e.inner().to_string(),
    })
}

/// Parse a response body into a JSON document.
pub fn parse(endpoint: &str, body: &[u8]) -> Result<Value, DecodeError> {
    let de = &mut serde_json::Deserializer::from_slice(body);
    serde_path_to_error::deserialize(de).map_err(|e| DecodeError {
        endpoint: endpoint.to_string(),
        path: e.path().to_string(),
        message: e.inner().to_string(),
    })
}

pub fn encode<T: Serialize>(value: &T) -> Result<Value, serde_json::Error> {
    serde_json::to_value(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::voltalis::{ProgrammationMode, SchedulerList};
    use serde_json::json;

    #[test]
    fn decode_error_names_endpoint_and_nested_path() {
        let raw = json!({"schedulerList": [{
            "id": 1,
            "name": "Nuit",
            "isActive": "yes",
            "isException": false,
            "data": [],
            "dayOfWeek": []
        }]});
        let err = decode::<SchedulerList>("getSchedulerList", &raw).unwrap_err();
        assert_eq!(err.endpoint, "getSchedulerList");
        assert_eq!(err.path, "schedulerList[0].isActive");
        assert!(err.to_string().starts_with("getSchedulerList: cannot decode `schedulerList[0].isActive`"));
    }

    #[test]
    fn missing_required_field_fails_the_whole_record() {
        let raw = json!({"id": 3, "name": "Eco", "type": 0, "group": [], "targets": []});
        let err = decode::<ProgrammationMode>("getModeList", &raw).unwrap_err();
        assert!(err.message.contains("color"), "{err}");
    }

    #[test]
    fn parse_reports_syntax_errors() {
        assert_eq!(parse("login", br#"{"a": 1}"#).unwrap(), json!({"a": 1}));
        let err = parse("login", b"<html>").unwrap_err();
        assert_eq!(err.endpoint, "login");
    }
}
