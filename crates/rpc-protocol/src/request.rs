//! RPC request envelope.

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{DecodeError, EncodeError, FieldError};
use crate::fields;

/// RPC request envelope.
///
/// Wire shape: `{"function": string, "args": {<name>: <value>, ...}}`.
/// Unknown top-level fields are ignored on decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Name of the operation to invoke.
    #[serde(default)]
    pub function: String,

    /// Named arguments.
    ///
    /// `None` only for decoded requests whose `args` were absent or null;
    /// the dispatcher rejects those. Requests built with [`Request::new`]
    /// always carry a map.
    #[serde(default, serialize_with = "serialize_args")]
    pub args: Option<Map<String, Value>>,
}

fn serialize_args<S: Serializer>(
    args: &Option<Map<String, Value>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match args {
        Some(map) => map.serialize(serializer),
        None => Map::new().serialize(serializer),
    }
}

impl Request {
    /// Create a request for `function` with no arguments.
    pub fn new(function: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            args: Some(Map::new()),
        }
    }

    /// Create a request with a prepared argument map.
    pub fn with_args(function: impl Into<String>, args: Map<String, Value>) -> Self {
        Self {
            function: function.into(),
            args: Some(args),
        }
    }

    fn args_mut(&mut self) -> &mut Map<String, Value> {
        self.args.get_or_insert_with(Map::new)
    }

    pub fn put_string(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.args_mut().insert(name.into(), Value::String(value.into()));
        self
    }

    pub fn put_integer(&mut self, name: impl Into<String>, value: i64) -> &mut Self {
        self.args_mut().insert(name.into(), Value::from(value));
        self
    }

    pub fn put_boolean(&mut self, name: impl Into<String>, value: bool) -> &mut Self {
        self.args_mut().insert(name.into(), Value::Bool(value));
        self
    }

    /// Insert a structured (or any other) value.
    pub fn put_value(&mut self, name: impl Into<String>, value: Value) -> &mut Self {
        self.args_mut().insert(name.into(), value);
        self
    }

    pub fn get_value(&self, name: &str) -> Result<&Value, FieldError> {
        fields::get_value(self.args.as_ref(), name)
    }

    pub fn get_string(&self, name: &str) -> Result<&str, FieldError> {
        fields::get_string(self.args.as_ref(), name)
    }

    pub fn get_integer(&self, name: &str) -> Result<i64, FieldError> {
        fields::get_integer(self.args.as_ref(), name)
    }

    pub fn get_boolean(&self, name: &str) -> Result<bool, FieldError> {
        fields::get_boolean(self.args.as_ref(), name)
    }

    /// Encode for publishing. Fails if no function is set.
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        if self.function.is_empty() {
            return Err(EncodeError::EmptyFunction);
        }
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode a received payload.
    ///
    /// Structural checks (missing args, empty function) are left to the
    /// dispatcher so it can answer with a precise message.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        // The derived visitor would also accept a JSON array.
        let value: Value = serde_json::from_slice(bytes)?;
        if !value.is_object() {
            return Err(DecodeError::NotAnObject);
        }
        Ok(serde_json::from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_encoding() {
        let mut request = Request::new("calculator");
        request
            .put_string("operation", "add")
            .put_integer("param1", 2)
            .put_integer("param2", 40);

        let value: Value = serde_json::from_slice(&request.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "function": "calculator",
                "args": {"operation": "add", "param1": 2, "param2": 40}
            })
        );
    }

    #[test]
    fn test_empty_function_is_not_encoded() {
        let request = Request::new("");
        assert!(matches!(request.encode(), Err(EncodeError::EmptyFunction)));
    }

    #[test]
    fn test_missing_args_decodes_as_none() {
        let request = Request::decode(br#"{"function": "quit"}"#).unwrap();
        assert_eq!(request.function, "quit");
        assert!(request.args.is_none());

        let request = Request::decode(br#"{"function": "quit", "args": null}"#).unwrap();
        assert!(request.args.is_none());
    }

    #[test]
    fn test_empty_args_are_present() {
        let request = Request::decode(br#"{"function": "quit", "args": {}}"#).unwrap();
        assert_eq!(request.args, Some(Map::new()));
        assert!(matches!(request.get_boolean("quit"), Err(FieldError::Missing { .. })));
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let request = Request::decode(
            br#"{"function": "quit", "args": {"quit": true}, "trace": {"id": 7}}"#,
        )
        .unwrap();
        assert!(request.get_boolean("quit").unwrap());
    }

    #[test]
    fn test_invalid_payloads() {
        assert!(Request::decode(b"").is_err());
        assert!(Request::decode(b"not json").is_err());
        assert!(Request::decode(br#"{"function": 12, "args": {}}"#).is_err());
        assert!(Request::decode(br#"{"function": "quit", "args": [1, 2]}"#).is_err());
        assert!(matches!(Request::decode(br#"[]"#), Err(DecodeError::NotAnObject)));
        assert!(matches!(Request::decode(br#"["quit", {}]"#), Err(DecodeError::NotAnObject)));
        assert!(matches!(Request::decode(b"null"), Err(DecodeError::NotAnObject)));
    }

    #[test]
    fn test_strict_decoding() {
        assert!(Request::decode(br#"{"function": null, "args": {}}"#).is_err());
        assert!(Request::decode(br#"{"function": "quit", "args": {}} {"function": "quit"}"#).is_err());
        assert!(Request::decode(br#"{"function": "quit", "args": {}}trailing"#).is_err());
        assert!(Request::decode(b"{\"function\": \"qu\xffit\", \"args\": {}}").is_err());
        let request = Request::decode(b" {\"function\": \"quit\", \"args\": {}}\n").unwrap();
        assert_eq!(request.function, "quit");
    }

    #[test]
    fn test_nested_value_argument() {
        let mut request = Request::new("getPages");
        request.put_value("filter", json!({"year": 1920, "tags": ["war"]}));
        let decoded = Request::decode(&request.encode().unwrap()).unwrap();
        assert_eq!(decoded.get_value("filter").unwrap()["year"], 1920);
        assert!(matches!(decoded.get_string("filter"), Err(FieldError::WrongType { .. })));
    }
}
