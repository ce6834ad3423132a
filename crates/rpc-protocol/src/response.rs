//! RPC response envelope.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{DecodeError, EncodeError, FieldError};
use crate::fields;
use crate::{STATUS_BAD_REQUEST, STATUS_OK};

/// Field names owned by the envelope itself.
const RESERVED_FIELDS: [&str; 2] = ["status", "message"];

/// RPC response envelope.
///
/// Wire shape: `{"status": int, "message"?: string, <field>: <value>, ...}`.
/// Result fields sit beside `status` at the top level. A payload without
/// `status` is malformed and fails to decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// HTTP-style status code (200 = success, 4xx = request error).
    pub status: i32,

    /// Human-readable explanation, present on non-success paths.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Result fields, populated on success. Never holds `status` or
    /// `message`; only `put_value` inserts.
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl Response {
    /// Create an empty response with the given status.
    pub fn new(status: i32) -> Self {
        Self {
            status,
            message: None,
            fields: Map::new(),
        }
    }

    /// Create an empty 200 response.
    pub fn ok() -> Self {
        Self::new(STATUS_OK)
    }

    /// Create a 400 response carrying `message`.
    pub fn bad_request(message: impl Into<String>) -> Self {
        let mut response = Self::new(STATUS_BAD_REQUEST);
        response.put_message(message);
        response
    }

    /// Whether the status indicates success.
    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }

    pub fn get_code(&self) -> i32 {
        self.status
    }

    pub fn get_message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn put_message(&mut self, message: impl Into<String>) -> &mut Self {
        self.message = Some(message.into());
        self
    }

    /// Insert a result field. `status` and `message` are rejected.
    pub fn put_value(&mut self, name: impl Into<String>, value: Value) -> Result<&mut Self, FieldError> {
        let name = name.into();
        if RESERVED_FIELDS.contains(&name.as_str()) {
            return Err(FieldError::Reserved { field: name });
        }
        self.fields.insert(name, value);
        Ok(self)
    }

    pub fn put_string(&mut self, name: impl Into<String>, value: impl Into<String>) -> Result<&mut Self, FieldError> {
        self.put_value(name, Value::String(value.into()))
    }

    pub fn put_integer(&mut self, name: impl Into<String>, value: i64) -> Result<&mut Self, FieldError> {
        self.put_value(name, Value::from(value))
    }

    pub fn put_boolean(&mut self, name: impl Into<String>, value: bool) -> Result<&mut Self, FieldError> {
        self.put_value(name, Value::Bool(value))
    }

    /// All result fields.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn get_value(&self, name: &str) -> Result<&Value, FieldError> {
        fields::get_value(Some(&self.fields), name)
    }

    pub fn get_string(&self, name: &str) -> Result<&str, FieldError> {
        fields::get_string(Some(&self.fields), name)
    }

    pub fn get_integer(&self, name: &str) -> Result<i64, FieldError> {
        fields::get_integer(Some(&self.fields), name)
    }

    pub fn get_boolean(&self, name: &str) -> Result<bool, FieldError> {
        fields::get_boolean(Some(&self.fields), name)
    }

    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
