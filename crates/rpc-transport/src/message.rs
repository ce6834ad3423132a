//! Transport-level message and its metadata.

/// Metadata carried beside the payload.
///
/// Correlation for request/response lives here, never in the payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    /// Opaque token binding a request to its reply.
    pub correlation_data: Option<Vec<u8>>,
    /// Topic the receiver should publish its reply to.
    pub response_topic: Option<String>,
}

/// A published message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub payload: Vec<u8>,
    pub properties: Properties,
}

impl Message {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            properties: Properties::default(),
        }
    }

    pub fn with_correlation_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.properties.correlation_data = Some(data.into());
        self
    }

    pub fn with_response_topic(mut self, topic: impl Into<String>) -> Self {
        self.properties.response_topic = Some(topic.into());
        self
    }

    /// Non-empty correlation data, if any.
    pub fn correlation_data(&self) -> Option<&[u8]> {
        self.properties
            .correlation_data
            .as_deref()
            .filter(|data| !data.is_empty())
    }

    /// Non-empty response topic, if any.
    pub fn response_topic(&self) -> Option<&str> {
        self.properties
            .response_topic
            .as_deref()
            .filter(|topic| !topic.is_empty())
    }
}
