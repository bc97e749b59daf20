use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{
    data::{Bar, QuoteTick, TradeTick},
    identifiers::ClientId,
    instrument::Instrument,
};

/// The kind of a message moving through the system.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    String,
    Command,
    Document,
    Event,
    Request,
    Response,
}

/// Returns the canonical upper-snake name for a message kind.
pub fn message_kind_to_str(kind: MessageKind) -> &'static str {
    match kind {
        MessageKind::String => "STRING",
        MessageKind::Command => "COMMAND",
        MessageKind::Document => "DOCUMENT",
        MessageKind::Event => "EVENT",
        MessageKind::Request => "REQUEST",
        MessageKind::Response => "RESPONSE",
    }
}

/// Parses a message kind from its canonical upper-snake name.
pub fn message_kind_from_str(value: &str) -> Option<MessageKind> {
    match value {
        "STRING" => Some(MessageKind::String),
        "COMMAND" => Some(MessageKind::Command),
        "DOCUMENT" => Some(MessageKind::Document),
        "EVENT" => Some(MessageKind::Event),
        "REQUEST" => Some(MessageKind::Request),
        "RESPONSE" => Some(MessageKind::Response),
        _ => None,
    }
}

/// A tagged message envelope. Equality is structural over all fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Message {
    pub kind: MessageKind,
    pub id: Uuid,
    pub timestamp_ns: u64,
}

impl Message {
    pub fn new(kind: MessageKind, id: Uuid, timestamp_ns: u64) -> Self {
        Self {
            kind,
            id,
            timestamp_ns,
        }
    }

    pub fn document(id: Uuid, timestamp_ns: u64) -> Self {
        Self::new(MessageKind::Document, id, timestamp_ns)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.kind {
            MessageKind::String => "String",
            MessageKind::Command => "Command",
            MessageKind::Document => "Document",
            MessageKind::Event => "Event",
            MessageKind::Request => "Request",
            MessageKind::Response => "Response",
        };
        write!(f, "{}(id={}, timestamp={})", name, self.id, self.timestamp_ns)
    }
}

/// A response message, correlated to the request that produced it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Response {
    pub correlation_id: Uuid,
    pub id: Uuid,
    pub timestamp_ns: u64,
}

impl Response {
    pub fn new(correlation_id: Uuid, id: Uuid, timestamp_ns: u64) -> Self {
        Self {
            correlation_id,
            id,
            timestamp_ns,
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Response(correlation_id={}, id={}, timestamp={})",
            self.correlation_id, self.id, self.timestamp_ns
        )
    }
}

/// The class of data a subscription or request refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataKind {
    Instrument,
    QuoteTick,
    TradeTick,
    Bar,
    OrderBookDelta,
}

/// Tags what a subscription or request is for: a data class plus free-form
/// metadata such as the instrument id or a row limit.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataType {
    pub kind: DataKind,
    pub metadata: BTreeMap<String, String>,
}

impl DataType {
    pub fn new(kind: DataKind) -> Self {
        Self {
            kind,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.metadata.insert(key.into(), value.to_string());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}{:?}", self.kind, self.metadata)
    }
}

/// The payload carried by a [`DataResponse`].
#[derive(Clone, Debug, PartialEq, Default)]
pub enum DataPayload {
    #[default]
    Empty,
    Instruments(Vec<Instrument>),
    QuoteTicks(Vec<QuoteTick>),
    TradeTicks(Vec<TradeTick>),
    Bars(Vec<Bar>),
}

impl DataPayload {
    pub fn is_empty(&self) -> bool {
        match self {
            DataPayload::Empty => true,
            DataPayload::Instruments(v) => v.is_empty(),
            DataPayload::QuoteTicks(v) => v.is_empty(),
            DataPayload::TradeTicks(v) => v.is_empty(),
            DataPayload::Bars(v) => v.is_empty(),
        }
    }
}

/// A request for data, answered by exactly one [`DataResponse`].
#[derive(Clone, Debug)]
pub struct DataRequest {
    pub request_id: Uuid,
    pub client_id: ClientId,
    pub data_type: DataType,
    pub timestamp_ns: u64,
}

impl DataRequest {
    pub fn new(client_id: ClientId, data_type: DataType, timestamp_ns: u64) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            client_id,
            data_type,
            timestamp_ns,
        }
    }
}

/// The single response produced for a [`DataRequest`], correlated by the
/// request id.
#[derive(Clone, Debug)]
pub struct DataResponse {
    pub correlation_id: Uuid,
    pub client_id: ClientId,
    pub data_type: DataType,
    pub payload: DataPayload,
    pub timed_out: bool,
    pub timestamp_ns: u64,
}

impl DataResponse {
    pub fn new(
        request: &DataRequest,
        payload: DataPayload,
        timestamp_ns: u64,
    ) -> Self {
        Self {
            correlation_id: request.request_id,
            client_id: request.client_id.clone(),
            data_type: request.data_type.clone(),
            payload,
            timed_out: false,
            timestamp_ns,
        }
    }

    /// Synthesized when a request's timeout alert fires before any client
    /// response arrives.
    pub fn timed_out(request: &DataRequest, timestamp_ns: u64) -> Self {
        Self {
            correlation_id: request.request_id,
            client_id: request.client_id.clone(),
            data_type: request.data_type.clone(),
            payload: DataPayload::Empty,
            timed_out: true,
            timestamp_ns,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::hash_map::DefaultHasher,
        hash::{Hash, Hasher},
    };

    use super::*;

    fn hash_of<T: Hash>(value: &T) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn message_equality_is_structural() {
        let uuid = Uuid::new_v4();
        let message1 = Message::new(MessageKind::Command, uuid, 0);
        let message2 = Message::new(MessageKind::Command, uuid, 0);
        let message3 = Message::new(MessageKind::Document, uuid, 0);
        let message4 = Message::new(MessageKind::Document, Uuid::new_v4(), 0);

        assert_eq!(message1, message1);
        assert_eq!(message1, message2);
        assert_ne!(message1, message3);
        assert_ne!(message3, message4);
    }

    #[test]
    fn message_hash_is_stable_for_equal_inputs() {
        let uuid = Uuid::new_v4();
        let a = Message::document(uuid, 0);
        let b = Message::document(uuid, 0);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn message_display() {
        let uuid = Uuid::new_v4();
        let message = Message::document(uuid, 0);
        assert_eq!(message.to_string(), format!("Document(id={uuid}, timestamp=0)"));
    }

    #[test]
    fn response_display_includes_correlation() {
        let id = Uuid::new_v4();
        let corr = Uuid::new_v4();
        let response = Response::new(corr, id, 0);
        assert_eq!(
            response.to_string(),
            format!("Response(correlation_id={corr}, id={id}, timestamp=0)")
        );
    }

    #[test]
    fn message_kind_str_round_trip() {
        for (kind, name) in [
            (MessageKind::String, "STRING"),
            (MessageKind::Command, "COMMAND"),
            (MessageKind::Document, "DOCUMENT"),
            (MessageKind::Event, "EVENT"),
            (MessageKind::Request, "REQUEST"),
            (MessageKind::Response, "RESPONSE"),
        ] {
            assert_eq!(message_kind_to_str(kind), name);
            assert_eq!(message_kind_from_str(name), Some(kind));
        }
        assert_eq!(message_kind_from_str("BOGUS"), None);
    }

    #[test]
    fn data_type_equality_includes_metadata() {
        let a = DataType::new(DataKind::TradeTick).with("InstrumentId", "AUD/USD.SIM");
        let b = DataType::new(DataKind::TradeTick).with("InstrumentId", "AUD/USD.SIM");
        let c = DataType::new(DataKind::TradeTick).with("InstrumentId", "EUR/USD.SIM");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(hash_of(&a), hash_of(&b));
    }
}
