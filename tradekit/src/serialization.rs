use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::model::{commands::TradingCommand, events::Event, order::Order};

/// Errors raised while encoding or decoding messages. Engines drop the
/// offending message and log at error level.
#[derive(Error, Debug)]
pub enum SerializationError {
    #[error("missing 'type' discriminator")]
    MissingDiscriminator,
    #[error("unknown 'type' discriminator: {0}")]
    UnknownDiscriminator(String),
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Encodes orders, commands and events as self-describing tagged records.
///
/// Records are byte buffers of tagged JSON: commands and events carry a
/// `type` discriminator naming the kind in upper-snake-case, field names are
/// upper-snake-case string keys, and absent optional fields are encoded as
/// explicit nulls. Decoding a record whose discriminator is unknown yields
/// [`SerializationError::UnknownDiscriminator`].
#[derive(Clone, Copy, Debug, Default)]
pub struct Serializer;

impl Serializer {
    pub fn new() -> Self {
        Self
    }

    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, SerializationError> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode_tagged<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, SerializationError> {
        let value: Value = serde_json::from_slice(data)?;
        let tag = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(SerializationError::MissingDiscriminator)?
            .to_string();
        serde_json::from_value(value).map_err(|err| {
            if err.to_string().starts_with("unknown variant") {
                SerializationError::UnknownDiscriminator(tag)
            } else {
                SerializationError::Malformed(err)
            }
        })
    }

    pub fn serialize_order(&self, order: &Order) -> Result<Vec<u8>, SerializationError> {
        self.encode(order)
    }

    pub fn deserialize_order(&self, data: &[u8]) -> Result<Order, SerializationError> {
        Ok(serde_json::from_slice(data)?)
    }

    pub fn serialize_command(
        &self,
        command: &TradingCommand,
    ) -> Result<Vec<u8>, SerializationError> {
        self.encode(command)
    }

    pub fn deserialize_command(&self, data: &[u8]) -> Result<TradingCommand, SerializationError> {
        self.decode_tagged(data)
    }

    pub fn serialize_event(&self, event: &Event) -> Result<Vec<u8>, SerializationError> {
        self.encode(event)
    }

    pub fn deserialize_event(&self, data: &[u8]) -> Result<Event, SerializationError> {
        self.decode_tagged(data)
    }
}

/// Converts `CamelCase` or `camelCase` to `CAMEL_CASE`. Already upper-snake
/// input is returned unchanged.
pub fn convert_camel_to_snake(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 4);
    let mut prev_lower_or_digit = false;
    for c in value.chars() {
        if c.is_uppercase() && prev_lower_or_digit {
            out.push('_');
        }
        prev_lower_or_digit = c.is_lowercase() || c.is_ascii_digit();
        out.extend(c.to_uppercase());
    }
    out
}

/// Converts `snake_case` or `SNAKE_CASE` to `SnakeCase`.
pub fn convert_snake_to_camel(value: &str) -> String {
    value
        .split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect()
}
