use rust_decimal::Decimal;
use thiserror::Error;

/// Account and balance state.
pub mod account;
/// Trading commands routed through the execution engine.
pub mod commands;
/// Market data records: quote ticks, trade ticks and bars.
pub mod data;
/// Core enumerations shared across the model.
pub mod enums;
/// Order, account and position events.
pub mod events;
/// Typed identifiers.
pub mod identifiers;
/// Instrument reference data.
pub mod instrument;
/// Orders and the order state machine.
pub mod order;
/// Positions and realized PnL tracking.
pub mod position;
/// Fixed-precision value objects.
pub mod value;

/// Errors raised by value-object construction; these propagate to the caller
/// immediately rather than through the event stream.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("precision {0} exceeds the supported maximum of 18")]
    PrecisionExceeded(u8),
    #[error("invalid decimal literal: {0}")]
    InvalidDecimal(String),
    #[error("quantity must not be negative, was {0}")]
    NegativeQuantity(Decimal),
    #[error("invalid currency code: {0}")]
    InvalidCurrencyCode(String),
    #[error("invalid instrument id, expected '<symbol>.<venue>': {0}")]
    InvalidInstrumentId(String),
    #[error("{0}")]
    Invalid(String),
}
