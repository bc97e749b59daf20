use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::model::ValidationError;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(SmolStr);

        impl $name {
            pub fn new(value: impl AsRef<str>) -> Self {
                Self(SmolStr::new(value.as_ref()))
            }

            pub fn as_str(&self) -> &str {
                self.0.as_str()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.0.as_str())
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }
    };
}

string_id!(
    /// A ticker symbol, e.g. `AUD/USD`.
    Symbol
);
string_id!(
    /// A trading venue, e.g. `SIM` or `BINANCE`.
    Venue
);
string_id!(
    /// Identifies a trader across the whole system.
    TraderId
);
string_id!(
    /// Identifies a strategy; the first component of client order ids.
    StrategyId
);
string_id!(
    /// Identifies an account at a venue.
    AccountId
);
string_id!(
    /// A strategy-generated order id, unique per strategy.
    ClientOrderId
);
string_id!(
    /// A venue-assigned order id, available once an order is accepted.
    VenueOrderId
);
string_id!(
    /// Identifies a position held in an account.
    PositionId
);
string_id!(
    /// A venue-assigned execution (trade) id.
    ExecutionId
);
string_id!(
    /// Identifies a data or execution client registered with an engine.
    ClientId
);

/// Identifies a tradable instrument as `(symbol, venue)`, rendered
/// `"{symbol}.{venue}"`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstrumentId {
    pub symbol: Symbol,
    pub venue: Venue,
}

impl InstrumentId {
    pub fn new(symbol: Symbol, venue: Venue) -> Self {
        Self { symbol, venue }
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.symbol, self.venue)
    }
}

impl FromStr for InstrumentId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // The venue never contains a dot; the symbol may (e.g. index tickers),
        // so split on the last one.
        let (symbol, venue) = s
            .rsplit_once('.')
            .ok_or_else(|| ValidationError::InvalidInstrumentId(s.to_string()))?;
        if symbol.is_empty() || venue.is_empty() {
            return Err(ValidationError::InvalidInstrumentId(s.to_string()));
        }
        Ok(Self::new(Symbol::new(symbol), Venue::new(venue)))
    }
}

impl Serialize for InstrumentId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for InstrumentId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        InstrumentId::from_str(&s).map_err(serde::de::Error::custom)
    }
}
