use serde::{Deserialize, Serialize};

/// The side of an order or of a trade's aggressor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Returns the opposite side.
    pub fn flipped(&self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl AsRef<str> for OrderSide {
    fn as_ref(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

/// Order type. Stop variants carry a trigger; limit variants carry a price.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Market,
    Limit,
    StopMarket,
    StopLimit,
}

impl AsRef<str> for OrderType {
    fn as_ref(&self) -> &'static str {
        match self {
            OrderType::Market => "MARKET",
            OrderType::Limit => "LIMIT",
            OrderType::StopMarket => "STOP_MARKET",
            OrderType::StopLimit => "STOP_LIMIT",
        }
    }
}

/// Order lifecycle status.
///
/// Terminal states are `Filled`, `Rejected`, `Invalid`, `Denied`, `Cancelled`
/// and `Expired`; transitions are driven exclusively by order events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Initialized,
    Submitted,
    Accepted,
    Rejected,
    Invalid,
    Denied,
    PartiallyFilled,
    Filled,
    Cancelled,
    Expired,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled
                | OrderStatus::Rejected
                | OrderStatus::Invalid
                | OrderStatus::Denied
                | OrderStatus::Cancelled
                | OrderStatus::Expired
        )
    }
}

/// Time in force.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeInForce {
    /// Expires at the venue's session close.
    Day,
    /// Good 'til cancelled.
    Gtc,
    /// Good 'til date; requires an expire time.
    Gtd,
    /// Fill or kill.
    Fok,
    /// Immediate or cancel.
    Ioc,
}

impl AsRef<str> for TimeInForce {
    fn as_ref(&self) -> &'static str {
        match self {
            TimeInForce::Day => "DAY",
            TimeInForce::Gtc => "GTC",
            TimeInForce::Gtd => "GTD",
            TimeInForce::Fok => "FOK",
            TimeInForce::Ioc => "IOC",
        }
    }
}

/// Whether a fill provided or consumed liquidity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LiquiditySide {
    Maker,
    Taker,
}

/// The price a quote-derived value is taken from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriceType {
    Bid,
    Ask,
    Mid,
    Last,
}

/// Bar aggregation interval kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BarAggregation {
    Tick,
    Second,
    Minute,
    Hour,
    Day,
}

/// The side of a position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionSide {
    Flat,
    Long,
    Short,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enums_serialize_as_upper_snake_names() {
        assert_eq!(serde_json::to_string(&OrderType::StopLimit).unwrap(), "\"STOP_LIMIT\"");
        assert_eq!(serde_json::to_string(&TimeInForce::Gtd).unwrap(), "\"GTD\"");
        assert_eq!(serde_json::to_string(&LiquiditySide::Taker).unwrap(), "\"TAKER\"");
    }

    #[test]
    fn order_status_terminal_set() {
        assert!(OrderStatus::Filled.is_terminal());
        assert!(OrderStatus::Denied.is_terminal());
        assert!(!OrderStatus::PartiallyFilled.is_terminal());
        assert!(!OrderStatus::Submitted.is_terminal());
    }
}
