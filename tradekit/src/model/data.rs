use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::model::{
    enums::{BarAggregation, OrderSide, PriceType},
    identifiers::InstrumentId,
    value::{Price, Quantity},
};

/// A top-of-book quote observation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteTick {
    pub instrument_id: InstrumentId,
    pub bid: Price,
    pub ask: Price,
    pub bid_size: Quantity,
    pub ask_size: Quantity,
    pub ts_event_ns: u64,
}

impl QuoteTick {
    /// Returns the price for the requested side of the quote. `Last` is not
    /// derivable from a quote and falls back to the mid.
    pub fn extract_price(&self, price_type: PriceType) -> Price {
        match price_type {
            PriceType::Bid => self.bid,
            PriceType::Ask => self.ask,
            PriceType::Mid | PriceType::Last => {
                let mid = (self.bid.value() + self.ask.value()) / Decimal::TWO;
                Price::new(mid, self.bid.precision() + 1).expect("mid precision within bounds")
            }
        }
    }
}

/// A single market trade observation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeTick {
    pub instrument_id: InstrumentId,
    pub price: Price,
    pub size: Quantity,
    pub aggressor_side: OrderSide,
    pub match_id: String,
    pub ts_event_ns: u64,
}

/// How bars for a given [`BarType`] are built.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BarSpecification {
    pub step: u64,
    pub aggregation: BarAggregation,
    pub price_type: PriceType,
}

impl fmt::Display for BarSpecification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:?}-{:?}", self.step, self.aggregation, self.price_type)
    }
}

/// Identifies a bar stream as instrument + specification.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BarType {
    pub instrument_id: InstrumentId,
    pub spec: BarSpecification,
}

/// An OHLCV aggregate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    pub bar_type: BarType,
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
    pub volume: Quantity,
    pub ts_event_ns: u64,
}

/// The book mutation a delta carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookAction {
    Add,
    Update,
    Delete,
}

/// An order-level change to one side of an instrument's book.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderBookDelta {
    pub instrument_id: InstrumentId,
    pub action: BookAction,
    pub order_id: String,
    pub side: OrderSide,
    pub price: Price,
    pub size: Quantity,
    pub ts_event_ns: u64,
}

/// Any market data record, merged into the single replay stream in backtest.
#[derive(Clone, Debug, PartialEq)]
pub enum MarketData {
    Quote(QuoteTick),
    Trade(TradeTick),
    Bar(Bar),
    Delta(OrderBookDelta),
}

impl MarketData {
    pub fn instrument_id(&self) -> &InstrumentId {
        match self {
            MarketData::Quote(t) => &t.instrument_id,
            MarketData::Trade(t) => &t.instrument_id,
            MarketData::Bar(b) => &b.bar_type.instrument_id,
            MarketData::Delta(d) => &d.instrument_id,
        }
    }

    pub fn ts_event_ns(&self) -> u64 {
        match self {
            MarketData::Quote(t) => t.ts_event_ns,
            MarketData::Trade(t) => t.ts_event_ns,
            MarketData::Bar(b) => b.ts_event_ns,
            MarketData::Delta(d) => d.ts_event_ns,
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::model::identifiers::{Symbol, Venue};

    fn quote() -> QuoteTick {
        QuoteTick {
            instrument_id: InstrumentId::new(Symbol::new("AUD/USD"), Venue::new("SIM")),
            bid: Price::new(dec!(1.00000), 5).unwrap(),
            ask: Price::new(dec!(1.00010), 5).unwrap(),
            bid_size: Quantity::new(dec!(100000), 0).unwrap(),
            ask_size: Quantity::new(dec!(100000), 0).unwrap(),
            ts_event_ns: 0,
        }
    }

    #[test]
    fn extract_price_by_type() {
        let tick = quote();
        assert_eq!(tick.extract_price(PriceType::Bid), tick.bid);
        assert_eq!(tick.extract_price(PriceType::Ask), tick.ask);
        assert_eq!(
            tick.extract_price(PriceType::Mid),
            Price::new(dec!(1.00005), 6).unwrap()
        );
    }
}
