pub use ladder::{BookLevel, BookOrder, Ladder};
use thiserror::Error;

use crate::model::{
    data::QuoteTick,
    enums::OrderSide,
    identifiers::InstrumentId,
    value::{Price, Quantity},
};

mod ladder;

/// Errors raised by book mutations.
#[derive(Error, Debug)]
pub enum BookError {
    #[error("an order with id '{0}' is already in the ladder")]
    OrderAlreadyExists(String),
    #[error("no order with id '{0}' in the ladder")]
    OrderNotFound(String),
}

/// A crossed or locked book: `best_bid >= best_ask`. Detection does not
/// mutate the book; engines surface this as a `BookIntegrity` event.
#[derive(Error, Debug, PartialEq)]
#[error("crossed book for {instrument_id}: best bid {best_bid} >= best ask {best_ask}")]
pub struct BookIntegrityError {
    pub instrument_id: InstrumentId,
    pub best_bid: Price,
    pub best_ask: Price,
}

// Synthetic order ids for the top-of-book levels maintained from quotes.
const QUOTE_BID_ID: &str = "QUOTE-BID";
const QUOTE_ASK_ID: &str = "QUOTE-ASK";

/// A two-sided order book: a descending bid ladder and an ascending ask
/// ladder at the instrument's precisions.
#[derive(Debug)]
pub struct OrderBook {
    pub instrument_id: InstrumentId,
    pub bids: Ladder,
    pub asks: Ladder,
    last_update_ns: u64,
}

impl OrderBook {
    pub fn new(instrument_id: InstrumentId, price_precision: u8, size_precision: u8) -> Self {
        Self {
            instrument_id,
            bids: Ladder::new(true, price_precision, size_precision),
            asks: Ladder::new(false, price_precision, size_precision),
            last_update_ns: 0,
        }
    }

    fn ladder_mut(&mut self, side: OrderSide) -> &mut Ladder {
        match side {
            OrderSide::Buy => &mut self.bids,
            OrderSide::Sell => &mut self.asks,
        }
    }

    pub fn add(&mut self, order: BookOrder) -> Result<(), BookError> {
        self.ladder_mut(order.side).add(order)
    }

    pub fn update(&mut self, order: BookOrder) -> Result<(), BookError> {
        self.ladder_mut(order.side).update(order)
    }

    pub fn delete(&mut self, order: &BookOrder) -> Result<(), BookError> {
        self.ladder_mut(order.side).delete(&order.id)
    }

    pub fn best_bid_price(&self) -> Option<Price> {
        self.bids.top().map(|level| level.price)
    }

    pub fn best_ask_price(&self) -> Option<Price> {
        self.asks.top().map(|level| level.price)
    }

    pub fn last_update_ns(&self) -> u64 {
        self.last_update_ns
    }

    /// Replaces the synthetic top-of-book levels with the latest quote.
    pub fn apply_quote_tick(&mut self, tick: &QuoteTick) {
        let _ = self.bids.delete(QUOTE_BID_ID);
        let _ = self.asks.delete(QUOTE_ASK_ID);
        self.bids
            .add(BookOrder::with_id(
                QUOTE_BID_ID,
                OrderSide::Buy,
                tick.bid,
                tick.bid_size,
            ))
            .expect("synthetic bid is unique");
        self.asks
            .add(BookOrder::with_id(
                QUOTE_ASK_ID,
                OrderSide::Sell,
                tick.ask,
                tick.ask_size,
            ))
            .expect("synthetic ask is unique");
        self.last_update_ns = tick.ts_event_ns;
    }

    /// Simulates walking the opposite side of the book with the given order.
    pub fn simulate_fills(&self, order: &BookOrder) -> Vec<(Price, Quantity)> {
        match order.side {
            OrderSide::Buy => self.asks.simulate_order_fills(order),
            OrderSide::Sell => self.bids.simulate_order_fills(order),
        }
    }

    /// Detects a crossed book. The book is left untouched either way.
    pub fn check_integrity(&self) -> Result<(), BookIntegrityError> {
        if let (Some(best_bid), Some(best_ask)) = (self.best_bid_price(), self.best_ask_price()) {
            if best_bid >= best_ask {
                return Err(BookIntegrityError {
                    instrument_id: self.instrument_id.clone(),
                    best_bid,
                    best_ask,
                });
            }
        }
        Ok(())
    }
}
