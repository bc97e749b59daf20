use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::model::{
    enums::{OrderSide, OrderStatus, OrderType, TimeInForce},
    events::Event,
    identifiers::{ClientOrderId, InstrumentId, StrategyId, TraderId, VenueOrderId},
    value::{Price, Quantity},
};

/// Errors raised by order construction and by illegal lifecycle transitions.
#[derive(Error, Debug)]
pub enum OrderError {
    #[error("order quantity must be positive")]
    QuantityNotPositive,
    #[error("expire time is required for GTD and forbidden otherwise")]
    ExpireTimeMismatch,
    #[error("invalid state transition: {from:?} -> {event}")]
    InvalidStateTransition {
        from: OrderStatus,
        event: &'static str,
    },
    #[error("event {event} does not apply to order {client_order_id}")]
    EventOrderIdMismatch {
        client_order_id: ClientOrderId,
        event: &'static str,
    },
    #[error("fill quantity {last_qty} exceeds leaves quantity {leaves_qty}")]
    FillExceedsLeaves {
        last_qty: Quantity,
        leaves_qty: Quantity,
    },
}

/// When an order leaves the book without filling, derived from its time in
/// force.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExpiryPolicy {
    /// Rests until cancelled.
    None,
    /// Expires at the venue's session close.
    Day,
    /// Expires at the carried nanosecond timestamp.
    Gtd(u64),
}

/// An order owned by a strategy, driven through its lifecycle by [`Event`]s.
///
/// The optional fields follow the order type: `price` is present for limit
/// variants, `trigger` for stop variants, and `expire_time_ns` iff the time
/// in force is GTD.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Order {
    pub client_order_id: ClientOrderId,
    pub strategy_id: StrategyId,
    pub instrument_id: InstrumentId,
    pub venue_order_id: Option<VenueOrderId>,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: Quantity,
    pub price: Option<Price>,
    pub trigger: Option<Price>,
    pub time_in_force: TimeInForce,
    pub expire_time_ns: Option<u64>,
    pub status: OrderStatus,
    pub filled_qty: Quantity,
    pub leaves_qty: Quantity,
    pub avg_px: Option<Decimal>,
    pub init_id: Uuid,
    pub ts_init_ns: u64,
}

impl Order {
    #[allow(clippy::too_many_arguments)]
    fn new(
        client_order_id: ClientOrderId,
        strategy_id: StrategyId,
        instrument_id: InstrumentId,
        side: OrderSide,
        order_type: OrderType,
        quantity: Quantity,
        price: Option<Price>,
        trigger: Option<Price>,
        time_in_force: TimeInForce,
        expire_time_ns: Option<u64>,
        init_id: Uuid,
        ts_init_ns: u64,
    ) -> Result<Self, OrderError> {
        if !quantity.is_positive() {
            return Err(OrderError::QuantityNotPositive);
        }
        if (time_in_force == TimeInForce::Gtd) != expire_time_ns.is_some() {
            return Err(OrderError::ExpireTimeMismatch);
        }
        let leaves_qty = quantity;
        Ok(Self {
            client_order_id,
            strategy_id,
            instrument_id,
            venue_order_id: None,
            side,
            order_type,
            quantity,
            price,
            trigger,
            time_in_force,
            expire_time_ns,
            status: OrderStatus::Initialized,
            filled_qty: Quantity::zero(quantity.precision()),
            leaves_qty,
            avg_px: None,
            init_id,
            ts_init_ns,
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn market(
        client_order_id: ClientOrderId,
        strategy_id: StrategyId,
        instrument_id: InstrumentId,
        side: OrderSide,
        quantity: Quantity,
        init_id: Uuid,
        ts_init_ns: u64,
    ) -> Result<Self, OrderError> {
        Self::new(
            client_order_id,
            strategy_id,
            instrument_id,
            side,
            OrderType::Market,
            quantity,
            None,
            None,
            TimeInForce::Ioc,
            None,
            init_id,
            ts_init_ns,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn limit(
        client_order_id: ClientOrderId,
        strategy_id: StrategyId,
        instrument_id: InstrumentId,
        side: OrderSide,
        quantity: Quantity,
        price: Price,
        time_in_force: TimeInForce,
        expire_time_ns: Option<u64>,
        init_id: Uuid,
        ts_init_ns: u64,
    ) -> Result<Self, OrderError> {
        Self::new(
            client_order_id,
            strategy_id,
            instrument_id,
            side,
            OrderType::Limit,
            quantity,
            Some(price),
            None,
            time_in_force,
            expire_time_ns,
            init_id,
            ts_init_ns,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn stop_market(
        client_order_id: ClientOrderId,
        strategy_id: StrategyId,
        instrument_id: InstrumentId,
        side: OrderSide,
        quantity: Quantity,
        trigger: Price,
        time_in_force: TimeInForce,
        expire_time_ns: Option<u64>,
        init_id: Uuid,
        ts_init_ns: u64,
    ) -> Result<Self, OrderError> {
        Self::new(
            client_order_id,
            strategy_id,
            instrument_id,
            side,
            OrderType::StopMarket,
            quantity,
            None,
            Some(trigger),
            time_in_force,
            expire_time_ns,
            init_id,
            ts_init_ns,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn stop_limit(
        client_order_id: ClientOrderId,
        strategy_id: StrategyId,
        instrument_id: InstrumentId,
        side: OrderSide,
        quantity: Quantity,
        price: Price,
        trigger: Price,
        time_in_force: TimeInForce,
        expire_time_ns: Option<u64>,
        init_id: Uuid,
        ts_init_ns: u64,
    ) -> Result<Self, OrderError> {
        Self::new(
            client_order_id,
            strategy_id,
            instrument_id,
            side,
            OrderType::StopLimit,
            quantity,
            Some(price),
            Some(trigger),
            time_in_force,
            expire_time_ns,
            init_id,
            ts_init_ns,
        )
    }

    /// Returns whether the order has reached a terminal state.
    pub fn is_completed(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn expiry_policy(&self) -> ExpiryPolicy {
        match self.time_in_force {
            TimeInForce::Day => ExpiryPolicy::Day,
            TimeInForce::Gtd => ExpiryPolicy::Gtd(
                self.expire_time_ns
                    .expect("construction guarantees an expire time for GTD"),
            ),
            _ => ExpiryPolicy::None,
        }
    }

    /// Returns whether the order is resting or partially filled at the venue.
    pub fn is_working(&self) -> bool {
        matches!(
            self.status,
            OrderStatus::Accepted | OrderStatus::PartiallyFilled
        )
    }

    fn transition(&mut self, to: OrderStatus, event: &'static str) -> Result<(), OrderError> {
        let legal = match (self.status, to) {
            (OrderStatus::Initialized, OrderStatus::Submitted)
            | (OrderStatus::Initialized, OrderStatus::Invalid)
            | (OrderStatus::Initialized, OrderStatus::Denied)
            // Local cancellation of an order never released to a venue,
            // e.g. bracket children whose entry did not fill.
            | (OrderStatus::Initialized, OrderStatus::Cancelled)
            | (OrderStatus::Submitted, OrderStatus::Accepted)
            | (OrderStatus::Submitted, OrderStatus::Rejected)
            // Market orders can fill straight off the submit ack.
            | (OrderStatus::Submitted, OrderStatus::PartiallyFilled)
            | (OrderStatus::Submitted, OrderStatus::Filled)
            | (OrderStatus::Accepted, OrderStatus::PartiallyFilled)
            | (OrderStatus::Accepted, OrderStatus::Filled)
            | (OrderStatus::Accepted, OrderStatus::Cancelled)
            | (OrderStatus::Accepted, OrderStatus::Expired)
            | (OrderStatus::PartiallyFilled, OrderStatus::PartiallyFilled)
            | (OrderStatus::PartiallyFilled, OrderStatus::Filled)
            | (OrderStatus::PartiallyFilled, OrderStatus::Cancelled)
            | (OrderStatus::PartiallyFilled, OrderStatus::Expired) => true,
            _ => false,
        };
        if !legal {
            return Err(OrderError::InvalidStateTransition {
                from: self.status,
                event,
            });
        }
        self.status = to;
        Ok(())
    }

    /// Applies an order event, advancing the state machine. Illegal
    /// transitions leave the order unchanged and return an error for the
    /// caller to log.
    pub fn apply(&mut self, event: &Event) -> Result<(), OrderError> {
        if let Some(id) = event.client_order_id() {
            if id != &self.client_order_id {
                return Err(OrderError::EventOrderIdMismatch {
                    client_order_id: self.client_order_id.clone(),
                    event: event.type_name(),
                });
            }
        }
        match event {
            Event::OrderSubmitted { .. } => self.transition(OrderStatus::Submitted, "OrderSubmitted"),
            Event::OrderAccepted { venue_order_id, .. } => {
                self.transition(OrderStatus::Accepted, "OrderAccepted")?;
                self.venue_order_id = Some(venue_order_id.clone());
                Ok(())
            }
            Event::OrderRejected { .. } => self.transition(OrderStatus::Rejected, "OrderRejected"),
            Event::OrderInvalid { .. } => self.transition(OrderStatus::Invalid, "OrderInvalid"),
            Event::OrderDenied { .. } => self.transition(OrderStatus::Denied, "OrderDenied"),
            Event::OrderCancelled { .. } => self.transition(OrderStatus::Cancelled, "OrderCancelled"),
            Event::OrderExpired { .. } => self.transition(OrderStatus::Expired, "OrderExpired"),
            Event::OrderFilled {
                last_qty, last_px, ..
            } => {
                if *last_qty > self.leaves_qty {
                    return Err(OrderError::FillExceedsLeaves {
                        last_qty: *last_qty,
                        leaves_qty: self.leaves_qty,
                    });
                }
                let to = if *last_qty == self.leaves_qty {
                    OrderStatus::Filled
                } else {
                    OrderStatus::PartiallyFilled
                };
                self.transition(to, "OrderFilled")?;
                let prev_notional =
                    self.avg_px.unwrap_or_default() * self.filled_qty.value();
                self.filled_qty += *last_qty;
                self.leaves_qty -= *last_qty;
                self.avg_px = Some(
                    (prev_notional + last_px.value() * last_qty.value()) / self.filled_qty.value(),
                );
                Ok(())
            }
            Event::OrderUpdated {
                quantity, price, ..
            } => {
                if !self.is_working() {
                    return Err(OrderError::InvalidStateTransition {
                        from: self.status,
                        event: "OrderUpdated",
                    });
                }
                self.quantity = *quantity;
                self.leaves_qty = quantity.saturating_sub(self.filled_qty);
                if self.price.is_some() {
                    self.price = *price;
                }
                Ok(())
            }
            // Rejected requests do not move the order's state.
            Event::OrderCancelRejected { .. } | Event::OrderUpdateRejected { .. } => Ok(()),
            _ => Ok(()),
        }
    }
}

/// Produces orders with strategy-scoped, monotonically numbered client order
/// ids of the form `O-{trader}-{strategy}-{n}`.
pub struct OrderFactory {
    trader_id: TraderId,
    strategy_id: StrategyId,
    count: u64,
}

impl OrderFactory {
    pub fn new(trader_id: TraderId, strategy_id: StrategyId) -> Self {
        Self {
            trader_id,
            strategy_id,
            count: 0,
        }
    }

    /// Generates the next client order id.
    pub fn next_id(&mut self) -> ClientOrderId {
        self.count += 1;
        ClientOrderId::new(format!(
            "O-{}-{}-{}",
            self.trader_id, self.strategy_id, self.count
        ))
    }

    pub fn market(
        &mut self,
        instrument_id: InstrumentId,
        side: OrderSide,
        quantity: Quantity,
        ts_init_ns: u64,
    ) -> Result<Order, OrderError> {
        Order::market(
            self.next_id(),
            self.strategy_id.clone(),
            instrument_id,
            side,
            quantity,
            Uuid::new_v4(),
            ts_init_ns,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn limit(
        &mut self,
        instrument_id: InstrumentId,
        side: OrderSide,
        quantity: Quantity,
        price: Price,
        time_in_force: TimeInForce,
        expire_time_ns: Option<u64>,
        ts_init_ns: u64,
    ) -> Result<Order, OrderError> {
        Order::limit(
            self.next_id(),
            self.strategy_id.clone(),
            instrument_id,
            side,
            quantity,
            price,
            time_in_force,
            expire_time_ns,
            Uuid::new_v4(),
            ts_init_ns,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn stop_market(
        &mut self,
        instrument_id: InstrumentId,
        side: OrderSide,
        quantity: Quantity,
        trigger: Price,
        time_in_force: TimeInForce,
        expire_time_ns: Option<u64>,
        ts_init_ns: u64,
    ) -> Result<Order, OrderError> {
        Order::stop_market(
            self.next_id(),
            self.strategy_id.clone(),
            instrument_id,
            side,
            quantity,
            trigger,
            time_in_force,
            expire_time_ns,
            Uuid::new_v4(),
            ts_init_ns,
        )
    }

    /// Builds a bracket: entry plus linked stop-loss and take-profit children
    /// with OCO semantics enforced by the execution engine.
    pub fn bracket(
        &mut self,
        entry: Order,
        stop_loss: Price,
        take_profit: Price,
        ts_init_ns: u64,
    ) -> Result<crate::model::commands::BracketOrder, OrderError> {
        let child_side = entry.side.flipped();
        let stop = Order::stop_market(
            self.next_id(),
            self.strategy_id.clone(),
            entry.instrument_id.clone(),
            child_side,
            entry.quantity,
            stop_loss,
            TimeInForce::Gtc,
            None,
            Uuid::new_v4(),
            ts_init_ns,
        )?;
        let profit = Order::limit(
            self.next_id(),
            self.strategy_id.clone(),
            entry.instrument_id.clone(),
            child_side,
            entry.quantity,
            take_profit,
            TimeInForce::Gtc,
            None,
            Uuid::new_v4(),
            ts_init_ns,
        )?;
        Ok(crate::model::commands::BracketOrder {
            entry,
            stop_loss: stop,
            take_profit: profit,
        })
    }
}
