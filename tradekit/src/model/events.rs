use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{
    account::AccountBalance,
    enums::{LiquiditySide, OrderSide},
    identifiers::{AccountId, ClientOrderId, ExecutionId, InstrumentId, VenueOrderId},
    value::{Money, Price, Quantity},
};

/// Events emitted by execution clients and engines.
///
/// Every event carries its own `event_id` for idempotent application, and an
/// event timestamp in nanoseconds. The wire form is a tagged record whose
/// `type` field names the kind in upper-snake-case.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "SCREAMING_SNAKE_CASE"
)]
pub enum Event {
    OrderSubmitted {
        account_id: AccountId,
        client_order_id: ClientOrderId,
        event_id: Uuid,
        ts_event_ns: u64,
    },
    OrderAccepted {
        account_id: AccountId,
        client_order_id: ClientOrderId,
        venue_order_id: VenueOrderId,
        event_id: Uuid,
        ts_event_ns: u64,
    },
    OrderRejected {
        account_id: AccountId,
        client_order_id: ClientOrderId,
        reason: String,
        event_id: Uuid,
        ts_event_ns: u64,
    },
    /// The order failed local validation before reaching a venue.
    OrderInvalid {
        client_order_id: ClientOrderId,
        reason: String,
        event_id: Uuid,
        ts_event_ns: u64,
    },
    /// The order was blocked by pre-trade risk.
    OrderDenied {
        client_order_id: ClientOrderId,
        reason: String,
        event_id: Uuid,
        ts_event_ns: u64,
    },
    OrderFilled {
        account_id: AccountId,
        client_order_id: ClientOrderId,
        venue_order_id: VenueOrderId,
        execution_id: ExecutionId,
        instrument_id: InstrumentId,
        side: OrderSide,
        last_qty: Quantity,
        last_px: Price,
        cumulative_qty: Quantity,
        leaves_qty: Quantity,
        liquidity_side: LiquiditySide,
        commission: Money,
        event_id: Uuid,
        ts_event_ns: u64,
    },
    OrderCancelled {
        account_id: AccountId,
        client_order_id: ClientOrderId,
        venue_order_id: Option<VenueOrderId>,
        event_id: Uuid,
        ts_event_ns: u64,
    },
    OrderExpired {
        account_id: AccountId,
        client_order_id: ClientOrderId,
        venue_order_id: Option<VenueOrderId>,
        event_id: Uuid,
        ts_event_ns: u64,
    },
    OrderUpdated {
        account_id: AccountId,
        client_order_id: ClientOrderId,
        venue_order_id: Option<VenueOrderId>,
        quantity: Quantity,
        price: Option<Price>,
        event_id: Uuid,
        ts_event_ns: u64,
    },
    OrderCancelRejected {
        account_id: AccountId,
        client_order_id: ClientOrderId,
        reason: String,
        event_id: Uuid,
        ts_event_ns: u64,
    },
    OrderUpdateRejected {
        account_id: AccountId,
        client_order_id: ClientOrderId,
        reason: String,
        event_id: Uuid,
        ts_event_ns: u64,
    },
    AccountState {
        account_id: AccountId,
        balances: Vec<AccountBalance>,
        event_id: Uuid,
        ts_event_ns: u64,
    },
    /// A crossed or locked book was observed; the book itself is untouched.
    BookIntegrity {
        instrument_id: InstrumentId,
        best_bid: Price,
        best_ask: Price,
        event_id: Uuid,
        ts_event_ns: u64,
    },
}

impl Event {
    /// Returns the event's own id, used for deduplication.
    pub fn event_id(&self) -> Uuid {
        match self {
            Event::OrderSubmitted { event_id, .. }
            | Event::OrderAccepted { event_id, .. }
            | Event::OrderRejected { event_id, .. }
            | Event::OrderInvalid { event_id, .. }
            | Event::OrderDenied { event_id, .. }
            | Event::OrderFilled { event_id, .. }
            | Event::OrderCancelled { event_id, .. }
            | Event::OrderExpired { event_id, .. }
            | Event::OrderUpdated { event_id, .. }
            | Event::OrderCancelRejected { event_id, .. }
            | Event::OrderUpdateRejected { event_id, .. }
            | Event::AccountState { event_id, .. }
            | Event::BookIntegrity { event_id, .. } => *event_id,
        }
    }

    /// Overrides the event id. The backtest matching engine stamps ids from
    /// a seeded source so that replayed runs are bit-identical.
    pub fn set_event_id(&mut self, id: Uuid) {
        match self {
            Event::OrderSubmitted { event_id, .. }
            | Event::OrderAccepted { event_id, .. }
            | Event::OrderRejected { event_id, .. }
            | Event::OrderInvalid { event_id, .. }
            | Event::OrderDenied { event_id, .. }
            | Event::OrderFilled { event_id, .. }
            | Event::OrderCancelled { event_id, .. }
            | Event::OrderExpired { event_id, .. }
            | Event::OrderUpdated { event_id, .. }
            | Event::OrderCancelRejected { event_id, .. }
            | Event::OrderUpdateRejected { event_id, .. }
            | Event::AccountState { event_id, .. }
            | Event::BookIntegrity { event_id, .. } => *event_id = id,
        }
    }

    pub fn ts_event_ns(&self) -> u64 {
        match self {
            Event::OrderSubmitted { ts_event_ns, .. }
            | Event::OrderAccepted { ts_event_ns, .. }
            | Event::OrderRejected { ts_event_ns, .. }
            | Event::OrderInvalid { ts_event_ns, .. }
            | Event::OrderDenied { ts_event_ns, .. }
            | Event::OrderFilled { ts_event_ns, .. }
            | Event::OrderCancelled { ts_event_ns, .. }
            | Event::OrderExpired { ts_event_ns, .. }
            | Event::OrderUpdated { ts_event_ns, .. }
            | Event::OrderCancelRejected { ts_event_ns, .. }
            | Event::OrderUpdateRejected { ts_event_ns, .. }
            | Event::AccountState { ts_event_ns, .. }
            | Event::BookIntegrity { ts_event_ns, .. } => *ts_event_ns,
        }
    }

    /// Returns the client order id the event refers to, if it is an order
    /// event.
    pub fn client_order_id(&self) -> Option<&ClientOrderId> {
        match self {
            Event::OrderSubmitted {
                client_order_id, ..
            }
            | Event::OrderAccepted {
                client_order_id, ..
            }
            | Event::OrderRejected {
                client_order_id, ..
            }
            | Event::OrderInvalid {
                client_order_id, ..
            }
            | Event::OrderDenied {
                client_order_id, ..
            }
            | Event::OrderFilled {
                client_order_id, ..
            }
            | Event::OrderCancelled {
                client_order_id, ..
            }
            | Event::OrderExpired {
                client_order_id, ..
            }
            | Event::OrderUpdated {
                client_order_id, ..
            }
            | Event::OrderCancelRejected {
                client_order_id, ..
            }
            | Event::OrderUpdateRejected {
                client_order_id, ..
            } => Some(client_order_id),
            Event::AccountState { .. } | Event::BookIntegrity { .. } => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Event::OrderSubmitted { .. } => "OrderSubmitted",
            Event::OrderAccepted { .. } => "OrderAccepted",
            Event::OrderRejected { .. } => "OrderRejected",
            Event::OrderInvalid { .. } => "OrderInvalid",
            Event::OrderDenied { .. } => "OrderDenied",
            Event::OrderFilled { .. } => "OrderFilled",
            Event::OrderCancelled { .. } => "OrderCancelled",
            Event::OrderExpired { .. } => "OrderExpired",
            Event::OrderUpdated { .. } => "OrderUpdated",
            Event::OrderCancelRejected { .. } => "OrderCancelRejected",
            Event::OrderUpdateRejected { .. } => "OrderUpdateRejected",
            Event::AccountState { .. } => "AccountState",
            Event::BookIntegrity { .. } => "BookIntegrity",
        }
    }

    pub fn order_submitted(
        account_id: AccountId,
        client_order_id: ClientOrderId,
        ts_event_ns: u64,
    ) -> Self {
        Event::OrderSubmitted {
            account_id,
            client_order_id,
            event_id: Uuid::new_v4(),
            ts_event_ns,
        }
    }

    pub fn order_accepted(
        account_id: AccountId,
        client_order_id: ClientOrderId,
        venue_order_id: VenueOrderId,
        ts_event_ns: u64,
    ) -> Self {
        Event::OrderAccepted {
            account_id,
            client_order_id,
            venue_order_id,
            event_id: Uuid::new_v4(),
            ts_event_ns,
        }
    }

    pub fn order_rejected(
        account_id: AccountId,
        client_order_id: ClientOrderId,
        reason: impl Into<String>,
        ts_event_ns: u64,
    ) -> Self {
        Event::OrderRejected {
            account_id,
            client_order_id,
            reason: reason.into(),
            event_id: Uuid::new_v4(),
            ts_event_ns,
        }
    }

    pub fn order_invalid(
        client_order_id: ClientOrderId,
        reason: impl Into<String>,
        ts_event_ns: u64,
    ) -> Self {
        Event::OrderInvalid {
            client_order_id,
            reason: reason.into(),
            event_id: Uuid::new_v4(),
            ts_event_ns,
        }
    }

    pub fn order_denied(
        client_order_id: ClientOrderId,
        reason: impl Into<String>,
        ts_event_ns: u64,
    ) -> Self {
        Event::OrderDenied {
            client_order_id,
            reason: reason.into(),
            event_id: Uuid::new_v4(),
            ts_event_ns,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn order_filled(
        account_id: AccountId,
        client_order_id: ClientOrderId,
        venue_order_id: VenueOrderId,
        execution_id: ExecutionId,
        instrument_id: InstrumentId,
        side: OrderSide,
        last_qty: Quantity,
        last_px: Price,
        cumulative_qty: Quantity,
        leaves_qty: Quantity,
        liquidity_side: LiquiditySide,
        commission: Money,
        ts_event_ns: u64,
    ) -> Self {
        Event::OrderFilled {
            account_id,
            client_order_id,
            venue_order_id,
            execution_id,
            instrument_id,
            side,
            last_qty,
            last_px,
            cumulative_qty,
            leaves_qty,
            liquidity_side,
            commission,
            event_id: Uuid::new_v4(),
            ts_event_ns,
        }
    }

    pub fn order_cancelled(
        account_id: AccountId,
        client_order_id: ClientOrderId,
        venue_order_id: Option<VenueOrderId>,
        ts_event_ns: u64,
    ) -> Self {
        Event::OrderCancelled {
            account_id,
            client_order_id,
            venue_order_id,
            event_id: Uuid::new_v4(),
            ts_event_ns,
        }
    }

    pub fn order_expired(
        account_id: AccountId,
        client_order_id: ClientOrderId,
        venue_order_id: Option<VenueOrderId>,
        ts_event_ns: u64,
    ) -> Self {
        Event::OrderExpired {
            account_id,
            client_order_id,
            venue_order_id,
            event_id: Uuid::new_v4(),
            ts_event_ns,
        }
    }

    pub fn order_cancel_rejected(
        account_id: AccountId,
        client_order_id: ClientOrderId,
        reason: impl Into<String>,
        ts_event_ns: u64,
    ) -> Self {
        Event::OrderCancelRejected {
            account_id,
            client_order_id,
            reason: reason.into(),
            event_id: Uuid::new_v4(),
            ts_event_ns,
        }
    }

    pub fn book_integrity(
        instrument_id: InstrumentId,
        best_bid: Price,
        best_ask: Price,
        ts_event_ns: u64,
    ) -> Self {
        Event::BookIntegrity {
            instrument_id,
            best_bid,
            best_ask,
            event_id: Uuid::new_v4(),
            ts_event_ns,
        }
    }
}
