use rust_decimal::Decimal;

use crate::model::{
    account::AccountBalance,
    enums::{LiquiditySide, OrderSide, PositionSide},
    events::Event,
    identifiers::{ClientOrderId, InstrumentId},
    position::Position,
    value::{Price, Quantity},
};

/// One fill as it appeared in the event stream.
#[derive(Clone, Debug, PartialEq)]
pub struct FillRecord {
    pub client_order_id: ClientOrderId,
    pub instrument_id: InstrumentId,
    pub side: OrderSide,
    pub last_qty: Quantity,
    pub last_px: Price,
    pub liquidity_side: LiquiditySide,
    pub ts_event_ns: u64,
}

/// All fills of a run, in event order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OrderFillsReport {
    pub fills: Vec<FillRecord>,
}

impl OrderFillsReport {
    pub fn from_events(events: &[Event]) -> Self {
        let fills = events
            .iter()
            .filter_map(|event| match event {
                Event::OrderFilled {
                    client_order_id,
                    instrument_id,
                    side,
                    last_qty,
                    last_px,
                    liquidity_side,
                    ts_event_ns,
                    ..
                } => Some(FillRecord {
                    client_order_id: client_order_id.clone(),
                    instrument_id: instrument_id.clone(),
                    side: *side,
                    last_qty: *last_qty,
                    last_px: *last_px,
                    liquidity_side: *liquidity_side,
                    ts_event_ns: *ts_event_ns,
                }),
                _ => None,
            })
            .collect();
        Self { fills }
    }

    pub fn total_volume(&self) -> Decimal {
        self.fills.iter().map(|f| f.last_qty.value()).sum()
    }
}

/// Final position snapshots, one per instrument traded.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PositionsReport {
    pub positions: Vec<PositionRecord>,
}

/// A final position snapshot.
#[derive(Clone, Debug, PartialEq)]
pub struct PositionRecord {
    pub instrument_id: InstrumentId,
    pub side: PositionSide,
    pub quantity: Quantity,
    pub avg_px_open: Decimal,
    pub realized_pnl: Decimal,
}

impl PositionsReport {
    pub fn from_positions<'a>(positions: impl Iterator<Item = &'a Position>) -> Self {
        let mut positions: Vec<PositionRecord> = positions
            .map(|position| PositionRecord {
                instrument_id: position.instrument_id.clone(),
                side: position.side,
                quantity: position.quantity,
                avg_px_open: position.avg_px_open,
                realized_pnl: position.realized_pnl,
            })
            .collect();
        positions.sort_by(|a, b| a.instrument_id.cmp(&b.instrument_id));
        Self { positions }
    }

    pub fn total_realized_pnl(&self) -> Decimal {
        self.positions.iter().map(|p| p.realized_pnl).sum()
    }
}

/// Final account balances, one entry per account and currency.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AccountReport {
    pub balances: Vec<(String, AccountBalance)>,
}
