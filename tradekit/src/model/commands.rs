use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{
    identifiers::{ClientOrderId, InstrumentId, StrategyId, TraderId},
    order::Order,
    value::{Price, Quantity},
};

/// Three linked orders: an entry with stop-loss and take-profit children.
///
/// The children are held by the execution engine until the entry fills; once
/// working they are a one-cancels-other pair.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct BracketOrder {
    pub entry: Order,
    pub stop_loss: Order,
    pub take_profit: Order,
}

/// Commands routed through the execution engine to an execution client.
///
/// The wire form is a tagged record whose `type` field names the kind in
/// upper-snake-case (`SUBMIT_ORDER`, `CANCEL_ORDER`, ...).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "SCREAMING_SNAKE_CASE"
)]
pub enum TradingCommand {
    SubmitOrder {
        trader_id: TraderId,
        strategy_id: StrategyId,
        order: Order,
        command_id: Uuid,
        ts_init_ns: u64,
    },
    SubmitBracketOrder {
        trader_id: TraderId,
        strategy_id: StrategyId,
        bracket: BracketOrder,
        command_id: Uuid,
        ts_init_ns: u64,
    },
    UpdateOrder {
        trader_id: TraderId,
        strategy_id: StrategyId,
        instrument_id: InstrumentId,
        client_order_id: ClientOrderId,
        quantity: Quantity,
        price: Option<Price>,
        command_id: Uuid,
        ts_init_ns: u64,
    },
    CancelOrder {
        trader_id: TraderId,
        strategy_id: StrategyId,
        instrument_id: InstrumentId,
        client_order_id: ClientOrderId,
        command_id: Uuid,
        ts_init_ns: u64,
    },
}

impl TradingCommand {
    pub fn command_id(&self) -> Uuid {
        match self {
            TradingCommand::SubmitOrder { command_id, .. }
            | TradingCommand::SubmitBracketOrder { command_id, .. }
            | TradingCommand::UpdateOrder { command_id, .. }
            | TradingCommand::CancelOrder { command_id, .. } => *command_id,
        }
    }

    pub fn instrument_id(&self) -> &InstrumentId {
        match self {
            TradingCommand::SubmitOrder { order, .. } => &order.instrument_id,
            TradingCommand::SubmitBracketOrder { bracket, .. } => &bracket.entry.instrument_id,
            TradingCommand::UpdateOrder { instrument_id, .. }
            | TradingCommand::CancelOrder { instrument_id, .. } => instrument_id,
        }
    }

    pub fn submit_order(
        trader_id: TraderId,
        strategy_id: StrategyId,
        order: Order,
        ts_init_ns: u64,
    ) -> Self {
        TradingCommand::SubmitOrder {
            trader_id,
            strategy_id,
            order,
            command_id: Uuid::new_v4(),
            ts_init_ns,
        }
    }

    pub fn submit_bracket_order(
        trader_id: TraderId,
        strategy_id: StrategyId,
        bracket: BracketOrder,
        ts_init_ns: u64,
    ) -> Self {
        TradingCommand::SubmitBracketOrder {
            trader_id,
            strategy_id,
            bracket,
            command_id: Uuid::new_v4(),
            ts_init_ns,
        }
    }

    pub fn cancel_order(
        trader_id: TraderId,
        strategy_id: StrategyId,
        instrument_id: InstrumentId,
        client_order_id: ClientOrderId,
        ts_init_ns: u64,
    ) -> Self {
        TradingCommand::CancelOrder {
            trader_id,
            strategy_id,
            instrument_id,
            client_order_id,
            command_id: Uuid::new_v4(),
            ts_init_ns,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn update_order(
        trader_id: TraderId,
        strategy_id: StrategyId,
        instrument_id: InstrumentId,
        client_order_id: ClientOrderId,
        quantity: Quantity,
        price: Option<Price>,
        ts_init_ns: u64,
    ) -> Self {
        TradingCommand::UpdateOrder {
            trader_id,
            strategy_id,
            instrument_id,
            client_order_id,
            quantity,
            price,
            command_id: Uuid::new_v4(),
            ts_init_ns,
        }
    }
}
