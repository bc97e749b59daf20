use crate::model::{
    commands::{BracketOrder, TradingCommand},
    data::{Bar, OrderBookDelta, QuoteTick, TradeTick},
    events::Event,
    identifiers::{ClientOrderId, InstrumentId, StrategyId, TraderId},
    order::{Order, OrderFactory},
};

/// The surface a strategy uses to act on the platform: an order factory and
/// a command buffer the hosting engine flushes through the execution engine.
pub struct StrategyContext<'a> {
    trader_id: TraderId,
    strategy_id: StrategyId,
    now_ns: u64,
    factory: &'a mut OrderFactory,
    commands: &'a mut Vec<TradingCommand>,
}

impl<'a> StrategyContext<'a> {
    pub fn new(
        trader_id: TraderId,
        strategy_id: StrategyId,
        now_ns: u64,
        factory: &'a mut OrderFactory,
        commands: &'a mut Vec<TradingCommand>,
    ) -> Self {
        Self {
            trader_id,
            strategy_id,
            now_ns,
            factory,
            commands,
        }
    }

    pub fn timestamp_ns(&self) -> u64 {
        self.now_ns
    }

    pub fn order_factory(&mut self) -> &mut OrderFactory {
        self.factory
    }

    pub fn submit_order(&mut self, order: Order) {
        self.commands.push(TradingCommand::submit_order(
            self.trader_id.clone(),
            self.strategy_id.clone(),
            order,
            self.now_ns,
        ));
    }

    pub fn submit_bracket_order(&mut self, bracket: BracketOrder) {
        self.commands.push(TradingCommand::submit_bracket_order(
            self.trader_id.clone(),
            self.strategy_id.clone(),
            bracket,
            self.now_ns,
        ));
    }

    pub fn cancel_order(&mut self, instrument_id: InstrumentId, client_order_id: ClientOrderId) {
        self.commands.push(TradingCommand::cancel_order(
            self.trader_id.clone(),
            self.strategy_id.clone(),
            instrument_id,
            client_order_id,
            self.now_ns,
        ));
    }
}

/// A trading strategy driven by the engine's event pipeline.
///
/// All handlers default to no-ops; implement the ones the strategy needs.
pub trait Strategy {
    fn on_start(&mut self, _ctx: &mut StrategyContext<'_>) {}

    fn on_quote_tick(&mut self, _tick: &QuoteTick, _ctx: &mut StrategyContext<'_>) {}

    fn on_trade_tick(&mut self, _tick: &TradeTick, _ctx: &mut StrategyContext<'_>) {}

    fn on_bar(&mut self, _bar: &Bar, _ctx: &mut StrategyContext<'_>) {}

    fn on_book_delta(&mut self, _delta: &OrderBookDelta, _ctx: &mut StrategyContext<'_>) {}

    fn on_event(&mut self, _event: &Event, _ctx: &mut StrategyContext<'_>) {}

    fn on_stop(&mut self, _ctx: &mut StrategyContext<'_>) {}
}
