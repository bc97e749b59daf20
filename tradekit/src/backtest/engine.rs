use std::{
    cell::RefCell,
    collections::HashMap,
    rc::Rc,
};

use tracing::{debug, info};

use crate::{
    backtest::{
        matching::{MatchingEngine, MatchingEngineConfig},
        models::FillModel,
        report::{AccountReport, OrderFillsReport, PositionsReport},
        BacktestError,
    },
    client::{DataClient, ExecutionClient},
    clock::{Clock, TestClock},
    engine::{
        data::{DataCommand, DataEngine, DataEngineConfig},
        execution::{ExecutionEngine, ExecutionEngineConfig},
    },
    message::{DataKind, DataPayload, DataRequest, DataType},
    model::{
        account::Account,
        commands::TradingCommand,
        data::{Bar, MarketData, QuoteTick, TradeTick},
        events::Event,
        identifiers::{
            AccountId, ClientId, ClientOrderId, InstrumentId, StrategyId, TraderId, Venue,
        },
        instrument::Instrument,
        order::{Order, OrderFactory},
        value::{Price, Quantity},
    },
    strategy::{Strategy, StrategyContext},
};

/// Historical data for a run: instruments plus their tick and bar series.
#[derive(Clone, Debug, Default)]
pub struct BacktestDataContainer {
    instruments: Vec<Instrument>,
    quotes: Vec<QuoteTick>,
    trades: Vec<TradeTick>,
    bars: Vec<Bar>,
}

impl BacktestDataContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_instrument(&mut self, instrument: Instrument) {
        self.instruments.push(instrument);
    }

    pub fn add_quote_ticks(&mut self, ticks: Vec<QuoteTick>) {
        self.quotes.extend(ticks);
    }

    pub fn add_trade_ticks(&mut self, ticks: Vec<TradeTick>) {
        self.trades.extend(ticks);
    }

    pub fn add_bars(&mut self, bars: Vec<Bar>) {
        self.bars.extend(bars);
    }

    pub fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }

    /// Merges all series into one stream, stably sorted by event timestamp
    /// so same-timestamp records keep their insertion order.
    pub fn sorted_stream(&self) -> Vec<MarketData> {
        let mut stream: Vec<MarketData> = Vec::with_capacity(
            self.quotes.len() + self.trades.len() + self.bars.len(),
        );
        stream.extend(self.quotes.iter().cloned().map(MarketData::Quote));
        stream.extend(self.trades.iter().cloned().map(MarketData::Trade));
        stream.extend(self.bars.iter().cloned().map(MarketData::Bar));
        stream.sort_by_key(|data| data.ts_event_ns());
        stream
    }
}

/// Serves historical data requests out of the run's data container.
struct BacktestDataClient {
    client_id: ClientId,
    container: BacktestDataContainer,
}

impl DataClient for BacktestDataClient {
    fn client_id(&self) -> ClientId {
        self.client_id.clone()
    }

    fn connect(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn disconnect(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn subscribe(&mut self, _data_type: &DataType) -> anyhow::Result<()> {
        // The replay loop pushes everything; subscription state lives in the
        // data engine.
        Ok(())
    }

    fn unsubscribe(&mut self, _data_type: &DataType) -> anyhow::Result<()> {
        Ok(())
    }

    fn request(&mut self, request: &DataRequest) -> anyhow::Result<Option<DataPayload>> {
        let instrument_id = request.data_type.get("InstrumentId");
        let limit: usize = request
            .data_type
            .get("Limit")
            .and_then(|value| value.parse().ok())
            .unwrap_or(usize::MAX);
        let payload = match request.data_type.kind {
            DataKind::Instrument => DataPayload::Instruments(
                self.container
                    .instruments
                    .iter()
                    .filter(|i| {
                        instrument_id
                            .map(|id| i.id.to_string() == id)
                            .unwrap_or(true)
                    })
                    .cloned()
                    .collect(),
            ),
            DataKind::QuoteTick => DataPayload::QuoteTicks(
                self.container
                    .quotes
                    .iter()
                    .filter(|t| {
                        instrument_id
                            .map(|id| t.instrument_id.to_string() == id)
                            .unwrap_or(true)
                    })
                    .take(limit)
                    .cloned()
                    .collect(),
            ),
            DataKind::TradeTick => DataPayload::TradeTicks(
                self.container
                    .trades
                    .iter()
                    .filter(|t| {
                        instrument_id
                            .map(|id| t.instrument_id.to_string() == id)
                            .unwrap_or(true)
                    })
                    .take(limit)
                    .cloned()
                    .collect(),
            ),
            _ => DataPayload::Empty,
        };
        Ok(Some(payload))
    }
}

type SharedMatching = Rc<RefCell<HashMap<InstrumentId, MatchingEngine>>>;

/// Routes execution commands to the simulated matching engines of one venue.
struct BacktestExecutionClient {
    venue: Venue,
    account_id: AccountId,
    matching: SharedMatching,
    // Which matching engine owns each order, for cancel/update routing.
    order_index: HashMap<ClientOrderId, InstrumentId>,
}

impl ExecutionClient for BacktestExecutionClient {
    fn client_id(&self) -> ClientId {
        ClientId::new(self.venue.as_str())
    }

    fn account_id(&self) -> AccountId {
        self.account_id.clone()
    }

    fn venue(&self) -> Venue {
        self.venue.clone()
    }

    fn connect(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn disconnect(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn submit_order(&mut self, order: Order, ts_ns: u64) -> anyhow::Result<Vec<Event>> {
        let instrument_id = order.instrument_id.clone();
        let client_order_id = order.client_order_id.clone();
        let mut matching = self.matching.borrow_mut();
        let engine = matching
            .get_mut(&instrument_id)
            .ok_or_else(|| anyhow::anyhow!("no matching engine for {instrument_id}"))?;
        self.order_index.insert(client_order_id, instrument_id);
        Ok(engine.submit_order(order, ts_ns))
    }

    fn update_order(
        &mut self,
        client_order_id: &ClientOrderId,
        quantity: Quantity,
        price: Option<Price>,
        ts_ns: u64,
    ) -> anyhow::Result<Vec<Event>> {
        match self.order_index.get(client_order_id) {
            Some(instrument_id) => {
                let mut matching = self.matching.borrow_mut();
                let engine = matching
                    .get_mut(instrument_id)
                    .ok_or_else(|| anyhow::anyhow!("no matching engine for {instrument_id}"))?;
                Ok(engine.update_order(client_order_id, quantity, price, ts_ns))
            }
            None => Ok(vec![Event::OrderUpdateRejected {
                account_id: self.account_id.clone(),
                client_order_id: client_order_id.clone(),
                reason: "order not found".to_string(),
                event_id: uuid::Uuid::new_v4(),
                ts_event_ns: ts_ns,
            }]),
        }
    }

    fn cancel_order(
        &mut self,
        client_order_id: &ClientOrderId,
        ts_ns: u64,
    ) -> anyhow::Result<Vec<Event>> {
        match self.order_index.get(client_order_id) {
            Some(instrument_id) => {
                let mut matching = self.matching.borrow_mut();
                let engine = matching
                    .get_mut(instrument_id)
                    .ok_or_else(|| anyhow::anyhow!("no matching engine for {instrument_id}"))?;
                Ok(engine.cancel_order(client_order_id, ts_ns))
            }
            None => Ok(vec![Event::order_cancel_rejected(
                self.account_id.clone(),
                client_order_id.clone(),
                "order not found",
                ts_ns,
            )]),
        }
    }
}

/// Configuration for a backtest run.
#[derive(Clone, Debug)]
pub struct BacktestEngineConfig {
    pub trader_id: TraderId,
    pub fill_model: FillModel,
    pub random_seed: u64,
    pub session_close_ns: Option<u64>,
    pub exec_config: ExecutionEngineConfig,
    pub data_config: DataEngineConfig,
    /// Starting balances per venue account.
    pub starting_accounts: Vec<Account>,
}

impl Default for BacktestEngineConfig {
    fn default() -> Self {
        Self {
            trader_id: TraderId::new("BACKTESTER-000"),
            fill_model: FillModel::default(),
            random_seed: 42,
            session_close_ns: None,
            exec_config: ExecutionEngineConfig::default(),
            data_config: DataEngineConfig::default(),
            starting_accounts: Vec::new(),
        }
    }
}

/// Everything a finished run produces.
#[derive(Debug)]
pub struct BacktestResults {
    /// The full event stream, in emission order.
    pub events: Vec<Event>,
    pub fills: OrderFillsReport,
    pub positions: PositionsReport,
    pub account: AccountReport,
    pub iterations: usize,
}

struct StrategyHandle {
    strategy_id: StrategyId,
    strategy: Box<dyn Strategy>,
    factory: OrderFactory,
}

/// Orchestrates a deterministic replay: the test clock, the data and
/// execution engines, one matching engine per instrument, and the
/// strategies.
///
/// Per tick: timer alerts with `trigger <= tick ts` fire first in timestamp
/// order, the venue's matching engine consumes the tick (working resting
/// orders), the data engine caches and fans out to strategies, and strategy
/// commands flush through the execution engine back into the venue until
/// quiescent. Identical inputs and seed give an identical run.
pub struct BacktestEngine {
    clock: Rc<RefCell<TestClock>>,
    config: BacktestEngineConfig,
    container: BacktestDataContainer,
    data_engine: DataEngine,
    exec_engine: ExecutionEngine,
    matching: SharedMatching,
    strategies: Vec<StrategyHandle>,
    pending_data: Rc<RefCell<Vec<MarketData>>>,
    command_buffer: Vec<TradingCommand>,
    event_log: Vec<Event>,
}

impl BacktestEngine {
    pub fn new(
        container: BacktestDataContainer,
        config: BacktestEngineConfig,
    ) -> Result<Self, BacktestError> {
        if container.instruments.is_empty() {
            return Err(BacktestError::InvalidConfiguration(
                "at least one instrument is required".to_string(),
            ));
        }

        let clock = Rc::new(RefCell::new(TestClock::new()));
        let mut data_engine = DataEngine::new(clock.clone(), config.data_config.clone());
        let mut exec_engine = ExecutionEngine::new(clock.clone(), config.exec_config.clone());

        // Freeze instrument registrations and build one matching engine per
        // instrument.
        let mut matching = HashMap::new();
        let mut venues: Vec<Venue> = Vec::new();
        for instrument in &container.instruments {
            data_engine.register_instrument(instrument.clone());
            exec_engine.register_instrument(instrument.clone());
            let venue = instrument.id.venue.clone();
            if !venues.contains(&venue) {
                venues.push(venue.clone());
            }
            matching.insert(
                instrument.id.clone(),
                MatchingEngine::new(
                    instrument.clone(),
                    account_id_for(&venue),
                    config.fill_model.clone(),
                    config.random_seed,
                    MatchingEngineConfig {
                        session_close_ns: config.session_close_ns,
                    },
                ),
            );
        }
        let matching: SharedMatching = Rc::new(RefCell::new(matching));

        for venue in venues {
            exec_engine.register_client(Box::new(BacktestExecutionClient {
                account_id: account_id_for(&venue),
                venue,
                matching: matching.clone(),
                order_index: HashMap::new(),
            }));
        }
        for account in &config.starting_accounts {
            exec_engine.register_account(account.clone());
        }

        data_engine.register_client(Box::new(BacktestDataClient {
            client_id: ClientId::new("BACKTEST"),
            container: container.clone(),
        }));
        let pending_data: Rc<RefCell<Vec<MarketData>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = pending_data.clone();
        data_engine.set_data_handler(move |data| sink.borrow_mut().push(data.clone()));

        Ok(Self {
            clock,
            config,
            container,
            data_engine,
            exec_engine,
            matching,
            strategies: Vec::new(),
            pending_data,
            command_buffer: Vec::new(),
            event_log: Vec::new(),
        })
    }

    pub fn add_strategy(&mut self, strategy_id: StrategyId, strategy: Box<dyn Strategy>) {
        let factory = OrderFactory::new(self.config.trader_id.clone(), strategy_id.clone());
        self.strategies.push(StrategyHandle {
            strategy_id,
            strategy,
            factory,
        });
    }

    /// Read access to the data engine (caches, subscriptions) for assertions
    /// and strategy plumbing.
    pub fn data_engine(&self) -> &DataEngine {
        &self.data_engine
    }

    pub fn execution_engine(&self) -> &ExecutionEngine {
        &self.exec_engine
    }

    /// Runs the replay to completion and produces the reports.
    pub fn run(mut self) -> Result<BacktestResults, BacktestError> {
        let stream = self.container.sorted_stream();
        if stream.is_empty() {
            return Err(BacktestError::NoData);
        }
        info!(
            instruments = self.container.instruments.len(),
            records = stream.len(),
            "backtest starting"
        );

        self.data_engine.start().map_err(lifecycle_error)?;
        self.exec_engine.start().map_err(lifecycle_error)?;

        let start_ns = stream.first().map(|d| d.ts_event_ns()).unwrap_or_default();
        self.clock.borrow_mut().set_time(start_ns);
        self.call_strategies(start_ns, |strategy, ctx| strategy.on_start(ctx));
        self.flush(start_ns);

        let mut iterations = 0;
        for data in stream {
            let ts_ns = data.ts_event_ns();
            iterations += 1;

            // Timer alerts due at or before this tick fire first, in
            // timestamp order.
            let handlers = self.clock.borrow_mut().advance_time(ts_ns);
            for handler in handlers {
                handler.handle();
            }

            // The venue sees the tick: book update, stop triggers, resting
            // fills, expiries.
            let venue_events = {
                let mut matching = self.matching.borrow_mut();
                match (&data, matching.get_mut(data.instrument_id())) {
                    (MarketData::Quote(tick), Some(engine)) => engine.process_quote_tick(tick),
                    (MarketData::Trade(tick), Some(engine)) => engine.process_trade_tick(tick),
                    _ => Vec::new(),
                }
            };
            self.exec_engine.process_events(venue_events);

            // The data engine caches and fans out to strategies.
            self.data_engine.send(DataCommand::Data(data));
            self.data_engine.run_until_idle();
            let pending: Vec<MarketData> = self.pending_data.borrow_mut().drain(..).collect();
            for data in pending {
                match &data {
                    MarketData::Quote(tick) => {
                        self.call_strategies(ts_ns, |strategy, ctx| strategy.on_quote_tick(tick, ctx))
                    }
                    MarketData::Trade(tick) => {
                        self.call_strategies(ts_ns, |strategy, ctx| strategy.on_trade_tick(tick, ctx))
                    }
                    MarketData::Bar(bar) => {
                        self.call_strategies(ts_ns, |strategy, ctx| strategy.on_bar(bar, ctx))
                    }
                    MarketData::Delta(delta) => self
                        .call_strategies(ts_ns, |strategy, ctx| strategy.on_book_delta(delta, ctx)),
                }
            }

            // Strategy commands flow through the execution engine into the
            // venue; resulting events fan back out until quiescent.
            self.flush(ts_ns);
        }

        let end_ns = self.clock.borrow().timestamp_ns();
        self.call_strategies(end_ns, |strategy, ctx| strategy.on_stop(ctx));
        self.flush(end_ns);

        self.data_engine.stop();
        self.exec_engine.stop();

        let fills = OrderFillsReport::from_events(&self.event_log);
        let positions = PositionsReport::from_positions(self.exec_engine.positions());
        let account = account_report(&self.exec_engine);
        info!(
            iterations,
            fills = fills.fills.len(),
            "backtest complete"
        );
        Ok(BacktestResults {
            events: self.event_log,
            fills,
            positions,
            account,
            iterations,
        })
    }

    fn call_strategies(
        &mut self,
        now_ns: u64,
        mut call: impl FnMut(&mut Box<dyn Strategy>, &mut StrategyContext<'_>),
    ) {
        for handle in self.strategies.iter_mut() {
            let StrategyHandle {
                strategy_id,
                strategy,
                factory,
            } = handle;
            let mut ctx = StrategyContext::new(
                self.config.trader_id.clone(),
                strategy_id.clone(),
                now_ns,
                factory,
                &mut self.command_buffer,
            );
            call(strategy, &mut ctx);
        }
    }

    /// Pumps commands and events until both are exhausted for this step.
    fn flush(&mut self, now_ns: u64) {
        loop {
            let events = self.exec_engine.drain_events();
            for event in &events {
                debug!(event = event.type_name(), "event");
            }
            self.event_log.extend(events.iter().cloned());
            for event in &events {
                self.call_strategies(now_ns, |strategy, ctx| strategy.on_event(event, ctx));
            }

            let commands: Vec<TradingCommand> = std::mem::take(&mut self.command_buffer);
            if commands.is_empty() && events.is_empty() {
                break;
            }
            for command in commands {
                self.exec_engine.execute(command);
            }
            self.exec_engine.run_until_idle();
        }
    }
}

fn account_id_for(venue: &Venue) -> AccountId {
    AccountId::new(format!("{venue}-001"))
}

fn lifecycle_error(err: crate::engine::LifecycleError) -> BacktestError {
    BacktestError::InvalidConfiguration(err.to_string())
}

fn account_report(exec_engine: &ExecutionEngine) -> AccountReport {
    let mut balances = Vec::new();
    // Deterministic report order regardless of account map layout.
    let mut orders: Vec<&Order> = exec_engine.orders().collect();
    orders.sort_by(|a, b| a.client_order_id.cmp(&b.client_order_id));
    let mut account_ids: Vec<AccountId> = orders
        .iter()
        .filter_map(|order| match exec_engine.last_event(&order.client_order_id) {
            Some(Event::OrderFilled { account_id, .. }) => Some(account_id.clone()),
            _ => None,
        })
        .collect();
    account_ids.sort();
    account_ids.dedup();
    for account_id in account_ids {
        if let Some(account) = exec_engine.account(&account_id) {
            for balance in account.balances() {
                balances.push((account_id.to_string(), balance));
            }
        }
    }
    AccountReport { balances }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::model::{
        enums::{OrderSide, OrderStatus},
        identifiers::Symbol,
        value::Currency,
    };

    fn audusd() -> Instrument {
        Instrument::new(
            InstrumentId::new(Symbol::new("AUD/USD"), Venue::new("SIM")),
            Currency::from_code("USD").unwrap(),
            5,
            0,
            dec!(0.00001),
            false,
        )
        .unwrap()
    }

    fn quote(bid: Decimal, ask: Decimal, ts: u64) -> QuoteTick {
        QuoteTick {
            instrument_id: audusd().id,
            bid: Price::new(bid, 5).unwrap(),
            ask: Price::new(ask, 5).unwrap(),
            bid_size: Quantity::new(dec!(1000000), 0).unwrap(),
            ask_size: Quantity::new(dec!(1000000), 0).unwrap(),
            ts_event_ns: ts,
        }
    }

    fn ramp_container() -> BacktestDataContainer {
        let mut container = BacktestDataContainer::new();
        container.add_instrument(audusd());
        container.add_quote_ticks(
            (0..20)
                .map(|i| {
                    let bid = dec!(1.00000) + Decimal::new(i, 5);
                    quote(bid, bid + dec!(0.00010), (i as u64 + 1) * 1_000)
                })
                .collect(),
        );
        container
    }

    /// Buys once on the first quote, sells everything on the tenth.
    struct BuyThenSell {
        instrument_id: InstrumentId,
        quantity: Quantity,
        quotes_seen: usize,
    }

    impl Strategy for BuyThenSell {
        fn on_quote_tick(&mut self, _tick: &QuoteTick, ctx: &mut StrategyContext<'_>) {
            self.quotes_seen += 1;
            if self.quotes_seen == 1 {
                let order = ctx
                    .order_factory()
                    .market(self.instrument_id.clone(), OrderSide::Buy, self.quantity, 0)
                    .expect("valid order");
                ctx.submit_order(order);
            } else if self.quotes_seen == 10 {
                let order = ctx
                    .order_factory()
                    .market(self.instrument_id.clone(), OrderSide::Sell, self.quantity, 0)
                    .expect("valid order");
                ctx.submit_order(order);
            }
        }
    }

    fn build_engine() -> BacktestEngine {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let mut engine = BacktestEngine::new(ramp_container(), BacktestEngineConfig::default())
            .expect("valid configuration");
        engine.add_strategy(
            StrategyId::new("S-001"),
            Box::new(BuyThenSell {
                instrument_id: audusd().id,
                quantity: Quantity::new(dec!(100), 0).unwrap(),
                quotes_seen: 0,
            }),
        );
        engine
    }

    #[test]
    fn round_trip_produces_fills_and_flat_position() {
        let results = build_engine().run().unwrap();

        assert_eq!(results.iterations, 20);
        assert_eq!(results.fills.fills.len(), 2);
        assert_eq!(results.fills.fills[0].side, OrderSide::Buy);
        assert_eq!(results.fills.fills[1].side, OrderSide::Sell);

        let position = &results.positions.positions[0];
        assert!(position.quantity.is_zero());
        // Bought at ask 1.00010, sold at bid 1.00009 nine pips higher.
        assert_eq!(position.realized_pnl, dec!(-0.00100));
    }

    #[test]
    fn identical_inputs_and_seed_give_identical_reports() {
        let a = build_engine().run().unwrap();
        let b = build_engine().run().unwrap();
        assert_eq!(a.fills, b.fills);
        assert_eq!(a.positions, b.positions);
        assert_eq!(a.account, b.account);
        assert_eq!(a.events.len(), b.events.len());
        let kinds = |results: &BacktestResults| {
            results
                .events
                .iter()
                .map(|e| e.type_name())
                .collect::<Vec<_>>()
        };
        assert_eq!(kinds(&a), kinds(&b));
    }

    #[test]
    fn empty_data_is_rejected() {
        let mut container = BacktestDataContainer::new();
        container.add_instrument(audusd());
        let engine = BacktestEngine::new(container, BacktestEngineConfig::default()).unwrap();
        assert!(matches!(engine.run(), Err(BacktestError::NoData)));
    }

    #[test]
    fn missing_instruments_are_rejected() {
        let container = BacktestDataContainer::new();
        assert!(matches!(
            BacktestEngine::new(container, BacktestEngineConfig::default()),
            Err(BacktestError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn two_strategies_trade_independently() {
        let mut engine = build_engine();
        engine.add_strategy(
            StrategyId::new("S-002"),
            Box::new(BuyThenSell {
                instrument_id: audusd().id,
                quantity: Quantity::new(dec!(50), 0).unwrap(),
                quotes_seen: 0,
            }),
        );
        let results = engine.run().unwrap();
        assert_eq!(results.fills.fills.len(), 4);
        assert_eq!(results.fills.total_volume(), dec!(300));
    }

    #[test]
    fn clock_advances_to_the_last_tick() {
        let engine = build_engine();
        let clock = engine.clock.clone();
        let _ = engine.run().unwrap();
        assert_eq!(clock.borrow().timestamp_ns(), 20_000);
    }
}
