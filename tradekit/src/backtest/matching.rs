use indexmap::IndexMap;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::debug;
use uuid::Uuid;

use crate::{
    backtest::models::FillModel,
    book::{BookOrder, OrderBook},
    model::{
        data::{QuoteTick, TradeTick},
        enums::{LiquiditySide, OrderSide, OrderType, TimeInForce},
        events::Event,
        identifiers::{AccountId, ClientOrderId, ExecutionId, VenueOrderId},
        instrument::Instrument,
        order::{ExpiryPolicy, Order},
        value::{Money, Price, Quantity},
    },
};

/// Configuration for a simulated venue.
#[derive(Clone, Debug, Default)]
pub struct MatchingEngineConfig {
    /// When set, DAY orders expire once the replay reaches this timestamp.
    pub session_close_ns: Option<u64>,
}

/// A simulated venue for one instrument.
///
/// The engine owns the instrument's market book (rebuilt from replayed
/// quotes), the strategy's resting limit orders and armed stops, and a
/// seeded [`FillModel`]. Incoming commands arrive from the execution engine;
/// market data moves the book and works resting orders. Every call returns
/// the events it generated, in order.
///
/// **Conditions for execution**
///
/// A buy is marketable while its price is at or above the best ask; a sell
/// while its price is at or below the best bid. Resting orders fill as maker
/// at their own price when the market touches it, subject to the fill
/// model's `prob_fill_at_limit`. Stops arm until the market crosses the
/// trigger, subject to `prob_fill_at_stop`, then convert to market or limit.
/// Market executions slip one tick adverse when the slippage draw succeeds.
pub struct MatchingEngine {
    instrument: Instrument,
    account_id: AccountId,
    book: OrderBook,
    fill_model: FillModel,
    config: MatchingEngineConfig,
    // Resting limit orders and armed stops, in arrival order.
    core: IndexMap<ClientOrderId, Order>,
    stops: IndexMap<ClientOrderId, Order>,
    last_px: Option<Price>,
    venue_order_count: u64,
    execution_count: u64,
    id_rng: StdRng,
}

impl MatchingEngine {
    pub fn new(
        instrument: Instrument,
        account_id: AccountId,
        fill_model: FillModel,
        random_seed: u64,
        config: MatchingEngineConfig,
    ) -> Self {
        let book = OrderBook::new(
            instrument.id.clone(),
            instrument.price_precision,
            instrument.size_precision,
        );
        Self {
            instrument,
            account_id,
            book,
            fill_model,
            config,
            core: IndexMap::new(),
            stops: IndexMap::new(),
            last_px: None,
            venue_order_count: 0,
            execution_count: 0,
            id_rng: StdRng::seed_from_u64(random_seed),
        }
    }

    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    /// Working (resting or armed) order count, for report assertions.
    pub fn open_order_count(&self) -> usize {
        self.core.len() + self.stops.len()
    }

    fn next_event_id(&mut self) -> Uuid {
        let bytes: [u8; 16] = self.id_rng.gen();
        uuid::Builder::from_random_bytes(bytes).into_uuid()
    }

    fn next_venue_order_id(&mut self) -> VenueOrderId {
        self.venue_order_count += 1;
        VenueOrderId::new(format!("V-{}", self.venue_order_count))
    }

    fn next_execution_id(&mut self) -> ExecutionId {
        self.execution_count += 1;
        ExecutionId::new(format!("E-{}", self.execution_count))
    }

    fn stamp(&mut self, mut event: Event) -> Event {
        let id = self.next_event_id();
        event.set_event_id(id);
        event
    }

    fn zero_commission(&self) -> Money {
        Money::zero(self.instrument.quote_currency)
    }

    fn best_ask(&self) -> Option<Price> {
        self.book.best_ask_price()
    }

    fn best_bid(&self) -> Option<Price> {
        self.book.best_bid_price()
    }

    fn is_marketable(&self, side: OrderSide, price: Price) -> bool {
        match side {
            OrderSide::Buy => self.best_ask().map(|ask| price >= ask).unwrap_or(false),
            OrderSide::Sell => self.best_bid().map(|bid| price <= bid).unwrap_or(false),
        }
    }

    fn walk_price(&self, side: OrderSide) -> Price {
        match side {
            OrderSide::Buy => Price::max(self.instrument.price_precision),
            OrderSide::Sell => Price::min(self.instrument.price_precision),
        }
    }

    fn adverse_tick(&self, side: OrderSide) -> i64 {
        match side {
            OrderSide::Buy => 1,
            OrderSide::Sell => -1,
        }
    }

    /// Emits a fill for the given portion and advances the order's state.
    fn fill(
        &mut self,
        order: &mut Order,
        last_px: Price,
        last_qty: Quantity,
        liquidity_side: LiquiditySide,
        ts_ns: u64,
        events: &mut Vec<Event>,
    ) {
        let execution_id = self.next_execution_id();
        let event = self.stamp(Event::order_filled(
            self.account_id.clone(),
            order.client_order_id.clone(),
            order
                .venue_order_id
                .clone()
                .expect("filled orders have been accepted"),
            execution_id,
            self.instrument.id.clone(),
            order.side,
            last_qty,
            last_px,
            order.filled_qty + last_qty,
            order.leaves_qty - last_qty,
            liquidity_side,
            self.zero_commission(),
            ts_ns,
        ));
        order
            .apply(&event)
            .expect("fill applies to a working order");
        events.push(event);
    }

    /// Walks the opposite side of the book, emitting taker fills while the
    /// price crosses. Market executions may slip one tick adverse.
    fn take_liquidity(
        &mut self,
        order: &mut Order,
        limit_price: Price,
        allow_slippage: bool,
        ts_ns: u64,
        events: &mut Vec<Event>,
    ) {
        let walk = BookOrder::with_id(
            order.client_order_id.as_str(),
            order.side,
            limit_price,
            order.leaves_qty,
        );
        let fills = self.book.simulate_fills(&walk);
        if fills.is_empty() {
            return;
        }
        let slip = allow_slippage && self.fill_model.is_slipped();
        let offset = self.adverse_tick(order.side);
        let tick_size = self.instrument.tick_size;
        for (price, qty) in fills {
            let px = if slip {
                price.offset_ticks(offset, tick_size)
            } else {
                price
            };
            self.fill(order, px, qty, LiquiditySide::Taker, ts_ns, events);
        }
    }

    /// Total opposite-side liquidity visible to the given price, for FOK
    /// checks.
    fn crossable_volume(&self, side: OrderSide, price: Price) -> rust_decimal::Decimal {
        match side {
            OrderSide::Buy => self.book.asks.crossable_volume(price),
            OrderSide::Sell => self.book.bids.crossable_volume(price),
        }
    }

    /// Processes a submit command from the execution engine.
    pub fn submit_order(&mut self, order: Order, ts_ns: u64) -> Vec<Event> {
        let mut events = Vec::new();
        let mut order = order;
        let submitted = self.stamp(Event::order_submitted(
            self.account_id.clone(),
            order.client_order_id.clone(),
            ts_ns,
        ));
        order
            .apply(&submitted)
            .expect("submit applies to an initialized order");
        events.push(submitted);

        if self.core.contains_key(&order.client_order_id)
            || self.stops.contains_key(&order.client_order_id)
        {
            events.push(self.stamp(Event::order_rejected(
                self.account_id.clone(),
                order.client_order_id.clone(),
                "duplicate client order id",
                ts_ns,
            )));
            return events;
        }

        match order.order_type {
            OrderType::Market => self.submit_market(order, ts_ns, &mut events),
            OrderType::Limit => self.submit_limit(order, ts_ns, &mut events),
            OrderType::StopMarket | OrderType::StopLimit => {
                self.submit_stop(order, ts_ns, &mut events)
            }
        }
        events
    }

    fn accept(&mut self, order: &mut Order, ts_ns: u64, events: &mut Vec<Event>) {
        let venue_order_id = self.next_venue_order_id();
        let event = self.stamp(Event::order_accepted(
            self.account_id.clone(),
            order.client_order_id.clone(),
            venue_order_id,
            ts_ns,
        ));
        order.apply(&event).expect("accept applies after submit");
        events.push(event);
    }

    fn reject(
        &mut self,
        order: &Order,
        reason: &str,
        ts_ns: u64,
        events: &mut Vec<Event>,
    ) {
        debug!(
            client_order_id = %order.client_order_id,
            reason,
            "order rejected"
        );
        events.push(self.stamp(Event::order_rejected(
            self.account_id.clone(),
            order.client_order_id.clone(),
            reason,
            ts_ns,
        )));
    }

    fn cancel_remainder(&mut self, order: &Order, ts_ns: u64, events: &mut Vec<Event>) {
        events.push(self.stamp(Event::order_cancelled(
            self.account_id.clone(),
            order.client_order_id.clone(),
            order.venue_order_id.clone(),
            ts_ns,
        )));
    }

    fn submit_market(&mut self, mut order: Order, ts_ns: u64, events: &mut Vec<Event>) {
        let opposite_empty = match order.side {
            OrderSide::Buy => self.best_ask().is_none(),
            OrderSide::Sell => self.best_bid().is_none(),
        };
        if opposite_empty {
            self.reject(&order, "no market for instrument", ts_ns, events);
            return;
        }
        self.accept(&mut order, ts_ns, events);
        let walk = self.walk_price(order.side);
        self.take_liquidity(&mut order, walk, true, ts_ns, events);
        if !order.leaves_qty.is_zero() {
            // Book exhausted: the unfilled remainder cannot rest.
            self.cancel_remainder(&order, ts_ns, events);
        }
    }

    fn submit_limit(&mut self, mut order: Order, ts_ns: u64, events: &mut Vec<Event>) {
        let price = order.price.expect("limit orders carry a price");
        match order.time_in_force {
            TimeInForce::Fok => {
                let available = self.crossable_volume(order.side, price);
                if available < order.quantity.value() {
                    self.reject(
                        &order,
                        "FOK order could not be filled in full",
                        ts_ns,
                        events,
                    );
                    return;
                }
                self.accept(&mut order, ts_ns, events);
                self.take_liquidity(&mut order, price, false, ts_ns, events);
            }
            TimeInForce::Ioc => {
                self.accept(&mut order, ts_ns, events);
                self.take_liquidity(&mut order, price, false, ts_ns, events);
                if !order.leaves_qty.is_zero() {
                    self.cancel_remainder(&order, ts_ns, events);
                }
            }
            _ => {
                self.accept(&mut order, ts_ns, events);
                if self.is_marketable(order.side, price) {
                    self.take_liquidity(&mut order, price, false, ts_ns, events);
                }
                if !order.leaves_qty.is_zero() {
                    self.core.insert(order.client_order_id.clone(), order);
                }
            }
        }
    }

    fn submit_stop(&mut self, mut order: Order, ts_ns: u64, events: &mut Vec<Event>) {
        let trigger = order.trigger.expect("stop orders carry a trigger");
        // A stop whose trigger is already inside the market is invalid at
        // the venue.
        let already_triggered = match order.side {
            OrderSide::Buy => self.best_ask().map(|ask| trigger <= ask).unwrap_or(false),
            OrderSide::Sell => self.best_bid().map(|bid| trigger >= bid).unwrap_or(false),
        };
        if already_triggered {
            self.reject(&order, "stop trigger already in the market", ts_ns, events);
            return;
        }
        self.accept(&mut order, ts_ns, events);
        self.stops.insert(order.client_order_id.clone(), order);
    }

    /// Processes a cancel command for a resting or armed order.
    pub fn cancel_order(&mut self, client_order_id: &ClientOrderId, ts_ns: u64) -> Vec<Event> {
        let mut events = Vec::new();
        let order = self
            .core
            .shift_remove(client_order_id)
            .or_else(|| self.stops.shift_remove(client_order_id));
        match order {
            Some(order) => {
                events.push(self.stamp(Event::order_cancelled(
                    self.account_id.clone(),
                    order.client_order_id.clone(),
                    order.venue_order_id.clone(),
                    ts_ns,
                )));
            }
            None => {
                events.push(self.stamp(Event::order_cancel_rejected(
                    self.account_id.clone(),
                    client_order_id.clone(),
                    "order not found",
                    ts_ns,
                )));
            }
        }
        events
    }

    /// Processes an update command, adjusting quantity and price in place.
    pub fn update_order(
        &mut self,
        client_order_id: &ClientOrderId,
        quantity: Quantity,
        price: Option<Price>,
        ts_ns: u64,
    ) -> Vec<Event> {
        let mut events = Vec::new();
        let found = self
            .core
            .get_mut(client_order_id)
            .or_else(|| self.stops.get_mut(client_order_id));
        match found {
            Some(order) => {
                order.quantity = quantity;
                order.leaves_qty = quantity.saturating_sub(order.filled_qty);
                if order.price.is_some() && price.is_some() {
                    order.price = price;
                }
                let venue_order_id = order.venue_order_id.clone();
                let event = self.stamp(Event::OrderUpdated {
                    account_id: self.account_id.clone(),
                    client_order_id: client_order_id.clone(),
                    venue_order_id,
                    quantity,
                    price,
                    event_id: Uuid::nil(),
                    ts_event_ns: ts_ns,
                });
                events.push(event);
            }
            None => {
                events.push(self.stamp(Event::OrderUpdateRejected {
                    account_id: self.account_id.clone(),
                    client_order_id: client_order_id.clone(),
                    reason: "order not found".to_string(),
                    event_id: Uuid::nil(),
                    ts_event_ns: ts_ns,
                }));
            }
        }
        events
    }

    /// Moves the market book from a quote and works resting orders.
    pub fn process_quote_tick(&mut self, tick: &QuoteTick) -> Vec<Event> {
        let mut events = Vec::new();
        self.book.apply_quote_tick(tick);
        if let Err(crossed) = self.book.check_integrity() {
            events.push(self.stamp(Event::book_integrity(
                crossed.instrument_id,
                crossed.best_bid,
                crossed.best_ask,
                tick.ts_event_ns,
            )));
        }
        self.work_orders(tick.ts_event_ns, &mut events);
        events
    }

    /// Records the last trade price and works resting orders against it.
    pub fn process_trade_tick(&mut self, tick: &TradeTick) -> Vec<Event> {
        let mut events = Vec::new();
        self.last_px = Some(tick.price);
        self.work_orders(tick.ts_event_ns, &mut events);
        events
    }

    fn work_orders(&mut self, ts_ns: u64, events: &mut Vec<Event>) {
        self.expire_orders(ts_ns, events);
        self.trigger_stops(ts_ns, events);
        self.fill_touched_limits(ts_ns, events);
    }

    fn is_expired(&self, order: &Order, ts_ns: u64) -> bool {
        match order.expiry_policy() {
            ExpiryPolicy::Gtd(expire_ns) => ts_ns >= expire_ns,
            ExpiryPolicy::Day => self
                .config
                .session_close_ns
                .map(|close| ts_ns >= close)
                .unwrap_or(false),
            ExpiryPolicy::None => false,
        }
    }

    fn expire_orders(&mut self, ts_ns: u64, events: &mut Vec<Event>) {
        let expired: Vec<ClientOrderId> = self
            .core
            .values()
            .chain(self.stops.values())
            .filter(|order| self.is_expired(order, ts_ns))
            .map(|order| order.client_order_id.clone())
            .collect();
        for client_order_id in expired {
            let order = self
                .core
                .shift_remove(&client_order_id)
                .or_else(|| self.stops.shift_remove(&client_order_id))
                .expect("expired order was collected from the maps");
            events.push(self.stamp(Event::order_expired(
                self.account_id.clone(),
                order.client_order_id.clone(),
                order.venue_order_id.clone(),
                ts_ns,
            )));
        }
    }

    fn stop_is_triggered(&self, order: &Order) -> bool {
        let trigger = order.trigger.expect("stops carry a trigger");
        match order.side {
            OrderSide::Buy => {
                self.best_ask().map(|ask| ask >= trigger).unwrap_or(false)
                    || self.last_px.map(|px| px >= trigger).unwrap_or(false)
            }
            OrderSide::Sell => {
                self.best_bid().map(|bid| bid <= trigger).unwrap_or(false)
                    || self.last_px.map(|px| px <= trigger).unwrap_or(false)
            }
        }
    }

    fn trigger_stops(&mut self, ts_ns: u64, events: &mut Vec<Event>) {
        let candidates: Vec<ClientOrderId> = self
            .stops
            .values()
            .filter(|order| self.stop_is_triggered(order))
            .map(|order| order.client_order_id.clone())
            .collect();

        for client_order_id in candidates {
            if !self.fill_model.is_stop_filled() {
                // The touch was not enough; the stop stays armed.
                continue;
            }
            let mut order = self
                .stops
                .shift_remove(&client_order_id)
                .expect("triggered stop was collected from the map");
            match order.order_type {
                OrderType::StopMarket => {
                    let walk = self.walk_price(order.side);
                    self.take_liquidity(&mut order, walk, true, ts_ns, events);
                    if !order.leaves_qty.is_zero() {
                        self.cancel_remainder(&order, ts_ns, events);
                    }
                }
                OrderType::StopLimit => {
                    let price = order.price.expect("stop-limits carry a price");
                    if self.is_marketable(order.side, price) {
                        self.take_liquidity(&mut order, price, false, ts_ns, events);
                    }
                    if !order.leaves_qty.is_zero() {
                        self.core.insert(order.client_order_id.clone(), order);
                    }
                }
                _ => unreachable!("only stops are armed"),
            }
        }
    }

    fn limit_is_touched(&self, order: &Order) -> bool {
        let price = order.price.expect("resting orders carry a price");
        match order.side {
            OrderSide::Buy => {
                self.best_ask().map(|ask| ask <= price).unwrap_or(false)
                    || self.last_px.map(|px| px <= price).unwrap_or(false)
            }
            OrderSide::Sell => {
                self.best_bid().map(|bid| bid >= price).unwrap_or(false)
                    || self.last_px.map(|px| px >= price).unwrap_or(false)
            }
        }
    }

    fn fill_touched_limits(&mut self, ts_ns: u64, events: &mut Vec<Event>) {
        let candidates: Vec<ClientOrderId> = self
            .core
            .values()
            .filter(|order| self.limit_is_touched(order))
            .map(|order| order.client_order_id.clone())
            .collect();

        for client_order_id in candidates {
            if !self.fill_model.is_limit_filled() {
                continue;
            }
            let mut order = self
                .core
                .shift_remove(&client_order_id)
                .expect("touched limit was collected from the map");
            let price = order.price.expect("resting orders carry a price");
            let leaves = order.leaves_qty;
            self.fill(&mut order, price, leaves, LiquiditySide::Maker, ts_ns, events);
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::model::{
        identifiers::{InstrumentId, StrategyId, Symbol, Venue},
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

    fn engine_with(fill_model: FillModel) -> MatchingEngine {
        MatchingEngine::new(
            audusd(),
            AccountId::new("SIM-001"),
            fill_model,
            42,
            MatchingEngineConfig::default(),
        )
    }

    fn engine() -> MatchingEngine {
        engine_with(FillModel::default())
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

    fn market_order(id: &str, side: OrderSide, qty: Decimal) -> Order {
        Order::market(
            ClientOrderId::new(id),
            StrategyId::new("S-001"),
            audusd().id,
            side,
            Quantity::new(qty, 0).unwrap(),
            Uuid::new_v4(),
            0,
        )
        .unwrap()
    }

    fn limit_order(id: &str, side: OrderSide, qty: Decimal, price: Decimal, tif: TimeInForce) -> Order {
        Order::limit(
            ClientOrderId::new(id),
            StrategyId::new("S-001"),
            audusd().id,
            side,
            Quantity::new(qty, 0).unwrap(),
            Price::new(price, 5).unwrap(),
            tif,
            if tif == TimeInForce::Gtd { Some(100) } else { None },
            Uuid::new_v4(),
            0,
        )
        .unwrap()
    }

    fn kinds(events: &[Event]) -> Vec<&'static str> {
        events.iter().map(|e| e.type_name()).collect()
    }

    #[test]
    fn market_order_fills_at_best_ask() {
        let mut engine = engine();
        engine.process_quote_tick(&quote(dec!(1.00000), dec!(1.00010), 1));

        let events = engine.submit_order(market_order("O-1", OrderSide::Buy, dec!(100)), 2);
        assert_eq!(
            kinds(&events),
            vec!["OrderSubmitted", "OrderAccepted", "OrderFilled"]
        );
        match &events[2] {
            Event::OrderFilled {
                last_px, leaves_qty, liquidity_side, ..
            } => {
                assert_eq!(last_px.value(), dec!(1.00010));
                assert!(leaves_qty.is_zero());
                assert_eq!(*liquidity_side, LiquiditySide::Taker);
            }
            other => panic!("expected fill, got {other:?}"),
        }
    }

    #[test]
    fn market_order_without_market_is_rejected() {
        let mut engine = engine();
        let events = engine.submit_order(market_order("O-1", OrderSide::Buy, dec!(100)), 1);
        assert_eq!(kinds(&events), vec!["OrderSubmitted", "OrderRejected"]);
    }

    #[test]
    fn market_order_slips_one_tick_adverse() {
        let mut engine = engine_with(FillModel::new(1.0, 1.0, 1.0, 7).unwrap());
        engine.process_quote_tick(&quote(dec!(1.00000), dec!(1.00010), 1));

        let events = engine.submit_order(market_order("O-1", OrderSide::Buy, dec!(100)), 2);
        match &events[2] {
            Event::OrderFilled { last_px, .. } => {
                assert_eq!(last_px.value(), dec!(1.00011));
            }
            other => panic!("expected fill, got {other:?}"),
        }
    }

    #[test]
    fn fok_without_full_liquidity_is_rejected_without_fills() {
        let mut engine = engine();
        engine.process_quote_tick(&quote(dec!(1.00000), dec!(1.00010), 1));

        let order = limit_order("O-1", OrderSide::Buy, dec!(2000000), dec!(1.00010), TimeInForce::Fok);
        let events = engine.submit_order(order, 2);
        assert_eq!(kinds(&events), vec!["OrderSubmitted", "OrderRejected"]);
    }

    #[test]
    fn ioc_fills_available_and_cancels_remainder() {
        let mut engine = engine();
        engine.process_quote_tick(&quote(dec!(1.00000), dec!(1.00010), 1));

        let order = limit_order("O-1", OrderSide::Buy, dec!(2000000), dec!(1.00010), TimeInForce::Ioc);
        let events = engine.submit_order(order, 2);
        assert_eq!(
            kinds(&events),
            vec![
                "OrderSubmitted",
                "OrderAccepted",
                "OrderFilled",
                "OrderCancelled"
            ]
        );
        match &events[2] {
            Event::OrderFilled { last_qty, .. } => assert_eq!(last_qty.value(), dec!(1000000)),
            other => panic!("expected fill, got {other:?}"),
        }
    }

    #[test]
    fn passive_limit_rests_then_fills_as_maker_when_touched() {
        let mut engine = engine();
        engine.process_quote_tick(&quote(dec!(1.00000), dec!(1.00010), 1));

        let order = limit_order("O-1", OrderSide::Buy, dec!(100), dec!(0.99990), TimeInForce::Gtc);
        let events = engine.submit_order(order, 2);
        assert_eq!(kinds(&events), vec!["OrderSubmitted", "OrderAccepted"]);
        assert_eq!(engine.open_order_count(), 1);

        // Market trades down through the limit.
        let events = engine.process_quote_tick(&quote(dec!(0.99980), dec!(0.99990), 3));
        assert_eq!(kinds(&events), vec!["OrderFilled"]);
        match &events[0] {
            Event::OrderFilled {
                last_px, liquidity_side, ..
            } => {
                assert_eq!(last_px.value(), dec!(0.99990));
                assert_eq!(*liquidity_side, LiquiditySide::Maker);
            }
            other => panic!("expected fill, got {other:?}"),
        }
        assert_eq!(engine.open_order_count(), 0);
    }

    #[test]
    fn stop_market_arms_then_triggers_on_trade() {
        let mut engine = engine();
        engine.process_quote_tick(&quote(dec!(1.00000), dec!(1.00010), 1));

        let order = Order::stop_market(
            ClientOrderId::new("O-1"),
            StrategyId::new("S-001"),
            audusd().id,
            OrderSide::Buy,
            Quantity::new(dec!(100), 0).unwrap(),
            Price::new(dec!(1.00050), 5).unwrap(),
            TimeInForce::Gtc,
            None,
            Uuid::new_v4(),
            0,
        )
        .unwrap();
        let events = engine.submit_order(order, 2);
        assert_eq!(kinds(&events), vec!["OrderSubmitted", "OrderAccepted"]);

        // Not yet triggered.
        assert!(engine
            .process_quote_tick(&quote(dec!(1.00010), dec!(1.00020), 3))
            .is_empty());

        // The market crosses the trigger; the stop converts to market.
        let events = engine.process_quote_tick(&quote(dec!(1.00050), dec!(1.00060), 4));
        assert_eq!(kinds(&events), vec!["OrderFilled"]);
        match &events[0] {
            Event::OrderFilled { last_px, .. } => assert_eq!(last_px.value(), dec!(1.00060)),
            other => panic!("expected fill, got {other:?}"),
        }
    }

    #[test]
    fn stop_already_in_market_is_rejected() {
        let mut engine = engine();
        engine.process_quote_tick(&quote(dec!(1.00000), dec!(1.00010), 1));

        let order = Order::stop_market(
            ClientOrderId::new("O-1"),
            StrategyId::new("S-001"),
            audusd().id,
            OrderSide::Buy,
            Quantity::new(dec!(100), 0).unwrap(),
            Price::new(dec!(1.00005), 5).unwrap(),
            TimeInForce::Gtc,
            None,
            Uuid::new_v4(),
            0,
        )
        .unwrap();
        let events = engine.submit_order(order, 2);
        assert_eq!(kinds(&events), vec!["OrderSubmitted", "OrderRejected"]);
    }

    #[test]
    fn gtd_order_expires_at_its_expire_time() {
        let mut engine = engine();
        engine.process_quote_tick(&quote(dec!(1.00000), dec!(1.00010), 1));

        let order = limit_order("O-1", OrderSide::Buy, dec!(100), dec!(0.99990), TimeInForce::Gtd);
        engine.submit_order(order, 2);

        let events = engine.process_quote_tick(&quote(dec!(1.00000), dec!(1.00010), 100));
        assert_eq!(kinds(&events), vec!["OrderExpired"]);
        assert_eq!(engine.open_order_count(), 0);
    }

    #[test]
    fn day_order_expires_at_session_close() {
        let mut engine = MatchingEngine::new(
            audusd(),
            AccountId::new("SIM-001"),
            FillModel::default(),
            42,
            MatchingEngineConfig {
                session_close_ns: Some(50),
            },
        );
        engine.process_quote_tick(&quote(dec!(1.00000), dec!(1.00010), 1));

        let order = Order::limit(
            ClientOrderId::new("O-1"),
            StrategyId::new("S-001"),
            audusd().id,
            OrderSide::Buy,
            Quantity::new(dec!(100), 0).unwrap(),
            Price::new(dec!(0.99990), 5).unwrap(),
            TimeInForce::Day,
            None,
            Uuid::new_v4(),
            0,
        )
        .unwrap();
        engine.submit_order(order, 2);

        let events = engine.process_quote_tick(&quote(dec!(1.00000), dec!(1.00010), 60));
        assert_eq!(kinds(&events), vec!["OrderExpired"]);
    }

    #[test]
    fn cancel_resting_order() {
        let mut engine = engine();
        engine.process_quote_tick(&quote(dec!(1.00000), dec!(1.00010), 1));
        engine.submit_order(
            limit_order("O-1", OrderSide::Buy, dec!(100), dec!(0.99990), TimeInForce::Gtc),
            2,
        );

        let events = engine.cancel_order(&ClientOrderId::new("O-1"), 3);
        assert_eq!(kinds(&events), vec!["OrderCancelled"]);
        assert_eq!(engine.open_order_count(), 0);
    }

    #[test]
    fn cancel_unknown_order_is_rejected() {
        let mut engine = engine();
        let events = engine.cancel_order(&ClientOrderId::new("O-404"), 1);
        assert_eq!(kinds(&events), vec!["OrderCancelRejected"]);
    }

    #[test]
    fn crossed_quote_raises_book_integrity_event() {
        let mut engine = engine();
        let events = engine.process_quote_tick(&quote(dec!(1.00020), dec!(1.00010), 1));
        assert_eq!(kinds(&events), vec!["BookIntegrity"]);
    }

    #[test]
    fn identical_seeds_produce_identical_event_streams() {
        let run = || {
            let mut engine = engine_with(FillModel::new(0.5, 0.5, 0.5, 11).unwrap());
            let mut events = Vec::new();
            events.extend(engine.process_quote_tick(&quote(dec!(1.00000), dec!(1.00010), 1)));
            events.extend(engine.submit_order(
                limit_order("O-1", OrderSide::Buy, dec!(100), dec!(0.99990), TimeInForce::Gtc),
                2,
            ));
            events.extend(engine.submit_order(market_order("O-2", OrderSide::Sell, dec!(50)), 3));
            for ts in 4..20 {
                events.extend(engine.process_quote_tick(&quote(
                    dec!(0.99985),
                    dec!(0.99995),
                    ts,
                )));
            }
            events
        };
        assert_eq!(run(), run());
    }
}
