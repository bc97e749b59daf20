use std::{
    cell::RefCell,
    collections::{HashMap, HashSet, VecDeque},
    rc::Rc,
};

use indexmap::IndexMap;
use rust_decimal::Decimal;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::{
    client::ExecutionClient,
    clock::Clock,
    engine::{Lifecycle, LifecycleError},
    model::{
        account::Account,
        commands::TradingCommand,
        events::Event,
        identifiers::{AccountId, ClientOrderId, InstrumentId, PositionId, Venue, VenueOrderId},
        instrument::Instrument,
        order::Order,
        position::Position,
        value::Money,
    },
};

/// Pre-trade risk limits applied before a command reaches a venue.
#[derive(Clone, Debug, Default)]
pub struct ExecutionEngineConfig {
    /// Orders above this quantity are denied.
    pub max_order_qty: Option<Decimal>,
}

/// A one-cancels-other link between two child orders.
#[derive(Debug)]
struct OcoLink {
    sibling: ClientOrderId,
}

/// The execution engine: a single-threaded cooperative consumer that routes
/// trading commands to execution clients and owns all order, position and
/// account state.
///
/// Order records are held in an arena keyed by client order id; venue order
/// ids map back to client order ids once assigned. Event application is
/// idempotent: duplicate deliveries are deduplicated by event id. Reads from
/// outside go through the query methods; no engine state is shared.
pub struct ExecutionEngine {
    lifecycle: Lifecycle,
    config: ExecutionEngineConfig,
    clock: Rc<RefCell<dyn Clock>>,
    clients: HashMap<Venue, Box<dyn ExecutionClient>>,
    instruments: HashMap<InstrumentId, Instrument>,
    orders: IndexMap<ClientOrderId, Order>,
    venue_index: HashMap<VenueOrderId, ClientOrderId>,
    positions: HashMap<InstrumentId, Position>,
    accounts: HashMap<AccountId, Account>,
    processed_events: HashSet<Uuid>,
    // Bracket children held locally until the entry fills.
    pending_children: HashMap<ClientOrderId, Vec<Order>>,
    oco_links: HashMap<ClientOrderId, OcoLink>,
    event_log: Vec<Event>,
    queue: VecDeque<TradingCommand>,
}

impl ExecutionEngine {
    pub fn new(clock: Rc<RefCell<dyn Clock>>, config: ExecutionEngineConfig) -> Self {
        Self {
            lifecycle: Lifecycle::new("ExecutionEngine"),
            config,
            clock,
            clients: HashMap::new(),
            instruments: HashMap::new(),
            orders: IndexMap::new(),
            venue_index: HashMap::new(),
            positions: HashMap::new(),
            accounts: HashMap::new(),
            processed_events: HashSet::new(),
            pending_children: HashMap::new(),
            oco_links: HashMap::new(),
            event_log: Vec::new(),
            queue: VecDeque::new(),
        }
    }

    pub fn start(&mut self) -> Result<(), LifecycleError> {
        self.lifecycle.start()
    }

    pub fn stop(&mut self) {
        self.lifecycle.stop()
    }

    pub fn reset(&mut self) -> Result<(), LifecycleError> {
        if self.lifecycle.reset()? {
            self.orders.clear();
            self.venue_index.clear();
            self.positions.clear();
            self.processed_events.clear();
            self.pending_children.clear();
            self.oco_links.clear();
            self.event_log.clear();
            self.queue.clear();
        }
        Ok(())
    }

    pub fn dispose(&mut self) {
        if self.lifecycle.dispose() {
            self.clients.clear();
        }
    }

    pub fn register_client(&mut self, client: Box<dyn ExecutionClient>) {
        let account_id = client.account_id();
        self.accounts
            .entry(account_id.clone())
            .or_insert_with(|| Account::new(account_id));
        self.clients.insert(client.venue(), client);
    }

    pub fn register_instrument(&mut self, instrument: Instrument) {
        self.instruments.insert(instrument.id.clone(), instrument);
    }

    pub fn register_account(&mut self, account: Account) {
        self.accounts.insert(account.id.clone(), account);
    }

    // Queries. State is owned exclusively by this engine.

    pub fn order(&self, client_order_id: &ClientOrderId) -> Option<&Order> {
        self.orders.get(client_order_id)
    }

    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.values()
    }

    pub fn open_orders(&self) -> Vec<&Order> {
        self.orders.values().filter(|o| !o.is_completed()).collect()
    }

    pub fn position(&self, instrument_id: &InstrumentId) -> Option<&Position> {
        self.positions.get(instrument_id)
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn account(&self, account_id: &AccountId) -> Option<&Account> {
        self.accounts.get(account_id)
    }

    /// Restores an order record during state-store recovery; replay order is
    /// ascending record timestamp, so later snapshots win.
    pub fn load_order(&mut self, order: Order) {
        if let Some(venue_order_id) = order.venue_order_id.clone() {
            self.venue_index
                .insert(venue_order_id, order.client_order_id.clone());
        }
        self.orders.insert(order.client_order_id.clone(), order);
    }

    /// The last event recorded for an order, for status queries.
    pub fn last_event(&self, client_order_id: &ClientOrderId) -> Option<&Event> {
        self.event_log
            .iter()
            .rev()
            .find(|event| event.client_order_id() == Some(client_order_id))
    }

    /// Drains the accumulated event log, e.g. for strategy fan-out.
    pub fn drain_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.event_log)
    }

    pub fn qsize(&self) -> usize {
        self.queue.len()
    }

    /// Enqueues a command for the run loop.
    pub fn execute(&mut self, command: TradingCommand) {
        self.queue.push_back(command);
    }

    /// Drains the inbound queue, dispatching one command at a time. Errors
    /// are logged with the command id and never terminate the loop.
    pub fn run_until_idle(&mut self) -> usize {
        let mut processed = 0;
        while let Some(command) = self.queue.pop_front() {
            let command_id = command.command_id();
            self.dispatch(command, command_id);
            processed += 1;
        }
        processed
    }

    fn now_ns(&self) -> u64 {
        self.clock.borrow().timestamp_ns()
    }

    fn dispatch(&mut self, command: TradingCommand, command_id: Uuid) {
        match command {
            TradingCommand::SubmitOrder { order, .. } => self.handle_submit_order(order),
            TradingCommand::SubmitBracketOrder { bracket, .. } => {
                self.handle_submit_bracket(bracket)
            }
            TradingCommand::UpdateOrder {
                instrument_id,
                client_order_id,
                quantity,
                price,
                ..
            } => {
                let ts_ns = self.now_ns();
                match self.client_for(&instrument_id) {
                    Some(client) => match client.update_order(&client_order_id, quantity, price, ts_ns) {
                        Ok(events) => self.process_events(events),
                        Err(err) => error!(%command_id, %err, "update order failed"),
                    },
                    None => warn!(%command_id, %instrument_id, "no execution client for venue"),
                }
            }
            TradingCommand::CancelOrder {
                instrument_id,
                client_order_id,
                ..
            } => {
                if self.orders.get(&client_order_id).is_none() {
                    warn!(%command_id, %client_order_id, "cancel for unknown order");
                    return;
                }
                self.route_cancel(&instrument_id, &client_order_id, command_id);
            }
        }
    }

    fn client_for(&mut self, instrument_id: &InstrumentId) -> Option<&mut Box<dyn ExecutionClient>> {
        self.clients.get_mut(&instrument_id.venue)
    }

    fn route_cancel(
        &mut self,
        instrument_id: &InstrumentId,
        client_order_id: &ClientOrderId,
        command_id: Uuid,
    ) {
        let ts_ns = self.now_ns();
        match self.client_for(instrument_id) {
            Some(client) => match client.cancel_order(client_order_id, ts_ns) {
                Ok(events) => self.process_events(events),
                Err(err) => error!(%command_id, %err, "cancel order failed"),
            },
            None => warn!(%command_id, %instrument_id, "no execution client for venue"),
        }
    }

    /// Validates an order locally. A failure is terminal: the order is
    /// recorded and receives an `OrderInvalid` event.
    fn validate(&self, order: &Order) -> Result<(), String> {
        let instrument = self
            .instruments
            .get(&order.instrument_id)
            .ok_or_else(|| format!("instrument {} not registered", order.instrument_id))?;
        if order.quantity.precision() > instrument.size_precision {
            return Err(format!(
                "quantity precision {} exceeds instrument size precision {}",
                order.quantity.precision(),
                instrument.size_precision
            ));
        }
        if let Some(price) = order.price {
            if price.precision() > instrument.price_precision {
                return Err(format!(
                    "price precision {} exceeds instrument price precision {}",
                    price.precision(),
                    instrument.price_precision
                ));
            }
            if !price.is_positive() {
                return Err("price must be positive".to_string());
            }
        }
        Ok(())
    }

    /// Pre-trade risk. A denial is terminal: the order receives an
    /// `OrderDenied` event and never reaches a venue.
    fn check_risk(&self, order: &Order) -> Result<(), String> {
        if let Some(max_qty) = self.config.max_order_qty {
            if order.quantity.value() > max_qty {
                return Err(format!(
                    "order quantity {} exceeds maximum {max_qty}",
                    order.quantity
                ));
            }
        }
        Ok(())
    }

    fn handle_submit_order(&mut self, order: Order) {
        let ts_ns = self.now_ns();
        let client_order_id = order.client_order_id.clone();

        if self.orders.contains_key(&client_order_id) {
            warn!(%client_order_id, "duplicate client order id, command dropped");
            return;
        }
        self.orders.insert(client_order_id.clone(), order.clone());

        if let Err(reason) = self.validate(&order) {
            let event = Event::order_invalid(client_order_id, reason, ts_ns);
            self.process_event(event);
            return;
        }
        if let Err(reason) = self.check_risk(&order) {
            let event = Event::order_denied(client_order_id, reason, ts_ns);
            self.process_event(event);
            return;
        }

        let instrument_id = order.instrument_id.clone();
        match self.client_for(&instrument_id) {
            Some(client) => match client.submit_order(order, ts_ns) {
                Ok(events) => self.process_events(events),
                Err(err) => {
                    error!(%client_order_id, %err, "submit failed at adapter");
                    let event = Event::order_invalid(
                        client_order_id,
                        format!("adapter error: {err}"),
                        ts_ns,
                    );
                    self.process_event(event);
                }
            },
            None => {
                let event = Event::order_invalid(
                    client_order_id,
                    format!("no execution client for venue {}", instrument_id.venue),
                    ts_ns,
                );
                self.process_event(event);
            }
        }
    }

    fn handle_submit_bracket(&mut self, bracket: crate::model::commands::BracketOrder) {
        let entry_id = bracket.entry.client_order_id.clone();
        // Any duplicate id drops the whole bracket before children are
        // staged, otherwise they would orphan when the entry submit is
        // refused.
        for client_order_id in [
            &entry_id,
            &bracket.stop_loss.client_order_id,
            &bracket.take_profit.client_order_id,
        ] {
            if self.orders.contains_key(client_order_id) {
                warn!(%client_order_id, "duplicate client order id in bracket, command dropped");
                return;
            }
        }
        self.orders.insert(
            bracket.stop_loss.client_order_id.clone(),
            bracket.stop_loss.clone(),
        );
        self.orders.insert(
            bracket.take_profit.client_order_id.clone(),
            bracket.take_profit.clone(),
        );
        self.pending_children.insert(
            entry_id,
            vec![bracket.stop_loss, bracket.take_profit],
        );
        self.handle_submit_order(bracket.entry);
    }

    /// Applies events received from an execution client or recovered from the
    /// state store. Duplicate event ids are ignored.
    pub fn process_events(&mut self, events: Vec<Event>) {
        for event in events {
            self.process_event(event);
        }
    }

    pub fn process_event(&mut self, event: Event) {
        if !self.processed_events.insert(event.event_id()) {
            debug!(event_id = %event.event_id(), "duplicate event ignored");
            return;
        }

        if let Some(client_order_id) = event.client_order_id().cloned() {
            match self.orders.get_mut(&client_order_id) {
                Some(order) => {
                    if let Err(err) = order.apply(&event) {
                        warn!(%client_order_id, %err, "event rejected by order state machine");
                        return;
                    }
                    if let Event::OrderAccepted { venue_order_id, .. } = &event {
                        self.venue_index
                            .insert(venue_order_id.clone(), client_order_id.clone());
                    }
                }
                None => {
                    warn!(%client_order_id, event = event.type_name(), "event for unknown order");
                    return;
                }
            }

            if let Event::OrderFilled { .. } = &event {
                self.apply_fill_to_position(&event);
            }

            self.event_log.push(event.clone());
            self.after_order_event(&client_order_id);
        } else {
            if let Event::AccountState {
                account_id,
                balances,
                ..
            } = &event
            {
                self.accounts
                    .entry(account_id.clone())
                    .or_insert_with(|| Account::new(account_id.clone()))
                    .apply_state(balances);
            }
            self.event_log.push(event);
        }
    }

    fn apply_fill_to_position(&mut self, event: &Event) {
        let (instrument_id, commission, account_id) = match event {
            Event::OrderFilled {
                instrument_id,
                commission,
                account_id,
                ..
            } => (instrument_id.clone(), *commission, account_id.clone()),
            _ => return,
        };
        let size_precision = self
            .instruments
            .get(&instrument_id)
            .map(|i| i.size_precision)
            .unwrap_or_default();
        let position = self
            .positions
            .entry(instrument_id.clone())
            .or_insert_with(|| {
                Position::new(
                    PositionId::new(format!("P-{instrument_id}")),
                    instrument_id.clone(),
                    size_precision,
                )
            });

        let realized_before = position.realized_pnl;
        position.apply_fill(event);
        let realized_delta = position.realized_pnl - realized_before;

        if let Some(instrument) = self.instruments.get(&instrument_id) {
            let account = self
                .accounts
                .entry(account_id.clone())
                .or_insert_with(|| Account::new(account_id));
            if !realized_delta.is_zero() {
                account.adjust(
                    Money::new(realized_delta, instrument.quote_currency),
                    Decimal::ONE,
                );
            }
            if !commission.value().is_zero() {
                account.adjust(commission, Decimal::NEGATIVE_ONE);
            }
        }
    }

    /// Bracket and OCO housekeeping after an order event lands.
    fn after_order_event(&mut self, client_order_id: &ClientOrderId) {
        let (is_terminal, is_filled, instrument_id) = match self.orders.get(client_order_id) {
            Some(order) => (
                order.is_completed(),
                order.leaves_qty.is_zero() && !order.filled_qty.is_zero(),
                order.instrument_id.clone(),
            ),
            None => return,
        };

        // Entry filled: release the children to the venue as an OCO pair.
        if is_filled {
            if let Some(children) = self.pending_children.remove(client_order_id) {
                let ids: Vec<ClientOrderId> =
                    children.iter().map(|c| c.client_order_id.clone()).collect();
                if let [stop_id, profit_id] = ids.as_slice() {
                    self.oco_links.insert(
                        stop_id.clone(),
                        OcoLink {
                            sibling: profit_id.clone(),
                        },
                    );
                    self.oco_links.insert(
                        profit_id.clone(),
                        OcoLink {
                            sibling: stop_id.clone(),
                        },
                    );
                }
                let ts_ns = self.now_ns();
                for child in children {
                    let child_id = child.client_order_id.clone();
                    let child_instrument = child.instrument_id.clone();
                    match self.client_for(&child_instrument) {
                        Some(client) => match client.submit_order(child, ts_ns) {
                            Ok(events) => self.process_events(events),
                            Err(err) => error!(%child_id, %err, "bracket child submit failed"),
                        },
                        None => warn!(%child_id, "no execution client for bracket child"),
                    }
                }
                return;
            }
        }

        if !is_terminal {
            return;
        }

        // Entry terminal without a fill: the children never reach the venue.
        if let Some(children) = self.pending_children.remove(client_order_id) {
            let ts_ns = self.now_ns();
            for child in children {
                let event = Event::order_cancelled(
                    self.account_for(&child.instrument_id),
                    child.client_order_id.clone(),
                    None,
                    ts_ns,
                );
                self.process_event(event);
            }
        }

        // OCO: a terminal child cancels its working sibling.
        if let Some(link) = self.oco_links.remove(client_order_id) {
            let sibling = link.sibling;
            self.oco_links.remove(&sibling);
            let sibling_working = self
                .orders
                .get(&sibling)
                .map(|order| !order.is_completed())
                .unwrap_or(false);
            if sibling_working {
                debug!(%sibling, "cancelling OCO sibling");
                self.route_cancel(&instrument_id, &sibling, Uuid::nil());
            }
        }
    }

    fn account_for(&self, instrument_id: &InstrumentId) -> AccountId {
        self.clients
            .get(&instrument_id.venue)
            .map(|client| client.account_id())
            .unwrap_or_else(|| AccountId::new(format!("{}-UNKNOWN", instrument_id.venue)))
    }
}
