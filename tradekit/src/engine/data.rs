use std::{
    cell::RefCell,
    collections::{HashMap, HashSet, VecDeque},
    rc::Rc,
};

use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::{
    book::{BookOrder, OrderBook},
    clock::{Clock, TimeEvent, TimeEventCallback},
    client::DataClient,
    engine::{Lifecycle, LifecycleError},
    message::{DataKind, DataPayload, DataRequest, DataResponse, DataType},
    model::{
        data::{Bar, BarType, BookAction, MarketData, OrderBookDelta, QuoteTick, TradeTick},
        identifiers::{ClientId, InstrumentId},
        instrument::Instrument,
    },
};

/// Messages consumed by the data engine's run loop.
pub enum DataCommand {
    Subscribe {
        client_id: ClientId,
        data_type: DataType,
    },
    Unsubscribe {
        client_id: ClientId,
        data_type: DataType,
    },
    Request {
        request: DataRequest,
        callback: Box<dyn FnMut(DataResponse)>,
        timeout_ns: Option<u64>,
    },
    /// A deferred payload pushed by a client for an earlier request.
    Response {
        request_id: Uuid,
        payload: DataPayload,
    },
    /// Inbound market data from a client or the backtest feed.
    Data(MarketData),
}

/// Configuration for the data engine's bounded tick caches.
#[derive(Clone, Debug)]
pub struct DataEngineConfig {
    pub tick_capacity: usize,
    pub bar_capacity: usize,
}

impl Default for DataEngineConfig {
    fn default() -> Self {
        Self {
            tick_capacity: 10_000,
            bar_capacity: 10_000,
        }
    }
}

type PendingRequests = Rc<RefCell<HashMap<Uuid, (DataRequest, Box<dyn FnMut(DataResponse)>)>>>;

/// A single-threaded cooperative consumer routing subscriptions, requests
/// and inbound market data.
///
/// Commands enqueue via [`send`](Self::send); the loop dequeues and
/// dispatches one message at a time. In backtest the driver drains the queue
/// synchronously with [`run_until_idle`](Self::run_until_idle); in live mode
/// the same loop runs on the runtime. Handler errors are logged with the
/// originating message and never terminate the loop.
pub struct DataEngine {
    lifecycle: Lifecycle,
    config: DataEngineConfig,
    clock: Rc<RefCell<dyn Clock>>,
    clients: HashMap<ClientId, Box<dyn DataClient>>,
    default_client: Option<ClientId>,
    instruments: HashMap<InstrumentId, Instrument>,
    subscriptions: HashSet<(ClientId, DataType)>,
    quote_cache: HashMap<InstrumentId, VecDeque<QuoteTick>>,
    trade_cache: HashMap<InstrumentId, VecDeque<TradeTick>>,
    bar_cache: HashMap<BarType, VecDeque<Bar>>,
    // Books maintained from order-level deltas.
    books: HashMap<InstrumentId, OrderBook>,
    // Highest delivered timestamp per stream, for monotonicity.
    quote_watermark: HashMap<InstrumentId, u64>,
    trade_watermark: HashMap<InstrumentId, u64>,
    pending_requests: PendingRequests,
    data_handler: Option<Box<dyn FnMut(&MarketData)>>,
    queue: VecDeque<DataCommand>,
    command_count: u64,
}

impl DataEngine {
    pub fn new(clock: Rc<RefCell<dyn Clock>>, config: DataEngineConfig) -> Self {
        Self {
            lifecycle: Lifecycle::new("DataEngine"),
            config,
            clock,
            clients: HashMap::new(),
            default_client: None,
            instruments: HashMap::new(),
            subscriptions: HashSet::new(),
            quote_cache: HashMap::new(),
            trade_cache: HashMap::new(),
            bar_cache: HashMap::new(),
            books: HashMap::new(),
            quote_watermark: HashMap::new(),
            trade_watermark: HashMap::new(),
            pending_requests: Rc::new(RefCell::new(HashMap::new())),
            data_handler: None,
            queue: VecDeque::new(),
            command_count: 0,
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
            self.subscriptions.clear();
            self.quote_cache.clear();
            self.trade_cache.clear();
            self.bar_cache.clear();
            self.books.clear();
            self.quote_watermark.clear();
            self.trade_watermark.clear();
            self.pending_requests.borrow_mut().clear();
            self.queue.clear();
            self.command_count = 0;
        }
        Ok(())
    }

    pub fn dispose(&mut self) {
        if self.lifecycle.dispose() {
            self.clients.clear();
        }
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle.is_running()
    }

    /// Registers a data client; the first registered client becomes the
    /// default request target.
    pub fn register_client(&mut self, client: Box<dyn DataClient>) {
        let client_id = client.client_id();
        if self.default_client.is_none() {
            self.default_client = Some(client_id.clone());
        }
        self.clients.insert(client_id, client);
    }

    /// Registers the downstream fan-out handler (the strategy router).
    pub fn set_data_handler(&mut self, handler: impl FnMut(&MarketData) + 'static) {
        self.data_handler = Some(Box::new(handler));
    }

    pub fn register_instrument(&mut self, instrument: Instrument) {
        self.instruments.insert(instrument.id.clone(), instrument);
    }

    pub fn instrument(&self, instrument_id: &InstrumentId) -> Option<&Instrument> {
        self.instruments.get(instrument_id)
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn qsize(&self) -> usize {
        self.queue.len()
    }

    /// Enqueues a command for the run loop.
    pub fn send(&mut self, command: DataCommand) {
        self.queue.push_back(command);
    }

    /// Drains the inbound queue, dispatching one message at a time. Returns
    /// the number of messages processed; the queue being empty is the
    /// quiescence the tests await.
    pub fn run_until_idle(&mut self) -> usize {
        let mut processed = 0;
        while let Some(command) = self.queue.pop_front() {
            self.command_count += 1;
            let message_id = self.command_count;
            self.dispatch(command, message_id);
            processed += 1;
        }
        processed
    }

    fn dispatch(&mut self, command: DataCommand, message_id: u64) {
        match command {
            DataCommand::Subscribe {
                client_id,
                data_type,
            } => self.handle_subscribe(client_id, data_type, message_id),
            DataCommand::Unsubscribe {
                client_id,
                data_type,
            } => self.handle_unsubscribe(client_id, data_type, message_id),
            DataCommand::Request {
                request,
                callback,
                timeout_ns,
            } => self.handle_request(request, callback, timeout_ns),
            DataCommand::Response {
                request_id,
                payload,
            } => self.handle_response(request_id, payload),
            DataCommand::Data(data) => self.handle_data(data),
        }
    }

    fn handle_subscribe(&mut self, client_id: ClientId, data_type: DataType, message_id: u64) {
        let key = (client_id.clone(), data_type.clone());
        if self.subscriptions.contains(&key) {
            // Idempotent: duplicate subscribe is a no-op.
            debug!(%client_id, %data_type, "already subscribed");
            return;
        }
        match self.clients.get_mut(&client_id) {
            Some(client) => {
                if let Err(err) = client.subscribe(&data_type) {
                    error!(message_id, %client_id, %err, "subscribe failed");
                    return;
                }
                self.subscriptions.insert(key);
            }
            None => warn!(message_id, %client_id, "no client registered"),
        }
    }

    fn handle_unsubscribe(&mut self, client_id: ClientId, data_type: DataType, message_id: u64) {
        let key = (client_id.clone(), data_type.clone());
        if !self.subscriptions.remove(&key) {
            debug!(%client_id, %data_type, "not subscribed");
            return;
        }
        if let Some(client) = self.clients.get_mut(&client_id) {
            if let Err(err) = client.unsubscribe(&data_type) {
                error!(message_id, %client_id, %err, "unsubscribe failed");
            }
        }
    }

    fn handle_request(
        &mut self,
        request: DataRequest,
        mut callback: Box<dyn FnMut(DataResponse)>,
        timeout_ns: Option<u64>,
    ) {
        let now_ns = self.clock.borrow().timestamp_ns();
        let client_id = if self.clients.contains_key(&request.client_id) {
            Some(request.client_id.clone())
        } else {
            self.default_client.clone()
        };

        let Some(client_id) = client_id else {
            // No client can serve this; an immediate empty response keeps
            // the one-response-per-request invariant.
            warn!(request_id = %request.request_id, "no data client registered");
            callback(DataResponse::new(&request, DataPayload::Empty, now_ns));
            return;
        };

        let client = self.clients.get_mut(&client_id).expect("client resolved");
        match client.request(&request) {
            Ok(Some(payload)) => callback(DataResponse::new(&request, payload, now_ns)),
            Ok(None) => {
                // The client will answer later; the request parks until its
                // pushed response or the timeout alert, whichever lands
                // first.
                let request_id = request.request_id;
                self.pending_requests
                    .borrow_mut()
                    .insert(request_id, (request, callback));
                if let Some(timeout_ns) = timeout_ns {
                    self.arm_request_timeout(request_id, now_ns + timeout_ns);
                }
            }
            Err(err) => {
                // Adapter failure: logged, and the caller still gets its one
                // (empty) response.
                error!(request_id = %request.request_id, %err, "data request failed");
                callback(DataResponse::new(&request, DataPayload::Empty, now_ns));
            }
        }
    }

    /// Resolves a parked request with the payload a client pushed for it. A
    /// response landing after the timeout alert (or a cancellation) is
    /// dropped: the request already received its one response.
    fn handle_response(&mut self, request_id: Uuid, payload: DataPayload) {
        let now_ns = self.clock.borrow().timestamp_ns();
        let entry = self.pending_requests.borrow_mut().remove(&request_id);
        match entry {
            Some((request, mut callback)) => {
                self.clock
                    .borrow_mut()
                    .cancel_timer(&request_timeout_timer(&request_id));
                callback(DataResponse::new(&request, payload, now_ns));
            }
            None => debug!(%request_id, "late response dropped"),
        }
    }

    /// Arms the alert that synthesizes a timed-out response for a parked
    /// request if nothing resolves it first.
    fn arm_request_timeout(&mut self, request_id: Uuid, alert_ns: u64) {
        let timer_name = request_timeout_timer(&request_id);
        let pending = self.pending_requests.clone();
        let timeout_callback: TimeEventCallback =
            Rc::new(RefCell::new(move |event: TimeEvent| {
                let entry = pending.borrow_mut().remove(&request_id);
                if let Some((request, mut callback)) = entry {
                    warn!(%request_id, "request timed out");
                    callback(DataResponse::timed_out(&request, event.trigger_ns));
                }
            }));
        if let Err(err) =
            self.clock
                .borrow_mut()
                .set_time_alert_ns(&timer_name, alert_ns, timeout_callback)
        {
            error!(%request_id, %err, "failed to arm request timeout");
        }
    }

    /// Cancels an in-flight request by id: the pending callback is dropped
    /// and no response will be delivered.
    pub fn cancel_request(&mut self, request_id: Uuid) {
        if self.pending_requests.borrow_mut().remove(&request_id).is_some() {
            self.clock
                .borrow_mut()
                .cancel_timer(&request_timeout_timer(&request_id));
        }
    }

    fn handle_data(&mut self, data: MarketData) {
        let instrument_id = data.instrument_id().clone();
        let ts = data.ts_event_ns();

        // Per-instrument monotonic stream ordering: drop stale ticks.
        let watermark = match &data {
            MarketData::Quote(_) => self.quote_watermark.get(&instrument_id),
            MarketData::Trade(_) => self.trade_watermark.get(&instrument_id),
            MarketData::Bar(_) | MarketData::Delta(_) => None,
        };
        if let Some(&last) = watermark {
            if ts < last {
                warn!(
                    instrument_id = %instrument_id,
                    ts,
                    last,
                    "dropping out-of-order tick"
                );
                return;
            }
        }

        match &data {
            MarketData::Quote(tick) => {
                self.quote_watermark.insert(instrument_id.clone(), ts);
                let cache = self.quote_cache.entry(instrument_id).or_default();
                if cache.len() == self.config.tick_capacity {
                    cache.pop_front();
                }
                cache.push_back(tick.clone());
            }
            MarketData::Trade(tick) => {
                self.trade_watermark.insert(instrument_id.clone(), ts);
                let cache = self.trade_cache.entry(instrument_id).or_default();
                if cache.len() == self.config.tick_capacity {
                    cache.pop_front();
                }
                cache.push_back(tick.clone());
            }
            MarketData::Bar(bar) => {
                let cache = self.bar_cache.entry(bar.bar_type.clone()).or_default();
                if cache.len() == self.config.bar_capacity {
                    cache.pop_front();
                }
                cache.push_back(bar.clone());
            }
            MarketData::Delta(delta) => self.apply_delta(delta),
        }

        if let Some(handler) = self.data_handler.as_mut() {
            handler(&data);
        }
    }

    fn apply_delta(&mut self, delta: &OrderBookDelta) {
        let (price_precision, size_precision) = self
            .instruments
            .get(&delta.instrument_id)
            .map(|i| (i.price_precision, i.size_precision))
            .unwrap_or((delta.price.precision(), delta.size.precision()));
        let book = self
            .books
            .entry(delta.instrument_id.clone())
            .or_insert_with(|| {
                OrderBook::new(delta.instrument_id.clone(), price_precision, size_precision)
            });
        let order = BookOrder::with_id(
            delta.order_id.clone(),
            delta.side,
            delta.price,
            delta.size,
        );
        let result = match delta.action {
            BookAction::Add => book.add(order),
            BookAction::Update => book.update(order),
            BookAction::Delete => book.delete(&order),
        };
        if let Err(err) = result {
            warn!(instrument_id = %delta.instrument_id, %err, "book delta rejected");
            return;
        }
        if let Err(crossed) = book.check_integrity() {
            warn!(%crossed, "crossed book from delta feed");
        }
    }

    /// The book maintained from order-level deltas, if any have arrived.
    pub fn order_book(&self, instrument_id: &InstrumentId) -> Option<&OrderBook> {
        self.books.get(instrument_id)
    }

    pub fn quote_ticks(&self, instrument_id: &InstrumentId) -> Vec<QuoteTick> {
        self.quote_cache
            .get(instrument_id)
            .map(|cache| cache.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn trade_ticks(&self, instrument_id: &InstrumentId) -> Vec<TradeTick> {
        self.trade_cache
            .get(instrument_id)
            .map(|cache| cache.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn bars(&self, bar_type: &BarType) -> Vec<Bar> {
        self.bar_cache
            .get(bar_type)
            .map(|cache| cache.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn last_quote(&self, instrument_id: &InstrumentId) -> Option<QuoteTick> {
        self.quote_cache
            .get(instrument_id)
            .and_then(|cache| cache.back().cloned())
    }

    // Convenience wrappers over `send` for the standard subscriptions.

    pub fn subscribe_quote_ticks(&mut self, client_id: ClientId, instrument_id: &InstrumentId) {
        self.send(DataCommand::Subscribe {
            client_id,
            data_type: DataType::new(DataKind::QuoteTick).with("InstrumentId", instrument_id),
        });
    }

    pub fn unsubscribe_quote_ticks(&mut self, client_id: ClientId, instrument_id: &InstrumentId) {
        self.send(DataCommand::Unsubscribe {
            client_id,
            data_type: DataType::new(DataKind::QuoteTick).with("InstrumentId", instrument_id),
        });
    }

    pub fn subscribe_trade_ticks(&mut self, client_id: ClientId, instrument_id: &InstrumentId) {
        self.send(DataCommand::Subscribe {
            client_id,
            data_type: DataType::new(DataKind::TradeTick).with("InstrumentId", instrument_id),
        });
    }

    pub fn unsubscribe_trade_ticks(&mut self, client_id: ClientId, instrument_id: &InstrumentId) {
        self.send(DataCommand::Unsubscribe {
            client_id,
            data_type: DataType::new(DataKind::TradeTick).with("InstrumentId", instrument_id),
        });
    }

    pub fn subscribe_instrument(&mut self, client_id: ClientId, instrument_id: &InstrumentId) {
        self.send(DataCommand::Subscribe {
            client_id,
            data_type: DataType::new(DataKind::Instrument).with("InstrumentId", instrument_id),
        });
    }

    pub fn unsubscribe_instrument(&mut self, client_id: ClientId, instrument_id: &InstrumentId) {
        self.send(DataCommand::Unsubscribe {
            client_id,
            data_type: DataType::new(DataKind::Instrument).with("InstrumentId", instrument_id),
        });
    }

    pub fn subscribe_bars(&mut self, client_id: ClientId, bar_type: &BarType) {
        self.send(DataCommand::Subscribe {
            client_id,
            data_type: DataType::new(DataKind::Bar)
                .with("InstrumentId", &bar_type.instrument_id)
                .with("Specification", &bar_type.spec),
        });
    }

    pub fn unsubscribe_bars(&mut self, client_id: ClientId, bar_type: &BarType) {
        self.send(DataCommand::Unsubscribe {
            client_id,
            data_type: DataType::new(DataKind::Bar)
                .with("InstrumentId", &bar_type.instrument_id)
                .with("Specification", &bar_type.spec),
        });
    }

    pub fn request(
        &mut self,
        request: DataRequest,
        callback: impl FnMut(DataResponse) + 'static,
        timeout_ns: Option<u64>,
    ) {
        self.send(DataCommand::Request {
            request,
            callback: Box::new(callback),
            timeout_ns,
        });
    }
}

fn request_timeout_timer(request_id: &Uuid) -> String {
    format!("REQUEST-{request_id}-TIMEOUT")
}
