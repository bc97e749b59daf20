use std::{cell::RefCell, rc::Rc};

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{info, warn};

use crate::{
    clock::LiveClock,
    engine::{
        data::{DataCommand, DataEngine, DataEngineConfig},
        execution::{ExecutionEngine, ExecutionEngineConfig},
    },
    model::{commands::TradingCommand, data::MarketData},
};

/// Wires the engines to the live clock and adapter channels on a
/// current-thread runtime.
///
/// Adapters push market data through [`data_sender`](Self::data_sender) and
/// strategies submit commands through [`command_sender`](Self::command_sender);
/// the node's run loop is the single consumer, so each engine still
/// processes messages one at a time in enqueue order. Timer events from the
/// live clock arrive through the same loop and dispatch to their registered
/// callbacks.
pub struct LiveNode {
    clock: Rc<RefCell<LiveClock>>,
    time_rx: UnboundedReceiver<crate::clock::TimeEvent>,
    data_engine: DataEngine,
    exec_engine: ExecutionEngine,
    data_tx: UnboundedSender<MarketData>,
    data_rx: UnboundedReceiver<MarketData>,
    command_tx: UnboundedSender<TradingCommand>,
    command_rx: UnboundedReceiver<TradingCommand>,
    shutdown_tx: UnboundedSender<()>,
    shutdown_rx: UnboundedReceiver<()>,
}

impl LiveNode {
    pub fn new(data_config: DataEngineConfig, exec_config: ExecutionEngineConfig) -> Self {
        let (clock, time_rx) = LiveClock::new();
        let clock = Rc::new(RefCell::new(clock));
        let data_engine = DataEngine::new(clock.clone(), data_config);
        let exec_engine = ExecutionEngine::new(clock.clone(), exec_config);
        let (data_tx, data_rx) = unbounded_channel();
        let (command_tx, command_rx) = unbounded_channel();
        let (shutdown_tx, shutdown_rx) = unbounded_channel();
        Self {
            clock,
            time_rx,
            data_engine,
            exec_engine,
            data_tx,
            data_rx,
            command_tx,
            command_rx,
            shutdown_tx,
            shutdown_rx,
        }
    }

    pub fn clock(&self) -> Rc<RefCell<LiveClock>> {
        self.clock.clone()
    }

    pub fn data_engine(&mut self) -> &mut DataEngine {
        &mut self.data_engine
    }

    pub fn execution_engine(&mut self) -> &mut ExecutionEngine {
        &mut self.exec_engine
    }

    /// The handle adapters use to push market data into the node.
    pub fn data_sender(&self) -> UnboundedSender<MarketData> {
        self.data_tx.clone()
    }

    /// The handle strategies use to submit trading commands.
    pub fn command_sender(&self) -> UnboundedSender<TradingCommand> {
        self.command_tx.clone()
    }

    /// Sending on this handle stops the run loop after the current message.
    pub fn shutdown_sender(&self) -> UnboundedSender<()> {
        self.shutdown_tx.clone()
    }

    /// The cooperative run loop: one message at a time, across timer events,
    /// market data and commands, until shutdown.
    pub async fn run(&mut self) {
        self.data_engine
            .start()
            .expect("data engine starts before the loop");
        self.exec_engine
            .start()
            .expect("execution engine starts before the loop");
        info!("live node running");

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown_rx.recv() => {
                    info!("live node shutting down");
                    break;
                }
                time_event = self.time_rx.recv() => {
                    match time_event {
                        Some(event) => {
                            let handler = self.clock.borrow().match_handler(event);
                            match handler {
                                Some(handler) => handler.handle(),
                                None => warn!("timer fired after cancellation"),
                            }
                        }
                        None => break,
                    }
                }
                data = self.data_rx.recv() => {
                    match data {
                        Some(data) => {
                            self.data_engine.send(DataCommand::Data(data));
                            self.data_engine.run_until_idle();
                        }
                        None => break,
                    }
                }
                command = self.command_rx.recv() => {
                    match command {
                        Some(command) => {
                            self.exec_engine.execute(command);
                            self.exec_engine.run_until_idle();
                        }
                        None => break,
                    }
                }
            }
        }

        self.data_engine.stop();
        self.exec_engine.stop();
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::model::{
        data::QuoteTick,
        identifiers::{InstrumentId, Symbol, Venue},
        value::{Price, Quantity},
    };

    fn quote(ts: u64) -> QuoteTick {
        QuoteTick {
            instrument_id: InstrumentId::new(Symbol::new("AUD/USD"), Venue::new("SIM")),
            bid: Price::new(dec!(1.00000), 5).unwrap(),
            ask: Price::new(dec!(1.00010), 5).unwrap(),
            bid_size: Quantity::new(dec!(100000), 0).unwrap(),
            ask_size: Quantity::new(dec!(100000), 0).unwrap(),
            ts_event_ns: ts,
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn pushed_data_lands_in_the_cache_before_shutdown() {
        let mut node = LiveNode::new(DataEngineConfig::default(), ExecutionEngineConfig::default());
        let data_tx = node.data_sender();
        let shutdown_tx = node.shutdown_sender();

        data_tx.send(MarketData::Quote(quote(1))).unwrap();
        data_tx.send(MarketData::Quote(quote(2))).unwrap();

        // Let the data drain, then stop.
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            let _ = shutdown_tx.send(());
        });
        node.run().await;

        let instrument_id = InstrumentId::new(Symbol::new("AUD/USD"), Venue::new("SIM"));
        assert_eq!(node.data_engine().quote_ticks(&instrument_id).len(), 2);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn live_clock_alert_dispatches_through_the_loop() {
        use std::time::Duration;

        use crate::clock::{Clock, TimeEvent, TimeEventCallback};

        let mut node = LiveNode::new(DataEngineConfig::default(), ExecutionEngineConfig::default());
        let fired: Rc<RefCell<Vec<TimeEvent>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = fired.clone();
        let callback: TimeEventCallback =
            Rc::new(RefCell::new(move |event: TimeEvent| sink.borrow_mut().push(event)));

        {
            let clock = node.clock();
            let mut clock = clock.borrow_mut();
            let soon = clock.timestamp_ns() + 10_000_000;
            clock.set_time_alert_ns("SOON", soon, callback).unwrap();
        }

        let shutdown_tx = node.shutdown_sender();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let _ = shutdown_tx.send(());
        });
        node.run().await;

        let fired = fired.borrow();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].name, "SOON");
    }
}
