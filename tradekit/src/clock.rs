use std::{cell::RefCell, fmt, rc::Rc};

use thiserror::Error;

/// Errors raised when scheduling timers.
#[derive(Error, Debug)]
pub enum ClockError {
    #[error("a timer named '{0}' already exists")]
    TimerAlreadyExists(String),
    #[error("timer name must not be empty")]
    EmptyTimerName,
    #[error("timer interval must be positive")]
    ZeroInterval,
}

/// A fired timer alert: the timer's name and the nanosecond it triggered at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimeEvent {
    pub name: String,
    pub trigger_ns: u64,
}

impl fmt::Display for TimeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TimeEvent(name={}, trigger_ns={})", self.name, self.trigger_ns)
    }
}

/// The callback invoked when a timer fires. Shared so that a component and
/// its clock registration can reference the same state.
pub type TimeEventCallback = Rc<RefCell<dyn FnMut(TimeEvent)>>;

/// Pairs a fired [`TimeEvent`] with the callback registered for its timer.
/// The driver invokes [`handle`](Self::handle) to dispatch it.
pub struct TimeEventHandler {
    pub event: TimeEvent,
    callback: TimeEventCallback,
}

impl TimeEventHandler {
    pub fn handle(self) {
        (self.callback.borrow_mut())(self.event);
    }
}

impl fmt::Debug for TimeEventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeEventHandler")
            .field("event", &self.event)
            .finish()
    }
}

/// A uniform time source: nanosecond timestamps plus named timers firing
/// registered callbacks.
pub trait Clock {
    /// Returns the current time in nanoseconds since the epoch.
    fn timestamp_ns(&self) -> u64;

    /// Schedules a one-shot alert at `alert_ns`.
    fn set_time_alert_ns(
        &mut self,
        name: &str,
        alert_ns: u64,
        callback: TimeEventCallback,
    ) -> Result<(), ClockError>;

    /// Schedules a repeating timer firing every `interval_ns`, starting at
    /// `start_ns` (or one interval from now) until `stop_ns` if given.
    fn set_timer_ns(
        &mut self,
        name: &str,
        interval_ns: u64,
        start_ns: Option<u64>,
        stop_ns: Option<u64>,
        callback: TimeEventCallback,
    ) -> Result<(), ClockError>;

    /// Cancels the named timer; unknown names are ignored.
    fn cancel_timer(&mut self, name: &str);

    /// Returns the names of all registered timers, in registration order.
    fn timer_names(&self) -> Vec<String>;

    fn timer_count(&self) -> usize {
        self.timer_names().len()
    }
}

struct ClockTimer {
    name: String,
    // None denotes a one-shot alert.
    interval_ns: Option<u64>,
    next_ns: u64,
    stop_ns: Option<u64>,
    callback: TimeEventCallback,
    insertion: u64,
}

/// A deterministic clock for backtesting: time advances only through
/// [`advance_time`](Self::advance_time), which returns the fired alerts in
/// chronological order for the driver to dispatch.
pub struct TestClock {
    time_ns: u64,
    timers: Vec<ClockTimer>,
    insertion_seq: u64,
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TestClock {
    pub fn new() -> Self {
        Self {
            time_ns: 0,
            timers: Vec::new(),
            insertion_seq: 0,
        }
    }

    /// Sets the time directly without firing any timers.
    pub fn set_time(&mut self, to_ns: u64) {
        self.time_ns = to_ns;
    }

    /// Advances the clock to `to_ns`, returning a handler for every
    /// alert with `trigger_ns <= to_ns`. Events are ordered by
    /// non-decreasing trigger time, ties broken by registration order;
    /// each fires exactly once and interval timers re-arm.
    pub fn advance_time(&mut self, to_ns: u64) -> Vec<TimeEventHandler> {
        let mut fired: Vec<(u64, u64, TimeEventHandler)> = Vec::new();

        for timer in self.timers.iter_mut() {
            while timer.next_ns <= to_ns {
                if let Some(stop_ns) = timer.stop_ns {
                    if timer.next_ns > stop_ns {
                        break;
                    }
                }
                fired.push((
                    timer.next_ns,
                    timer.insertion,
                    TimeEventHandler {
                        event: TimeEvent {
                            name: timer.name.clone(),
                            trigger_ns: timer.next_ns,
                        },
                        callback: timer.callback.clone(),
                    },
                ));
                match timer.interval_ns {
                    Some(interval) => timer.next_ns += interval,
                    None => {
                        // One-shot: mark as spent by pushing past the horizon.
                        timer.next_ns = u64::MAX;
                        break;
                    }
                }
            }
        }

        self.timers.retain(|timer| {
            timer.next_ns != u64::MAX
                && timer
                    .stop_ns
                    .map(|stop| timer.next_ns <= stop)
                    .unwrap_or(true)
        });

        fired.sort_by_key(|(trigger, insertion, _)| (*trigger, *insertion));
        self.time_ns = to_ns;
        fired.into_iter().map(|(_, _, handler)| handler).collect()
    }

    fn register(&mut self, timer: ClockTimer) -> Result<(), ClockError> {
        if timer.name.is_empty() {
            return Err(ClockError::EmptyTimerName);
        }
        if self.timers.iter().any(|t| t.name == timer.name) {
            return Err(ClockError::TimerAlreadyExists(timer.name));
        }
        self.timers.push(timer);
        Ok(())
    }
}

impl Clock for TestClock {
    fn timestamp_ns(&self) -> u64 {
        self.time_ns
    }

    fn set_time_alert_ns(
        &mut self,
        name: &str,
        alert_ns: u64,
        callback: TimeEventCallback,
    ) -> Result<(), ClockError> {
        let insertion = self.insertion_seq;
        self.insertion_seq += 1;
        self.register(ClockTimer {
            name: name.to_string(),
            interval_ns: None,
            // An alert already in the past fires on the next advance.
            next_ns: alert_ns.max(self.time_ns),
            stop_ns: None,
            callback,
            insertion,
        })
    }

    fn set_timer_ns(
        &mut self,
        name: &str,
        interval_ns: u64,
        start_ns: Option<u64>,
        stop_ns: Option<u64>,
        callback: TimeEventCallback,
    ) -> Result<(), ClockError> {
        if interval_ns == 0 {
            return Err(ClockError::ZeroInterval);
        }
        let insertion = self.insertion_seq;
        self.insertion_seq += 1;
        let first = start_ns.unwrap_or(self.time_ns) + interval_ns;
        self.register(ClockTimer {
            name: name.to_string(),
            interval_ns: Some(interval_ns),
            next_ns: first,
            stop_ns,
            callback,
            insertion,
        })
    }

    fn cancel_timer(&mut self, name: &str) {
        self.timers.retain(|timer| timer.name != name);
    }

    fn timer_names(&self) -> Vec<String> {
        self.timers.iter().map(|timer| timer.name.clone()).collect()
    }
}

#[cfg(feature = "live")]
pub use live::LiveClock;

#[cfg(feature = "live")]
mod live {
    use std::{collections::HashMap, time::Duration};

    use tokio::{
        sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
        task::JoinHandle,
    };

    use super::*;

    /// A clock backed by the host wall clock. Timers are dispatched by
    /// background tokio tasks that send [`TimeEvent`]s into the channel
    /// returned at construction; the owning loop receives them and dispatches
    /// through [`match_handler`](Self::match_handler). Precision is
    /// best-effort.
    pub struct LiveClock {
        tx: UnboundedSender<TimeEvent>,
        tasks: HashMap<String, JoinHandle<()>>,
        callbacks: HashMap<String, TimeEventCallback>,
    }

    impl LiveClock {
        pub fn new() -> (Self, UnboundedReceiver<TimeEvent>) {
            let (tx, rx) = unbounded_channel();
            (
                Self {
                    tx,
                    tasks: HashMap::new(),
                    callbacks: HashMap::new(),
                },
                rx,
            )
        }

        /// Pairs a received event with its registered callback; `None` if the
        /// timer was cancelled in the meantime.
        pub fn match_handler(&self, event: TimeEvent) -> Option<TimeEventHandler> {
            let callback = self.callbacks.get(&event.name)?.clone();
            Some(TimeEventHandler { event, callback })
        }

        fn spawn(&mut self, name: String, interval_ns: Option<u64>, first_ns: u64, stop_ns: Option<u64>) {
            let tx = self.tx.clone();
            let task_name = name.clone();
            let handle = tokio::spawn(async move {
                let mut next_ns = first_ns;
                loop {
                    let now = wall_clock_ns();
                    let wait = Duration::from_nanos(next_ns.saturating_sub(now));
                    tokio::time::sleep(wait).await;
                    if tx
                        .send(TimeEvent {
                            name: task_name.clone(),
                            trigger_ns: next_ns,
                        })
                        .is_err()
                    {
                        return;
                    }
                    match interval_ns {
                        Some(interval) => {
                            next_ns += interval;
                            if let Some(stop) = stop_ns {
                                if next_ns > stop {
                                    return;
                                }
                            }
                        }
                        None => return,
                    }
                }
            });
            self.tasks.insert(name, handle);
        }
    }

    impl Clock for LiveClock {
        fn timestamp_ns(&self) -> u64 {
            wall_clock_ns()
        }

        fn set_time_alert_ns(
            &mut self,
            name: &str,
            alert_ns: u64,
            callback: TimeEventCallback,
        ) -> Result<(), ClockError> {
            if name.is_empty() {
                return Err(ClockError::EmptyTimerName);
            }
            if self.callbacks.contains_key(name) {
                return Err(ClockError::TimerAlreadyExists(name.to_string()));
            }
            self.callbacks.insert(name.to_string(), callback);
            self.spawn(name.to_string(), None, alert_ns, None);
            Ok(())
        }

        fn set_timer_ns(
            &mut self,
            name: &str,
            interval_ns: u64,
            start_ns: Option<u64>,
            stop_ns: Option<u64>,
            callback: TimeEventCallback,
        ) -> Result<(), ClockError> {
            if interval_ns == 0 {
                return Err(ClockError::ZeroInterval);
            }
            if name.is_empty() {
                return Err(ClockError::EmptyTimerName);
            }
            if self.callbacks.contains_key(name) {
                return Err(ClockError::TimerAlreadyExists(name.to_string()));
            }
            self.callbacks.insert(name.to_string(), callback);
            let first = start_ns.unwrap_or_else(wall_clock_ns) + interval_ns;
            self.spawn(name.to_string(), Some(interval_ns), first, stop_ns);
            Ok(())
        }

        fn cancel_timer(&mut self, name: &str) {
            if let Some(handle) = self.tasks.remove(name) {
                handle.abort();
            }
            self.callbacks.remove(name);
        }

        fn timer_names(&self) -> Vec<String> {
            self.callbacks.keys().cloned().collect()
        }
    }

    fn wall_clock_ns() -> u64 {
        chrono::Utc::now()
            .timestamp_nanos_opt()
            .expect("wall clock within chrono's representable range") as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Rc<RefCell<Vec<TimeEvent>>>, TimeEventCallback) {
        let events: Rc<RefCell<Vec<TimeEvent>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        let callback: TimeEventCallback =
            Rc::new(RefCell::new(move |event: TimeEvent| sink.borrow_mut().push(event)));
        (events, callback)
    }

    #[test]
    fn advance_fires_alerts_in_trigger_order() {
        let mut clock = TestClock::new();
        let (events, callback) = recorder();
        clock.set_time_alert_ns("B", 200, callback.clone()).unwrap();
        clock.set_time_alert_ns("A", 100, callback).unwrap();

        let handlers = clock.advance_time(250);
        let triggers: Vec<_> = handlers.iter().map(|h| h.event.trigger_ns).collect();
        assert_eq!(triggers, vec![100, 200]);

        for handler in handlers {
            handler.handle();
        }
        let names: Vec<_> = events.borrow().iter().map(|e| e.name.clone()).collect();
        assert_eq!(names, vec!["A", "B"]);
        assert_eq!(clock.timestamp_ns(), 250);
    }

    #[test]
    fn ties_break_by_insertion_order() {
        let mut clock = TestClock::new();
        let (_, callback) = recorder();
        clock.set_time_alert_ns("first", 100, callback.clone()).unwrap();
        clock.set_time_alert_ns("second", 100, callback).unwrap();

        let handlers = clock.advance_time(100);
        let names: Vec<_> = handlers.iter().map(|h| h.event.name.clone()).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn alerts_fire_exactly_once() {
        let mut clock = TestClock::new();
        let (_, callback) = recorder();
        clock.set_time_alert_ns("once", 100, callback).unwrap();

        assert_eq!(clock.advance_time(150).len(), 1);
        assert!(clock.advance_time(200).is_empty());
        assert!(clock.timer_names().is_empty());
    }

    #[test]
    fn interval_timers_re_arm() {
        let mut clock = TestClock::new();
        let (_, callback) = recorder();
        clock
            .set_timer_ns("tick", 100, Some(0), None, callback)
            .unwrap();

        let handlers = clock.advance_time(350);
        let triggers: Vec<_> = handlers.iter().map(|h| h.event.trigger_ns).collect();
        assert_eq!(triggers, vec![100, 200, 300]);
        // Still armed for the next interval.
        assert_eq!(clock.timer_names(), vec!["tick".to_string()]);
    }

    #[test]
    fn interval_timer_respects_stop_time() {
        let mut clock = TestClock::new();
        let (_, callback) = recorder();
        clock
            .set_timer_ns("tick", 100, Some(0), Some(250), callback)
            .unwrap();

        let handlers = clock.advance_time(500);
        let triggers: Vec<_> = handlers.iter().map(|h| h.event.trigger_ns).collect();
        assert_eq!(triggers, vec![100, 200]);
        assert!(clock.timer_names().is_empty());
    }

    #[test]
    fn duplicate_timer_name_is_rejected() {
        let mut clock = TestClock::new();
        let (_, callback) = recorder();
        clock.set_time_alert_ns("dup", 100, callback.clone()).unwrap();
        assert!(matches!(
            clock.set_time_alert_ns("dup", 200, callback),
            Err(ClockError::TimerAlreadyExists(_))
        ));
    }

    #[test]
    fn cancel_timer_removes_it() {
        let mut clock = TestClock::new();
        let (_, callback) = recorder();
        clock.set_time_alert_ns("gone", 100, callback).unwrap();
        clock.cancel_timer("gone");
        assert!(clock.advance_time(200).is_empty());
    }
}
