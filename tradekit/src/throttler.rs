use std::{cell::RefCell, collections::VecDeque, rc::Rc};

use tracing::debug;

use crate::clock::{Clock, TimeEvent, TimeEventCallback};

/// A token-per-interval rate limiter gating a downstream handler.
///
/// Up to `limit` items per `interval_ns` are delivered synchronously from
/// [`send`](Self::send); the rest queue in FIFO order and drain when the
/// refresh alert fires. Ordering is strict FIFO across immediate and deferred
/// delivery. The refresh alert is armed only while a backlog exists.
pub struct Throttler<T> {
    name: String,
    inner: Rc<RefCell<Inner<T>>>,
    clock: Rc<RefCell<dyn Clock>>,
}

struct Inner<T> {
    limit: usize,
    interval_ns: u64,
    tokens: usize,
    queue: VecDeque<T>,
    output: Box<dyn FnMut(T)>,
    recv_count: usize,
    sent_count: usize,
    is_throttling: bool,
}

impl<T> Inner<T> {
    fn deliver(&mut self, item: T) {
        (self.output)(item);
        self.sent_count += 1;
    }
}

impl<T: 'static> Throttler<T> {
    pub fn new(
        name: impl Into<String>,
        limit: usize,
        interval_ns: u64,
        clock: Rc<RefCell<dyn Clock>>,
        output: impl FnMut(T) + 'static,
    ) -> Self {
        assert!(limit > 0, "throttler limit must be positive");
        assert!(interval_ns > 0, "throttler interval must be positive");
        Self {
            name: name.into(),
            inner: Rc::new(RefCell::new(Inner {
                limit,
                interval_ns,
                tokens: limit,
                queue: VecDeque::new(),
                output: Box::new(output),
                recv_count: 0,
                sent_count: 0,
                is_throttling: false,
            })),
            clock,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of items waiting for a token refresh.
    pub fn qsize(&self) -> usize {
        self.inner.borrow().queue.len()
    }

    /// Whether at least one item has been received.
    pub fn is_active(&self) -> bool {
        self.inner.borrow().recv_count > 0
    }

    /// Whether a refresh alert is armed, i.e. a backlog exists.
    pub fn is_throttling(&self) -> bool {
        self.inner.borrow().is_throttling
    }

    pub fn recv_count(&self) -> usize {
        self.inner.borrow().recv_count
    }

    pub fn sent_count(&self) -> usize {
        self.inner.borrow().sent_count
    }

    fn refresh_timer_name(&self) -> String {
        format!("{}-REFRESH-TOKEN", self.name)
    }

    /// Sends an item through the gate: delivered synchronously if a token is
    /// available, otherwise queued until the refresh alert fires. Panics from
    /// the output handler propagate to the caller.
    pub fn send(&self, item: T) {
        let mut inner = self.inner.borrow_mut();
        inner.recv_count += 1;

        if !inner.is_throttling && inner.tokens > 0 {
            inner.tokens -= 1;
            inner.deliver(item);
            return;
        }

        inner.queue.push_back(item);
        if !inner.is_throttling {
            inner.is_throttling = true;
            drop(inner);
            self.arm_refresh();
        }
    }

    fn arm_refresh(&self) {
        let timer_name = self.refresh_timer_name();
        let alert_ns = {
            let clock = self.clock.borrow();
            clock.timestamp_ns() + self.inner.borrow().interval_ns
        };
        let callback = refresh_callback(&self.inner, &self.clock, &timer_name);
        let mut clock = self.clock.borrow_mut();
        clock.cancel_timer(&timer_name);
        clock
            .set_time_alert_ns(&timer_name, alert_ns, callback)
            .expect("refresh alert registration");
        debug!(timer = %timer_name, "throttler engaged");
    }
}

// The refresh callback re-arms itself while a backlog remains.
fn refresh_callback<T: 'static>(
    inner: &Rc<RefCell<Inner<T>>>,
    clock: &Rc<RefCell<dyn Clock>>,
    name: &str,
) -> TimeEventCallback {
    let inner = inner.clone();
    let clock = clock.clone();
    let name = name.to_string();
    Rc::new(RefCell::new(move |_event: TimeEvent| {
        let re_arm = {
            let mut inner = inner.borrow_mut();
            inner.tokens = inner.limit;
            while inner.tokens > 0 {
                match inner.queue.pop_front() {
                    Some(item) => {
                        inner.tokens -= 1;
                        inner.deliver(item);
                    }
                    None => break,
                }
            }
            inner.is_throttling = !inner.queue.is_empty();
            inner.is_throttling
        };
        if re_arm {
            let alert_ns = {
                let clock_ref = clock.borrow();
                clock_ref.timestamp_ns() + inner.borrow().interval_ns
            };
            let callback = refresh_callback(&inner, &clock, &name);
            let mut clock_mut = clock.borrow_mut();
            // The fired one-shot may still be registered on some clocks.
            clock_mut.cancel_timer(&name);
            clock_mut
                .set_time_alert_ns(&name, alert_ns, callback)
                .expect("refresh alert registration");
        } else {
            debug!(timer = %name, "throttler backlog drained");
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;

    struct Fixture {
        clock: Rc<RefCell<TestClock>>,
        received: Rc<RefCell<Vec<&'static str>>>,
        throttler: Throttler<&'static str>,
    }

    fn fixture() -> Fixture {
        let clock = Rc::new(RefCell::new(TestClock::new()));
        let received: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = received.clone();
        let dyn_clock: Rc<RefCell<dyn Clock>> = clock.clone();
        let throttler = Throttler::new(
            "Throttler-1",
            5,
            1_000_000_000,
            dyn_clock,
            move |item| sink.borrow_mut().push(item),
        );
        Fixture {
            clock,
            received,
            throttler,
        }
    }

    #[test]
    fn instantiation() {
        let fixture = fixture();
        assert_eq!(fixture.throttler.name(), "Throttler-1");
        assert_eq!(fixture.throttler.qsize(), 0);
        assert!(!fixture.throttler.is_active());
        assert!(!fixture.throttler.is_throttling());
    }

    #[test]
    fn send_when_not_active_becomes_active() {
        let fixture = fixture();
        fixture.throttler.send("MESSAGE");

        assert!(fixture.throttler.is_active());
        assert!(!fixture.throttler.is_throttling());
        assert_eq!(*fixture.received.borrow(), vec!["MESSAGE"]);
    }

    #[test]
    fn send_to_limit_becomes_throttled() {
        let fixture = fixture();
        for _ in 0..6 {
            fixture.throttler.send("MESSAGE");
        }

        assert_eq!(
            fixture.clock.borrow().timer_names(),
            vec!["Throttler-1-REFRESH-TOKEN".to_string()]
        );
        assert!(fixture.throttler.is_active());
        assert!(fixture.throttler.is_throttling());
        assert_eq!(fixture.received.borrow().len(), 5);
        assert_eq!(fixture.throttler.qsize(), 1);
    }

    #[test]
    fn refresh_when_at_limit_sends_remaining_items() {
        let fixture = fixture();
        for _ in 0..6 {
            fixture.throttler.send("MESSAGE");
        }

        let handlers = fixture.clock.borrow_mut().advance_time(1_000_000_000);
        for handler in handlers {
            handler.handle();
        }

        assert!(fixture.throttler.is_active());
        assert!(!fixture.throttler.is_throttling());
        assert_eq!(fixture.received.borrow().len(), 6);
        assert_eq!(fixture.throttler.qsize(), 0);
        // Backlog drained, so the refresh alert is disarmed.
        assert!(fixture.clock.borrow().timer_names().is_empty());
    }

    #[test]
    fn fifo_order_is_preserved_across_bursts() {
        let clock = Rc::new(RefCell::new(TestClock::new()));
        let received: Rc<RefCell<Vec<u32>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = received.clone();
        let dyn_clock: Rc<RefCell<dyn Clock>> = clock.clone();
        let throttler = Throttler::new("T", 2, 100, dyn_clock, move |item| {
            sink.borrow_mut().push(item)
        });

        for i in 0..7 {
            throttler.send(i);
        }
        assert_eq!(*received.borrow(), vec![0, 1]);
        assert_eq!(throttler.qsize(), 5);

        let handlers = clock.borrow_mut().advance_time(100);
        for handler in handlers {
            handler.handle();
        }
        assert_eq!(*received.borrow(), vec![0, 1, 2, 3]);
        assert!(throttler.is_throttling());

        let handlers = clock.borrow_mut().advance_time(200);
        for handler in handlers {
            handler.handle();
        }
        let handlers = clock.borrow_mut().advance_time(300);
        for handler in handlers {
            handler.handle();
        }
        assert_eq!(*received.borrow(), vec![0, 1, 2, 3, 4, 5, 6]);
        assert!(!throttler.is_throttling());
        assert_eq!(throttler.sent_count(), 7);
        assert_eq!(throttler.recv_count(), 7);
    }
}
