use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    engine::execution::ExecutionEngine,
    model::order::Order,
    serialization::{SerializationError, Serializer},
};

/// The kind of record held in a state store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordKind {
    Order,
    Position,
    Account,
}

/// A persisted record: serializer-compatible payload keyed by `(kind, id)`.
#[derive(Clone, Debug, PartialEq)]
pub struct StateRecord {
    pub kind: RecordKind,
    pub id: String,
    pub timestamp_ns: u64,
    pub payload: Vec<u8>,
}

/// A key-value store persisting order and position records. Writing an
/// existing key replaces the record (last write wins).
pub trait StateStore {
    fn put(&mut self, record: StateRecord);

    fn get(&self, kind: RecordKind, id: &str) -> Option<&StateRecord>;

    /// All records in ascending `timestamp_ns`, the replay order for
    /// recovery.
    fn records(&self) -> Vec<&StateRecord>;
}

/// The in-process store used by the backtest engine and tests.
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    records: HashMap<(RecordKind, String), StateRecord>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl StateStore for InMemoryStateStore {
    fn put(&mut self, record: StateRecord) {
        self.records
            .insert((record.kind, record.id.clone()), record);
    }

    fn get(&self, kind: RecordKind, id: &str) -> Option<&StateRecord> {
        self.records.get(&(kind, id.to_string()))
    }

    fn records(&self) -> Vec<&StateRecord> {
        let mut records: Vec<&StateRecord> = self.records.values().collect();
        records.sort_by_key(|record| (record.timestamp_ns, record.id.clone()));
        records
    }
}

/// Writes an order snapshot into the store.
pub fn snapshot_order(
    store: &mut dyn StateStore,
    serializer: &Serializer,
    order: &Order,
    timestamp_ns: u64,
) -> Result<(), SerializationError> {
    let payload = serializer.serialize_order(order)?;
    store.put(StateRecord {
        kind: RecordKind::Order,
        id: order.client_order_id.to_string(),
        timestamp_ns,
        payload,
    });
    Ok(())
}

/// Rebuilds execution-engine order state by replaying stored order records
/// in ascending `timestamp_ns`. Malformed records are skipped and reported.
pub fn recover_orders(
    store: &dyn StateStore,
    serializer: &Serializer,
    engine: &mut ExecutionEngine,
) -> Result<usize, SerializationError> {
    let mut recovered = 0;
    for record in store.records() {
        if record.kind != RecordKind::Order {
            continue;
        }
        let order = serializer.deserialize_order(&record.payload)?;
        engine.load_order(order);
        recovered += 1;
    }
    Ok(recovered)
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use super::*;
    use crate::{
        clock::TestClock,
        engine::execution::ExecutionEngineConfig,
        model::{
            enums::{OrderSide, TimeInForce},
            identifiers::{ClientOrderId, InstrumentId, StrategyId, Symbol, Venue},
            value::{Price, Quantity},
        },
    };

    fn order(id: &str, ts: u64) -> Order {
        Order::limit(
            ClientOrderId::new(id),
            StrategyId::new("S-001"),
            InstrumentId::new(Symbol::new("AUD/USD"), Venue::new("SIM")),
            OrderSide::Buy,
            Quantity::new(dec!(100000), 0).unwrap(),
            Price::new(dec!(1.00000), 5).unwrap(),
            TimeInForce::Gtc,
            None,
            Uuid::new_v4(),
            ts,
        )
        .unwrap()
    }

    #[test]
    fn put_get_round_trip() {
        let mut store = InMemoryStateStore::new();
        let serializer = Serializer::new();
        let order = order("O-1", 10);
        snapshot_order(&mut store, &serializer, &order, 10).unwrap();

        let record = store.get(RecordKind::Order, "O-1").unwrap();
        assert_eq!(record.timestamp_ns, 10);
        let back = serializer.deserialize_order(&record.payload).unwrap();
        assert_eq!(back, order);
    }

    #[test]
    fn last_write_wins_per_key() {
        let mut store = InMemoryStateStore::new();
        let serializer = Serializer::new();
        let order = order("O-1", 10);
        snapshot_order(&mut store, &serializer, &order, 10).unwrap();
        snapshot_order(&mut store, &serializer, &order, 20).unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(RecordKind::Order, "O-1").unwrap().timestamp_ns, 20);
    }

    #[test]
    fn records_are_replayed_in_timestamp_order() {
        let mut store = InMemoryStateStore::new();
        let serializer = Serializer::new();
        snapshot_order(&mut store, &serializer, &order("O-2", 30), 30).unwrap();
        snapshot_order(&mut store, &serializer, &order("O-1", 10), 10).unwrap();
        snapshot_order(&mut store, &serializer, &order("O-3", 20), 20).unwrap();

        let ids: Vec<&str> = store.records().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["O-1", "O-3", "O-2"]);
    }

    #[test]
    fn recovery_rebuilds_order_state() {
        let mut store = InMemoryStateStore::new();
        let serializer = Serializer::new();
        snapshot_order(&mut store, &serializer, &order("O-1", 10), 10).unwrap();
        snapshot_order(&mut store, &serializer, &order("O-2", 20), 20).unwrap();

        let clock = Rc::new(RefCell::new(TestClock::new()));
        let mut engine = ExecutionEngine::new(clock, ExecutionEngineConfig::default());
        let recovered = recover_orders(&store, &serializer, &mut engine).unwrap();

        assert_eq!(recovered, 2);
        assert!(engine.order(&ClientOrderId::new("O-1")).is_some());
        assert!(engine.order(&ClientOrderId::new("O-2")).is_some());
    }
}
