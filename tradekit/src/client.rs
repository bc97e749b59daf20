use crate::{
    message::{DataPayload, DataRequest, DataType},
    model::{
        events::Event,
        identifiers::{AccountId, ClientId, ClientOrderId, Venue},
        order::Order,
        value::{Price, Quantity},
    },
};

/// The capability contract a market-data adapter must satisfy.
///
/// `subscribe`/`unsubscribe` are idempotent. `request` must lead to exactly
/// one payload (possibly empty) per request id: `Ok(Some(_))` answers
/// synchronously, while `Ok(None)` defers and the adapter later pushes the
/// payload into the engine as a `DataCommand::Response` carrying the same
/// request id. Adapters that do not support a request kind answer with an
/// empty payload rather than nothing. Streaming data is pushed into the data
/// engine by the hosting runtime, not through this trait.
pub trait DataClient {
    fn client_id(&self) -> ClientId;

    fn connect(&mut self) -> anyhow::Result<()>;

    fn disconnect(&mut self) -> anyhow::Result<()>;

    fn is_connected(&self) -> bool;

    fn subscribe(&mut self, data_type: &DataType) -> anyhow::Result<()>;

    fn unsubscribe(&mut self, data_type: &DataType) -> anyhow::Result<()>;

    fn request(&mut self, request: &DataRequest) -> anyhow::Result<Option<DataPayload>>;
}

/// The capability contract an execution adapter must satisfy.
///
/// Every call returns the order events it generated, tagged with the
/// client's account id and the originating client order id.
pub trait ExecutionClient {
    fn client_id(&self) -> ClientId;

    fn account_id(&self) -> AccountId;

    fn venue(&self) -> Venue;

    fn connect(&mut self) -> anyhow::Result<()>;

    fn disconnect(&mut self) -> anyhow::Result<()>;

    fn is_connected(&self) -> bool;

    fn submit_order(&mut self, order: Order, ts_ns: u64) -> anyhow::Result<Vec<Event>>;

    fn update_order(
        &mut self,
        client_order_id: &ClientOrderId,
        quantity: Quantity,
        price: Option<Price>,
        ts_ns: u64,
    ) -> anyhow::Result<Vec<Event>>;

    fn cancel_order(
        &mut self,
        client_order_id: &ClientOrderId,
        ts_ns: u64,
    ) -> anyhow::Result<Vec<Event>>;
}
