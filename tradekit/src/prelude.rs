//! The commonly used types in one import.

#[cfg(feature = "backtest")]
pub use crate::backtest::{
    BacktestDataContainer, BacktestEngine, BacktestEngineConfig, BacktestError, BacktestResults,
    FillModel, MatchingEngine, MatchingEngineConfig, OrderFillsReport, PositionsReport,
};
#[cfg(feature = "live")]
pub use crate::live::LiveNode;
#[cfg(feature = "live")]
pub use crate::clock::LiveClock;
pub use crate::{
    book::{BookLevel, BookOrder, Ladder, OrderBook},
    client::{DataClient, ExecutionClient},
    clock::{Clock, TestClock, TimeEvent, TimeEventCallback, TimeEventHandler},
    engine::{
        data::{DataCommand, DataEngine, DataEngineConfig},
        execution::{ExecutionEngine, ExecutionEngineConfig},
        ComponentState, LifecycleError,
    },
    message::{
        DataKind, DataPayload, DataRequest, DataResponse, DataType, Message, MessageKind, Response,
    },
    model::{
        account::{Account, AccountBalance},
        commands::{BracketOrder, TradingCommand},
        data::{
            Bar, BarSpecification, BarType, BookAction, MarketData, OrderBookDelta, QuoteTick,
            TradeTick,
        },
        enums::{
            BarAggregation, LiquiditySide, OrderSide, OrderStatus, OrderType, PositionSide,
            PriceType, TimeInForce,
        },
        events::Event,
        identifiers::{
            AccountId, ClientId, ClientOrderId, ExecutionId, InstrumentId, PositionId, StrategyId,
            Symbol, TraderId, Venue, VenueOrderId,
        },
        instrument::Instrument,
        order::{ExpiryPolicy, Order, OrderError, OrderFactory},
        position::Position,
        value::{Currency, Money, Price, Quantity},
        ValidationError,
    },
    serialization::{convert_camel_to_snake, convert_snake_to_camel, SerializationError, Serializer},
    state::{InMemoryStateStore, RecordKind, StateRecord, StateStore},
    strategy::{Strategy, StrategyContext},
    throttler::Throttler,
};
