// Candle aggregation, order lifecycle and the strategy event loop
pub mod candle_aggregator;
pub mod fill_tracker;
pub mod orchestrator;
pub mod position_manager;
pub mod price_feed;

pub use candle_aggregator::{BucketEvent, CandleAggregator};
pub use fill_tracker::{poll_until_filled, FillOutcome, FillPolicy, OrderFillTracker};
pub use orchestrator::{
    StrategyEvent, StrategyHandle, StrategyLog, StrategyOrchestrator, StrategySnapshot,
};
pub use position_manager::{
    ExitReason, OpenOutcome, PositionManager, PositionSettings, Trade, TradeStatus,
};
pub use price_feed::{parse_agg_trade, TradeStream};
