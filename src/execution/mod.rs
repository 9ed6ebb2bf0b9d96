// Order lifecycle: reconciliation, bracket placement and the cycle scheduler
pub mod order_sequencer;
pub mod position_book;
pub mod trading_loop;

pub use order_sequencer::{
    BracketOrderPlan, BracketParams, BracketRecord, BracketState, OrderSequencer, PlacedBracket,
};
pub use position_book::PositionBook;
pub use trading_loop::{CycleReport, EngineState, LoopSettings, TradingLoop};
