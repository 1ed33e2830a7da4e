pub mod tick_buffer;
pub mod tick_channel;
pub mod tick_source;

pub use tick_buffer::TickBuffer;
pub use tick_channel::TickChannel;
pub use tick_source::{BinanceAggTradeSource, ReplayTickSource, TickSource};
