pub mod cli;
pub mod config;
pub mod daemon;
pub mod error;
pub mod filter;
pub mod gpio;
pub mod indicator;
pub mod lifecycle;
pub mod source;

pub use error::*;
pub use filter::*;
pub use gpio::*;
pub use indicator::{Indicator, LoopStats, MainLoop};
pub use lifecycle::*;
pub use source::*;
