//! Worker module for device process spawning and output parsing.

mod line;
mod payload;
mod process;
mod stream;

pub use line::*;
pub use payload::*;
pub use process::*;
pub use stream::*;
