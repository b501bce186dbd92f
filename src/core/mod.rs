pub mod color;
pub mod dbc;
pub mod message;
pub mod signal;

pub use color::Color;
pub use dbc::{DbcError, DbcFile, DbcMessage};
pub use message::{CanData, CanMessage, MessageId};
pub use signal::{Signal, SignalId};
