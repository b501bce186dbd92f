//! Bit-level layout and editing of CAN signals defined in DBC files.
//!
//! [`layout::BinaryView`] maps the signals of one message onto a grid of
//! bytes and bits, overlays the last received payload and turns pointer
//! gestures into edit requests that [`editor::SignalEditor`] applies to a
//! [`core::DbcFile`].

pub mod config;
pub mod core;
pub mod decode;
pub mod editor;
pub mod layout;
pub mod store;
