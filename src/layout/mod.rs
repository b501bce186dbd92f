//! Bit-grid layout of a CAN message: which signals cover which bits, live
//! payload overlay, and the pointer gestures that edit signals on the grid.

pub mod addressing;
pub mod gesture;
pub mod model;
pub mod overlay;
pub mod view;

use thiserror::Error;

use crate::core::{MessageId, Signal, SignalId};

pub use addressing::{bit_index, grid_pos, BitRange, GridPos, COLUMN_COUNT, HEX_COLUMN};
pub use gesture::{resolve_selection, DragDirection, GestureController, GestureState, Selection};
pub use model::{BinaryLayout, Cell, SignalSpan};
pub use view::BinaryView;

/// Why a signal could not be placed on the grid
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("signal has zero size")]
    EmptySignal,

    #[error("bit {bit} lies outside a {row_count}-byte message")]
    OutOfBounds { bit: usize, row_count: usize },
}

/// Requests and notifications emitted by the bit grid. Consumers act on them
/// synchronously; nothing is expected back.
#[derive(Debug, Clone, PartialEq)]
pub enum BinaryViewEvent {
    /// Create a signal over a dragged range. `start_bit` is the first bit
    /// of the range in the numbering of `little_endian`.
    AddSignal { start_bit: usize, size: usize, little_endian: bool },
    /// Move the edges of an existing signal, same numbering as `AddSignal`
    ResizeSignal { signal: SignalId, start_bit: usize, size: usize },
    RemoveSignal(SignalId),
    /// Replace a signal with an edited copy
    EditSignal { signal: SignalId, updated: Signal },
    SignalClicked(SignalId),
    SignalHovered(Option<SignalId>),
    OpenChart { msg_id: MessageId, signal: SignalId },
}
