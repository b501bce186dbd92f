//! Pointer gestures over the bit grid.
//!
//! A press on a bit cell sets an anchor, dragging selects the bits between
//! the anchor and the pointer, and the release turns that selection into an
//! add or resize request. A press on a signal's msb/lsb cell resizes that
//! signal instead, with the anchor moved to its opposite edge.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::{MessageId, SignalId};
use crate::store::SignalStore;
use super::addressing::{bit_index, grid_pos, GridPos, BITS_PER_ROW};
use super::model::BinaryLayout;
use super::BinaryViewEvent;

/// How a free drag picks the endianness of the new signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DragDirection {
    /// The drag starts at the msb: dragging backwards gives little-endian
    #[default]
    MsbFirst,
    /// The drag starts at the lsb: dragging forwards gives little-endian
    LsbFirst,
    AlwaysLE,
    AlwaysBE,
}

/// Bits selected by an in-progress drag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub anchor_bit: usize,
    pub current_bit: usize,
    pub start_bit: usize,
    pub size: usize,
    pub is_little_endian: bool,
}

/// Resolve the selection between `anchor` and `current`. When resizing,
/// `resize_endianness` carries the signal's own endianness, which wins over
/// the drag direction policy.
pub fn resolve_selection(
    policy: DragDirection,
    anchor: GridPos,
    current: GridPos,
    resize_endianness: Option<bool>,
) -> Selection {
    // The hex column selects up to the last bit of its row
    let current = GridPos::new(current.row, current.col.min(BITS_PER_ROW - 1));
    let anchor = GridPos::new(anchor.row, anchor.col.min(BITS_PER_ROW - 1));

    let is_little_endian = resize_endianness.unwrap_or(match policy {
        DragDirection::MsbFirst => current < anchor,
        DragDirection::LsbFirst => current >= anchor,
        DragDirection::AlwaysLE => true,
        DragDirection::AlwaysBE => false,
    });

    let current_bit = bit_index(current, is_little_endian);
    let anchor_bit = bit_index(anchor, is_little_endian);
    let start_bit = current_bit.min(anchor_bit);
    Selection {
        anchor_bit,
        current_bit,
        start_bit,
        size: current_bit.max(anchor_bit) - start_bit + 1,
        is_little_endian,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GestureState {
    #[default]
    Idle,
    AnchorSet {
        pressed: GridPos,
        anchor: GridPos,
    },
    Resizing {
        pressed: GridPos,
        anchor: GridPos,
        signal: SignalId,
        is_little_endian: bool,
    },
}

/// Gesture and hover state of one bit grid
#[derive(Debug, Clone, Default)]
pub struct GestureController {
    pub drag_direction: DragDirection,
    state: GestureState,
    selection: Option<Selection>,
    hovered: Option<SignalId>,
}

impl GestureController {
    pub fn new(drag_direction: DragDirection) -> Self {
        Self { drag_direction, ..Self::default() }
    }

    pub fn state(&self) -> GestureState {
        self.state
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    pub fn hovered(&self) -> Option<SignalId> {
        self.hovered
    }

    pub fn resizing_signal(&self) -> Option<SignalId> {
        match self.state {
            GestureState::Resizing { signal, .. } => Some(signal),
            _ => None,
        }
    }

    /// Drop any gesture and hover state
    pub fn reset(&mut self) {
        self.state = GestureState::Idle;
        self.selection = None;
        self.hovered = None;
    }

    pub fn pointer_down(&mut self, pos: Option<GridPos>, layout: &BinaryLayout) {
        self.state = GestureState::Idle;
        self.selection = None;

        let Some(pressed) = pos.filter(|p| layout.contains(*p) && !p.is_hex()) else {
            return;
        };
        let Some(cell) = layout.cell(pressed) else {
            return;
        };

        let bit = bit_index(pressed, true);
        for &id in &cell.sigs {
            let Some(span) = layout.span(id) else {
                continue;
            };
            if bit == span.lsb || bit == span.msb {
                let opposite = if bit == span.lsb { span.msb } else { span.lsb };
                self.state = GestureState::Resizing {
                    pressed,
                    anchor: grid_pos(opposite, true),
                    signal: id,
                    is_little_endian: span.is_little_endian,
                };
                debug!("resizing signal {} from {:?}", id, pressed);
                return;
            }
        }

        self.state = GestureState::AnchorSet { pressed, anchor: pressed };
    }

    /// Track the pointer: updates hover and, while pressed, the selection
    pub fn pointer_move(&mut self, pos: Option<GridPos>, layout: &BinaryLayout) -> Option<BinaryViewEvent> {
        let current = pos.filter(|p| layout.contains(*p))?;

        let drag = match self.state {
            GestureState::Idle => None,
            GestureState::AnchorSet { pressed, anchor } => Some((pressed, anchor, None)),
            GestureState::Resizing { pressed, anchor, is_little_endian, .. } => {
                Some((pressed, anchor, Some(is_little_endian)))
            }
        };
        if let Some((pressed, anchor, resize)) = drag {
            if current != pressed || self.selection.is_some() {
                self.selection = Some(resolve_selection(self.drag_direction, anchor, current, resize));
            }
        }

        self.highlight(layout.topmost_at(current))
    }

    /// Finish the gesture. Always returns to idle.
    pub fn pointer_up(&mut self, pos: Option<GridPos>, layout: &BinaryLayout) -> Option<BinaryViewEvent> {
        let state = std::mem::take(&mut self.state);
        let dragged = self.selection.take().is_some();
        let release = pos.filter(|p| layout.contains(*p))?;

        let event = match state {
            GestureState::Idle => None,
            GestureState::AnchorSet { anchor, .. } if dragged => {
                let sel = resolve_selection(self.drag_direction, anchor, release, None);
                Some(BinaryViewEvent::AddSignal {
                    start_bit: sel.start_bit,
                    size: sel.size,
                    little_endian: sel.is_little_endian,
                })
            }
            GestureState::Resizing { anchor, signal, is_little_endian, .. } if dragged => {
                let sel = resolve_selection(self.drag_direction, anchor, release, Some(is_little_endian));
                Some(BinaryViewEvent::ResizeSignal { signal, start_bit: sel.start_bit, size: sel.size })
            }
            GestureState::AnchorSet { anchor, .. } | GestureState::Resizing { anchor, .. } => {
                layout.topmost_at(anchor).map(BinaryViewEvent::SignalClicked)
            }
        };
        debug!(?event, "gesture finished");
        event
    }

    /// Pointer left the grid
    pub fn leave(&mut self) -> Option<BinaryViewEvent> {
        self.highlight(None)
    }

    fn highlight(&mut self, sig: Option<SignalId>) -> Option<BinaryViewEvent> {
        if sig == self.hovered {
            return None;
        }
        self.hovered = sig;
        Some(BinaryViewEvent::SignalHovered(sig))
    }

    pub fn remove_hovered(&mut self) -> Option<BinaryViewEvent> {
        self.hovered.take().map(BinaryViewEvent::RemoveSignal)
    }

    pub fn toggle_hovered_endianness<S: SignalStore + ?Sized>(
        &self,
        store: &S,
        msg_id: &MessageId,
    ) -> Option<BinaryViewEvent> {
        let signal = store.signal(msg_id, self.hovered?)?;
        let mut updated = signal.clone();
        updated.is_little_endian = !updated.is_little_endian;
        Some(BinaryViewEvent::EditSignal { signal: signal.id, updated })
    }

    pub fn toggle_hovered_signedness<S: SignalStore + ?Sized>(
        &self,
        store: &S,
        msg_id: &MessageId,
    ) -> Option<BinaryViewEvent> {
        let signal = store.signal(msg_id, self.hovered?)?;
        let mut updated = signal.clone();
        updated.is_signed = !updated.is_signed;
        Some(BinaryViewEvent::EditSignal { signal: signal.id, updated })
    }

    pub fn open_hovered_chart(&self, msg_id: &MessageId) -> Option<BinaryViewEvent> {
        self.hovered.map(|signal| BinaryViewEvent::OpenChart { msg_id: *msg_id, signal })
    }
}
