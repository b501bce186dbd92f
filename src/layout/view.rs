use std::collections::BTreeSet;
use tracing::debug;

use crate::core::{MessageId, SignalId};
use crate::store::{PayloadSource, SignalStore};
use super::addressing::GridPos;
use super::gesture::{DragDirection, GestureController};
use super::model::BinaryLayout;
use super::BinaryViewEvent;

/// The bit grid of the active message together with its gesture state.
///
/// Structural rebuilds always reset the gesture first, and a pending
/// definition change is applied before any live-data update, so cells are
/// never painted with stale signal coverage.
#[derive(Debug, Default)]
pub struct BinaryView {
    msg_id: Option<MessageId>,
    layout: BinaryLayout,
    gesture: GestureController,
    synced_generation: Option<u64>,
}

impl BinaryView {
    pub fn new(drag_direction: DragDirection) -> Self {
        Self {
            gesture: GestureController::new(drag_direction),
            ..Self::default()
        }
    }

    pub fn msg_id(&self) -> Option<MessageId> {
        self.msg_id
    }

    pub fn layout(&self) -> &BinaryLayout {
        &self.layout
    }

    pub fn gesture(&self) -> &GestureController {
        &self.gesture
    }

    /// Switch to another message, dropping any gesture in progress
    pub fn set_message<S, P>(&mut self, msg_id: MessageId, store: &S, payloads: &P)
    where
        S: SignalStore + ?Sized,
        P: PayloadSource + ?Sized,
    {
        debug!("binary view switched to {}", msg_id);
        self.msg_id = Some(msg_id);
        self.refresh(store, payloads);
    }

    /// Rebuild the grid from the store and re-apply the last payload
    pub fn refresh<S, P>(&mut self, store: &S, payloads: &P)
    where
        S: SignalStore + ?Sized,
        P: PayloadSource + ?Sized,
    {
        self.gesture.reset();
        self.synced_generation = Some(store.generation());

        let Some(id) = self.msg_id else {
            self.layout = BinaryLayout::default();
            return;
        };
        let last = payloads.last_payload(&id);
        self.layout
            .rebuild(store.message_definition(&id), last.map_or(0, |d| d.dat.len()));
        if let Some(data) = last {
            self.layout.update_state(data);
        }
    }

    /// Rebuild if the store changed since the last refresh
    pub fn sync<S, P>(&mut self, store: &S, payloads: &P) -> bool
    where
        S: SignalStore + ?Sized,
        P: PayloadSource + ?Sized,
    {
        if self.synced_generation == Some(store.generation()) {
            return false;
        }
        self.refresh(store, payloads);
        true
    }

    /// Apply the newest payload of the active message. Returns the cells to
    /// repaint (all of them after a rebuild).
    pub fn update_state<S, P>(&mut self, store: &S, payloads: &P) -> Vec<usize>
    where
        S: SignalStore + ?Sized,
        P: PayloadSource + ?Sized,
    {
        if self.sync(store, payloads) {
            return (0..self.layout.cells().len()).collect();
        }
        match self.msg_id.and_then(|id| payloads.last_payload(&id)) {
            Some(data) => self.layout.update_state(data),
            None => Vec::new(),
        }
    }

    pub fn pointer_down(&mut self, pos: Option<GridPos>) {
        self.gesture.pointer_down(pos, &self.layout);
    }

    pub fn pointer_move(&mut self, pos: Option<GridPos>) -> Option<BinaryViewEvent> {
        self.gesture.pointer_move(pos, &self.layout)
    }

    pub fn pointer_up(&mut self, pos: Option<GridPos>) -> Option<BinaryViewEvent> {
        self.gesture.pointer_up(pos, &self.layout)
    }

    pub fn leave(&mut self) -> Option<BinaryViewEvent> {
        self.gesture.leave()
    }

    pub fn delete_hovered(&mut self) -> Option<BinaryViewEvent> {
        self.gesture.remove_hovered()
    }

    pub fn toggle_endianness<S: SignalStore + ?Sized>(&self, store: &S) -> Option<BinaryViewEvent> {
        self.gesture.toggle_hovered_endianness(store, self.msg_id.as_ref()?)
    }

    pub fn toggle_signedness<S: SignalStore + ?Sized>(&self, store: &S) -> Option<BinaryViewEvent> {
        self.gesture.toggle_hovered_signedness(store, self.msg_id.as_ref()?)
    }

    pub fn open_chart(&self) -> Option<BinaryViewEvent> {
        self.gesture.open_hovered_chart(self.msg_id.as_ref()?)
    }

    pub fn overlapping_signals(&self) -> BTreeSet<SignalId> {
        self.layout.overlapping_signals()
    }
}
