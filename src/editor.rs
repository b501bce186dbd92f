//! Signal editing on top of a [`DbcFile`]: turns bit-grid events into
//! definition changes and validates edits before they are stored.

use thiserror::Error;
use tracing::{debug, info};

use crate::core::{DbcFile, MessageId, Signal, SignalId};
use crate::layout::addressing::{flip_bit_pos, signal_range, BITS_PER_ROW};
use crate::layout::BinaryViewEvent;

/// Rejected signal edits
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    #[error("message {0} is not defined")]
    UnknownMessage(MessageId),

    #[error("signal {signal} not found in message {msg_id}")]
    UnknownSignal { msg_id: MessageId, signal: SignalId },

    #[error("signal name is empty")]
    EmptyName,

    #[error("there is already a signal named '{0}'")]
    DuplicateName(String),

    #[error("signal size {0} is not in 1..=64")]
    InvalidSize(usize),

    #[error("signal '{name}' extends beyond the {size}-byte message")]
    OutOfBounds { name: String, size: usize },

    #[error("signal '{0}' has min greater than max")]
    InvalidRange(String),
}

/// Signal list state of the active message
#[derive(Debug, Clone, Default)]
pub struct SignalEditor {
    filter: String,
}

impl SignalEditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn set_filter(&mut self, text: &str) {
        self.filter = text.trim().to_string();
    }

    /// Signals of the message whose name contains the filter, ignoring case
    pub fn visible_signals<'a>(&self, dbc: &'a DbcFile, msg_id: &MessageId) -> Vec<&'a Signal> {
        let Some(msg) = dbc.msg(msg_id.address) else {
            return Vec::new();
        };
        let filter_lower = self.filter.to_lowercase();
        msg.signals()
            .iter()
            .filter(|s| filter_lower.is_empty() || s.name.to_lowercase().contains(&filter_lower))
            .collect()
    }

    /// Create a signal over a grid range. `start_bit` is the first bit of the
    /// range in the numbering of `little_endian`. An undefined message is
    /// created with `fallback_size` bytes once the signal is known to fit.
    pub fn add_signal(
        &self,
        dbc: &mut DbcFile,
        msg_id: &MessageId,
        start_bit: usize,
        size: usize,
        little_endian: bool,
        fallback_size: usize,
    ) -> Result<SignalId, EditError> {
        let msg = dbc.msg(msg_id.address);
        let name = (1..)
            .map(|i| format!("NEW_SIGNAL_{}", i))
            .find(|n| msg.map_or(true, |m| m.signal_by_name(n).is_none()))
            .unwrap_or_default();
        let mut signal = Signal::new(&name, 0, size, little_endian);
        set_range(&mut signal, start_bit, size);
        signal.min = Some(0.0);
        signal.max = Some(signal.raw_max() as f64);
        validate(msg.map_or(fallback_size, |m| m.size), &signal)?;

        if msg.is_none() {
            let name = format!("NEW_MSG_{:X}", msg_id.address);
            info!("Creating message {} for new signal", name);
            dbc.update_msg(msg_id, &name, fallback_size, "");
        }
        dbc.add_signal(msg_id.address, signal).ok_or(EditError::UnknownMessage(*msg_id))
    }

    /// Move the edges of a signal. `start_bit` is in the signal's own
    /// numbering, as produced by a resize gesture.
    pub fn resize_signal(
        &self,
        dbc: &mut DbcFile,
        msg_id: &MessageId,
        id: SignalId,
        start_bit: usize,
        size: usize,
    ) -> Result<(), EditError> {
        let mut signal = lookup(dbc, msg_id, id)?.clone();
        set_range(&mut signal, start_bit, size);
        self.store(dbc, msg_id, signal)
    }

    pub fn remove_signal(&self, dbc: &mut DbcFile, msg_id: &MessageId, id: SignalId) -> Result<Signal, EditError> {
        let removed = dbc
            .remove_signal(msg_id.address, id)
            .ok_or(EditError::UnknownSignal { msg_id: *msg_id, signal: id })?;
        debug!("removed signal {} from {}", removed.name, msg_id);
        Ok(removed)
    }

    /// Replace a signal with an edited copy. Switching the byte order keeps
    /// the start cell on the grid.
    pub fn save_signal(&self, dbc: &mut DbcFile, msg_id: &MessageId, mut signal: Signal) -> Result<(), EditError> {
        let origin = lookup(dbc, msg_id, signal.id)?;
        if signal.is_little_endian != origin.is_little_endian {
            signal.start_bit = flip_bit_pos(signal.start_bit);
        }
        self.store(dbc, msg_id, signal)
    }

    fn store(&self, dbc: &mut DbcFile, msg_id: &MessageId, signal: Signal) -> Result<(), EditError> {
        let msg = dbc.msg(msg_id.address).ok_or(EditError::UnknownMessage(*msg_id))?;
        if signal.name.trim().is_empty() {
            return Err(EditError::EmptyName);
        }
        if msg.signals().iter().any(|s| s.id != signal.id && s.name == signal.name) {
            return Err(EditError::DuplicateName(signal.name));
        }
        validate(msg.size, &signal)?;

        let id = signal.id;
        if dbc.update_signal(msg_id.address, signal) {
            Ok(())
        } else {
            Err(EditError::UnknownSignal { msg_id: *msg_id, signal: id })
        }
    }

    /// Carry out an edit request from the bit grid. Returns the affected
    /// signal, or None for events that do not edit anything.
    pub fn apply(
        &self,
        dbc: &mut DbcFile,
        msg_id: &MessageId,
        event: &BinaryViewEvent,
        fallback_size: usize,
    ) -> Result<Option<SignalId>, EditError> {
        match event {
            BinaryViewEvent::AddSignal { start_bit, size, little_endian } => self
                .add_signal(dbc, msg_id, *start_bit, *size, *little_endian, fallback_size)
                .map(Some),
            BinaryViewEvent::ResizeSignal { signal, start_bit, size } => {
                self.resize_signal(dbc, msg_id, *signal, *start_bit, *size)?;
                Ok(Some(*signal))
            }
            BinaryViewEvent::RemoveSignal(signal) => {
                self.remove_signal(dbc, msg_id, *signal)?;
                Ok(Some(*signal))
            }
            BinaryViewEvent::EditSignal { signal, updated } => {
                let mut updated = updated.clone();
                updated.id = *signal;
                self.save_signal(dbc, msg_id, updated)?;
                Ok(Some(*signal))
            }
            BinaryViewEvent::SignalClicked(_)
            | BinaryViewEvent::SignalHovered(_)
            | BinaryViewEvent::OpenChart { .. } => Ok(None),
        }
    }
}

fn lookup<'a>(dbc: &'a DbcFile, msg_id: &MessageId, id: SignalId) -> Result<&'a Signal, EditError> {
    dbc.msg(msg_id.address)
        .ok_or(EditError::UnknownMessage(*msg_id))?
        .signal(id)
        .ok_or(EditError::UnknownSignal { msg_id: *msg_id, signal: id })
}

/// Grid range start to DBC start bit
fn set_range(signal: &mut Signal, start_bit: usize, size: usize) {
    signal.start_bit = if signal.is_little_endian { start_bit } else { flip_bit_pos(start_bit) };
    signal.size = size;
}

fn validate(msg_size: usize, signal: &Signal) -> Result<(), EditError> {
    if !(1..=64).contains(&signal.size) {
        return Err(EditError::InvalidSize(signal.size));
    }
    let in_bounds = signal_range(signal.start_bit, signal.size, signal.is_little_endian)
        .map(|r| r.last < msg_size.saturating_mul(BITS_PER_ROW))
        .unwrap_or(false);
    if !in_bounds {
        return Err(EditError::OutOfBounds { name: signal.name.clone(), size: msg_size });
    }
    if let (Some(min), Some(max)) = (signal.min, signal.max) {
        if min > max {
            return Err(EditError::InvalidRange(signal.name.clone()));
        }
    }
    Ok(())
}
