//! Read-side interfaces the bit grid consumes: message definitions and the
//! last received payload per message.

use std::collections::HashMap;

use crate::core::{CanData, CanMessage, DbcFile, DbcMessage, MessageId, Signal, SignalId};

/// Authoritative signal definitions
pub trait SignalStore {
    fn message_definition(&self, id: &MessageId) -> Option<&DbcMessage>;

    fn signal(&self, id: &MessageId, signal: SignalId) -> Option<&Signal> {
        self.message_definition(id)?.signal(signal)
    }

    /// Moves whenever definitions or the edit history change
    fn generation(&self) -> u64;
}

impl SignalStore for DbcFile {
    fn message_definition(&self, id: &MessageId) -> Option<&DbcMessage> {
        self.msg(id.address)
    }

    fn generation(&self) -> u64 {
        DbcFile::generation(self)
    }
}

/// Latest payload and bit statistics per message
pub trait PayloadSource {
    fn last_payload(&self, id: &MessageId) -> Option<&CanData>;
}

/// In-memory [`PayloadSource`] fed with received frames
#[derive(Debug, Default)]
pub struct PayloadCache {
    data: HashMap<MessageId, CanData>,
}

impl PayloadCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a frame; returns the stream it belongs to
    pub fn push(&mut self, msg: &CanMessage) -> MessageId {
        let id = msg.message_id();
        self.data.entry(id).or_default().update(msg);
        id
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl PayloadSource for PayloadCache {
    fn last_payload(&self, id: &MessageId) -> Option<&CanData> {
        self.data.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dbc_file_as_store() {
        let mut dbc = DbcFile::new("test");
        let id = MessageId::new(1, 0x200);
        dbc.update_msg(&id, "Msg", 8, "");
        let sig = dbc.add_signal(0x200, Signal::new("A", 0, 8, true)).unwrap();

        let store: &dyn SignalStore = &dbc;
        assert_eq!(store.message_definition(&id).unwrap().name, "Msg");
        assert_eq!(store.signal(&id, sig).unwrap().name, "A");
        assert!(store.signal(&MessageId::new(1, 0x300), sig).is_none());
        assert_eq!(store.generation(), dbc.generation());
    }

    #[test]
    fn test_payload_cache_tracks_streams() {
        let mut cache = PayloadCache::new();
        let a = cache.push(&CanMessage::new(0, 0x10, vec![1, 2]));
        cache.push(&CanMessage::new(0, 0x10, vec![1, 3]));
        let b = cache.push(&CanMessage::new(1, 0x10, vec![9]));

        assert_ne!(a, b);
        assert_eq!(cache.len(), 2);
        let data = cache.last_payload(&a).unwrap();
        assert_eq!(data.dat, vec![1, 3]);
        assert_eq!(data.count, 2);
        assert_eq!(data.bit_change_counts[1][0], 1);
        assert_eq!(data.bit_change_counts[1][1], 0);

        cache.clear();
        assert!(cache.last_payload(&a).is_none());
    }
}
