use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

use crate::core::{Color, DbcMessage, Signal, SignalId};
use super::addressing::{grid_pos, signal_boundaries, signal_range, GridPos, BITS_PER_ROW, COLUMN_COUNT};
use super::LayoutError;

/// One cell of the bit grid
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cell {
    /// Signals covering this bit: largest first, and among equal sizes the
    /// most recently added first. The front entry is the topmost signal.
    pub sigs: Vec<SignalId>,
    pub is_msb: bool,
    pub is_lsb: bool,
    /// Backed by received payload bytes
    pub valid: bool,
    /// Display value ("0"/"1", or two hex digits in the hex column)
    pub val: String,
    pub bg_color: Color,
}

impl Cell {
    pub fn topmost(&self) -> Option<SignalId> {
        self.sigs.first().copied()
    }

    pub fn is_overlap(&self) -> bool {
        self.sigs.len() > 1
    }
}

/// Where a signal landed on the grid
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalSpan {
    pub size: usize,
    pub is_little_endian: bool,
    /// Boundary bits in DBC numbering
    pub lsb: usize,
    pub msb: usize,
    /// Covered cell indices, in range order
    pub cells: Vec<usize>,
}

impl SignalSpan {
    pub fn lsb_cell(&self) -> usize {
        if self.is_little_endian { self.cells[0] } else { self.cells[self.cells.len() - 1] }
    }

    pub fn msb_cell(&self) -> usize {
        if self.is_little_endian { self.cells[self.cells.len() - 1] } else { self.cells[0] }
    }
}

/// Bit grid of one message: `row_count` rows of 8 bit cells plus a hex cell
#[derive(Debug, Clone, Default)]
pub struct BinaryLayout {
    row_count: usize,
    cells: Vec<Cell>,
    /// Reverse index: signal -> covered cells
    spans: BTreeMap<SignalId, SignalSpan>,
    rejected: Vec<(SignalId, LayoutError)>,
}

impl BinaryLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the grid from scratch. Without a definition the grid takes
    /// the size of the last received payload so undefined messages can
    /// still be inspected.
    pub fn rebuild(&mut self, definition: Option<&DbcMessage>, last_payload_len: usize) {
        self.row_count = definition.map_or(last_payload_len, |m| m.size);
        self.cells = vec![Cell::default(); self.row_count * COLUMN_COUNT];
        self.spans.clear();
        self.rejected.clear();

        if let Some(msg) = definition {
            for sig in msg.signals() {
                match self.place(sig) {
                    Ok(span) => self.insert(sig.id, span),
                    Err(e) => {
                        warn!(
                            "signal {} out of bounds. start_bit: {} size: {}: {}",
                            sig.name, sig.start_bit, sig.size, e
                        );
                        self.rejected.push((sig.id, e));
                    }
                }
            }
        }

        let valid_rows = last_payload_len.min(self.row_count);
        for cell in &mut self.cells[..valid_rows * COLUMN_COUNT] {
            cell.valid = true;
        }

        debug!(
            rows = self.row_count,
            signals = self.spans.len(),
            rejected = self.rejected.len(),
            "rebuilt bit layout"
        );
    }

    fn place(&self, sig: &Signal) -> Result<SignalSpan, LayoutError> {
        let range = signal_range(sig.start_bit, sig.size, sig.is_little_endian).map_err(|e| match e {
            LayoutError::OutOfBounds { bit, .. } => LayoutError::OutOfBounds { bit, row_count: self.row_count },
            e => e,
        })?;
        if range.last >= self.row_count * BITS_PER_ROW {
            return Err(LayoutError::OutOfBounds { bit: range.last, row_count: self.row_count });
        }

        let (lsb, msb) = signal_boundaries(sig.start_bit, sig.size, sig.is_little_endian);
        Ok(SignalSpan {
            size: sig.size,
            is_little_endian: sig.is_little_endian,
            lsb,
            msb,
            cells: range
                .iter()
                .map(|bit| grid_pos(bit, sig.is_little_endian).cell_index())
                .collect(),
        })
    }

    fn insert(&mut self, id: SignalId, span: SignalSpan) {
        let Self { cells, spans, .. } = self;

        for &idx in &span.cells {
            let sigs = &mut cells[idx].sigs;
            let pos = sigs.partition_point(|other| spans.get(other).map_or(0, |s| s.size) > span.size);
            sigs.insert(pos, id);
        }
        cells[span.lsb_cell()].is_lsb = true;
        cells[span.msb_cell()].is_msb = true;

        spans.insert(id, span);
    }

    /// Append empty rows; existing cells are left untouched
    pub(super) fn grow(&mut self, row_count: usize) {
        if row_count <= self.row_count {
            return;
        }
        let filler = Cell { valid: true, ..Cell::default() };
        self.cells.resize(row_count * COLUMN_COUNT, filler);
        self.row_count = row_count;
    }

    pub(super) fn cells_mut(&mut self) -> &mut [Cell] {
        &mut self.cells
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn contains(&self, pos: GridPos) -> bool {
        pos.row < self.row_count && pos.col < COLUMN_COUNT
    }

    pub fn cell(&self, pos: GridPos) -> Option<&Cell> {
        if self.contains(pos) { self.cells.get(pos.cell_index()) } else { None }
    }

    pub fn topmost_at(&self, pos: GridPos) -> Option<SignalId> {
        self.cell(pos).and_then(Cell::topmost)
    }

    pub fn span(&self, id: SignalId) -> Option<&SignalSpan> {
        self.spans.get(&id)
    }

    /// Cells covered by a signal; empty if it is not laid out
    pub fn signal_cells(&self, id: SignalId) -> &[usize] {
        self.spans.get(&id).map_or(&[], |s| s.cells.as_slice())
    }

    pub fn is_overlapping(&self, id: SignalId) -> bool {
        self.signal_cells(id).iter().any(|&idx| self.cells[idx].is_overlap())
    }

    /// Signals that share at least one bit with another signal
    pub fn overlapping_signals(&self) -> BTreeSet<SignalId> {
        self.cells
            .iter()
            .filter(|c| c.is_overlap())
            .flat_map(|c| c.sigs.iter().copied())
            .collect()
    }

    /// Signals skipped by the last rebuild, with the reason
    pub fn out_of_bounds(&self) -> &[(SignalId, LayoutError)] {
        &self.rejected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DbcFile;
    use crate::core::MessageId;
    use crate::layout::addressing::HEX_COLUMN;

    fn message(size: usize, signals: Vec<Signal>) -> (DbcFile, Vec<SignalId>) {
        let mut dbc = DbcFile::new("test");
        dbc.update_msg(&MessageId::new(0, 0x100), "Test", size, "");
        let ids = signals
            .into_iter()
            .map(|s| dbc.add_signal(0x100, s).unwrap())
            .collect();
        (dbc, ids)
    }

    fn cell_at_bit(layout: &BinaryLayout, bit: usize) -> &Cell {
        layout.cell(grid_pos(bit, true)).unwrap()
    }

    #[test]
    fn test_empty_message_has_full_grid() {
        let (dbc, _) = message(8, vec![]);
        let mut layout = BinaryLayout::new();
        layout.rebuild(dbc.msg(0x100), 8);

        assert_eq!(layout.row_count(), 8);
        assert_eq!(layout.cells().len(), 72);
        assert!(layout.cells().iter().all(|c| c.sigs.is_empty()));
        assert!(layout.overlapping_signals().is_empty());
    }

    #[test]
    fn test_adjacent_nibbles() {
        let (dbc, ids) = message(1, vec![
            Signal::new("A", 0, 4, true),
            Signal::new("B", 4, 4, true),
        ]);
        let mut layout = BinaryLayout::new();
        layout.rebuild(dbc.msg(0x100), 1);

        for bit in 0..4 {
            assert_eq!(cell_at_bit(&layout, bit).sigs, vec![ids[0]]);
        }
        for bit in 4..8 {
            assert_eq!(cell_at_bit(&layout, bit).sigs, vec![ids[1]]);
        }
        assert!(cell_at_bit(&layout, 0).is_lsb);
        assert!(cell_at_bit(&layout, 3).is_msb);
        assert!(cell_at_bit(&layout, 4).is_lsb);
        assert!(cell_at_bit(&layout, 7).is_msb);
        assert!(!cell_at_bit(&layout, 1).is_lsb && !cell_at_bit(&layout, 1).is_msb);
        assert!(layout.overlapping_signals().is_empty());
    }

    #[test]
    fn test_single_bit_signal_is_msb_and_lsb() {
        let (dbc, ids) = message(2, vec![Signal::new("Flag", 9, 1, true)]);
        let mut layout = BinaryLayout::new();
        layout.rebuild(dbc.msg(0x100), 2);

        let cell = cell_at_bit(&layout, 9);
        assert_eq!(cell.sigs, vec![ids[0]]);
        assert!(cell.is_msb && cell.is_lsb);
        assert_eq!(layout.signal_cells(ids[0]).len(), 1);
    }

    #[test]
    fn test_overlap_sorted_largest_first() {
        let (dbc, ids) = message(2, vec![
            Signal::new("Small", 4, 4, true),
            Signal::new("Large", 0, 16, true),
            Signal::new("Apart", 0, 2, false),
        ]);
        let mut layout = BinaryLayout::new();
        layout.rebuild(dbc.msg(0x100), 2);

        let shared = cell_at_bit(&layout, 5);
        assert_eq!(shared.sigs, vec![ids[1], ids[0]]);
        assert!(shared.is_overlap());
        assert_eq!(layout.topmost_at(grid_pos(5, true)), Some(ids[1]));

        let overlapping = layout.overlapping_signals();
        assert!(overlapping.contains(&ids[0]));
        assert!(overlapping.contains(&ids[1]));
        assert!(layout.is_overlapping(ids[0]));
    }

    #[test]
    fn test_equal_size_later_signal_is_topmost() {
        let (dbc, ids) = message(1, vec![
            Signal::new("First", 0, 8, true),
            Signal::new("Second", 0, 8, true),
        ]);
        let mut layout = BinaryLayout::new();
        layout.rebuild(dbc.msg(0x100), 1);

        assert_eq!(cell_at_bit(&layout, 0).sigs, vec![ids[1], ids[0]]);
    }

    #[test]
    fn test_big_endian_signal_cells() {
        // Motorola, msb at bit 7 of byte 0, runs into the high nibble of byte 1
        let (dbc, ids) = message(2, vec![Signal::new("Rpm", 7, 12, false)]);
        let mut layout = BinaryLayout::new();
        layout.rebuild(dbc.msg(0x100), 2);

        let span = layout.span(ids[0]).unwrap();
        assert_eq!(span.cells.len(), 12);
        assert_eq!(span.msb_cell(), GridPos::new(0, 0).cell_index());
        assert_eq!(span.lsb_cell(), GridPos::new(1, 3).cell_index());
        assert!(layout.cell(GridPos::new(0, 0)).unwrap().is_msb);
        assert!(layout.cell(GridPos::new(1, 3)).unwrap().is_lsb);
        assert!(layout.cell(GridPos::new(1, 4)).unwrap().sigs.is_empty());
    }

    #[test]
    fn test_out_of_bounds_signal_is_excluded() {
        let (dbc, ids) = message(1, vec![
            Signal::new("Fits", 0, 4, true),
            Signal::new("TooLong", 4, 8, true),
            Signal::new("Empty", 0, 0, true),
        ]);
        let mut layout = BinaryLayout::new();
        layout.rebuild(dbc.msg(0x100), 1);

        // No partial placement of the overflowing signal
        assert!(layout.cells().iter().all(|c| !c.sigs.contains(&ids[1])));
        assert!(layout.span(ids[1]).is_none());
        assert_eq!(layout.out_of_bounds().len(), 2);
        assert_eq!(layout.out_of_bounds()[0], (ids[1], LayoutError::OutOfBounds { bit: 11, row_count: 1 }));
        assert_eq!(layout.out_of_bounds()[1], (ids[2], LayoutError::EmptySignal));
        assert_eq!(layout.signal_cells(ids[0]).len(), 4);
        assert_eq!(dbc.msg(0x100).unwrap().signals().len(), 3);
    }

    #[test]
    fn test_start_bit_near_usize_max_is_excluded() {
        let (dbc, ids) = message(8, vec![
            Signal::new("Wrapping", usize::MAX, 2, true),
            Signal::new("WrappingBE", usize::MAX - 7, 16, false),
            Signal::new("Fits", 0, 8, true),
        ]);
        let mut layout = BinaryLayout::new();
        layout.rebuild(dbc.msg(0x100), 8);

        assert_eq!(
            layout.out_of_bounds()[0],
            (ids[0], LayoutError::OutOfBounds { bit: usize::MAX, row_count: 8 })
        );
        assert_eq!(layout.out_of_bounds().len(), 2);
        assert!(layout.span(ids[0]).is_none() && layout.span(ids[1]).is_none());
        assert_eq!(layout.signal_cells(ids[2]).len(), 8);
    }

    #[test]
    fn test_validity_follows_payload_length() {
        let (dbc, _) = message(4, vec![]);
        let mut layout = BinaryLayout::new();
        layout.rebuild(dbc.msg(0x100), 2);

        assert!(layout.cell(GridPos::new(1, HEX_COLUMN)).unwrap().valid);
        assert!(!layout.cell(GridPos::new(2, 0)).unwrap().valid);
        assert_eq!(layout.cells().iter().filter(|c| c.valid).count(), 18);
    }

    #[test]
    fn test_undefined_message_uses_payload_length() {
        let mut layout = BinaryLayout::new();
        layout.rebuild(None, 3);
        assert_eq!(layout.row_count(), 3);
        assert_eq!(layout.cells().len(), 27);
        assert!(layout.cells().iter().all(|c| c.valid));
    }

    #[test]
    fn test_rebuild_discards_previous_layout() {
        let (mut dbc, ids) = message(1, vec![Signal::new("A", 0, 8, true)]);
        let mut layout = BinaryLayout::new();
        layout.rebuild(dbc.msg(0x100), 1);
        assert_eq!(layout.signal_cells(ids[0]).len(), 8);

        dbc.remove_signal(0x100, ids[0]);
        layout.rebuild(dbc.msg(0x100), 1);
        assert!(layout.span(ids[0]).is_none());
        assert!(layout.cells().iter().all(|c| c.sigs.is_empty() && !c.is_lsb && !c.is_msb));
    }

    #[test]
    fn test_cell_lookup_bounds() {
        let mut layout = BinaryLayout::new();
        layout.rebuild(None, 1);
        assert!(layout.cell(GridPos::new(0, 8)).is_some());
        assert!(layout.cell(GridPos::new(0, 9)).is_none());
        assert!(layout.cell(GridPos::new(1, 0)).is_none());
    }
}
