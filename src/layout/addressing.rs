//! Conversions between linear bit indices and bit-grid coordinates.
//!
//! The grid shows one payload byte per row. Columns 0..=7 hold the bits of
//! that byte, most significant first, and column 8 holds the byte in hex.
//!
//! A linear bit index is byte-major: `row * 8 + offset`. In little-endian
//! (Intel) numbering the offset counts from the right edge of the row, so it
//! equals the DBC bit number. In big-endian (Motorola) numbering it counts
//! from the left edge, which makes a Motorola signal a contiguous run of
//! indices.

use super::LayoutError;

/// Bit columns per row
pub const BITS_PER_ROW: usize = 8;
/// Bit columns plus the hex byte column
pub const COLUMN_COUNT: usize = 9;
/// Column showing the whole byte in hex
pub const HEX_COLUMN: usize = 8;

/// A cell coordinate. Ordering is row-major.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridPos {
    pub row: usize,
    pub col: usize,
}

impl GridPos {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    pub fn from_cell_index(index: usize) -> Self {
        Self { row: index / COLUMN_COUNT, col: index % COLUMN_COUNT }
    }

    /// Index into the flat `row_count * 9` cell array
    pub fn cell_index(self) -> usize {
        self.row * COLUMN_COUNT + self.col
    }

    pub fn is_hex(self) -> bool {
        self.col == HEX_COLUMN
    }
}

/// Inclusive range of linear bit indices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitRange {
    pub first: usize,
    pub last: usize,
}

impl BitRange {
    pub fn len(&self) -> usize {
        self.last - self.first + 1
    }

    pub fn contains(&self, bit: usize) -> bool {
        (self.first..=self.last).contains(&bit)
    }

    pub fn iter(&self) -> std::ops::RangeInclusive<usize> {
        self.first..=self.last
    }
}

/// Linear bit index of a bit cell. Must not be called with the hex column.
pub fn bit_index(pos: GridPos, little_endian: bool) -> usize {
    debug_assert!(pos.col < BITS_PER_ROW);
    pos.row * BITS_PER_ROW + if little_endian { 7 - pos.col } else { pos.col }
}

/// Inverse of [`bit_index`]
pub fn grid_pos(bit: usize, little_endian: bool) -> GridPos {
    let offset = bit % BITS_PER_ROW;
    GridPos {
        row: bit / BITS_PER_ROW,
        col: if little_endian { 7 - offset } else { offset },
    }
}

/// Mirror a bit inside its byte (DBC Motorola <-> sequential numbering)
pub fn flip_bit_pos(bit: usize) -> usize {
    8 * (bit / 8) + 7 - bit % 8
}

/// Linear range covered by a signal, in the numbering of its own endianness.
/// A range that does not fit in `usize` is out of bounds for any grid; the
/// error then carries `row_count: 0`.
pub fn signal_range(start_bit: usize, size: usize, little_endian: bool) -> Result<BitRange, LayoutError> {
    if size == 0 {
        return Err(LayoutError::EmptySignal);
    }
    let first = if little_endian { start_bit } else { flip_bit_pos(start_bit) };
    let last = first
        .checked_add(size - 1)
        .ok_or(LayoutError::OutOfBounds { bit: first, row_count: 0 })?;
    Ok(BitRange { first, last })
}

/// `(lsb, msb)` bit positions of a signal in DBC numbering
pub fn signal_boundaries(start_bit: usize, size: usize, little_endian: bool) -> (usize, usize) {
    let span = size.saturating_sub(1);
    if little_endian {
        (start_bit, start_bit.saturating_add(span))
    } else {
        (flip_bit_pos(flip_bit_pos(start_bit).saturating_add(span)), start_bit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_bit_index_orientation() {
        // Top-left cell is the MSB of byte 0
        assert_eq!(bit_index(GridPos::new(0, 0), true), 7);
        assert_eq!(bit_index(GridPos::new(0, 0), false), 0);
        assert_eq!(bit_index(GridPos::new(1, 7), true), 8);
        assert_eq!(bit_index(GridPos::new(1, 7), false), 15);
    }

    #[test]
    fn test_flip_bit_pos() {
        assert_eq!(flip_bit_pos(0), 7);
        assert_eq!(flip_bit_pos(7), 0);
        assert_eq!(flip_bit_pos(12), 11);
        assert_eq!(flip_bit_pos(flip_bit_pos(37)), 37);
    }

    #[test]
    fn test_single_bit_range() {
        for le in [true, false] {
            let range = signal_range(21, 1, le).unwrap();
            assert_eq!(range.first, range.last);
            assert_eq!(range.len(), 1);
        }
    }

    #[test]
    fn test_empty_signal_is_rejected() {
        assert_eq!(signal_range(3, 0, true), Err(LayoutError::EmptySignal));
    }

    #[test]
    fn test_range_past_usize_is_out_of_bounds() {
        assert_eq!(
            signal_range(usize::MAX, 2, true),
            Err(LayoutError::OutOfBounds { bit: usize::MAX, row_count: 0 })
        );
        assert!(signal_range(usize::MAX - 7, 9, false).is_err());
        assert_eq!(signal_boundaries(usize::MAX, 2, true), (usize::MAX, usize::MAX));
    }

    #[test]
    fn test_big_endian_range_is_contiguous_in_grid() {
        // Motorola 12 bits starting at bit 7: all of byte 0 then the high nibble of byte 1
        let range = signal_range(7, 12, false).unwrap();
        assert_eq!(range, BitRange { first: 0, last: 11 });
        assert_eq!(grid_pos(range.first, false), GridPos::new(0, 0));
        assert_eq!(grid_pos(range.last, false), GridPos::new(1, 3));
        assert_eq!(signal_boundaries(7, 12, false), (12, 7));
    }

    #[test]
    fn test_cell_index() {
        let pos = GridPos::new(2, 8);
        assert!(pos.is_hex());
        assert_eq!(pos.cell_index(), 26);
        assert_eq!(GridPos::from_cell_index(26), pos);
    }

    #[test]
    fn test_row_major_ordering() {
        assert!(GridPos::new(0, 7) < GridPos::new(1, 0));
        assert!(GridPos::new(1, 2) < GridPos::new(1, 3));
    }

    proptest! {
        #[test]
        fn grid_pos_round_trips(row_count in 1usize..=64, seed in any::<usize>(), le in any::<bool>()) {
            let bit = seed % (row_count * BITS_PER_ROW);
            let pos = grid_pos(bit, le);
            prop_assert!(pos.row < row_count);
            prop_assert!(pos.col < BITS_PER_ROW);
            prop_assert_eq!(bit_index(pos, le), bit);
        }

        #[test]
        fn boundaries_sit_on_range_ends(start in 0usize..64, size in 1usize..=16, le in any::<bool>()) {
            let range = signal_range(start, size, le).unwrap();
            let (lsb, msb) = signal_boundaries(start, size, le);
            let first = bit_index(grid_pos(range.first, le), true);
            let last = bit_index(grid_pos(range.last, le), true);
            if le {
                prop_assert_eq!((first, last), (lsb, msb));
            } else {
                prop_assert_eq!((first, last), (msb, lsb));
            }
        }
    }
}
