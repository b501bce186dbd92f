//! Live payload overlay: bit values and toggle-activity highlighting.

use tracing::debug;

use crate::core::{CanData, Color};
use super::addressing::{BITS_PER_ROW, COLUMN_COUNT, HEX_COLUMN};
use super::model::{BinaryLayout, Cell};

const MAX_ALPHA: f64 = 255.0;
/// Steepness of the logarithmic response
const FACTOR: f64 = 0.25;
/// Baseline for bits that belong to a signal
const SIGNAL_OFFSET: f64 = 50.0;
/// Extra floor for bits that toggled at least once
const ACTIVE_FLOOR: f64 = 25.0;

/// Background alpha of a bit cell from how often the bit toggled
pub fn highlight_alpha(toggles: u32, samples: u64, in_signal: bool) -> u8 {
    let scaler = MAX_ALPHA / (1.0 + FACTOR).log2();
    let offset = if in_signal { SIGNAL_OFFSET } else { 0.0 };
    let min = if toggles == 0 { offset } else { offset + ACTIVE_FLOOR };
    let ratio = if samples == 0 { 0.0 } else { toggles as f64 / samples as f64 };

    (offset + (1.0 + FACTOR * ratio).log2() * scaler)
        .clamp(min, MAX_ALPHA)
        .round() as u8
}

impl BinaryLayout {
    /// Apply the latest payload. Grows the grid when the payload is longer
    /// than the current row count; signal coverage is left as is. Returns the
    /// indices of cells whose value or color changed.
    pub fn update_state(&mut self, data: &CanData) -> Vec<usize> {
        let binary = &data.dat;
        if binary.len() > self.row_count() {
            debug!(from = self.row_count(), to = binary.len(), "payload longer than definition, growing grid");
            self.grow(binary.len());
        }

        let cells = self.cells_mut();
        let mut changed = Vec::new();
        for (i, &byte) in binary.iter().enumerate() {
            let counts = data.bit_change_counts.get(i).copied().unwrap_or([0; 8]);
            for j in 0..BITS_PER_ROW {
                let idx = i * COLUMN_COUNT + j;
                let cell = &mut cells[idx];
                let val = if (byte >> (7 - j)) & 1 != 0 { "1" } else { "0" };
                let alpha = highlight_alpha(counts[7 - j], data.count, !cell.sigs.is_empty());
                let color = cell.bg_color.with_alpha(alpha);
                if update_item(cell, val, color) {
                    changed.push(idx);
                }
            }

            let idx = i * COLUMN_COUNT + HEX_COLUMN;
            let color = data.colors.get(i).copied().unwrap_or_default();
            if update_item(&mut cells[idx], &format!("{:02X}", byte), color) {
                changed.push(idx);
            }
        }
        changed
    }
}

fn update_item(cell: &mut Cell, val: &str, color: Color) -> bool {
    if cell.val != val || cell.bg_color != color {
        cell.val = val.to_string();
        cell.bg_color = color;
        true
    } else {
        false
    }
}
