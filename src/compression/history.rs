
//! The indexed color history, a small cache of recently reconstructed pixels.
//! A group may be coded as three indices into this cache instead of residuals.

use super::state::CodecState;
use super::tables::{COMPONENTS, GROUP_SIZE, HISTORY_PIXELS_ABOVE, HISTORY_SIZE, QUANT_DIVISOR, clamp};


/// Entries that are never aliased to the line above.
const CACHED_ENTRIES: usize = HISTORY_SIZE - HISTORY_PIXELS_ABOVE;


/// The cached pixels, most recently used first.
#[derive(Debug, Clone, Default)]
pub(crate) struct History {
    pub pixels: [[i32; COMPONENTS]; HISTORY_SIZE],
    pub valid: [bool; HISTORY_SIZE],
}

impl History {

    /// Number of entries that currently hold a pixel.
    #[cfg(test)]
    pub fn valid_count(&self) -> usize {
        self.valid.iter().filter(|&&valid| valid).count()
    }
}


impl CodecState<'_> {

    /// The pixel behind a history index. Outside of the first line,
    /// the last entries refer to the pixels above the group.
    pub fn history_lookup(&self, entry: usize, h_pos: i32, first_line: bool) -> [i32; COMPONENTS] {
        if first_line || entry < CACHED_ENTRIES {
            return self.history.pixels[entry];
        }

        let half = (HISTORY_PIXELS_ABOVE / 2) as i32;
        let center = clamp((h_pos / 3) * 3 + 1, half, self.slice_width - 1 - half);
        let position = center + (entry - CACHED_ENTRIES) as i32 - half;

        let mut pixel = [0; COMPONENTS];
        for component in 0 .. COMPONENTS {
            pixel[component] = self.previous[component].clamped(position);
        }

        pixel
    }

    /// Whether the original pixel is within the quantization error of any valid entry.
    /// The quantization error is estimated from a slightly higher qp.
    pub fn is_within_quant_error(&mut self, h_pos: i32, v_pos: i32, qp: i32, sample: usize) -> bool {
        self.group.within_quant_error[sample] = false;

        // nothing has been cached before the first pixel
        if h_pos == 0 && v_pos == 0 {
            return false;
        }

        let modified_qp = (qp + 2).min(self.tables.max_qp());
        let max_error = [
            QUANT_DIVISOR[self.level(modified_qp, 0) as usize] / 2,
            QUANT_DIVISOR[self.level(modified_qp, 1) as usize] / 2,
            QUANT_DIVISOR[self.level(modified_qp, 2) as usize] / 2,
        ];

        if self.v_pos > 0 {
            for valid in &mut self.history.valid[CACHED_ENTRIES ..] {
                *valid = true;
            }
        }

        let original = self.original_pixel(h_pos);
        let first_line = v_pos == 0;

        let hit = (0 .. HISTORY_SIZE)
            .filter(|&entry| self.history.valid[entry])
            .any(|entry| {
                let pixel = self.history_lookup(entry, h_pos, first_line);
                (0 .. COMPONENTS).all(|component| (pixel[component] - original[component]).abs() <= max_error[component])
            });

        self.group.within_quant_error[sample] = hit;
        hit
    }

    /// The valid entry that is closest to the original pixel, luma weighted twice.
    /// Ties are resolved towards the most recently used entry.
    pub fn pick_best_history_entry(&self, h_pos: i32, original: [i32; COMPONENTS]) -> usize {
        let first_line = self.v_pos == 0;
        let mut best = 0;
        let mut lowest_sad = i32::MAX;

        for entry in (0 .. HISTORY_SIZE).filter(|&entry| self.history.valid[entry]) {
            let pixel = self.history_lookup(entry, h_pos, first_line);

            let sad = 2 * (pixel[0] - original[0]).abs()
                + (pixel[1] - original[1]).abs()
                + (pixel[2] - original[2]).abs();

            if sad < lowest_sad {
                lowest_sad = sad;
                best = entry;
            }
        }

        best
    }

    /// Insert the pixel as the most recently used entry.
    /// An equal entry is moved to the front instead if the last group was coded with indices,
    /// otherwise the first empty or the least recently used entry is replaced.
    pub fn update_history_element(&mut self, recon: [i32; COMPONENTS], last_group_selected: bool) {
        let cache_size = if self.v_pos == 0 { HISTORY_SIZE } else { CACHED_ENTRIES };
        let mut location = cache_size - 1;

        for entry in 0 .. cache_size {
            if !self.history.valid[entry] {
                location = entry;
                break;
            }

            if last_group_selected && self.history.pixels[entry] == recon {
                location = entry;
                break;
            }
        }

        for entry in (1 ..= location).rev() {
            self.history.pixels[entry] = self.history.pixels[entry - 1];
            self.history.valid[entry] = self.history.valid[entry - 1];
        }

        self.history.pixels[0] = recon;
        self.history.valid[0] = true;
    }

    /// Insert the final reconstruction of the pixel one group to the left.
    /// Clears the history at the start of a slice, and at the start of each line
    /// if the slice does not span the whole picture width.
    pub fn update_history(&mut self, h_pos: i32, v_pos: i32, last_group_selected: bool) {
        if h_pos == 0 {
            if v_pos == 0 {
                self.history.valid = [false; HISTORY_SIZE];
            }
            else if self.config.slice_size.width() != self.config.picture_size.width() {
                for valid in &mut self.history.valid[.. CACHED_ENTRIES] {
                    *valid = false;
                }
            }
        }

        let position = h_pos - GROUP_SIZE as i32;
        if position < 0 {
            return;
        }

        let mut pixel = [0; COMPONENTS];
        for component in 0 .. COMPONENTS {
            pixel[component] = self.current[component][position];
        }

        self.update_history_element(pixel, last_group_selected);
    }

    /// Replace the reconstruction of the group that was just coded with the selected history pixels.
    pub fn use_history(&mut self) {
        let start = self.h_pos - GROUP_SIZE as i32 + 1;

        for sample in 0 .. GROUP_SIZE {
            for component in 0 .. COMPONENTS {
                self.current[component][start + sample as i32] = self.group.history_pixels[sample][component];
            }
        }
    }

    /// The original pixel at the position of the current line.
    pub fn original_pixel(&self, h_pos: i32) -> [i32; COMPONENTS] {
        [ self.original[0][h_pos], self.original[1][h_pos], self.original[2][h_pos] ]
    }
}
