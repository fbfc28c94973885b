
//! Sample predictors and the search for the block prediction vector of the next line.

use super::state::{to_line_buffer, LineBuffer};
use super::tables::{clamp, COMPONENTS, GROUP_SIZE, QUANT_DIVISOR};


/// Number of candidate block prediction vectors.
pub const BLOCK_VECTORS: usize = 10;

/// Number of groups whose errors are summed for a block prediction decision.
pub const BLOCK_WINDOW: usize = 3;

/// Block prediction requires an edge within this many pixels.
const EDGE_COUNT: i32 = 3;

/// Sample difference that counts as an edge, for 8 bits per component.
const EDGE_STRENGTH: i32 = 32;

/// The vector with offset two is never selected.
const EXCLUDED_VECTOR: usize = 1;


/// How a sample is predicted from its neighbours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Predictor {

    /// Modified median adaptive prediction from the line above.
    MedianAdaptive,

    /// The sample to the left, used on the first line of a slice.
    Left,

    /// Copy the sample `vector + 1` positions to the left.
    Block(u8),
}


/// Predict a sample of the current line.
/// `residuals` are the quantized residuals of the earlier samples in the same group.
pub(crate) fn predict_sample(
    previous: &LineBuffer, current: &LineBuffer, h_pos: i32,
    predictor: Predictor, level: i32, residuals: &[i32; GROUP_SIZE], bit_depth: i32,
) -> i32
{
    let group_start = (h_pos / 3) * 3;
    let a = current[group_start - 1];
    let divisor = QUANT_DIVISOR[level as usize];

    match predictor {
        Predictor::MedianAdaptive => {
            let above = |offset: i32| previous[group_start + offset];
            let filtered = |offset: i32| (above(offset - 1) + 2 * above(offset) + above(offset + 1) + 2) >> 2;
            let blend = |offset: i32| above(offset) + clamp(filtered(offset) - above(offset), -(divisor / 2), divisor / 2);

            let blend_b = blend(0);
            let blend_d = blend(1);
            let blend_e = blend(2);

            // the line above is replaced by the left sample at the start of the line
            let blend_c = if h_pos / 3 == 0 { a } else { blend(-1) };

            match h_pos % 3 {
                0 => clamp(a + blend_b - blend_c, a.min(blend_b), a.max(blend_b)),

                1 => clamp(
                    a + blend_d - blend_c + residuals[0] * divisor,
                    a.min(blend_b).min(blend_d), a.max(blend_b).max(blend_d)
                ),

                _ => clamp(
                    a + blend_e - blend_c + (residuals[0] + residuals[1]) * divisor,
                    a.min(blend_b).min(blend_d.min(blend_e)), a.max(blend_b).max(blend_d.max(blend_e))
                ),
            }
        },

        Predictor::Left => {
            let max = (1 << bit_depth) - 1;

            match h_pos % 3 {
                0 => a,
                1 => clamp(a + residuals[0] * divisor, 0, max),
                _ => clamp(a + (residuals[0] + residuals[1]) * divisor, 0, max),
            }
        },

        Predictor::Block(vector) => {
            current[(h_pos - 1 - i32::from(vector)).max(current.first_position())]
        },
    }
}


/// Accumulates block prediction costs while a line is finished,
/// and remembers the predictor of each group for the next line.
#[derive(Debug, Clone)]
pub(crate) struct BlockSearch {
    predictors: Vec<Predictor>,

    run: i32,
    last_edge_count: i32,
    edge_detected: bool,

    group_error: [[i32; BLOCK_VECTORS]; COMPONENTS],
    window_error: [[[i32; BLOCK_VECTORS]; BLOCK_WINDOW]; COMPONENTS],
}

/// The parameters of the block search that do not change within a slice.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SearchDepth {
    pub bits_per_component: i32,
    pub bit_depth: i32,
    pub line_buffer_depth: i32,
    pub enabled: bool,
}

impl BlockSearch {

    /// Every group starts with median adaptive prediction.
    pub fn new(groups_per_line: usize) -> Self {
        Self {
            predictors: vec![ Predictor::MedianAdaptive; groups_per_line ],
            run: 0,
            last_edge_count: 0,
            edge_detected: false,
            group_error: [[0; BLOCK_VECTORS]; COMPONENTS],
            window_error: [[[0; BLOCK_VECTORS]; BLOCK_WINDOW]; COMPONENTS],
        }
    }

    /// The predictor that the search chose for the group in the line above.
    #[inline]
    pub fn predictor_at(&self, h_pos: i32) -> Predictor {
        self.predictors[(h_pos / 3) as usize]
    }

    /// Account a finished sample of the current line.
    /// Must be called for each position of the line, and for each component in order.
    pub fn update(&mut self, current: &LineBuffer, component: usize, h_pos: i32, depth: SearchDepth) {
        let reduce = |sample: i32| to_line_buffer(sample, depth.bit_depth, depth.line_buffer_depth);
        let recon = current[h_pos];

        if h_pos == 0 {
            self.run = 0;
            self.last_edge_count = 10;
            self.window_error = [[[0; BLOCK_VECTORS]; BLOCK_WINDOW]; COMPONENTS];
        }

        let difference = (reduce(recon) - reduce(current[h_pos - 1])).abs();
        if component == 0 { self.edge_detected = false; }
        if difference > EDGE_STRENGTH << (depth.bits_per_component - 8) { self.edge_detected = true; }

        if component == COMPONENTS - 1 {
            if self.edge_detected { self.last_edge_count = 0; }
            else { self.last_edge_count += 1; }
        }

        let window_index = ((h_pos / 3) % BLOCK_WINDOW as i32) as usize;
        let sample_index = h_pos % 3;

        for vector in 0 .. BLOCK_VECTORS {
            if sample_index == 0 {
                self.group_error[component][vector] = 0;
            }

            let unused = [0; GROUP_SIZE];
            let prediction = predict_sample(
                current, current, h_pos, Predictor::Block(vector as u8),
                0, &unused, depth.bit_depth
            );

            let difference = (reduce(recon) - reduce(prediction)).abs();
            self.group_error[component][vector] += (difference >> (depth.bit_depth - 7)).min(0x3f);
        }

        if sample_index != 2 {
            return;
        }

        self.window_error[component][window_index] = self.group_error[component];

        // the decision needs all components of the group
        if component < COMPONENTS - 1 {
            return;
        }

        let mut best_error = i32::MAX;
        let mut best = Predictor::MedianAdaptive;

        for vector in 0 .. BLOCK_VECTORS {
            if vector == EXCLUDED_VECTOR { continue; }

            let sum: i32 = (0 .. BLOCK_WINDOW)
                .map(|window| {
                    let error: i32 = (0 .. COMPONENTS).map(|component| self.window_error[component][window][vector]).sum();
                    error.min(511)
                })
                .sum();

            let error = sum >> 3;
            if error < best_error {
                best_error = error;
                best = Predictor::Block(vector as u8);
            }
        }

        if depth.enabled && h_pos >= 9 {
            if matches!(best, Predictor::Block(vector) if vector > 0) { self.run += 1; }
            else { self.run = 0; }
        }

        let group = (h_pos / 3) as usize;
        self.predictors[group] =
            if self.run >= 3 && self.last_edge_count < EDGE_COUNT { best }
            else { Predictor::MedianAdaptive };
    }
}
