
//! The entropy coding of groups.
//! Each unit holds the three residuals of one component, all coded with the same size.
//! The size is transmitted as a unary prefix relative to a size that is predicted from
//! the previous unit, so that both directions can track it without side information.

use crate::error::UnitResult;
use crate::io::{BitReader, BitWriter};
use crate::io::fifo::BitFifo;
use crate::math::bit_length;
use super::state::CodecState;
use super::tables::{
    clamp, predict_size, residual_size,
    COMPONENTS, GROUPS_PER_SUPERGROUP, GROUP_SIZE, HISTORY_INDEX_BITS,
};


/// Bytes reserved for the coded unit of each component.
const SUBSTREAM_BYTES: usize = 16;

/// Rate control size of the units of a group that is coded with history indices.
const HISTORY_UNIT_SIZES: [i32; COMPONENTS] = [
    HISTORY_INDEX_BITS as i32 + 1, HISTORY_INDEX_BITS as i32, HISTORY_INDEX_BITS as i32
];


/// Stages the bits of each component of a group before they are written to the slice.
/// History indices are spread over all substreams.
#[derive(Debug, Clone)]
pub(crate) struct Substreams {
    fifos: [BitFifo; COMPONENTS],
}

impl Substreams {
    pub fn new() -> Self {
        Self {
            fifos: [
                BitFifo::new(SUBSTREAM_BYTES),
                BitFifo::new(SUBSTREAM_BYTES),
                BitFifo::new(SUBSTREAM_BYTES),
            ]
        }
    }

    #[inline]
    fn put(&mut self, component: usize, value: i32, size: i32) -> UnitResult {
        debug_assert!(size >= 0, "negative bit count");
        self.fifos[component].put_bits(value, size as u32)
    }

    /// Move the group to the slice, in component order.
    pub fn drain_into(&mut self, writer: &mut BitWriter) -> UnitResult {
        for fifo in &mut self.fifos {
            fifo.drain_into(writer)?;
        }

        Ok(())
    }
}


impl CodecState<'_> {

    /// The predicted size of the next unit, corrected for the qp change since the previous group.
    pub fn qp_adjusted_predicted_size(&self, component: usize) -> i32 {
        let master_qp = self.group.master_qp;
        let predicted = self.group.predicted_size[component]
            + self.level(self.group.previous_master_qp, component)
            - self.level(master_qp, component);

        clamp(predicted, 0, self.max_residual_size(component, master_qp) - 1)
    }

    /// The luma size that signals a group of history indices.
    pub fn escape_code_size(&self) -> i32 {
        self.bit_depth[0] + 1 - self.level(self.group.master_qp, 0)
    }

    /// Whether the residuals of the component need the midpoint predictor.
    pub fn using_midpoint(&self, component: usize) -> bool {
        let max_size = self.group.quantized_residual[component].iter()
            .map(|&residual| residual_size(residual))
            .max().unwrap_or(0);

        max_size >= self.max_residual_size(component, self.group.master_qp)
    }

    /// Approximate number of bits for coding the group with residuals.
    pub fn estimate_bits_for_group(&self) -> i32 {
        let qp = self.group.master_qp;
        let mut max_size = [0; COMPONENTS];

        for component in 0 .. COMPONENTS {
            for sample in 0 .. GROUP_SIZE {
                let h_pos = self.h_pos + sample as i32 - (GROUP_SIZE as i32 - 1);
                if h_pos >= self.slice_width { continue; }

                let size = residual_size(self.group.quantized_residual[component][sample]);
                max_size[component] = max_size[component].max(size);
            }

            max_size[component] = max_size[component].min(self.max_residual_size(component, qp));
        }

        let mut total = 0;
        for component in 0 .. COMPONENTS {
            let predicted = self.qp_adjusted_predicted_size(component);
            let max = max_size[component];

            total +=
                if max < predicted { 1 + GROUP_SIZE as i32 * predicted }
                else if component != 0 && max == self.max_residual_size(component, qp) { (max - predicted) + GROUP_SIZE as i32 * max }
                else { 1 + (max - predicted) + GROUP_SIZE as i32 * max };
        }

        if max_size[0] < self.max_residual_size(0, qp) && self.group.previous_history_selected {
            total += 1;
        }

        total
    }

    /// Whether the buffer is about to run empty, so that the group must use as many bits as possible.
    fn must_force_midpoint(&self) -> bool {
        let config = self.config;
        let max_bits_per_group = (3 * i32::from(config.bits_per_pixel) + 15) >> 4;
        let fullness = self.rate.buffer_fullness;

        if self.rate.chunk_bits() + max_bits_per_group + 8 > config.chunk_size as i32 * 8 {
            fullness - 8 < max_bits_per_group - 3
        }
        else if !config.vbr && self.rate.pixel_count >= i32::from(config.initial_xmit_delay) {
            fullness < max_bits_per_group - 3
        }
        else {
            false
        }
    }

    /// Entropy code the current group and append it to the slice.
    pub fn encode_group(&mut self, substreams: &mut Substreams, writer: &mut BitWriter) -> UnitResult {
        self.group.midpoint_selected = [false; COMPONENTS];
        self.group.force_midpoint = self.must_force_midpoint();

        let start = writer.bit_count();

        for component in 0 .. COMPONENTS {
            self.encode_unit(component, substreams)?;
        }

        substreams.drain_into(writer)?;

        let bits = (writer.bit_count() - start) as i32;
        self.rate.add_group_bits(bits, self.rcb_bits)?;
        self.group.previous_master_qp = self.group.master_qp;
        Ok(())
    }

    fn encode_unit(&mut self, component: usize, substreams: &mut Substreams) -> UnitResult {
        let qp = self.group.master_qp;
        let predicted = self.qp_adjusted_predicted_size(component);

        if component == 0 {
            self.group.previous_history_selected = self.group.history_selected;
            self.write_flatness(substreams)?;
        }
        else if self.group.history_selected {
            return Ok(());
        }

        let residuals = self.group.quantized_residual[component];
        let mut required_sizes = [0; GROUP_SIZE];
        for (required, &residual) in required_sizes.iter_mut().zip(residuals.iter()) {
            *required = residual_size(residual);
        }

        let midpoint_size = self.max_residual_size(component, qp);
        let mut max_size = required_sizes.iter().copied().max().unwrap_or(0);

        if self.group.force_midpoint || max_size >= midpoint_size {
            max_size = midpoint_size;
            required_sizes = [midpoint_size; GROUP_SIZE];
        }

        let (mut prefix, size) =
            if predicted < max_size { (max_size - predicted, max_size) }
            else { (0, predicted) };

        // the escape code becomes the shortest prefix after a history group
        if component == 0 && self.group.previous_history_selected {
            prefix += 1;
        }

        self.group.history_selected = false;

        if component == 0 && !self.group.force_midpoint && self.group.within_quant_error.iter().all(|&within| within) {
            if self.history_is_cheaper(predicted) {
                self.group.history_selected = true;
                return self.write_history_indices(predicted, substreams);
            }
        }

        // the trailing one is omitted for the longest prefix
        let max_prefix = midpoint_size + (component == 0) as i32 - predicted;
        if prefix == max_prefix { substreams.put(component, 0, max_prefix)?; }
        else { substreams.put(component, 1, prefix + 1)?; }

        let midpoint = max_size == midpoint_size;
        for sample in 0 .. GROUP_SIZE {
            let residual =
                if midpoint { self.group.midpoint_residual[component][sample] }
                else { residuals[sample] };

            substreams.put(component, residual, size)?;
        }

        self.group.midpoint_selected[component] = midpoint;
        self.group.rc_size_unit[component] = max_size * GROUP_SIZE as i32 + 1;
        self.group.predicted_size[component] = predict_size(required_sizes);
        Ok(())
    }

    /// Compare the error and the bit cost of history indices against residual coding.
    fn history_is_cheaper(&self, predicted: i32) -> bool {
        let prefix_bits =
            if self.group.previous_history_selected { 1 }
            else { self.escape_code_size() - predicted };

        let history_bits = prefix_bits + HISTORY_INDEX_BITS as i32 * GROUP_SIZE as i32;

        let mut residual_error = [0; COMPONENTS];
        for component in 0 .. COMPONENTS {
            residual_error[component] =
                if self.using_midpoint(component) { self.group.max_midpoint_error[component] }
                else { self.group.max_error[component] };
        }

        let log_error = |error: [i32; COMPONENTS]| 2 * bit_length(error[0]) + bit_length(error[1]) + bit_length(error[2]);
        let history_log_error = log_error(self.group.max_history_error);
        let residual_log_error = log_error(residual_error);
        let residual_bits = self.estimate_bits_for_group();

        history_log_error <= residual_log_error
            && history_bits + 4 * history_log_error < residual_bits + 4 * residual_log_error
    }

    fn write_history_indices(&mut self, predicted: i32, substreams: &mut Substreams) -> UnitResult {
        if self.group.previous_history_selected {
            substreams.put(0, 1, 1)?;
        }
        else {
            substreams.put(0, 0, self.escape_code_size() - predicted)?;
        }

        for sample in 0 .. GROUP_SIZE {
            let index = self.group.history_indices[sample] as i32;
            substreams.put(sample, index, HISTORY_INDEX_BITS as i32)?;
        }

        self.group.rc_size_unit = HISTORY_UNIT_SIZES;
        Ok(())
    }

    fn write_flatness(&mut self, substreams: &mut Substreams) -> UnitResult {
        let phase = self.group_count % GROUPS_PER_SUPERGROUP;
        let qp = self.group.master_qp;

        if phase == GROUPS_PER_SUPERGROUP - 1 && self.config.is_flatness_info_sent(qp) {
            substreams.put(0, self.flatness.next_first_flat.is_some() as i32, 1)?;
        }

        if phase == 0 {
            if let Some(first_flat) = self.flatness.first_flat {
                if qp >= self.config.somewhat_flat_qp_threshold() {
                    substreams.put(0, self.flatness.very_flat as i32, 1)?;
                }
                else {
                    self.flatness.very_flat = false;
                }

                substreams.put(0, first_flat, 2)?;
            }
        }

        Ok(())
    }

    /// Read the next group from the slice.
    pub fn decode_group(&mut self, reader: &mut BitReader<'_>) -> UnitResult {
        let start = reader.bit_count();

        for component in 0 .. COMPONENTS {
            self.decode_unit(component, reader)?;
        }

        self.group.previous_master_qp = self.group.master_qp;

        let bits = (reader.bit_count() - start) as i32;
        self.rate.add_group_bits(bits, self.rcb_bits)?;
        self.update_group_flatness();
        Ok(())
    }

    fn decode_unit(&mut self, component: usize, reader: &mut BitReader<'_>) -> UnitResult {
        let qp = self.group.master_qp;
        let predicted = self.qp_adjusted_predicted_size(component);

        if component == 0 {
            self.group.previous_history_selected = self.group.history_selected;
            self.group.history_selected = false;
            self.read_flatness(reader)?;
        }

        if self.group.history_selected {
            return Ok(());
        }

        let midpoint_size = self.max_residual_size(component, qp);
        let max_prefix = midpoint_size + (component == 0) as i32 - predicted;

        let mut prefix = 0;
        while prefix < max_prefix && !reader.read_bit()? {
            prefix += 1;
        }

        let previous_history = component == 0 && self.group.previous_history_selected;
        let size = predicted + prefix - previous_history as i32;

        let history =
            if self.group.previous_history_selected { prefix == 0 }
            else { size >= self.escape_code_size() };

        if component == 0 && history {
            self.group.history_selected = true;

            for index in &mut self.group.history_indices {
                *index = reader.read_bits(HISTORY_INDEX_BITS)? as usize;
            }

            self.group.rc_size_unit = HISTORY_UNIT_SIZES;
            return Ok(());
        }

        let midpoint = size == midpoint_size;
        self.group.midpoint_selected[component] = midpoint;

        let mut required_sizes = [0; GROUP_SIZE];
        for sample in 0 .. GROUP_SIZE {
            let residual = reader.read_signed_bits(size as u32)?;
            self.group.quantized_residual[component][sample] = residual;
            required_sizes[sample] = residual_size(residual);
        }

        let mut max_size = required_sizes.iter().copied().max().unwrap_or(0);
        if midpoint {
            max_size = size;
            required_sizes = [size; GROUP_SIZE];
        }

        self.group.rc_size_unit[component] = max_size * GROUP_SIZE as i32 + 1;
        self.group.predicted_size[component] = predict_size(required_sizes);
        Ok(())
    }

    fn read_flatness(&mut self, reader: &mut BitReader<'_>) -> UnitResult {
        let phase = self.group_count % GROUPS_PER_SUPERGROUP;
        let qp = self.group.master_qp;

        if phase == GROUPS_PER_SUPERGROUP - 1 {
            let flat = self.config.is_flatness_info_sent(qp) && reader.read_bit()?;
            self.flatness.next_first_flat = if flat { Some(0) } else { None };
        }

        if phase == 0 {
            if self.flatness.next_first_flat.is_some() {
                self.flatness.very_flat = qp >= self.config.somewhat_flat_qp_threshold() && reader.read_bit()?;
                self.flatness.first_flat = Some(reader.read_bits(2)?);
            }
            else {
                self.flatness.first_flat = None;
            }
        }

        Ok(())
    }

    /// Replace the reconstruction of each component that was coded
    /// with the midpoint predictor. Encoder only.
    pub fn update_midpoint(&mut self) {
        let start = self.h_pos - GROUP_SIZE as i32 + 1;

        for sample in 0 .. GROUP_SIZE {
            let h_pos = start + sample as i32;

            for component in 0 .. COMPONENTS {
                if self.group.midpoint_selected[component] {
                    self.current[component][h_pos] = self.group.midpoint_recon[component][sample];
                }
            }

            if h_pos + 1 >= self.slice_width {
                return;
            }
        }
    }
}
