
//! The raster loop over the pixels of one slice.
//! Encoder and decoder share this loop and the complete codec state,
//! they only differ in where the residuals come from and where the bits go.

use crate::error::{Error, Result, UnitResult};
use crate::io::{BitReader, BitWriter};
use crate::math::Vec2;
use super::{Planes, SliceStatistics};
use super::predict::{predict_sample, Predictor, SearchDepth};
use super::state::{CodecState, GroupState};
use super::tables::{clamp, quantize, residual_size, COMPONENTS, GROUP_SIZE};
use super::vlc::Substreams;


/// The part of the slice loop that depends on the coding direction.
pub(crate) trait Direction {

    /// Called once before the first pixel.
    fn begin(&mut self, state: &mut CodecState<'_>) -> UnitResult;

    /// Called at the start of every line but the first.
    fn start_line(&mut self, _state: &mut CodecState<'_>, _v_pos: i32) {}

    /// Produce the reconstructed sample from the prediction.
    fn reconstruct(
        &mut self, state: &mut CodecState<'_>, component: usize,
        h_pos: i32, sample: usize, prediction: i32, qp: i32
    ) -> i32;

    /// Called at the last pixel of each group, before the flat qp adjustment.
    fn decide_flatness(&mut self, _state: &mut CodecState<'_>, _h_pos: i32, _qp: i32) {}

    /// Called for every pixel after the qp of the next group is known.
    fn after_quantizer_update(&mut self, state: &mut CodecState<'_>, h_pos: i32, v_pos: i32, qp: i32, sample: usize);

    /// Whether the group to the left of the current position was coded with history indices.
    fn last_group_used_history(&self, group: &GroupState) -> bool;

    /// Called when the pixels of a group are complete, before the rate control.
    fn code_group(&mut self, _state: &mut CodecState<'_>) -> UnitResult { Ok(()) }

    /// Called after the rate control, unless the slice is complete.
    fn prefetch_group(&mut self, _state: &mut CodecState<'_>) -> UnitResult { Ok(()) }
}


/// Run the slice loop, returning the reconstructed samples of the slice.
pub(crate) fn code_slice<D: Direction>(state: &mut CodecState<'_>, direction: &mut D) -> Result<(Planes, SliceStatistics)> {
    let width = state.slice_width;
    let height = state.slice_height;

    let mut output = Planes::new(Vec2(width as usize, height as usize));
    let mut statistics = SliceStatistics::default();

    let search_depth = |state: &CodecState<'_>, component: usize| SearchDepth {
        bits_per_component: state.config.bits_per_component.into(),
        bit_depth: state.bit_depth[component],
        line_buffer_depth: state.config.line_buffer_depth.into(),
        enabled: state.config.block_prediction,
    };

    state.h_pos = 0;
    state.v_pos = 0;
    direction.begin(state)?;

    let (mut h_pos, mut v_pos) = (0, 0);
    let mut sample = 0;
    let mut qp = 0;
    let mut new_qp = 0;

    loop {
        state.v_pos = v_pos;

        // the history receives the pixels of the group to the left
        if h_pos % GROUP_SIZE as i32 == 0 {
            let selected = direction.last_group_used_history(&state.group);

            for offset in 0 .. GROUP_SIZE as i32 {
                state.update_history(h_pos + offset, v_pos, selected);
            }
        }

        for component in 0 .. COMPONENTS {
            let level = state.level(qp, component);

            let predictor =
                if v_pos == 0 { Predictor::Left }
                else { state.block_search.predictor_at(h_pos) };

            let prediction = predict_sample(
                &state.previous[component], &state.current[component], h_pos, predictor, level,
                &state.group.quantized_residual[component], state.bit_depth[component],
            );

            let recon = direction.reconstruct(state, component, h_pos, sample, prediction, qp);
            state.current[component][h_pos] = recon;
        }

        if sample == GROUP_SIZE - 1 || h_pos == width - 1 {
            direction.decide_flatness(state, h_pos, qp);
            qp = state.adjust_flat_quantizer(new_qp);
        }

        direction.after_quantizer_update(state, h_pos, v_pos, qp, sample);
        sample += 1;

        if sample >= GROUP_SIZE || h_pos + 1 == width {
            for padding in sample .. GROUP_SIZE {
                state.group.pad(padding);
                h_pos += 1;
            }

            state.h_pos = h_pos;
            direction.code_group(state)?;

            for component in 0 .. COMPONENTS {
                state.group.left_recon[component] = state.current[component][h_pos.min(width - 1)];
            }

            statistics.account_group(&state.group, state.flatness.group_is_flat);

            let config = state.config;
            let (scale, bpg_offset) = state.rate.fullness_offset(config, v_pos, state.group_count);
            state.group_count += 1;

            state.rate.rate_control(config, state.rcb_bits, scale, bpg_offset, sample as i32, state.group.rc_size_unit)?;
            new_qp = state.rate.qp;
            state.rate.absorb_underflow(config.vbr)?;

            if h_pos < width - 1 || v_pos < height - 1 {
                direction.prefetch_group(state)?;
            }

            sample = 0;
        }

        h_pos += 1;
        if h_pos >= width {
            for position in 0 .. width {
                for component in 0 .. COMPONENTS {
                    let depth = search_depth(state, component);
                    let recon = state.current[component][position];

                    state.block_search.update(&state.current[component], component, position, depth);
                    output.set(component, Vec2(position as usize, v_pos as usize), recon as u16);
                }
            }

            state.advance_line();
            h_pos = 0;
            v_pos += 1;

            if v_pos >= height { break; }
            direction.start_line(state, v_pos);
        }
    }

    statistics.max_buffer_fullness = state.rate.max_fullness;
    Ok((output, statistics))
}


/// Chooses residuals from the original samples and writes the groups to a bit stream.
#[derive(Debug)]
pub(crate) struct Encoder<'p> {
    source: &'p Planes,
    origin: Vec2<usize>,
    substreams: Substreams,
    writer: BitWriter,
}

impl<'p> Encoder<'p> {

    /// Encode the slice whose top left pixel is at `origin` within the source planes.
    pub fn new(source: &'p Planes, origin: Vec2<usize>, byte_capacity: usize) -> Self {
        Self { source, origin, substreams: Substreams::new(), writer: BitWriter::with_byte_capacity(byte_capacity) }
    }

    /// Copy one line of original samples into the state.
    /// Positions right of the picture repeat the last column,
    /// lines below the picture are filled with the midpoint.
    fn load_line(&self, state: &mut CodecState<'_>, v_pos: i32) {
        let size = self.source.size;
        let y = self.origin.y() + v_pos as usize;

        for component in 0 .. COMPONENTS {
            let midpoint = 1 << (state.bit_depth[component] - 1);

            for position in 0 .. state.slice_width {
                let x = (self.origin.x() + position as usize).min(size.width() - 1);

                state.original[component][position] =
                    if y >= size.height() { midpoint }
                    else { i32::from(self.source.get(component, Vec2(x, y))) };
            }
        }
    }

    /// Close the slice: complete the chunk sizes and check the final buffer fullness.
    /// Returns the bytes of the slice, the size of each chunk, and the number of coded bits.
    pub fn finish(self, state: &mut CodecState<'_>) -> Result<(Vec<u8>, Vec<usize>, usize)> {
        let config = state.config;
        let height = config.slice_size.height();
        let bit_count = self.writer.bit_count();
        let mut bytes = self.writer.into_bytes();

        let chunk_sizes =
            if config.vbr {
                while state.rate.chunk_count() + 1 < height {
                    state.rate.remove_bits(config);
                }

                let mut chunk_sizes = std::mem::take(&mut state.rate.chunk_sizes);
                chunk_sizes.truncate(height - 1);

                let earlier: usize = chunk_sizes.iter().sum();
                chunk_sizes.push(bytes.len().saturating_sub(earlier));
                chunk_sizes
            }
            else {
                vec![ config.chunk_size; height ]
            };

        let capacity: usize = chunk_sizes.iter().sum();
        if bytes.len() > capacity {
            return Err(Error::BufferOverflow { capacity: (capacity * 8) as i32, fullness: bit_count as i32 });
        }

        bytes.resize(capacity, 0);

        let allowed = (i32::from(config.initial_xmit_delay) * i32::from(config.bits_per_pixel)) >> 4;
        if state.rate.buffer_fullness > allowed {
            return Err(Error::SliceRemainder { fullness: state.rate.buffer_fullness, allowed });
        }

        Ok((bytes, chunk_sizes, bit_count))
    }
}

impl Direction for Encoder<'_> {
    fn begin(&mut self, state: &mut CodecState<'_>) -> UnitResult {
        self.load_line(state, 0);
        Ok(())
    }

    fn start_line(&mut self, state: &mut CodecState<'_>, v_pos: i32) {
        self.load_line(state, v_pos);
    }

    fn reconstruct(
        &mut self, state: &mut CodecState<'_>, component: usize,
        h_pos: i32, sample: usize, prediction: i32, qp: i32
    ) -> i32
    {
        if sample == 0 {
            state.group.master_qp = qp;
        }

        let level = state.level(qp, component);
        let max_sample = state.max_sample(component);
        let original = state.original[component][h_pos];

        let residual = quantize(original - prediction, level);
        let recon = clamp(prediction + (residual << level), 0, max_sample);

        // the midpoint residual must fit the size that signals the midpoint predictor
        let midpoint = state.midpoint(component, level);
        let max_size = state.max_residual_size(component, qp);
        let mut midpoint_residual = quantize(original - midpoint, level);
        while residual_size(midpoint_residual) > max_size {
            midpoint_residual -= midpoint_residual.signum();
        }

        let midpoint_recon = clamp(midpoint + (midpoint_residual << level), 0, max_sample);

        let error = state.scaled_error(original, recon);
        let midpoint_error = state.scaled_error(original, midpoint_recon);

        let group = &mut state.group;
        group.quantized_residual[component][sample] = residual;
        group.midpoint_residual[component][sample] = midpoint_residual;
        group.midpoint_recon[component][sample] = midpoint_recon;

        if sample == 0 {
            group.max_error[component] = error;
            group.max_midpoint_error[component] = midpoint_error;
        }
        else {
            group.max_error[component] = group.max_error[component].max(error);
            group.max_midpoint_error[component] = group.max_midpoint_error[component].max(midpoint_error);
        }

        recon
    }

    fn decide_flatness(&mut self, state: &mut CodecState<'_>, h_pos: i32, qp: i32) {
        state.decide_flatness(h_pos, qp);
    }

    fn after_quantizer_update(&mut self, state: &mut CodecState<'_>, h_pos: i32, v_pos: i32, _qp: i32, sample: usize) {
        if sample == 0 {
            state.group.within_quant_error = [true; GROUP_SIZE];
        }

        let master_qp = state.group.master_qp;
        if !state.is_within_quant_error(h_pos, v_pos, master_qp, sample) {
            return;
        }

        let original = state.original_pixel(h_pos);
        let entry = state.pick_best_history_entry(h_pos, original);
        let pixel = state.history_lookup(entry, h_pos, v_pos == 0);

        let mut errors = [0; COMPONENTS];
        for component in 0 .. COMPONENTS {
            errors[component] = state.scaled_error(original[component], pixel[component]);
        }

        let group = &mut state.group;
        group.history_indices[sample] = entry;
        group.history_pixels[sample] = pixel;

        for component in 0 .. COMPONENTS {
            if sample == 0 { group.max_history_error[component] = 0; }
            group.max_history_error[component] = group.max_history_error[component].max(errors[component]);
        }
    }

    fn last_group_used_history(&self, group: &GroupState) -> bool {
        group.history_selected
    }

    fn code_group(&mut self, state: &mut CodecState<'_>) -> UnitResult {
        state.encode_group(&mut self.substreams, &mut self.writer)?;
        state.update_midpoint();

        if state.group.history_selected {
            state.use_history();
        }

        Ok(())
    }
}


/// Reads residuals and history indices from a bit stream.
/// Each group is read ahead, before its first pixel is reconstructed.
#[derive(Debug)]
pub(crate) struct Decoder<'b> {
    reader: BitReader<'b>,
}

impl<'b> Decoder<'b> {
    pub fn new(bytes: &'b [u8]) -> Self {
        Self { reader: BitReader::new(bytes) }
    }

    /// Number of bits consumed so far.
    pub fn bit_count(&self) -> usize {
        self.reader.bit_count()
    }
}

impl Direction for Decoder<'_> {
    fn begin(&mut self, state: &mut CodecState<'_>) -> UnitResult {
        state.decode_group(&mut self.reader)
    }

    fn reconstruct(
        &mut self, state: &mut CodecState<'_>, component: usize,
        h_pos: i32, sample: usize, prediction: i32, qp: i32
    ) -> i32
    {
        let group = &state.group;

        if group.history_selected {
            let entry = group.history_indices[sample];
            return state.history_lookup(entry, h_pos, state.v_pos == 0)[component];
        }

        let level = state.level(qp, component);
        let residual = group.quantized_residual[component][sample];

        let prediction =
            if group.midpoint_selected[component] { state.midpoint(component, level) }
            else { prediction };

        clamp(prediction + (residual << level), 0, state.max_sample(component))
    }

    fn after_quantizer_update(&mut self, state: &mut CodecState<'_>, _h_pos: i32, _v_pos: i32, qp: i32, _sample: usize) {
        state.group.master_qp = qp;
    }

    fn last_group_used_history(&self, group: &GroupState) -> bool {
        group.previous_history_selected
    }

    fn prefetch_group(&mut self, state: &mut CodecState<'_>) -> UnitResult {
        state.decode_group(&mut self.reader)
    }
}
