
//! Detection and signalling of flat picture content.
//! Flat groups are coded with a lower qp, so that smooth gradients do not band.
//! The encoder looks one supergroup ahead in the original samples
//! and transmits the position of the first flat group, if any.

use super::state::CodecState;
use super::tables::{COMPONENTS, GROUPS_PER_SUPERGROUP, GROUP_SIZE, QUANT_DIVISOR, RANGE_COUNT};


/// How flat the original samples around a group are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flatness {
    NotFlat,

    /// Flat relative to the quantization step of a slightly lower qp.
    Somewhat,

    /// Flat within the fixed detection threshold.
    Very,
}

impl Flatness {
    pub fn is_flat(self) -> bool { self != Flatness::NotFlat }
}


/// The flatness signal of the current and the upcoming supergroup.
#[derive(Debug, Clone, Default)]
pub(crate) struct FlatnessState {

    /// The group within the current supergroup where flat content starts.
    pub first_flat: Option<i32>,

    /// Whether the content starting at `first_flat` is very flat.
    pub very_flat: bool,

    /// The signal that is being prepared for the next supergroup.
    pub next_first_flat: Option<i32>,
    pub next_very_flat: bool,

    /// Whether the current group receives the flat qp adjustment.
    pub group_is_flat: bool,
}


impl CodecState<'_> {

    /// Classify the original samples following `h_pos`,
    /// which is one position left of the group in question.
    pub fn original_flatness(&self, h_pos: i32) -> Flatness {
        let qp = (self.group.master_qp - 4).max(0);
        let threshold = |component: usize| QUANT_DIVISOR[self.level(qp, component) as usize].max(self.flatness_det_thresh);

        // the group would start beyond the end of the slice
        if h_pos + 1 >= self.slice_width {
            return Flatness::NotFlat;
        }

        let classify = |offsets: std::ops::RangeInclusive<i32>| {
            let mut somewhat = true;
            let mut very = true;

            for component in 0 .. COMPONENTS {
                let samples = offsets.clone().map(|offset| {
                    self.original[component][(h_pos + offset).min(self.slice_width - 1)]
                });

                let (min, max) = samples.fold((i32::MAX, i32::MIN), |(min, max), sample| (min.min(sample), max.max(sample)));
                let spread = max - min;

                if spread > threshold(component) { somewhat = false; }
                if spread > self.flatness_det_thresh { very = false; }
            }

            if very { Flatness::Very }
            else if somewhat { Flatness::Somewhat }
            else { Flatness::NotFlat }
        };

        // the group including the sample to the left
        let flatness = classify(0 ..= GROUP_SIZE as i32);
        if flatness.is_flat() || h_pos + 2 >= self.slice_width {
            return flatness;
        }

        // the group and the next one, without the left sample
        classify(1 ..= 2 * GROUP_SIZE as i32)
    }

    /// Update the flatness signal at the end of each group. Encoder only.
    /// The last group of a supergroup searches the next supergroup for flat content,
    /// which is then signalled while the next supergroup is coded.
    pub fn decide_flatness(&mut self, h_pos: i32, qp: i32) {
        let phase = self.group_count % GROUPS_PER_SUPERGROUP;

        if phase == GROUPS_PER_SUPERGROUP - 1 {
            self.flatness.next_first_flat = None;

            if self.config.is_flatness_info_sent(qp) {
                let mut previous_flat = self.flatness.first_flat.is_some();

                for group in 0 .. GROUPS_PER_SUPERGROUP {
                    let flatness = self.original_flatness(h_pos + (group + 1) * GROUP_SIZE as i32);

                    if !previous_flat && flatness.is_flat() {
                        self.flatness.next_first_flat = Some(group);
                        self.flatness.next_very_flat = flatness == Flatness::Very;
                        break;
                    }

                    previous_flat = flatness.is_flat();
                }
            }
        }
        else if phase == 0 {
            self.flatness.first_flat = self.flatness.next_first_flat;
            self.flatness.very_flat = self.flatness.next_very_flat;
        }

        self.update_group_flatness();
    }

    /// Whether the current group is the signalled first flat group.
    pub fn update_group_flatness(&mut self) {
        let phase = self.group_count % GROUPS_PER_SUPERGROUP;
        self.flatness.group_is_flat = self.flatness.first_flat == Some(phase);
    }

    /// The qp for the next group, lowered if the current group is flat.
    /// Also lowers the qp of the rate control.
    pub fn adjust_flat_quantizer(&mut self, new_qp: i32) -> i32 {
        let master_qp = self.group.master_qp;
        let top_range_max_qp = i32::from(self.config.rc_ranges[RANGE_COUNT - 1].max_qp);

        if !self.flatness.group_is_flat || master_qp >= top_range_max_qp {
            return new_qp;
        }

        if !self.flatness.very_flat || master_qp < self.config.somewhat_flat_qp_threshold() {
            self.rate.qp = (self.rate.qp - 4).max(0);
            (new_qp - 4).max(0)
        }
        else {
            let very_flat_qp = self.config.very_flat_qp();
            self.rate.qp = very_flat_qp;
            very_flat_qp
        }
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::math::Vec2;
    use crate::meta::{Parameters, Setup};

    fn setup() -> Setup {
        Parameters::default().setup(Vec2(64, 64)).unwrap()
    }

    fn fill(state: &mut CodecState<'_>, samples: impl Fn(i32) -> i32) {
        for position in 0 .. state.slice_width {
            for component in 0 .. COMPONENTS {
                state.original[component][position] = samples(position);
            }
        }
    }

    #[test]
    fn classify_original_samples() {
        let setup = setup();
        let mut state = CodecState::new(&setup).unwrap();

        fill(&mut state, |_| 100);
        assert_eq!(state.original_flatness(10), Flatness::Very);

        // beyond the threshold of 2, but within the quantization step of qp 9 - 4
        fill(&mut state, |position| 100 + position % 4);
        state.group.master_qp = 9;
        assert_eq!(state.original_flatness(10), Flatness::Somewhat);

        state.group.master_qp = 0;
        assert_eq!(state.original_flatness(10), Flatness::NotFlat);

        fill(&mut state, |position| position * 50);
        assert_eq!(state.original_flatness(10), Flatness::NotFlat);

        // only the left sample is off
        fill(&mut state, |position| if position == 10 { 0 } else { 100 });
        assert_eq!(state.original_flatness(10), Flatness::Very);

        // no group starts at the end of the slice
        fill(&mut state, |_| 100);
        assert_eq!(state.original_flatness(63), Flatness::NotFlat);
    }

    #[test]
    fn first_flat_group_of_the_next_supergroup() {
        let setup = setup();
        let mut state = CodecState::new(&setup).unwrap();

        // flat from position 17 onwards
        fill(&mut state, |position| if position < 17 { position * 40 } else { 7 });

        state.group_count = 3;
        state.decide_flatness(11, 5);
        assert_eq!(state.flatness.next_first_flat, Some(1));
        assert!(state.flatness.next_very_flat);
        assert!(!state.flatness.group_is_flat);

        state.group_count = 4;
        state.decide_flatness(14, 5);
        assert_eq!(state.flatness.first_flat, Some(1));
        assert!(!state.flatness.group_is_flat);

        state.group_count = 5;
        state.decide_flatness(17, 5);
        assert!(state.flatness.group_is_flat);

        // outside of the flatness qp range
        state.group_count = 7;
        state.decide_flatness(23, 14);
        assert_eq!(state.flatness.next_first_flat, None);
    }

    #[test]
    fn flat_groups_lower_the_qp() {
        let setup = setup();
        let mut state = CodecState::new(&setup).unwrap();
        state.flatness.group_is_flat = true;
        state.rate.qp = 9;

        state.group.master_qp = 9;
        state.flatness.very_flat = true;
        assert_eq!(state.adjust_flat_quantizer(10), 1);
        assert_eq!(state.rate.qp, 1);

        state.rate.qp = 9;
        state.flatness.very_flat = false;
        assert_eq!(state.adjust_flat_quantizer(10), 6);
        assert_eq!(state.rate.qp, 5);

        // very flat below the threshold is treated as somewhat flat
        state.group.master_qp = 5;
        state.flatness.very_flat = true;
        assert_eq!(state.adjust_flat_quantizer(2), 0);
        assert_eq!(state.rate.qp, 1);

        state.group.master_qp = 15;
        assert_eq!(state.adjust_flat_quantizer(12), 12);

        state.group.master_qp = 9;
        state.flatness.group_is_flat = false;
        assert_eq!(state.adjust_flat_quantizer(12), 12);
    }
}
