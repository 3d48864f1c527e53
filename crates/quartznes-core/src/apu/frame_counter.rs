//! Frame sequencer: quarter/half-frame clocks and the frame IRQ.
//!
//! Runs in the CPU-cycle domain. The 4-step NTSC sequence asserts the frame
//! IRQ on the last three cycles of its period; 5-step mode never raises it.
//! Writes to `$4017` land 3-4 CPU cycles later depending on write parity,
//! and a 5-step write clocks the quarter+half units immediately.

use crate::region::Region;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "savestate", derive(serde::Serialize, serde::Deserialize))]
pub(super) enum SequencerMode {
    #[default]
    FourStep,
    FiveStep,
}

/// NTSC step boundaries in CPU cycles.
const STEPS_4_NTSC: [u32; 6] = [7457, 14913, 22371, 29828, 29829, 29830];
const STEPS_5_NTSC: [u32; 6] = [7457, 14913, 22371, 29829, 37281, 37282];
/// PAL boundaries; Dendy uses the NTSC ones.
const STEPS_4_PAL: [u32; 6] = [8313, 16627, 24939, 33252, 33253, 33254];
const STEPS_5_PAL: [u32; 6] = [8313, 16627, 24939, 33253, 41565, 41566];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepKind {
    Quarter,
    Half,
    None,
}

const STEP_KINDS: [StepKind; 6] = [
    StepKind::Quarter,
    StepKind::Half,
    StepKind::Quarter,
    StepKind::None,
    StepKind::Half,
    StepKind::None,
];

/// Clocks to distribute after one sequencer step.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(super) struct FrameTick {
    pub quarter: bool,
    pub half: bool,
    pub irq: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "savestate", derive(serde::Serialize, serde::Deserialize))]
pub(super) struct FrameCounter {
    mode: SequencerMode,
    pub(super) irq_inhibit: bool,
    cycle: u32,
    step: u8,
    pal_steps: bool,
    pending: Option<PendingWrite>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "savestate", derive(serde::Serialize, serde::Deserialize))]
struct PendingWrite {
    value: u8,
    delay: u8,
}

impl FrameCounter {
    pub(super) fn new(region: Region) -> Self {
        Self {
            mode: SequencerMode::FourStep,
            irq_inhibit: false,
            cycle: 0,
            step: 0,
            pal_steps: region == Region::Pal,
            pending: None,
        }
    }

    fn steps(&self) -> &'static [u32; 6] {
        match (self.mode, self.pal_steps) {
            (SequencerMode::FourStep, false) => &STEPS_4_NTSC,
            (SequencerMode::FiveStep, false) => &STEPS_5_NTSC,
            (SequencerMode::FourStep, true) => &STEPS_4_PAL,
            (SequencerMode::FiveStep, true) => &STEPS_5_PAL,
        }
    }

    /// `$4017` write: inhibit applies immediately, the mode change lands
    /// after the parity-dependent delay.
    pub(super) fn write(&mut self, value: u8, cpu_cycle: u64) {
        let delay = if cpu_cycle & 1 == 1 { 4 } else { 3 };
        self.pending = Some(PendingWrite { value, delay });
        self.irq_inhibit = value & 0b0100_0000 != 0;
    }

    pub(super) fn reset(&mut self, prior_value: u8) {
        self.cycle = 0;
        self.step = 0;
        self.irq_inhibit = false;
        self.pending = Some(PendingWrite {
            value: prior_value,
            delay: 3,
        });
    }

    /// One CPU-cycle step.
    pub(super) fn step(&mut self) -> FrameTick {
        let mut tick = FrameTick::default();

        self.cycle = self.cycle.wrapping_add(1);
        let steps = self.steps();
        if self.cycle == steps[self.step as usize] {
            if self.mode == SequencerMode::FourStep && self.step >= 3 && !self.irq_inhibit {
                tick.irq = true;
            }
            match STEP_KINDS[self.step as usize] {
                StepKind::Quarter => tick.quarter = true,
                StepKind::Half => {
                    tick.quarter = true;
                    tick.half = true;
                }
                StepKind::None => {}
            }
            self.step += 1;
            if self.step == 6 {
                self.step = 0;
                self.cycle = 0;
            }
        }

        if let Some(mut pending) = self.pending.take() {
            pending.delay -= 1;
            if pending.delay == 0 {
                self.mode = if pending.value & 0x80 == 0 {
                    SequencerMode::FourStep
                } else {
                    SequencerMode::FiveStep
                };
                self.cycle = 0;
                self.step = 0;
                if self.mode == SequencerMode::FiveStep {
                    tick.quarter = true;
                    tick.half = true;
                }
            } else {
                self.pending = Some(pending);
            }
        }

        tick
    }
}
