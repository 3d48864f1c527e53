//! Pulse channel: duty sequencer, envelope, sweep, length counter.

use super::{envelope::Envelope, length_counter::LengthCounter, sweep::Sweep, tables::PULSE_DUTY};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "savestate", derive(serde::Serialize, serde::Deserialize))]
pub(super) struct Pulse {
    duty: u8,
    duty_pos: u8,
    timer: u16,
    timer_period: u16,
    enabled: bool,
    pub(super) envelope: Envelope,
    pub(super) length: LengthCounter,
    pub(super) sweep: Sweep,
}

impl Pulse {
    pub(super) fn new(ones_complement_sweep: bool) -> Self {
        Self {
            duty: 0,
            duty_pos: 0,
            timer: 0,
            timer_period: 0,
            enabled: false,
            envelope: Envelope::default(),
            length: LengthCounter::default(),
            sweep: Sweep::new(ones_complement_sweep),
        }
    }

    /// `$4000/$4004`: duty, halt/loop, envelope.
    pub(super) fn write_control(&mut self, value: u8) {
        self.duty = value >> 6;
        self.envelope.configure(value);
        self.length.set_halt(self.envelope.halts_length());
    }

    /// `$4001/$4005`: sweep.
    pub(super) fn write_sweep(&mut self, value: u8) {
        self.sweep.write(value);
    }

    /// `$4002/$4006`: timer low.
    pub(super) fn write_timer_lo(&mut self, value: u8) {
        self.timer_period = (self.timer_period & 0x0700) | u16::from(value);
    }

    /// `$4003/$4007`: timer high + length load; restarts the sequencer.
    pub(super) fn write_timer_hi(&mut self, value: u8) {
        self.timer_period = (self.timer_period & 0x00FF) | (u16::from(value & 0x07) << 8);
        self.length.load(value >> 3, self.enabled);
        self.duty_pos = 0;
        self.envelope.restart();
    }

    pub(super) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.length.clear();
        }
    }

    /// One APU-cycle timer step.
    pub(super) fn clock_timer(&mut self) {
        if self.timer == 0 {
            self.timer = self.timer_period;
            self.duty_pos = (self.duty_pos + 1) & 7;
        } else {
            self.timer -= 1;
        }
    }

    pub(super) fn clock_quarter(&mut self) {
        self.envelope.clock();
    }

    pub(super) fn clock_half(&mut self) {
        self.length.set_halt(self.envelope.halts_length());
        self.length.clock();
        self.sweep.clock(&mut self.timer_period);
    }

    pub(super) fn output(&self) -> u8 {
        if !self.enabled
            || !self.length.active()
            || self.sweep.mutes(self.timer_period)
            || PULSE_DUTY[self.duty as usize][self.duty_pos as usize] == 0
        {
            0
        } else {
            self.envelope.output()
        }
    }

    pub(super) fn length_active(&self) -> bool {
        self.length.active()
    }
}
