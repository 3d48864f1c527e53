//! Triangle channel: linear counter gate over a 32-step sequencer.

use super::{length_counter::LengthCounter, tables::TRIANGLE_SEQUENCE};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "savestate", derive(serde::Serialize, serde::Deserialize))]
pub(super) struct Triangle {
    control: bool,
    linear_reload_value: u8,
    linear_counter: u8,
    linear_reload: bool,
    timer: u16,
    timer_period: u16,
    sequence_pos: u8,
    last_output: u8,
    enabled: bool,
    pub(super) length: LengthCounter,
}

impl Triangle {
    /// `$4008`: control/halt flag and linear counter reload value.
    pub(super) fn write_control(&mut self, value: u8) {
        self.control = value & 0b1000_0000 != 0;
        self.linear_reload_value = value & 0b0111_1111;
        self.length.set_halt(self.control);
    }

    pub(super) fn write_timer_lo(&mut self, value: u8) {
        self.timer_period = (self.timer_period & 0x0700) | u16::from(value);
    }

    /// `$400B`: length load + linear reload. The sequencer position is
    /// deliberately not reset.
    pub(super) fn write_timer_hi(&mut self, value: u8) {
        self.timer_period = (self.timer_period & 0x00FF) | (u16::from(value & 0x07) << 8);
        self.length.load(value >> 3, self.enabled);
        self.linear_reload = true;
    }

    pub(super) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.length.clear();
        }
    }

    /// CPU-rate timer step; both gates must be open to advance.
    pub(super) fn clock_timer(&mut self) {
        if self.timer == 0 {
            self.timer = self.timer_period;
            if self.length.active() && self.linear_counter > 0 {
                self.sequence_pos = (self.sequence_pos + 1) & 0x1F;
                self.last_output = TRIANGLE_SEQUENCE[self.sequence_pos as usize];
            }
        } else {
            self.timer -= 1;
        }
    }

    /// Quarter-frame clock of the linear counter; the halt (control) flag
    /// governs whether the reload request sticks.
    pub(super) fn clock_quarter(&mut self) {
        if self.linear_reload {
            self.linear_counter = self.linear_reload_value;
        } else if self.linear_counter > 0 {
            self.linear_counter -= 1;
        }
        if !self.control {
            self.linear_reload = false;
        }
    }

    pub(super) fn clock_half(&mut self) {
        self.length.clock();
    }

    /// The DAC holds its last value while the channel is gated.
    pub(super) fn output(&self) -> u8 {
        self.last_output
    }

    pub(super) fn length_active(&self) -> bool {
        self.length.active()
    }
}

#[cfg(test)]
mod tests {
    use super::Triangle;

    #[test]
    fn linear_counter_reload_and_halt_clear() {
        let mut triangle = Triangle::default();
        triangle.set_enabled(true);
        triangle.write_control(0x85); // control set, reload 5
        triangle.write_timer_hi(0x08);
        triangle.clock_quarter();
        assert_eq!(triangle.linear_counter, 5);
        // Control still set: reload flag stays, counter reloads again.
        triangle.clock_quarter();
        assert_eq!(triangle.linear_counter, 5);
        // Clearing control lets the reload flag drop and the count run.
        triangle.write_control(0x05);
        triangle.clock_quarter();
        triangle.clock_quarter();
        assert_eq!(triangle.linear_counter, 4);
    }
}
