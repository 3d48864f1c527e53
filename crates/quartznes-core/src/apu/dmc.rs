//! Delta modulation channel.
//!
//! The DMC never touches memory itself: when its sample buffer runs dry it
//! raises a fetch request, the machine turns that into a DMC DMA (RDY low,
//! 1-4 stolen cycles depending on CPU phase), and the fetched byte comes
//! back through [`Dmc::sample_fetched`].

use crate::region::Region;

use super::tables;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "savestate", derive(serde::Serialize, serde::Deserialize))]
pub(super) struct Dmc {
    irq_enable: bool,
    loop_flag: bool,
    enabled: bool,
    output_level: u8,
    sample_address: u16,
    sample_length: u16,
    current_address: u16,
    pub(super) bytes_remaining: u16,
    sample_buffer: Option<u8>,
    shift: u8,
    bits_remaining: u8,
    silence: bool,
    timer: u16,
    timer_period: u16,
    region: Region,
    /// Address of an outstanding DMA fetch, taken by the machine.
    fetch_request: Option<u16>,
    /// Set from request to delivery so a slow DMA is not requested twice.
    fetch_outstanding: bool,
    pub(super) irq: bool,
}

impl Dmc {
    pub(super) fn new(region: Region) -> Self {
        Self {
            irq_enable: false,
            loop_flag: false,
            enabled: false,
            output_level: 0,
            sample_address: tables::DMC_SAMPLE_BASE,
            sample_length: 1,
            current_address: tables::DMC_SAMPLE_BASE,
            bytes_remaining: 0,
            sample_buffer: None,
            shift: 0,
            // The bit counter powers up at 8 so the first sample plays a
            // full period.
            bits_remaining: 8,
            silence: true,
            timer: tables::dmc_rates(region)[0] - 1,
            timer_period: tables::dmc_rates(region)[0] - 1,
            region,
            fetch_request: None,
            fetch_outstanding: false,
            irq: false,
        }
    }

    /// `$4010`: IRQ enable, loop, rate select.
    pub(super) fn write_control(&mut self, value: u8) {
        self.irq_enable = value & 0b1000_0000 != 0;
        if !self.irq_enable {
            self.irq = false;
        }
        self.loop_flag = value & 0b0100_0000 != 0;
        self.timer_period = tables::dmc_rates(self.region)[(value & 0x0F) as usize] - 1;
    }

    /// `$4011`: direct 7-bit DAC load.
    pub(super) fn write_direct_load(&mut self, value: u8) {
        self.output_level = value & 0x7F;
    }

    /// `$4012`: sample start address.
    pub(super) fn write_sample_address(&mut self, value: u8) {
        self.sample_address =
            tables::DMC_SAMPLE_BASE.wrapping_add(u16::from(value) * tables::DMC_SAMPLE_ADDR_STRIDE);
    }

    /// `$4013`: sample length.
    pub(super) fn write_sample_length(&mut self, value: u8) {
        self.sample_length = u16::from(value) * tables::DMC_SAMPLE_LEN_STRIDE + 1;
    }

    /// `$4015` bit 4; the write also acknowledges a pending DMC IRQ.
    pub(super) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        self.irq = false;
        if !enabled {
            self.bytes_remaining = 0;
        } else if self.bytes_remaining == 0 {
            self.restart_sample();
        }
    }

    pub(super) fn active(&self) -> bool {
        self.bytes_remaining > 0
    }

    fn restart_sample(&mut self) {
        self.current_address = self.sample_address;
        self.bytes_remaining = self.sample_length;
    }

    /// CPU-rate timer step.
    pub(super) fn clock_timer(&mut self) {
        if self.timer == 0 {
            self.timer = self.timer_period;
            self.clock_output_unit();
        } else {
            self.timer -= 1;
        }
        if self.enabled
            && self.sample_buffer.is_none()
            && self.bytes_remaining > 0
            && !self.fetch_outstanding
        {
            self.fetch_request = Some(self.current_address);
            self.fetch_outstanding = true;
        }
    }

    fn clock_output_unit(&mut self) {
        if self.bits_remaining == 0 {
            self.bits_remaining = 8;
            match self.sample_buffer.take() {
                Some(byte) => {
                    self.shift = byte;
                    self.silence = false;
                }
                None => self.silence = true,
            }
        }
        if !self.silence {
            if self.shift & 1 != 0 {
                if self.output_level <= 125 {
                    self.output_level += 2;
                }
            } else if self.output_level >= 2 {
                self.output_level -= 2;
            }
        }
        self.shift >>= 1;
        self.bits_remaining -= 1;
    }

    /// Outstanding DMA fetch address, if any.
    pub(super) fn take_fetch_request(&mut self) -> Option<u16> {
        self.fetch_request.take()
    }

    /// Byte delivered by the DMC DMA.
    pub(super) fn sample_fetched(&mut self, value: u8) {
        self.fetch_outstanding = false;
        self.sample_buffer = Some(value);
        self.current_address = if self.current_address == 0xFFFF {
            0x8000
        } else {
            self.current_address + 1
        };
        self.bytes_remaining = self.bytes_remaining.saturating_sub(1);
        if self.bytes_remaining == 0 {
            if self.loop_flag {
                self.restart_sample();
            } else if self.irq_enable {
                self.irq = true;
            }
        }
    }

    pub(super) fn output(&self) -> u8 {
        self.output_level
    }
}
