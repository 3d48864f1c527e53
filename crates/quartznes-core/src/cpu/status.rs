use bitflags::bitflags;

bitflags! {
    /// The 6502 processor status register (P).
    ///
    /// Bit layout: `N V U B D I Z C`. Bit 5 (U) reads as 1; bit 4 (B) only
    /// exists on the stack copy pushed by BRK/PHP.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "savestate", derive(serde::Serialize, serde::Deserialize))]
    pub struct Status: u8 {
        const CARRY     = 0b0000_0001;
        const ZERO      = 0b0000_0010;
        /// IRQ disable. Polled one cycle behind writes; see the interrupt
        /// sequencing in `cpu`.
        const INTERRUPT = 0b0000_0100;
        /// Decimal mode flag. Stored and pushed, but the 2A03 ties the
        /// decimal circuit off so ADC/SBC ignore it.
        const DECIMAL   = 0b0000_1000;
        const BREAK     = 0b0001_0000;
        const UNUSED    = 0b0010_0000;
        const OVERFLOW  = 0b0100_0000;
        const NEGATIVE  = 0b1000_0000;
    }
}

impl Status {
    /// Power-on value: unused bit set, IRQs masked.
    pub fn power_on() -> Self {
        Status::from_bits_truncate(0x24)
    }

    /// Updates Z from a result byte.
    #[inline]
    pub fn set_zero(&mut self, value: u8) {
        self.set(Status::ZERO, value == 0);
    }

    /// Updates N from bit 7 of a result byte.
    #[inline]
    pub fn set_negative(&mut self, value: u8) {
        self.set(Status::NEGATIVE, value & 0x80 != 0);
    }

    /// Common Z+N update after loads, transfers, and ALU results.
    #[inline]
    pub fn set_zn(&mut self, value: u8) {
        self.set_zero(value);
        self.set_negative(value);
    }

    /// Byte image pushed to the stack. `brk` selects the B bit (set for
    /// BRK/PHP, clear for IRQ/NMI); the unused bit always reads as 1.
    #[inline]
    pub fn to_pushed(self, brk: bool) -> u8 {
        let mut bits = self.bits() | Status::UNUSED.bits();
        if brk {
            bits |= Status::BREAK.bits();
        } else {
            bits &= !Status::BREAK.bits();
        }
        bits
    }

    /// Restores flags from a stack byte; B is discarded, U forced on.
    #[inline]
    pub fn from_pulled(value: u8) -> Self {
        let mut status = Status::from_bits_truncate(value);
        status.remove(Status::BREAK);
        status.insert(Status::UNUSED);
        status
    }
}

#[cfg(test)]
mod tests {
    use super::Status;

    #[test]
    fn pushed_image_controls_break_bit() {
        let status = Status::power_on();
        assert_eq!(status.to_pushed(true) & 0x30, 0x30);
        assert_eq!(status.to_pushed(false) & 0x30, 0x20);
    }

    #[test]
    fn pulled_image_ignores_break_and_sets_unused() {
        let status = Status::from_pulled(0x10);
        assert!(!status.contains(Status::BREAK));
        assert!(status.contains(Status::UNUSED));
    }
}
