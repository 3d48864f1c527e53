//! CPU-visible PPU register bit layouts and the internal v/t/x/w latches.

use bitflags::bitflags;

bitflags! {
    /// `$2000` - PPUCTRL.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub(crate) struct Control: u8 {
        const NAMETABLE_LO   = 0b0000_0001;
        const NAMETABLE_HI   = 0b0000_0010;
        const VRAM_STEP_32   = 0b0000_0100;
        const SPRITE_TABLE   = 0b0000_1000;
        const BG_TABLE       = 0b0001_0000;
        const SPRITE_8X16    = 0b0010_0000;
        const MASTER_SLAVE   = 0b0100_0000;
        const NMI_ENABLE     = 0b1000_0000;
    }
}

impl Control {
    /// Base nametable select (0..3) copied into `t`.
    pub(crate) fn nametable_bits(self) -> u8 {
        self.bits() & 0x03
    }

    /// `$2007` address increment: 1 across, 32 down.
    pub(crate) fn vram_step(self) -> u16 {
        if self.contains(Control::VRAM_STEP_32) {
            32
        } else {
            1
        }
    }

    pub(crate) fn sprite_height(self) -> u8 {
        if self.contains(Control::SPRITE_8X16) {
            16
        } else {
            8
        }
    }

    pub(crate) fn bg_table(self) -> u16 {
        if self.contains(Control::BG_TABLE) {
            0x1000
        } else {
            0x0000
        }
    }

    pub(crate) fn sprite_table(self) -> u16 {
        if self.contains(Control::SPRITE_TABLE) {
            0x1000
        } else {
            0x0000
        }
    }
}

bitflags! {
    /// `$2001` - PPUMASK.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub(crate) struct Mask: u8 {
        const GRAYSCALE      = 0b0000_0001;
        const BG_LEFT        = 0b0000_0010;
        const SPRITES_LEFT   = 0b0000_0100;
        const SHOW_BG        = 0b0000_1000;
        const SHOW_SPRITES   = 0b0001_0000;
        const EMPHASIZE_R    = 0b0010_0000;
        const EMPHASIZE_G    = 0b0100_0000;
        const EMPHASIZE_B    = 0b1000_0000;
    }
}

impl Mask {
    pub(crate) fn rendering_enabled(self) -> bool {
        self.intersects(Mask::SHOW_BG | Mask::SHOW_SPRITES)
    }

    /// Emphasis bits packed into bits 0..2 (R, G, B).
    pub(crate) fn emphasis(self) -> u8 {
        self.bits() >> 5
    }
}

bitflags! {
    /// `$2002` - PPUSTATUS (upper three bits; the rest is open bus).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub(crate) struct StatusFlags: u8 {
        const SPRITE_OVERFLOW = 0b0010_0000;
        const SPRITE_ZERO_HIT = 0b0100_0000;
        const VBLANK          = 0b1000_0000;
    }
}

/// The 15-bit loopy address as used by `v` and `t`.
///
/// Layout: `yyy NN YYYYY XXXXX` (fine Y, nametable, coarse Y, coarse X).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "savestate", derive(serde::Serialize, serde::Deserialize))]
pub(crate) struct VramAddr(pub(crate) u16);

const COARSE_X: u16 = 0x001F;
const COARSE_Y: u16 = 0x03E0;
const NT_H: u16 = 0x0400;
const NT_V: u16 = 0x0800;
const FINE_Y: u16 = 0x7000;
const ADDR_MASK: u16 = 0x7FFF;

impl VramAddr {
    #[inline]
    pub(crate) fn raw(self) -> u16 {
        self.0
    }

    #[inline]
    pub(crate) fn set_raw(&mut self, value: u16) {
        self.0 = value & ADDR_MASK;
    }

    #[inline]
    pub(crate) fn bus_addr(self) -> u16 {
        self.0 & 0x3FFF
    }

    #[inline]
    pub(crate) fn fine_y(self) -> u16 {
        (self.0 & FINE_Y) >> 12
    }

    /// Nametable address of the tile under the cursor.
    #[inline]
    pub(crate) fn tile_addr(self) -> u16 {
        0x2000 | (self.0 & 0x0FFF)
    }

    /// Attribute byte address for the tile under the cursor.
    #[inline]
    pub(crate) fn attribute_addr(self) -> u16 {
        0x23C0 | (self.0 & 0x0C00) | ((self.0 >> 4) & 0x38) | ((self.0 >> 2) & 0x07)
    }

    /// Quadrant shift within the attribute byte (0, 2, 4, 6).
    #[inline]
    pub(crate) fn attribute_shift(self) -> u16 {
        ((self.0 >> 4) & 0x04) | (self.0 & 0x02)
    }

    /// Coarse X increment with horizontal nametable wrap.
    pub(crate) fn increment_coarse_x(&mut self) {
        if self.0 & COARSE_X == COARSE_X {
            self.0 = (self.0 & !COARSE_X) ^ NT_H;
        } else {
            self.0 += 1;
        }
    }

    /// Fine/coarse Y increment with the row-29 wrap and row-31 quirk.
    pub(crate) fn increment_y(&mut self) {
        if self.0 & FINE_Y != FINE_Y {
            self.0 += 0x1000;
            return;
        }
        self.0 &= !FINE_Y;
        let coarse_y = (self.0 & COARSE_Y) >> 5;
        match coarse_y {
            29 => {
                self.0 = (self.0 & !COARSE_Y) ^ NT_V;
            }
            31 => {
                // Rows 30/31 point into the attribute tables; wrapping from
                // 31 does not flip the vertical nametable.
                self.0 &= !COARSE_Y;
            }
            _ => {
                self.0 = (self.0 & !COARSE_Y) | ((coarse_y + 1) << 5);
            }
        }
    }

    /// Copies coarse X and the horizontal nametable bit from `t`.
    pub(crate) fn copy_horizontal(&mut self, t: VramAddr) {
        self.0 = (self.0 & !(COARSE_X | NT_H)) | (t.0 & (COARSE_X | NT_H));
    }

    /// Copies the vertical scroll bits from `t`.
    pub(crate) fn copy_vertical(&mut self, t: VramAddr) {
        let mask = COARSE_Y | NT_V | FINE_Y;
        self.0 = (self.0 & !mask) | (t.0 & mask);
    }

    /// Linear `$2007` increment (1 or 32).
    pub(crate) fn increment(&mut self, step: u16) {
        self.0 = self.0.wrapping_add(step) & ADDR_MASK;
    }
}

/// The internal scroll/address latch set: current (`v`), temporary (`t`),
/// fine X, and the shared write toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "savestate", derive(serde::Serialize, serde::Deserialize))]
pub(crate) struct VramRegisters {
    pub(crate) v: VramAddr,
    pub(crate) t: VramAddr,
    pub(crate) fine_x: u8,
    pub(crate) w: bool,
}

impl VramRegisters {
    /// `$2000` write: nametable select lands in `t`.
    pub(crate) fn write_control(&mut self, nametable: u8) {
        self.t.0 = (self.t.0 & !(NT_H | NT_V)) | (u16::from(nametable & 0x03) << 10);
    }

    /// `$2005` write pair (X scroll then Y scroll).
    pub(crate) fn write_scroll(&mut self, value: u8) {
        if !self.w {
            self.t.0 = (self.t.0 & !COARSE_X) | (u16::from(value) >> 3);
            self.fine_x = value & 0x07;
        } else {
            self.t.0 = (self.t.0 & !(COARSE_Y | FINE_Y))
                | ((u16::from(value) & 0xF8) << 2)
                | ((u16::from(value) & 0x07) << 12);
        }
        self.w = !self.w;
    }

    /// `$2006` write pair (high byte then low byte); the second write
    /// transfers `t` into `v`.
    pub(crate) fn write_addr(&mut self, value: u8) -> bool {
        if !self.w {
            // Bit 14 is cleared by the high write.
            self.t.0 = (self.t.0 & 0x00FF) | ((u16::from(value) & 0x3F) << 8);
            self.w = true;
            false
        } else {
            self.t.0 = (self.t.0 & 0x7F00) | u16::from(value);
            self.v = self.t;
            self.w = false;
            true
        }
    }

    /// `$2002` read side effect.
    pub(crate) fn clear_toggle(&mut self) {
        self.w = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scroll_writes_fill_t_and_fine_x() {
        let mut regs = VramRegisters::default();
        regs.write_scroll(0x7D); // X = 0b01111_101
        assert_eq!(regs.t.0 & COARSE_X, 0x0F);
        assert_eq!(regs.fine_x, 5);
        regs.write_scroll(0x5E); // Y = 0b01011_110
        assert_eq!((regs.t.0 & COARSE_Y) >> 5, 0x0B);
        assert_eq!(regs.t.fine_y(), 6);
        assert!(!regs.w);
    }

    #[test]
    fn addr_write_pair_transfers_to_v() {
        let mut regs = VramRegisters::default();
        assert!(!regs.write_addr(0x21));
        assert!(regs.write_addr(0x08));
        assert_eq!(regs.v.raw(), 0x2108);
    }

    #[test]
    fn coarse_x_wrap_flips_horizontal_nametable() {
        let mut v = VramAddr(31);
        v.increment_coarse_x();
        assert_eq!(v.raw(), NT_H);
    }

    #[test]
    fn y_increment_wraps_at_row_29() {
        let mut v = VramAddr((29 << 5) | FINE_Y);
        v.increment_y();
        assert_eq!(v.raw(), NT_V);
    }

    #[test]
    fn attribute_address_matches_reference_formula() {
        let v = VramAddr(0x0000);
        assert_eq!(v.attribute_addr(), 0x23C0);
        let v = VramAddr(0x0C00 | (7 << 5) | 9);
        assert_eq!(v.attribute_addr(), 0x2FC0 | (1 << 3) | 2);
    }
}
