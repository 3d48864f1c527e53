//! Palette RAM with its mirroring quirks, plus a master RGB table for the
//! packed output formats.

use crate::mem_block::ppu::PaletteRam;

/// Commonly observed RP2C02 power-up palette contents. Real hardware is not
/// fully deterministic here; a fixed table keeps test output reproducible.
const POWER_ON: [u8; 32] = [
    0x09, 0x01, 0x00, 0x01, 0x00, 0x02, 0x02, 0x0D, 0x08, 0x10, 0x08, 0x24, 0x00, 0x00, 0x04,
    0x2C, 0x09, 0x01, 0x34, 0x03, 0x00, 0x04, 0x00, 0x14, 0x08, 0x3A, 0x00, 0x02, 0x00, 0x20,
    0x2C, 0x08,
];

/// The 32-byte palette with `$3F10/$3F14/$3F18/$3F1C` mirroring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Palette {
    ram: PaletteRam,
}

impl Palette {
    pub(crate) fn power_on() -> Self {
        let mut ram = PaletteRam::new();
        ram.as_mut_slice().copy_from_slice(&POWER_ON);
        Self { ram }
    }

    /// Resolves the `$3F00-$3FFF` mirror rules to a RAM index.
    #[inline]
    fn index(addr: u16) -> usize {
        let mut index = (addr & 0x1F) as usize;
        // Sprite backdrop mirrors shadow the background ones.
        if index & 0x13 == 0x10 {
            index &= !0x10;
        }
        index
    }

    /// CPU/pipeline read; grayscale masks the low hue bits.
    #[inline]
    pub(crate) fn read(&self, addr: u16, grayscale: bool) -> u8 {
        let value = self.ram[Self::index(addr)];
        if grayscale {
            value & 0x30
        } else {
            value
        }
    }

    #[inline]
    pub(crate) fn write(&mut self, addr: u16, value: u8) {
        self.ram[Self::index(addr)] = value & 0x3F;
    }

    pub(crate) fn as_slice(&self) -> &[u8] {
        self.ram.as_slice()
    }

    pub(crate) fn load(&mut self, bytes: &[u8]) {
        let len = bytes.len().min(32);
        self.ram.as_mut_slice()[..len].copy_from_slice(&bytes[..len]);
    }
}

/// Canonical NTSC master palette (2C02, no emphasis), RGB triplets.
#[rustfmt::skip]
pub const MASTER_RGB: [[u8; 3]; 64] = [
    [0x66, 0x66, 0x66], [0x00, 0x2A, 0x88], [0x14, 0x12, 0xA7], [0x3B, 0x00, 0xA4],
    [0x5C, 0x00, 0x7E], [0x6E, 0x00, 0x40], [0x6C, 0x06, 0x00], [0x56, 0x1D, 0x00],
    [0x33, 0x35, 0x00], [0x0B, 0x48, 0x00], [0x00, 0x52, 0x00], [0x00, 0x4F, 0x08],
    [0x00, 0x40, 0x4D], [0x00, 0x00, 0x00], [0x00, 0x00, 0x00], [0x00, 0x00, 0x00],
    [0xAD, 0xAD, 0xAD], [0x15, 0x5F, 0xD9], [0x42, 0x40, 0xFF], [0x75, 0x27, 0xFE],
    [0xA0, 0x1A, 0xCC], [0xB7, 0x1E, 0x7B], [0xB5, 0x31, 0x20], [0x99, 0x4E, 0x00],
    [0x6B, 0x6D, 0x00], [0x38, 0x87, 0x00], [0x0C, 0x93, 0x00], [0x00, 0x8F, 0x32],
    [0x00, 0x7C, 0x8D], [0x00, 0x00, 0x00], [0x00, 0x00, 0x00], [0x00, 0x00, 0x00],
    [0xFF, 0xFE, 0xFF], [0x64, 0xB0, 0xFF], [0x92, 0x90, 0xFF], [0xC6, 0x76, 0xFF],
    [0xF3, 0x6A, 0xFF], [0xFE, 0x6E, 0xCC], [0xFE, 0x81, 0x70], [0xEA, 0x9E, 0x22],
    [0xBC, 0xBE, 0x00], [0x88, 0xD8, 0x00], [0x5C, 0xE4, 0x30], [0x45, 0xE0, 0x82],
    [0x48, 0xCD, 0xDE], [0x4F, 0x4F, 0x4F], [0x00, 0x00, 0x00], [0x00, 0x00, 0x00],
    [0xFF, 0xFE, 0xFF], [0xC0, 0xDF, 0xFF], [0xD3, 0xD2, 0xFF], [0xE8, 0xC8, 0xFF],
    [0xFB, 0xC2, 0xFF], [0xFE, 0xC4, 0xEA], [0xFE, 0xCC, 0xC5], [0xF7, 0xD8, 0xA5],
    [0xE4, 0xE5, 0x94], [0xCF, 0xEF, 0x96], [0xBD, 0xF4, 0xAB], [0xB3, 0xF3, 0xCC],
    [0xB5, 0xEB, 0xF2], [0xB8, 0xB8, 0xB8], [0x00, 0x00, 0x00], [0x00, 0x00, 0x00],
];

/// Applies the color-emphasis bits to an RGB triplet. Each active emphasis
/// line attenuates the other two channels, which is a close approximation of
/// the analog behavior.
pub fn apply_emphasis(rgb: [u8; 3], emphasis: u8) -> [u8; 3] {
    if emphasis == 0 {
        return rgb;
    }
    let attenuate = |c: u8| ((u16::from(c) * 3) / 4) as u8;
    let [mut r, mut g, mut b] = rgb;
    if emphasis & 0x01 != 0 {
        g = attenuate(g);
        b = attenuate(b);
    }
    if emphasis & 0x02 != 0 {
        r = attenuate(r);
        b = attenuate(b);
    }
    if emphasis & 0x04 != 0 {
        r = attenuate(r);
        g = attenuate(g);
    }
    [r, g, b]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sprite_backdrop_mirrors_background() {
        let mut palette = Palette::power_on();
        palette.write(0x3F10, 0x2A);
        assert_eq!(palette.read(0x3F00, false), 0x2A);
        palette.write(0x3F04, 0x11);
        assert_eq!(palette.read(0x3F14, false), 0x11);
    }

    #[test]
    fn grayscale_masks_hue_bits() {
        let mut palette = Palette::power_on();
        palette.write(0x3F01, 0x27);
        assert_eq!(palette.read(0x3F01, true), 0x20);
    }

    #[test]
    fn writes_are_masked_to_six_bits() {
        let mut palette = Palette::power_on();
        palette.write(0x3F02, 0xFF);
        assert_eq!(palette.read(0x3F02, false), 0x3F);
    }
}
