//! quartznes-core: a master-clock-accurate NES emulation engine.
//!
//! The crate models the 2A03 (CPU + APU) and 2C02 (PPU) as components
//! interleaved under one master clock, with every bus cycle - not every
//! instruction - landing at its correct tick. Hosts drive a [`Machine`]
//! from a monotonic clock, hand it a frame-ready callback and an audio
//! sink, and publish controller state; everything else stays inside.

pub mod apu;
pub mod bus;
pub mod cartridge;
pub mod clock;
pub mod controller;
pub mod cpu;
pub mod error;
pub mod machine;
pub mod mem_block;
pub mod memory;
pub mod ppu;
pub mod region;
pub mod reset_kind;
#[cfg(feature = "savestate")]
pub mod savestate;

pub use cartridge::{load_cartridge, load_cartridge_from_file, Cartridge};
pub use error::Error;
pub use machine::{AudioSink, IrqSource, Machine};
pub use ppu::frame::{Frame, PixelFormat};
pub use region::Region;
pub use reset_kind::ResetKind;

#[cfg(test)]
mod tests {
    use ctor::ctor;
    use tracing::Level;
    use tracing_subscriber::FmtSubscriber;

    #[ctor]
    fn init_tracing() {
        let subscriber = FmtSubscriber::builder()
            .with_file(true)
            .with_line_number(true)
            .with_max_level(Level::WARN)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}
