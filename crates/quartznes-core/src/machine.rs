//! The console: every component glued together under the master clock.
//!
//! Single-threaded and cooperative: the host drives [`Machine::run`] (wall
//! paced) or [`Machine::run_master`] (deterministic), the scheduler picks
//! the next due component, and that component performs exactly one hardware
//! step. Side effects raised during a step (NMI/IRQ levels, DMA requests)
//! are sampled by the next component the scheduler dispatches, matching the
//! one-cycle observation latency of the real buses.

use bitflags::bitflags;

use crate::{
    apu::Apu,
    bus::cpu::{self as cpu_bus, CpuBusView, CpuFabric, CpuSignals},
    bus::ppu::{self as ppu_bus, PpuBusView, PpuFabric},
    cartridge::Cartridge,
    clock::{ClockSlot, MasterClock},
    controller::ControllerPorts,
    cpu::Cpu,
    ppu::{frame::PixelFormat, Ppu},
    region::Region,
    reset_kind::ResetKind,
};

bitflags! {
    /// IRQ line sources feeding the CPU's level-sensitive input.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "savestate", derive(serde::Serialize, serde::Deserialize))]
    pub struct IrqSource: u8 {
        const FRAME_COUNTER = 0b0001;
        const DMC           = 0b0010;
        const MAPPER        = 0b0100;
        const EXTERNAL      = 0b1000;
    }
}

/// The CPU's IRQ input as a mask of named sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "savestate", derive(serde::Serialize, serde::Deserialize))]
pub struct IrqLines {
    sources: IrqSource,
}

impl IrqLines {
    pub fn raise(&mut self, source: IrqSource) {
        self.sources.insert(source);
    }

    pub fn clear(&mut self, source: IrqSource) {
        self.sources.remove(source);
    }

    pub fn set(&mut self, source: IrqSource, level: bool) {
        self.sources.set(source, level);
    }

    /// The line is asserted while any source is.
    pub fn asserted(&self) -> bool {
        !self.sources.is_empty()
    }

    pub fn sources(&self) -> IrqSource {
        self.sources
    }
}

/// Host-provided audio output; receives one sample per APU cycle.
pub trait AudioSink: Send {
    fn push_sample(&mut self, sample: f32);
}

impl<F: FnMut(f32) + Send> AudioSink for F {
    fn push_sample(&mut self, sample: f32) {
        self(sample);
    }
}

pub struct Machine {
    pub(crate) region: Region,
    pub(crate) cpu: Cpu,
    pub(crate) ppu: Ppu,
    pub(crate) apu: Apu,
    pub(crate) cart: Option<Cartridge>,
    pub(crate) cpu_fab: CpuFabric,
    pub(crate) ppu_fab: PpuFabric,
    pub(crate) controllers: ControllerPorts,
    pub(crate) signals: CpuSignals,
    pub(crate) irq: IrqLines,
    pub(crate) clock: MasterClock,
    audio: Option<Box<dyn AudioSink>>,
    /// Latched when the PPU hands off a frame; cleared by `take_frame`.
    pub(crate) frame_ready: bool,
}

impl std::fmt::Debug for Machine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Machine")
            .field("region", &self.region)
            .field("has_cartridge", &self.cart.is_some())
            .field("cpu_cycles", &self.cpu.cycles())
            .finish()
    }
}

impl Machine {
    /// A bare console with no cartridge inserted.
    pub fn new(region: Region, format: PixelFormat) -> Self {
        Self {
            region,
            cpu: Cpu::new(),
            ppu: Ppu::new(region, format),
            apu: Apu::new(region),
            cart: None,
            cpu_fab: cpu_bus::power_on_fabric(),
            ppu_fab: ppu_bus::power_on_fabric(),
            controllers: ControllerPorts::new(),
            signals: CpuSignals::default(),
            irq: IrqLines::default(),
            clock: MasterClock::new(region),
            audio: None,
            frame_ready: false,
        }
    }

    /// Builds a console around a cartridge. The requested region wins over
    /// the ROM's timing hint (a mismatch is logged, per policy).
    pub fn with_cartridge(
        cart: Cartridge,
        requested: Option<Region>,
        format: PixelFormat,
    ) -> Self {
        let region = Region::resolve(requested, cart.header().timing);
        let mut machine = Self::new(region, format);
        machine.insert_cartridge(cart);
        machine
    }

    /// Inserts a cartridge and performs a power-on reset.
    pub fn insert_cartridge(&mut self, cart: Cartridge) {
        self.cart = Some(cart);
        self.reset(ResetKind::PowerOn);
    }

    /// Full console reset. Fabric slots are reinitialized before the first
    /// cycle so no handler survives dangling.
    pub fn reset(&mut self, kind: ResetKind) {
        match kind {
            ResetKind::PowerOn => {
                self.cpu_fab = cpu_bus::power_on_fabric();
                self.ppu_fab = ppu_bus::power_on_fabric();
                self.cpu.reset_to_known();
                self.apu.reset();
            }
            ResetKind::Soft => {
                // RAM and registers survive; rebuild only the slot tables.
                let mut fresh_cpu = cpu_bus::power_on_fabric();
                fresh_cpu
                    .backing_slice_mut()
                    .copy_from_slice(self.cpu_fab.backing_slice());
                let mut fresh_ppu = ppu_bus::power_on_fabric();
                fresh_ppu
                    .backing_slice_mut()
                    .copy_from_slice(self.ppu_fab.backing_slice());
                self.cpu_fab = fresh_cpu;
                self.ppu_fab = fresh_ppu;
                self.cpu.reset_analog();
            }
        }
        self.ppu.reset(kind);
        if let Some(cart) = self.cart.as_mut() {
            cart.reset(kind);
            cart.attach(&mut self.cpu_fab, &mut self.ppu_fab);
        }
        self.signals = CpuSignals::default();
        self.irq = IrqLines::default();
        self.clock.reset();
        self.frame_ready = false;
    }

    // --- Host wiring ---

    pub fn set_audio_sink<S: AudioSink + 'static>(&mut self, sink: S) {
        self.audio = Some(Box::new(sink));
    }

    pub fn controllers_mut(&mut self) -> &mut ControllerPorts {
        &mut self.controllers
    }

    pub fn region(&self) -> Region {
        self.region
    }

    /// APU sample rate in Hz for the configured region.
    pub fn audio_sample_rate(&self) -> u32 {
        self.clock.rates().apu_hz() as u32
    }

    // --- Read-only introspection (debugger hooks) ---

    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    pub fn ppu(&self) -> &Ppu {
        &self.ppu
    }

    pub fn apu(&self) -> &Apu {
        &self.apu
    }

    pub fn cartridge(&self) -> Option<&Cartridge> {
        self.cart.as_ref()
    }

    pub fn irq_lines(&self) -> &IrqLines {
        &self.irq
    }

    /// Raises or drops the external IRQ line (expansion port devices).
    pub fn set_external_irq(&mut self, level: bool) {
        self.irq.set(IrqSource::EXTERNAL, level);
    }

    /// Side-effect-free CPU bus read.
    pub fn cpu_peek(&self, addr: u16) -> u8 {
        let view = self.peek_view();
        view.peek(addr)
    }

    /// Debugger/tooling read through the CPU bus (performs the access with
    /// full side effects, outside any CPU cycle).
    pub fn cpu_read(&mut self, addr: u16) -> u8 {
        let nmi = self.ppu.nmi_output();
        let irq = self.irq.asserted();
        let cycles = self.cpu.cycles();
        let mut view = CpuBusView {
            fab: &mut self.cpu_fab,
            ppu_fab: &mut self.ppu_fab,
            ppu: &mut self.ppu,
            apu: &mut self.apu,
            cart: self.cart.as_mut(),
            controllers: &mut self.controllers,
            signals: &mut self.signals,
            cycles,
            nmi_line: nmi,
            irq_line: irq,
        };
        view.read(addr)
    }

    /// Debugger/tooling write through the CPU bus (performs the access with
    /// full side effects, outside any CPU cycle).
    pub fn cpu_poke(&mut self, addr: u16, value: u8) {
        let nmi = self.ppu.nmi_output();
        let irq = self.irq.asserted();
        let cycles = self.cpu.cycles();
        let mut view = CpuBusView {
            fab: &mut self.cpu_fab,
            ppu_fab: &mut self.ppu_fab,
            ppu: &mut self.ppu,
            apu: &mut self.apu,
            cart: self.cart.as_mut(),
            controllers: &mut self.controllers,
            signals: &mut self.signals,
            cycles,
            nmi_line: nmi,
            irq_line: irq,
        };
        view.write(addr, value);
    }

    /// Bulk-loads CPU-visible RAM via the fabric backing store.
    pub fn load_ram(&mut self, src: &[u8], addr: u16) {
        self.cpu_fab.copy_to_backing(src, addr);
    }

    fn peek_view(&self) -> PeekView<'_> {
        PeekView { machine: self }
    }

    // --- Clock driving ---

    /// Wall-paced advance from a monotonic microsecond timestamp.
    pub fn run(&mut self, now_micros: u64) {
        self.clock.advance_wall(now_micros);
        self.drain_due();
    }

    /// Deterministic advance by raw master-clock ticks.
    pub fn run_master(&mut self, ticks: u64) {
        self.clock.advance_master(ticks);
        self.drain_due();
    }

    /// Runs until the PPU hands off the next frame (the VBlank swap point).
    pub fn run_to_vblank(&mut self) {
        self.frame_ready = false;
        let step = self.clock.rates().ppu_div;
        while !self.frame_ready {
            self.run_master(step);
        }
    }

    /// True once per completed frame; cleared by the call.
    pub fn take_frame(&mut self) -> bool {
        core::mem::take(&mut self.frame_ready)
    }

    fn drain_due(&mut self) {
        while let Some(slot) = self.clock.next_due() {
            match slot {
                ClockSlot::Cpu => self.tick_cpu(),
                ClockSlot::Ppu => self.tick_ppu(),
                ClockSlot::Apu => self.tick_apu(),
            }
        }
    }

    fn tick_cpu(&mut self) {
        // Device IRQ levels are folded into the mask at the cycle boundary;
        // a line raised mid-cycle is observed one cycle later, as on
        // hardware.
        self.irq.set(IrqSource::FRAME_COUNTER, self.apu.frame_irq());
        self.irq.set(IrqSource::DMC, self.apu.dmc_irq());
        let mapper_irq = self.cart.as_ref().is_some_and(Cartridge::irq_pending);
        self.irq.set(IrqSource::MAPPER, mapper_irq);

        let nmi = self.ppu.nmi_output();
        let irq = self.irq.asserted();
        let cycles = self.cpu.cycles();
        let mut view = CpuBusView {
            fab: &mut self.cpu_fab,
            ppu_fab: &mut self.ppu_fab,
            ppu: &mut self.ppu,
            apu: &mut self.apu,
            cart: self.cart.as_mut(),
            controllers: &mut self.controllers,
            signals: &mut self.signals,
            cycles,
            nmi_line: nmi,
            irq_line: irq,
        };
        self.cpu.tick(&mut view);

        if let Some(cart) = self.cart.as_mut() {
            cart.tick(self.cpu.cycles());
        }
    }

    fn tick_ppu(&mut self) {
        let cpu_cycle = self.cpu.cycles();
        let mut view = PpuBusView {
            fab: &mut self.ppu_fab,
            cart: self.cart.as_mut(),
            cpu_cycle,
        };
        self.ppu.tick(&mut view);
        if self.ppu.take_frame_completed() {
            self.frame_ready = true;
        }
    }

    fn tick_apu(&mut self) {
        self.apu.tick();
        if let Some(addr) = self.apu.take_dmc_fetch() {
            self.cpu.request_dmc_fetch(addr);
        }
        let mut sample = self.apu.sample();
        if let Some(cart) = self.cart.as_mut() {
            let out_hz = self.clock.rates().apu_hz() as u32;
            sample = cart.ext_audio_sample(sample);
            sample = cart.post_process_sample(sample, out_hz);
        }
        if let Some(sink) = self.audio.as_mut() {
            sink.push_sample(sample);
        }
    }
}

/// Borrowed immutable view used by `cpu_peek`.
struct PeekView<'a> {
    machine: &'a Machine,
}

impl PeekView<'_> {
    fn peek(&self, addr: u16) -> u8 {
        use crate::bus::cpu::CpuRead;
        use crate::memory::ppu as ppu_mem;
        let machine = self.machine;
        match machine.cpu_fab.read_tag(addr) {
            CpuRead::Ram { index } => machine.cpu_fab.backing(index),
            CpuRead::Open | CpuRead::CartReg => machine.cpu_fab.float(),
            CpuRead::PpuReg { reg } => machine.ppu.reg_peek(ppu_mem::Register::from_index(reg)),
            CpuRead::ApuStatus => machine.apu.peek_status() | (machine.cpu_fab.float() & 0x20),
            CpuRead::Controller { port } => {
                (machine.controllers.peek(port) & 0x1F) | (machine.cpu_fab.float() & 0xE0)
            }
            CpuRead::PrgRom { slot } => match machine.cart.as_ref() {
                Some(cart) => cart.prg_read(slot, addr),
                None => machine.cpu_fab.float(),
            },
            CpuRead::PrgRam { slot } => match machine.cart.as_ref() {
                Some(cart) => cart.prg_ram_read(slot, addr),
                None => machine.cpu_fab.float(),
            },
        }
    }
}
