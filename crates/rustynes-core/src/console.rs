//! NES Console Implementation.
//!
//! The Console struct provides the high-level emulation API, managing the
//! CPU, PPU, APU, and mapper integration with proper timing.

use crate::bus::{ControllerState, NesBus};
use crate::region::Region;
use rustynes_cpu::{Cpu, Status};
use rustynes_mappers::{Mapper, Rom, RomError, create_mapper};

#[cfg(not(feature = "std"))]
use alloc::{boxed::Box, vec::Vec};

#[cfg(feature = "serde")]
use crate::bus::BusSnapshot;
#[cfg(feature = "serde")]
use crate::save_state::{self, SaveStateError};
#[cfg(feature = "serde")]
use rustynes_apu::Apu;
#[cfg(feature = "serde")]
use rustynes_ppu::Ppu;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// NES emulation timing constants.
pub mod timing {
    /// Master clock frequency (NTSC).
    pub const MASTER_CLOCK_NTSC: u32 = 21_477_272;
    /// CPU clock frequency (NTSC).
    pub const CPU_CLOCK_NTSC: u32 = MASTER_CLOCK_NTSC / 12;
    /// PPU clock frequency (NTSC).
    pub const PPU_CLOCK_NTSC: u32 = MASTER_CLOCK_NTSC / 4;
    /// CPU cycles per frame (NTSC).
    pub const CPU_CYCLES_PER_FRAME: u32 = 29_780;
    /// PPU dots per scanline.
    pub const PPU_DOTS_PER_SCANLINE: u16 = 341;
    /// Total scanlines (including vblank).
    pub const PPU_SCANLINES: u16 = 262;
    /// Target frame rate (NTSC).
    pub const FRAME_RATE_NTSC: f64 = 60.0988;
}

/// Console error type.
#[derive(Debug, Clone)]
pub enum ConsoleError {
    /// ROM loading error.
    RomError(RomError),
    /// Invalid state.
    InvalidState(String),
}

impl From<RomError> for ConsoleError {
    fn from(err: RomError) -> Self {
        Self::RomError(err)
    }
}

impl core::fmt::Display for ConsoleError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::RomError(e) => write!(f, "ROM error: {e}"),
            Self::InvalidState(msg) => write!(f, "Invalid state: {msg}"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ConsoleError {}

/// NES console emulator.
pub struct Console {
    /// 6502 CPU.
    cpu: Cpu,
    /// System bus (PPU, APU, mapper, RAM).
    bus: NesBus,
    /// Frame buffer (256x240 RGB888, 3 bytes per pixel).
    framebuffer: Vec<u8>,
    /// Audio sample buffer.
    audio_buffer: Vec<f32>,
    /// Total CPU cycles executed.
    total_cycles: u64,
    /// Frame counter.
    frame_count: u64,
    /// Is emulation running?
    running: bool,
    /// MD5 of the raw ROM image, recorded at load time for save-state
    /// cross-checks. `None` when the console was built directly from a
    /// mapper (no ROM bytes were ever handed to the core).
    #[cfg(feature = "serde")]
    rom_hash: Option<[u8; 16]>,
}

impl Console {
    /// Create a new console with the given ROM.
    ///
    /// # Errors
    ///
    /// Returns an error if the ROM cannot be loaded or uses an unsupported mapper.
    pub fn new(rom_data: &[u8]) -> Result<Self, ConsoleError> {
        let rom = Rom::load(rom_data)?;
        let mapper = create_mapper(&rom)?;
        let region = Region::from_header(rom_data);
        let mut console = Self::with_mapper_and_region(mapper, region)?;
        #[cfg(feature = "serde")]
        {
            console.rom_hash = Some(md5::compute(rom_data).0);
        }
        Ok(console)
    }

    /// Create a new console from ROM bytes (alias for `new`).
    ///
    /// # Errors
    ///
    /// Returns an error if the ROM cannot be loaded or uses an unsupported mapper.
    pub fn from_rom_bytes(rom_data: &[u8]) -> Result<Self, ConsoleError> {
        Self::new(rom_data)
    }

    /// Create a new console from ROM bytes with sample rate configuration.
    ///
    /// Note: The sample rate is currently unused as the APU handles resampling internally.
    ///
    /// # Errors
    ///
    /// Returns an error if the ROM cannot be loaded or uses an unsupported mapper.
    pub fn from_rom_bytes_with_sample_rate(
        rom_data: &[u8],
        _sample_rate: u32,
    ) -> Result<Self, ConsoleError> {
        Self::new(rom_data)
    }

    /// Create a console with a pre-created mapper.
    ///
    /// # Errors
    ///
    /// Returns an error if the console cannot be initialized.
    pub fn with_mapper(mapper: Box<dyn Mapper>) -> Result<Self, ConsoleError> {
        Self::with_mapper_and_region(mapper, Region::Ntsc)
    }

    /// Create a console with a pre-created mapper for a specific timing region.
    ///
    /// # Errors
    ///
    /// Returns an error if the console cannot be initialized.
    pub fn with_mapper_and_region(
        mapper: Box<dyn Mapper>,
        region: Region,
    ) -> Result<Self, ConsoleError> {
        let bus = NesBus::with_region(mapper, region);
        let cpu = Cpu::new();

        Ok(Self {
            cpu,
            bus,
            framebuffer: vec![0; 256 * 240 * 3],
            audio_buffer: Vec::with_capacity(2048),
            total_cycles: 0,
            frame_count: 0,
            running: true,
            #[cfg(feature = "serde")]
            rom_hash: None,
        })
    }

    /// Console timing region (NTSC/PAL/Dendy) this console was built for.
    #[must_use]
    pub fn region(&self) -> Region {
        self.bus.region()
    }

    /// Reset the console to initial state.
    pub fn reset(&mut self) {
        self.cpu.reset(&mut self.bus);
        self.bus.reset();
        self.total_cycles = 0;
        self.running = true;
    }

    /// Power on the console (cold boot).
    pub fn power_on(&mut self) {
        self.reset();
    }

    /// Run emulation for one CPU instruction.
    ///
    /// Returns the number of CPU cycles executed.
    pub fn step(&mut self) -> u8 {
        if !self.running {
            return 0;
        }

        // Handle DMC DMA stall
        if self.bus.dmc_stall_active() {
            self.bus.decrement_dmc_stall();
            self.step_components(1);
            return 1;
        }

        // Handle OAM DMA
        if self.bus.oam_dma_pending() {
            let dma_cycles = self.bus.execute_oam_dma();
            self.step_components(dma_cycles);
            return dma_cycles as u8;
        }

        // Handle interrupts
        if self.bus.nmi_pending() {
            self.bus.acknowledge_nmi();
            self.cpu.trigger_nmi();
        } else if self.bus.irq_pending() && !self.cpu.status().contains(Status::I) {
            self.cpu.set_irq(true);
        }

        // Execute one CPU instruction
        let cycles = self.cpu.step(&mut self.bus);
        self.step_components(u16::from(cycles));
        self.bus.add_cpu_cycles(cycles);
        self.total_cycles += u64::from(cycles);

        cycles
    }

    /// Step PPU and APU for the given number of CPU cycles.
    fn step_components(&mut self, cpu_cycles: u16) {
        for _ in 0..cpu_cycles {
            // Step PPU (3 dots per CPU cycle)
            self.bus.step_ppu();

            // Step APU (1:1 with CPU)
            if let Some(sample) = self.bus.step_apu() {
                self.audio_buffer.push(sample);
            }
        }
    }

    /// Run emulation for one frame (approximately 29,780 CPU cycles).
    ///
    /// Returns the actual number of CPU cycles executed.
    pub fn step_frame(&mut self) -> u64 {
        let start_cycles = self.total_cycles;
        let target_cycles = self.total_cycles + u64::from(timing::CPU_CYCLES_PER_FRAME);

        while self.total_cycles < target_cycles && self.running {
            self.step();
        }

        // Copy PPU framebuffer
        self.update_framebuffer();
        self.frame_count += 1;

        self.total_cycles - start_cycles
    }

    /// Run emulation for one frame with cycle-accurate timing.
    ///
    /// This is an alias for `step_frame()` for API compatibility.
    /// Returns the actual number of CPU cycles executed.
    pub fn step_frame_accurate(&mut self) -> u64 {
        self.step_frame()
    }

    /// Update the framebuffer from PPU output.
    fn update_framebuffer(&mut self) {
        let ppu_buffer = self.bus.ppu.frame_buffer();

        // Convert PPU palette indices to RGB888, matching the video sink
        // contract: no alpha channel, the host owns compositing.
        for (i, &palette_idx) in ppu_buffer.iter().enumerate() {
            let rgb = crate::palette::NES_PALETTE[palette_idx as usize & 0x3F];
            let offset = i * 3;
            self.framebuffer[offset] = rgb.0; // R
            self.framebuffer[offset + 1] = rgb.1; // G
            self.framebuffer[offset + 2] = rgb.2; // B
        }
    }

    /// Get the current framebuffer (256 x visible-scanlines, RGB888).
    ///
    /// Pixel format is fixed at RGB888 (3 bytes/pixel); the host's video
    /// sink presents it directly (`set_pixel_format`/`render_game` in the
    /// external interface are host-side concerns this accessor feeds).
    #[must_use]
    pub fn framebuffer(&self) -> &[u8] {
        &self.framebuffer
    }

    /// Framebuffer width in pixels (always 256).
    #[must_use]
    pub fn framebuffer_width(&self) -> usize {
        256
    }

    /// Framebuffer height in visible scanlines for this console's region.
    #[must_use]
    pub fn framebuffer_height(&self) -> usize {
        self.framebuffer.len() / (256 * 3)
    }

    /// Take the audio buffer (drains accumulated samples).
    pub fn take_audio(&mut self) -> Vec<f32> {
        core::mem::take(&mut self.audio_buffer)
    }

    /// Get the audio buffer without draining.
    #[must_use]
    pub fn audio_buffer(&self) -> &[f32] {
        &self.audio_buffer
    }

    /// Get audio samples (alias for `audio_buffer`).
    #[must_use]
    pub fn audio_samples(&self) -> &[f32] {
        &self.audio_buffer
    }

    /// Clear the audio sample buffer.
    pub fn clear_audio_samples(&mut self) {
        self.audio_buffer.clear();
    }

    /// Set controller 1 state from button byte.
    pub fn set_controller_1(&mut self, buttons: u8) {
        self.bus.controller1 = ControllerState { buttons };
    }

    /// Set controller 2 state from button byte.
    pub fn set_controller_2(&mut self, buttons: u8) {
        self.bus.controller2 = ControllerState { buttons };
    }

    /// Set controller 1 state.
    pub fn set_controller1(&mut self, state: ControllerState) {
        self.bus.controller1 = state;
    }

    /// Set controller 2 state.
    pub fn set_controller2(&mut self, state: ControllerState) {
        self.bus.controller2 = state;
    }

    /// Get controller 1 state.
    #[must_use]
    pub fn controller1(&self) -> ControllerState {
        self.bus.controller1
    }

    /// Get controller 2 state.
    #[must_use]
    pub fn controller2(&self) -> ControllerState {
        self.bus.controller2
    }

    /// Button bit masks in host notification order: A, B, Select, Start, Up, Down, Left, Right.
    const BUTTON_MASKS: [u8; 8] = [
        ControllerState::A,
        ControllerState::B,
        ControllerState::SELECT,
        ControllerState::START,
        ControllerState::UP,
        ControllerState::DOWN,
        ControllerState::LEFT,
        ControllerState::RIGHT,
    ];

    /// Notify the core that a controller button was pressed.
    ///
    /// `player_index` selects controller 1 (0) or controller 2 (1); `button_index`
    /// is 0-7 in A, B, Select, Start, Up, Down, Left, Right order. This is the
    /// host-facing entry point for button-down events; out-of-range indices are
    /// ignored rather than panicking, since the core never originates an error
    /// from a malformed host call.
    pub fn notify_button_pressed(&mut self, player_index: u8, button_index: u8) {
        self.set_button(player_index, button_index, true);
    }

    /// Notify the core that a controller button was released.
    pub fn notify_button_released(&mut self, player_index: u8, button_index: u8) {
        self.set_button(player_index, button_index, false);
    }

    fn set_button(&mut self, player_index: u8, button_index: u8, pressed: bool) {
        let Some(&mask) = Self::BUTTON_MASKS.get(button_index as usize) else {
            return;
        };
        let state = match player_index {
            0 => &mut self.bus.controller1,
            1 => &mut self.bus.controller2,
            _ => return,
        };
        if pressed {
            state.buttons |= mask;
        } else {
            state.buttons &= !mask;
        }
    }

    /// Get the total CPU cycles executed.
    #[must_use]
    pub fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    /// Get the frame count.
    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Check if emulation is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Pause emulation.
    pub fn pause(&mut self) {
        self.running = false;
    }

    /// Resume emulation.
    pub fn resume(&mut self) {
        self.running = true;
    }

    /// Get a reference to the CPU for debugging.
    #[must_use]
    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    /// Get a reference to the PPU for debugging.
    #[must_use]
    pub fn ppu(&self) -> &rustynes_ppu::Ppu {
        &self.bus.ppu
    }

    /// Get a reference to the APU for debugging.
    #[must_use]
    pub fn apu(&self) -> &rustynes_apu::Apu {
        &self.bus.apu
    }

    /// Get the total CPU cycles (alias for `total_cycles`).
    #[must_use]
    pub fn cycles(&self) -> u64 {
        self.total_cycles
    }

    /// Peek at memory without side effects.
    ///
    /// This is useful for debugging/display purposes where we don't want
    /// to trigger PPU register side effects or mapper state changes.
    #[must_use]
    pub fn peek_memory(&self, addr: u16) -> u8 {
        self.bus.peek(addr)
    }

    /// Get a reference to the bus for debugging.
    #[must_use]
    pub fn bus(&self) -> &NesBus {
        &self.bus
    }

    /// Get a mutable reference to the bus.
    pub fn bus_mut(&mut self) -> &mut NesBus {
        &mut self.bus
    }

    /// Get the mapper number.
    #[must_use]
    pub fn mapper_number(&self) -> u16 {
        self.bus.mapper.mapper_number()
    }

    /// Get the mapper name.
    #[must_use]
    pub fn mapper_name(&self) -> &'static str {
        self.bus.mapper.mapper_name()
    }

    /// Check if the ROM has battery-backed RAM.
    #[must_use]
    pub fn has_battery(&self) -> bool {
        self.bus.mapper.has_battery()
    }

    /// Get battery-backed RAM for saving.
    #[must_use]
    pub fn battery_ram(&self) -> Option<&[u8]> {
        self.bus.mapper.battery_ram()
    }

    /// Load battery-backed RAM.
    pub fn load_battery_ram(&mut self, data: &[u8]) {
        self.bus.mapper.set_battery_ram(data);
    }

    /// Serialize the full machine state to an opaque, versioned byte blob.
    ///
    /// The blob is only meaningful when fed back into [`Console::load_state`]
    /// on a console built from the same ROM and mapper; the header records
    /// an MD5 of the ROM image (when known) and the mapper number so a
    /// mismatched restore is rejected rather than silently corrupting state.
    ///
    /// # Errors
    ///
    /// Returns [`SaveStateError::Encode`] if the component snapshot cannot
    /// be bincode-encoded (only possible if a component's `Serialize` impl
    /// is itself broken; this never happens in practice).
    #[cfg(feature = "serde")]
    pub fn save_state(&self) -> Result<Vec<u8>, SaveStateError> {
        let snapshot = ConsoleSnapshot {
            cpu: self.cpu.clone(),
            ppu: self.bus.ppu.clone(),
            apu: self.bus.apu.clone(),
            bus: self.bus.snapshot(),
            mapper_number: self.bus.mapper.mapper_number(),
            mapper_data: self.bus.mapper.save_state(),
            total_cycles: self.total_cycles,
            frame_count: self.frame_count,
            running: self.running,
        };
        let body = bincode::serialize(&snapshot)
            .map_err(|e| SaveStateError::Encode(format!("{e}")))?;
        let rom_hash = self.rom_hash.unwrap_or([0; 16]);
        Ok(save_state::encode(rom_hash, self.frame_count, &body))
    }

    /// Restore machine state previously produced by [`Console::save_state`].
    ///
    /// On failure the console is left exactly as it was before the call —
    /// validation happens before any field is mutated.
    ///
    /// # Errors
    ///
    /// Returns [`SaveStateError`] if the blob is truncated, corrupted,
    /// was produced by an incompatible version, records a ROM hash that
    /// doesn't match this console's loaded ROM, or names a different
    /// mapper number than the one currently attached.
    #[cfg(feature = "serde")]
    pub fn load_state(&mut self, data: &[u8]) -> Result<(), SaveStateError> {
        let header = save_state::decode(data)?;
        if let Some(expected) = self.rom_hash {
            if expected != header.rom_hash {
                return Err(SaveStateError::RomMismatch {
                    expected,
                    actual: header.rom_hash,
                });
            }
        }
        let snapshot: ConsoleSnapshot = bincode::deserialize(header.body)
            .map_err(|e| SaveStateError::Decode(format!("{e}")))?;
        let actual_mapper = self.bus.mapper.mapper_number();
        if snapshot.mapper_number != actual_mapper {
            return Err(SaveStateError::MapperMismatch {
                expected: snapshot.mapper_number,
                actual: actual_mapper,
            });
        }
        self.bus
            .mapper
            .load_state(&snapshot.mapper_data)
            .map_err(|_| SaveStateError::MapperState)?;

        self.cpu = snapshot.cpu;
        self.bus.ppu = snapshot.ppu;
        self.bus.apu = snapshot.apu;
        self.bus.restore(&snapshot.bus);
        self.total_cycles = snapshot.total_cycles;
        self.frame_count = snapshot.frame_count;
        self.running = snapshot.running;
        Ok(())
    }
}

/// Fixed-order snapshot of every stateful component, as bincode-encoded
/// inside a save-state blob's body.
#[cfg(feature = "serde")]
#[derive(Serialize, Deserialize)]
struct ConsoleSnapshot {
    cpu: Cpu,
    ppu: Ppu,
    apu: Apu,
    bus: BusSnapshot,
    mapper_number: u16,
    mapper_data: Vec<u8>,
    total_cycles: u64,
    frame_count: u64,
    running: bool,
}
