//! NES System Bus Implementation.
//!
//! The bus connects the CPU to all other components:
//! - PPU registers ($2000-$2007, mirrored every 8 bytes to $3FFF)
//! - APU/IO registers ($4000-$4017)
//! - Cartridge space ($4020-$FFFF)
//! - Internal RAM ($0000-$07FF, mirrored to $1FFF)

use crate::region::Region;
use rustynes_apu::{Apu, System as ApuSystem};
use rustynes_cpu::Bus;
use rustynes_mappers::Mapper;
use rustynes_ppu::Ppu;

#[cfg(not(feature = "std"))]
use alloc::boxed::Box;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Controller input state.
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ControllerState {
    /// Button states: A, B, Select, Start, Up, Down, Left, Right
    pub buttons: u8,
}

impl ControllerState {
    /// A button mask.
    pub const A: u8 = 0x01;
    /// B button mask.
    pub const B: u8 = 0x02;
    /// Select button mask.
    pub const SELECT: u8 = 0x04;
    /// Start button mask.
    pub const START: u8 = 0x08;
    /// Up button mask.
    pub const UP: u8 = 0x10;
    /// Down button mask.
    pub const DOWN: u8 = 0x20;
    /// Left button mask.
    pub const LEFT: u8 = 0x40;
    /// Right button mask.
    pub const RIGHT: u8 = 0x80;
}

/// NES system bus connecting all components.
///
/// Nametable storage and mirroring live inside [`Ppu`] itself (its
/// internal `Vram`), so the bus only has to forward CHR pattern-table
/// accesses to the mapper through closures when stepping or touching
/// PPU registers.
pub struct NesBus {
    /// Internal RAM (2KB, mirrored 4 times).
    pub ram: [u8; 2048],
    /// PPU (Picture Processing Unit).
    pub ppu: Ppu,
    /// APU (Audio Processing Unit).
    pub apu: Apu,
    /// Cartridge mapper.
    pub mapper: Box<dyn Mapper>,
    /// Controller 1 state.
    pub controller1: ControllerState,
    /// Controller 2 state.
    pub controller2: ControllerState,
    /// Controller 1 shift register.
    controller1_shift: u8,
    /// Controller 2 shift register.
    controller2_shift: u8,
    /// Controller strobe latch.
    controller_strobe: bool,
    /// OAM DMA page.
    oam_dma_page: Option<u8>,
    /// CPU cycle counter for DMA timing.
    cpu_cycles: u64,
    /// DMC DMA stall cycles.
    dmc_stall_cycles: u8,
    /// Last value on the data bus (for open bus behavior).
    last_bus_value: u8,
    /// NMI pending from PPU.
    nmi_pending: bool,
    /// IRQ pending from mapper/APU.
    irq_pending: bool,
    /// Sample accumulator for downsampling.
    sample_count: u32,
    /// Sample sum for averaging.
    sample_sum: f32,
    /// Console timing region; drives PPU scanline geometry and APU rate tables.
    region: Region,
    /// Cycle position (0..5) within the 5-CPU-cycle/16-PPU-dot PAL group.
    pal_dot_group: u8,
    /// A12 line state observed at the end of the previous CPU cycle.
    a12_prev: bool,
    /// Consecutive CPU cycles A12 has been observed low, saturating at 3.
    a12_low_streak: u8,
}

impl NesBus {
    /// CPU cycles per audio sample (at 44100 Hz).
    const CYCLES_PER_SAMPLE: u32 = 40; // ~1789773 / 44100

    /// Create a new NES bus with the given mapper, defaulting to NTSC timing.
    pub fn new(mapper: Box<dyn Mapper>) -> Self {
        Self::with_region(mapper, Region::Ntsc)
    }

    /// Create a new NES bus for a specific console timing region.
    ///
    /// NTSC runs 262 scanlines/frame with the odd-frame dot skip; PAL and
    /// Dendy both run 312 scanlines/frame with no odd-frame skip. PAL
    /// additionally averages 3.2 PPU dots per CPU cycle (16 dots per 5
    /// cycles) in `step_ppu`, while Dendy keeps NTSC's flat 3 dots/cycle
    /// ratio despite sharing PAL's frame length.
    pub fn with_region(mapper: Box<dyn Mapper>, region: Region) -> Self {
        let (num_scanlines, odd_frame_skip) = region.ppu_geometry();
        let apu_system = match region {
            Region::Ntsc => ApuSystem::NTSC,
            Region::Pal => ApuSystem::PAL,
            Region::Dendy => ApuSystem::Dendy,
        };
        Self {
            ram: [0; 2048],
            ppu: Ppu::with_region(
                mapper.mirroring(),
                num_scanlines,
                odd_frame_skip,
                region.nmi_scanline(),
                region.visible_scanlines(),
            ),
            apu: Apu::with_system(apu_system),
            mapper,
            controller1: ControllerState::default(),
            controller2: ControllerState::default(),
            controller1_shift: 0,
            controller2_shift: 0,
            controller_strobe: false,
            oam_dma_page: None,
            cpu_cycles: 0,
            dmc_stall_cycles: 0,
            last_bus_value: 0,
            nmi_pending: false,
            irq_pending: false,
            sample_count: 0,
            sample_sum: 0.0,
            region,
            pal_dot_group: 0,
            a12_prev: false,
            a12_low_streak: 0,
        }
    }

    /// Reset the bus and all components.
    pub fn reset(&mut self) {
        self.ram.fill(0);
        self.ppu.reset();
        self.apu.reset();
        self.mapper.reset();
        self.controller1_shift = 0;
        self.controller2_shift = 0;
        self.controller_strobe = false;
        self.oam_dma_page = None;
        self.cpu_cycles = 0;
        self.dmc_stall_cycles = 0;
        self.last_bus_value = 0;
        self.nmi_pending = false;
        self.irq_pending = false;
        self.sample_count = 0;
        self.sample_sum = 0.0;
        self.pal_dot_group = 0;
        self.a12_prev = false;
        self.a12_low_streak = 0;
    }

    /// Console timing region this bus was constructed for.
    #[must_use]
    pub fn region(&self) -> Region {
        self.region
    }

    /// Check if OAM DMA is pending.
    #[must_use]
    pub fn oam_dma_pending(&self) -> bool {
        self.oam_dma_page.is_some()
    }

    /// Execute OAM DMA transfer.
    ///
    /// Returns the number of CPU cycles consumed.
    pub fn execute_oam_dma(&mut self) -> u16 {
        if let Some(page) = self.oam_dma_page.take() {
            let base = u16::from(page) << 8;

            // Copy 256 bytes to OAM
            let mut data = [0u8; 256];
            for i in 0..256u16 {
                let addr = base.wrapping_add(i);
                data[i as usize] = self.cpu_read(addr);
            }
            self.ppu.oam_dma(&data);

            // DMA takes 513 or 514 cycles depending on CPU cycle parity
            let cycles = if self.cpu_cycles % 2 == 1 { 514 } else { 513 };
            self.cpu_cycles += u64::from(cycles);
            cycles
        } else {
            0
        }
    }

    /// Internal CPU read without updating bus state (for DMA).
    fn cpu_read(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x1FFF => self.ram[(addr & 0x07FF) as usize],
            0x8000..=0xFFFF => self.mapper.read_prg(addr),
            _ => 0,
        }
    }

    /// Step the PPU by 3 dots (NTSC/Dendy) or, on PAL, 3 dots with a 4th
    /// dot inserted once every 5 CPU cycles (16 dots per 5 cycles, an
    /// average of 3.2 dots/cycle).
    ///
    /// Returns true if NMI should be triggered.
    pub fn step_ppu(&mut self) -> bool {
        let mut nmi = false;
        self.ppu.set_mirroring(self.mapper.mirroring());

        let dots = if self.region == Region::Pal {
            let extra = u8::from(self.pal_dot_group == 0);
            self.pal_dot_group = (self.pal_dot_group + 1) % 5;
            3 + extra
        } else {
            3
        };

        for _ in 0..dots {
            let mapper = &*self.mapper;
            let (_frame_complete, nmi_triggered) =
                self.ppu.step_with_chr(|addr| mapper.read_chr(addr));
            if nmi_triggered {
                nmi = true;
            }
        }

        // A12 edge detection: sample the line once per CPU cycle (after all
        // of this cycle's PPU dots have run) and clock the mapper's IRQ
        // counter only on a low-to-high transition preceded by at least 3
        // CPU cycles of A12 held low. This drives MMC3-style IRQ timing
        // directly off the PPU address bus instead of approximating it with
        // a fixed per-scanline dot.
        let a12_now = self.ppu.current_a12();
        if a12_now {
            if !self.a12_prev && self.a12_low_streak >= 3 {
                self.mapper.ppu_a12_rising();
            }
            self.a12_low_streak = 0;
        } else {
            self.a12_low_streak = self.a12_low_streak.saturating_add(1);
        }
        self.a12_prev = a12_now;

        // Clock the mapper for each CPU cycle
        self.mapper.clock(1);

        if nmi {
            self.nmi_pending = true;
        }

        nmi
    }

    /// Step the APU by one CPU cycle.
    ///
    /// Returns audio sample if available.
    pub fn step_apu(&mut self) -> Option<f32> {
        self.apu.clock();

        // Handle DMC sample fetch
        if self.apu.dmc_needs_sample() {
            let addr = self.apu.dmc_sample_addr();
            let sample = self.mapper.read_prg(addr);
            self.apu.dmc_fill_sample(sample);
            // DMC DMA stalls CPU for 4 cycles
            self.dmc_stall_cycles = 4;
        }

        // Accumulate samples for downsampling
        self.sample_sum += self.apu.output();
        self.sample_count += 1;

        if self.sample_count >= Self::CYCLES_PER_SAMPLE {
            #[allow(clippy::cast_precision_loss)]
            let sample = self.sample_sum / self.sample_count as f32;
            self.sample_count = 0;
            self.sample_sum = 0.0;
            Some(sample)
        } else {
            None
        }
    }

    /// Check if NMI is pending.
    #[must_use]
    pub fn nmi_pending(&self) -> bool {
        self.nmi_pending
    }

    /// Acknowledge NMI.
    pub fn acknowledge_nmi(&mut self) {
        self.nmi_pending = false;
    }

    /// Check if IRQ is pending.
    #[must_use]
    pub fn irq_pending(&self) -> bool {
        self.irq_pending || self.mapper.irq_pending() || self.apu.irq_pending()
    }

    /// Acknowledge mapper IRQ.
    pub fn acknowledge_mapper_irq(&mut self) {
        self.mapper.irq_acknowledge();
    }

    /// Get the current CPU cycle count.
    #[must_use]
    pub fn cpu_cycles(&self) -> u64 {
        self.cpu_cycles
    }

    /// Increment CPU cycle count.
    pub fn add_cpu_cycles(&mut self, cycles: u8) {
        self.cpu_cycles += u64::from(cycles);
    }

    /// Read controller register.
    fn read_controller(&mut self, port: u8) -> u8 {
        let shift = if port == 0 {
            &mut self.controller1_shift
        } else {
            &mut self.controller2_shift
        };

        // Open bus behavior: bits 5-7 come from last bus value
        let open_bus = self.last_bus_value & 0xE0;

        // Read bit 0 from shift register
        let data = (*shift & 1) | open_bus;
        *shift >>= 1;
        *shift |= 0x80; // Shift in 1s after all buttons read

        data
    }

    /// Write controller strobe.
    fn write_controller_strobe(&mut self, val: u8) {
        let new_strobe = val & 1 != 0;

        // On falling edge (strobe 1->0), latch controller state
        if self.controller_strobe && !new_strobe {
            self.controller1_shift = self.controller1.buttons;
            self.controller2_shift = self.controller2.buttons;
        }

        self.controller_strobe = new_strobe;

        // While strobe is high, continuously reload
        if self.controller_strobe {
            self.controller1_shift = self.controller1.buttons;
            self.controller2_shift = self.controller2.buttons;
        }
    }

    /// Check if DMC stall is active.
    #[must_use]
    pub fn dmc_stall_active(&self) -> bool {
        self.dmc_stall_cycles > 0
    }

    /// Decrement DMC stall counter.
    pub fn decrement_dmc_stall(&mut self) {
        if self.dmc_stall_cycles > 0 {
            self.dmc_stall_cycles -= 1;
        }
    }

    /// Peek at memory without side effects.
    ///
    /// This is useful for debugging/display purposes where we don't want
    /// to trigger PPU register side effects or mapper state changes.
    #[must_use]
    pub fn peek(&self, addr: u16) -> u8 {
        match addr {
            // Internal RAM (mirrored every 2KB)
            0x0000..=0x1FFF => self.ram[(addr & 0x07FF) as usize],

            // PPU registers - return last bus value to avoid side effects
            0x2000..=0x3FFF => self.last_bus_value,

            // APU and I/O registers
            0x4000..=0x4017 => match addr {
                0x4015 => self.apu.peek_status(),
                0x4016 | 0x4017 => self.last_bus_value,
                _ => self.last_bus_value,
            },

            // APU test mode
            0x4018..=0x401F => self.last_bus_value,

            // Cartridge space
            0x4020..=0xFFFF => self.mapper.read_prg(addr),
        }
    }

    /// Capture the bus-owned state that isn't part of the PPU, APU, or mapper
    /// sub-snapshots: RAM, controller latches, and DMA/open-bus bookkeeping.
    #[cfg(feature = "serde")]
    #[must_use]
    pub fn snapshot(&self) -> BusSnapshot {
        BusSnapshot {
            ram: self.ram,
            controller1: self.controller1.buttons,
            controller2: self.controller2.buttons,
            controller1_shift: self.controller1_shift,
            controller2_shift: self.controller2_shift,
            controller_strobe: self.controller_strobe,
            oam_dma_page: self.oam_dma_page,
            cpu_cycles: self.cpu_cycles,
            dmc_stall_cycles: self.dmc_stall_cycles,
            last_bus_value: self.last_bus_value,
            nmi_pending: self.nmi_pending,
            irq_pending: self.irq_pending,
            sample_count: self.sample_count,
            sample_sum: self.sample_sum,
            pal_dot_group: self.pal_dot_group,
        }
    }

    /// Restore bus-owned state previously produced by [`NesBus::snapshot`].
    ///
    /// Leaves the PPU, APU, and mapper untouched; the caller restores those
    /// separately since they are serialized as independent sub-snapshots.
    #[cfg(feature = "serde")]
    pub fn restore(&mut self, snap: &BusSnapshot) {
        self.ram = snap.ram;
        self.controller1 = ControllerState {
            buttons: snap.controller1,
        };
        self.controller2 = ControllerState {
            buttons: snap.controller2,
        };
        self.controller1_shift = snap.controller1_shift;
        self.controller2_shift = snap.controller2_shift;
        self.controller_strobe = snap.controller_strobe;
        self.oam_dma_page = snap.oam_dma_page;
        self.cpu_cycles = snap.cpu_cycles;
        self.dmc_stall_cycles = snap.dmc_stall_cycles;
        self.last_bus_value = snap.last_bus_value;
        self.nmi_pending = snap.nmi_pending;
        self.irq_pending = snap.irq_pending;
        self.sample_count = snap.sample_count;
        self.sample_sum = snap.sample_sum;
        self.pal_dot_group = snap.pal_dot_group;
    }
}

/// Serializable snapshot of [`NesBus`] state outside the PPU, APU, and mapper.
#[cfg(feature = "serde")]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusSnapshot {
    ram: [u8; 2048],
    controller1: u8,
    controller2: u8,
    controller1_shift: u8,
    controller2_shift: u8,
    controller_strobe: bool,
    oam_dma_page: Option<u8>,
    cpu_cycles: u64,
    dmc_stall_cycles: u8,
    last_bus_value: u8,
    nmi_pending: bool,
    irq_pending: bool,
    sample_count: u32,
    sample_sum: f32,
    pal_dot_group: u8,
}

/// CPU bus implementation.
impl Bus for NesBus {
    fn read(&mut self, addr: u16) -> u8 {
        let value = match addr {
            // Internal RAM (mirrored every 2KB)
            0x0000..=0x1FFF => self.ram[(addr & 0x07FF) as usize],

            // PPU registers (mirrored every 8 bytes)
            0x2000..=0x3FFF => {
                let mapper = &*self.mapper;
                self.ppu.read_register(addr, |a| mapper.read_chr(a))
            }

            // APU and I/O registers
            0x4000..=0x4017 => match addr {
                0x4015 => self.apu.read_status(),
                0x4016 => self.read_controller(0),
                0x4017 => self.read_controller(1),
                _ => self.last_bus_value, // Write-only registers
            },

            // APU test mode (normally disabled)
            0x4018..=0x401F => self.last_bus_value,

            // Cartridge space
            0x4020..=0xFFFF => self.mapper.read_prg(addr),
        };

        self.last_bus_value = value;
        value
    }

    fn write(&mut self, addr: u16, val: u8) {
        self.last_bus_value = val;

        match addr {
            // Internal RAM (mirrored every 2KB)
            0x0000..=0x1FFF => {
                self.ram[(addr & 0x07FF) as usize] = val;
            }

            // PPU registers (mirrored every 8 bytes)
            0x2000..=0x3FFF => {
                let mapper = &mut *self.mapper;
                self.ppu
                    .write_register(addr, val, |a, v| mapper.write_chr(a, v));
            }

            // APU and I/O registers
            0x4000..=0x4017 => match addr {
                0x4000..=0x4013 | 0x4015 | 0x4017 => {
                    self.apu.write(addr, val);
                }
                0x4014 => {
                    // OAM DMA
                    self.oam_dma_page = Some(val);
                }
                0x4016 => {
                    self.write_controller_strobe(val);
                }
                _ => {}
            },

            // APU test mode (normally disabled)
            0x4018..=0x401F => {}

            // Cartridge space
            0x4020..=0xFFFF => {
                self.mapper.write_prg(addr, val);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustynes_mappers::{Mirroring, Nrom, Rom, RomHeader};

    #[cfg(not(feature = "std"))]
    use alloc::{boxed::Box, vec, vec::Vec};

    fn create_test_bus() -> NesBus {
        let rom = Rom {
            header: RomHeader {
                mapper_number: 0,
                submapper: 0,
                prg_rom_size: 32768,
                chr_rom_size: 8192,
                prg_ram_size: 0,
                prg_nvram_size: 0,
                chr_ram_size: 0,
                chr_nvram_size: 0,
                nes2_format: false,
                mirroring: Mirroring::Vertical,
                has_battery: false,
                has_trainer: false,
            },
            prg_rom: vec![0; 32768],
            chr_rom: vec![0; 8192],
            trainer: None,
        };
        NesBus::new(Box::new(Nrom::new(&rom)))
    }

    #[test]
    fn test_ram_mirroring() {
        let mut bus = create_test_bus();

        // Write to $0000
        Bus::write(&mut bus, 0x0000, 0x42);
        assert_eq!(Bus::read(&mut bus, 0x0000), 0x42);

        // Should mirror to $0800, $1000, $1800
        assert_eq!(Bus::read(&mut bus, 0x0800), 0x42);
        assert_eq!(Bus::read(&mut bus, 0x1000), 0x42);
        assert_eq!(Bus::read(&mut bus, 0x1800), 0x42);

        // Write to mirrored address
        Bus::write(&mut bus, 0x1234, 0xAB);
        assert_eq!(Bus::read(&mut bus, 0x0234), 0xAB); // $1234 & $07FF = $0234
    }

    #[test]
    fn test_controller_strobe() {
        let mut bus = create_test_bus();

        // Set controller 1 buttons
        bus.controller1.buttons = 0b1010_0101; // A, Select, Up, Right

        // Strobe high then low to latch
        Bus::write(&mut bus, 0x4016, 1);
        Bus::write(&mut bus, 0x4016, 0);

        // Read buttons one at a time (bit 0 of each read)
        assert_eq!(Bus::read(&mut bus, 0x4016) & 1, 1); // A
        assert_eq!(Bus::read(&mut bus, 0x4016) & 1, 0); // B
        assert_eq!(Bus::read(&mut bus, 0x4016) & 1, 1); // Select
        assert_eq!(Bus::read(&mut bus, 0x4016) & 1, 0); // Start
        assert_eq!(Bus::read(&mut bus, 0x4016) & 1, 0); // Up (bit 4)
        assert_eq!(Bus::read(&mut bus, 0x4016) & 1, 1); // Down
        assert_eq!(Bus::read(&mut bus, 0x4016) & 1, 0); // Left
        assert_eq!(Bus::read(&mut bus, 0x4016) & 1, 1); // Right
    }

    #[test]
    fn test_oam_dma() {
        let mut bus = create_test_bus();

        // Fill RAM page 2 ($0200-$02FF) with test data
        for i in 0..256 {
            Bus::write(&mut bus, 0x0200 + i, i as u8);
        }

        // Trigger OAM DMA from page 2
        Bus::write(&mut bus, 0x4014, 0x02);
        assert!(bus.oam_dma_pending());

        // Execute DMA
        let cycles = bus.execute_oam_dma();
        assert!(!bus.oam_dma_pending());
        assert!(cycles == 513 || cycles == 514);
    }

    #[test]
    fn test_open_bus_behavior() {
        let mut bus = create_test_bus();

        // Read from a location to set bus value
        Bus::write(&mut bus, 0x0000, 0xAB);
        let _ = Bus::read(&mut bus, 0x0000);

        // Last bus value should be updated
        assert_eq!(bus.last_bus_value, 0xAB);
    }

    #[test]
    fn test_peek_memory() {
        let mut bus = create_test_bus();

        // Write to RAM
        Bus::write(&mut bus, 0x0100, 0x42);

        // Peek should return the value without side effects
        assert_eq!(bus.peek(0x0100), 0x42);

        // Peek at mirrored address
        assert_eq!(bus.peek(0x0900), 0x42);
    }

    #[test]
    fn test_reset() {
        let mut bus = create_test_bus();
        bus.nmi_pending = true;

        bus.reset();

        assert_eq!(Bus::read(&mut bus, 0x0000), 0);
        assert_eq!(bus.cpu_cycles, 0);
        assert!(!bus.nmi_pending);
    }

    #[test]
    fn test_pal_averages_3_2_dots_per_cycle() {
        let rom = Rom {
            header: RomHeader {
                mapper_number: 0,
                submapper: 0,
                prg_rom_size: 32768,
                chr_rom_size: 8192,
                prg_ram_size: 0,
                prg_nvram_size: 0,
                chr_ram_size: 0,
                chr_nvram_size: 0,
                nes2_format: false,
                mirroring: Mirroring::Vertical,
                has_battery: false,
                has_trainer: false,
            },
            prg_rom: vec![0; 32768],
            chr_rom: vec![0; 8192],
            trainer: None,
        };
        let mut bus = NesBus::with_region(Box::new(Nrom::new(&rom)), Region::Pal);
        assert_eq!(bus.region(), Region::Pal);
        assert_eq!(bus.ppu.scanline(), 0);
        assert_eq!(bus.ppu.dot(), 0);

        for _ in 0..5 {
            bus.step_ppu();
        }

        // Starting from dot 0 with no sprite/rendering side effects, 5 CPU
        // cycles of PAL stepping should have advanced exactly 16 dots.
        assert_eq!(bus.ppu.scanline(), 0);
        assert_eq!(bus.ppu.dot(), 16);
    }
}
