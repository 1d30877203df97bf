//! Mapper 180: `UNROM` variant (Crazy Climber)
//!
//! Identical to `UxROM` except the *first* 16KB bank is fixed and the
//! *switchable* bank sits at $C000-$FFFF instead of $8000-$BFFF. This
//! inversion exists because Crazy Climber's hardware wires the cartridge's
//! two joypad-adjacent controllers through the fixed bank.
//!
//! Memory layout:
//! - Fixed 16KB PRG-ROM bank (first bank) at $8000-$BFFF
//! - Switchable 16KB PRG-ROM bank at $C000-$FFFF
//! - 8KB CHR-RAM (no CHR-ROM)
//! - Mirroring fixed by hardware (from header)

use crate::{Mapper, Mirroring, Rom};

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Mapper 180 implementation.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Mapper180 {
    /// PRG-ROM data.
    prg_rom: Vec<u8>,
    /// CHR-RAM (8KB).
    chr_ram: Vec<u8>,
    /// Number of 16KB PRG banks.
    prg_banks: usize,
    /// Currently selected PRG bank for $C000-$FFFF.
    prg_bank: u8,
    /// Nametable mirroring mode (fixed by hardware).
    mirroring: Mirroring,
}

impl Mapper180 {
    /// Create a new Mapper180 instance from ROM data.
    #[must_use]
    pub fn new(rom: &Rom) -> Self {
        let prg_banks = (rom.prg_rom.len() / 16384).max(1);
        let chr_ram = if rom.chr_rom.is_empty() {
            vec![0u8; 8192]
        } else {
            rom.chr_rom.clone()
        };

        Self {
            prg_rom: rom.prg_rom.clone(),
            chr_ram,
            prg_banks,
            prg_bank: 0,
            mirroring: rom.header.mirroring,
        }
    }
}

impl Mapper for Mapper180 {
    fn read_prg(&self, addr: u16) -> u8 {
        let offset = (addr & 0x3FFF) as usize;
        match addr {
            // First bank is fixed, unlike plain UxROM.
            0x8000..=0xBFFF => self.prg_rom[offset],
            0xC000..=0xFFFF => {
                let bank = (self.prg_bank as usize) % self.prg_banks;
                self.prg_rom[bank * 16384 + offset]
            }
            _ => 0,
        }
    }

    fn write_prg(&mut self, addr: u16, val: u8) {
        if addr >= 0x8000 {
            self.prg_bank = val;
        }
    }

    fn read_chr(&self, addr: u16) -> u8 {
        self.chr_ram[(addr & 0x1FFF) as usize]
    }

    fn write_chr(&mut self, addr: u16, val: u8) {
        self.chr_ram[(addr & 0x1FFF) as usize] = val;
    }

    fn mirroring(&self) -> Mirroring {
        self.mirroring
    }

    fn mapper_number(&self) -> u16 {
        180
    }

    fn mapper_name(&self) -> &'static str {
        "Mapper180"
    }

    fn reset(&mut self) {
        self.prg_bank = 0;
    }

    #[cfg(feature = "serde")]
    fn save_state(&self) -> Vec<u8> {
        bincode::serialize(self).expect("Mapper180 state is always serializable")
    }

    #[cfg(feature = "serde")]
    fn load_state(&mut self, data: &[u8]) -> Result<(), crate::mapper::MapperStateError> {
        *self = bincode::deserialize(data).map_err(|_| crate::mapper::MapperStateError)?;
        Ok(())
    }
}
