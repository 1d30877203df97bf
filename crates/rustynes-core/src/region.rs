//! Console timing region (NTSC/PAL/Dendy).
//!
//! The distilled spec treats the region standard as a bundle of read-only
//! constants chosen once at cartridge insert and threaded into every
//! component that needs one (PPU scanline geometry, APU rate tables, the
//! system clock's PPU-dots-per-CPU-cycle ratio). This module is that single
//! source, detected from the raw iNES/NES 2.0 header bytes rather than
//! threaded through [`rustynes_mappers::RomHeader`], since no mapper
//! implementation needs it.

use rustynes_apu::System as ApuSystem;

/// Console timing region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Region {
    /// 60 Hz, 262 scanlines/frame, odd-frame pre-render dot skip.
    #[default]
    Ntsc,
    /// 50 Hz, 312 scanlines/frame, no odd-frame dot skip, 3.2 PPU dots/CPU cycle.
    Pal,
    /// Famiclone: 312 scanlines/frame like PAL (no odd-frame dot skip), but
    /// NTSC-rate CPU/PPU/APU tables and a much later NMI scanline (290) to
    /// pad the post-render area out to PAL's frame length.
    Dendy,
}

impl Region {
    /// Detect the region encoded in a 16-byte (or longer) iNES/NES 2.0 header.
    ///
    /// iNES 1.0 only distinguishes NTSC/PAL (byte 9, bit 0). NES 2.0 adds
    /// Dendy via byte 12, bits 0-1 (0=NTSC, 1=PAL, 2=multi-region, 3=Dendy);
    /// a multi-region cartridge is treated as NTSC. Headers shorter than 13
    /// bytes (should not happen past [`rustynes_mappers::RomHeader::parse`]'s
    /// own length check) default to NTSC.
    #[must_use]
    pub fn from_header(data: &[u8]) -> Self {
        if data.len() < 13 {
            return Self::Ntsc;
        }
        let nes2_format = (data[7] & 0x0C) == 0x08;
        if nes2_format {
            match data[12] & 0x03 {
                1 => Self::Pal,
                3 => Self::Dendy,
                _ => Self::Ntsc,
            }
        } else if data[9] & 0x01 != 0 {
            Self::Pal
        } else {
            Self::Ntsc
        }
    }

    /// Scanlines per frame and whether the pre-render scanline is
    /// shortened by one dot on odd frames with rendering enabled.
    #[must_use]
    pub fn ppu_geometry(self) -> (u16, bool) {
        match self {
            Self::Ntsc => (262, true),
            Self::Pal | Self::Dendy => (312, false),
        }
    }

    /// The first VBlank (NMI) scanline: 241 on NTSC, 240 on PAL, 290 on
    /// Dendy.
    #[must_use]
    pub fn nmi_scanline(self) -> u16 {
        match self {
            Self::Ntsc => 241,
            Self::Pal => 240,
            Self::Dendy => 290,
        }
    }

    /// Number of visible (rendered) scanlines, starting at 0: 240 on NTSC,
    /// 239 on PAL/Dendy.
    #[must_use]
    pub fn visible_scanlines(self) -> u16 {
        match self {
            Self::Ntsc => 240,
            Self::Pal | Self::Dendy => 239,
        }
    }

    /// The APU rate-table selector for this region.
    #[must_use]
    pub fn apu_system(self) -> ApuSystem {
        match self {
            Self::Ntsc => ApuSystem::NTSC,
            Self::Pal => ApuSystem::PAL,
            Self::Dendy => ApuSystem::Dendy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(byte9: u8, nes2: bool, byte12: u8) -> [u8; 16] {
        let mut h = [0u8; 16];
        h[0..4].copy_from_slice(&[0x4E, 0x45, 0x53, 0x1A]);
        h[9] = byte9;
        if nes2 {
            h[7] |= 0x08;
        }
        h[12] = byte12;
        h
    }

    #[test]
    fn ines_defaults_to_ntsc() {
        assert_eq!(Region::from_header(&header(0, false, 0)), Region::Ntsc);
    }

    #[test]
    fn ines_pal_flag() {
        assert_eq!(Region::from_header(&header(1, false, 0)), Region::Pal);
    }

    #[test]
    fn nes2_dendy() {
        assert_eq!(Region::from_header(&header(0, true, 0x03)), Region::Dendy);
    }

    #[test]
    fn nes2_multi_region_is_ntsc() {
        assert_eq!(Region::from_header(&header(0, true, 0x02)), Region::Ntsc);
    }

    #[test]
    fn too_short_defaults_to_ntsc() {
        assert_eq!(Region::from_header(&[0x4E, 0x45, 0x53, 0x1A]), Region::Ntsc);
    }

    #[test]
    fn ppu_geometry_matches_hardware() {
        assert_eq!(Region::Ntsc.ppu_geometry(), (262, true));
        assert_eq!(Region::Pal.ppu_geometry(), (312, false));
        assert_eq!(Region::Dendy.ppu_geometry(), (312, false));
    }

    #[test]
    fn nmi_scanline_matches_hardware() {
        assert_eq!(Region::Ntsc.nmi_scanline(), 241);
        assert_eq!(Region::Pal.nmi_scanline(), 240);
        assert_eq!(Region::Dendy.nmi_scanline(), 290);
    }

    #[test]
    fn visible_scanlines_matches_hardware() {
        assert_eq!(Region::Ntsc.visible_scanlines(), 240);
        assert_eq!(Region::Pal.visible_scanlines(), 239);
        assert_eq!(Region::Dendy.visible_scanlines(), 239);
    }
}
