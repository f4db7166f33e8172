use thiserror::Error;

const HEADER_END: usize = 0x0150;
const TITLE_RANGE: std::ops::Range<usize> = 0x0134..0x0144;
const CGB_FLAG: usize = 0x0143;
const RAM_SIZE_CODE: usize = 0x0149;

#[derive(Error, Debug)]
pub enum CartridgeError {
    #[error("ROM image too small for a cartridge header: {len} bytes")]
    RomTooSmall { len: usize },
    #[error("invalid RAM size code in cartridge header: {code:02X}")]
    InvalidRamSize { code: u8 },
}

/// A cartridge mapped at 0x0000-0x7FFF (ROM) and 0xA000-0xBFFF (external
/// RAM). Mapper chips are not modelled; ROM-range writes are dropped.
#[derive(Debug)]
pub struct Cartridge {
    pub rom: Vec<u8>,
    pub ram: Vec<u8>,
    pub cgb: bool,
    pub title: String,
}

impl Cartridge {
    /// Parse a ROM image, taking title, CGB flag and RAM size from the
    /// cartridge header.
    pub fn load(rom: Vec<u8>) -> Result<Self, CartridgeError> {
        if rom.len() < HEADER_END {
            return Err(CartridgeError::RomTooSmall { len: rom.len() });
        }
        let title = rom[TITLE_RANGE]
            .iter()
            .take_while(|&&b| b != 0)
            .filter(|b| b.is_ascii_graphic() || **b == b' ')
            .map(|&b| b as char)
            .collect();
        let cgb = rom[CGB_FLAG] & 0x80 != 0;
        let ram_len = match rom[RAM_SIZE_CODE] {
            0x00 => 0,
            0x01 => 0x800,
            0x02 => 0x2000,
            0x03 => 0x8000,
            0x04 => 0x2_0000,
            0x05 => 0x1_0000,
            code => return Err(CartridgeError::InvalidRamSize { code }),
        };
        Ok(Self {
            rom,
            ram: vec![0; ram_len],
            cgb,
            title,
        })
    }

    /// Build a cartridge directly from a ROM blob and a RAM size, skipping
    /// header validation. Intended for tests.
    pub fn from_bytes_with_ram(rom: Vec<u8>, ram_size: usize) -> Self {
        Self {
            rom,
            ram: vec![0; ram_size],
            cgb: true,
            title: String::new(),
        }
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x7FFF => self.rom.get(addr as usize).copied().unwrap_or(0xFF),
            0xA000..=0xBFFF => self
                .ram
                .get((addr - 0xA000) as usize)
                .copied()
                .unwrap_or(0xFF),
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        match addr {
            0x0000..=0x7FFF => {
                // Mapper command range; no mapper is modelled.
                log::debug!(
                    target: "chroma_core::cartridge",
                    "dropped ROM-range write {addr:04X} <- {val:02X}"
                );
            }
            0xA000..=0xBFFF => {
                let off = (addr - 0xA000) as usize;
                if off < self.ram.len() {
                    self.ram[off] = val;
                }
            }
            _ => {}
        }
    }
}
