//! Game Boy Color memory bus and PPU state core.
//!
//! This crate contains the memory-mapped half of a CGB emulator: the bus
//! dispatcher, WRAM/HRAM, the GPU memory subsystem (VRAM banks, OAM, LCD
//! registers, CGB palette RAM) and the LCD mode machine. The CPU core,
//! pixel rasteriser and host loop live in separate crates and drive this
//! one via the [`mmu`] and [`ppu`] surfaces.

/// Audio register file (NR10-NR52) and wave pattern RAM.
pub mod apu;

/// ROM/RAM cartridge handling.
pub mod cartridge;

/// Joypad register (JOYP).
pub mod input;

/// Interrupt sources and their IF/IE bit positions.
pub mod interrupts;

/// Memory map and hardware plumbing.
pub mod mmu;

/// Pixel Processing Unit (PPU) memory and mode machine.
pub mod ppu;

/// Serial transfer registers (SB/SC).
pub mod serial;

/// Divider/timer registers.
pub mod timer;
