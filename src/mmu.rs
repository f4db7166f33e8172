use crate::{
    apu::Apu,
    cartridge::Cartridge,
    input::Input,
    interrupts::Interrupt,
    ppu::{Mode, Ppu, STAT_SOURCE_HBLANK, STAT_SOURCE_LYC, STAT_SOURCE_OAM, STAT_SOURCE_VBLANK},
    serial::Serial,
    timer::Timer,
};

const WRAM_BANK_SIZE: usize = 0x1000;
const LOG_TARGET: &str = "chroma_core::mmu";

// OAM DMA copies one byte per 4 dots, starting after a short delay.
const OAM_DMA_START_DELAY: u16 = 8;
const OAM_DMA_CYCLES: u16 = 640;

/// Latches and progress of the CGB VRAM DMA channel (FF51-FF55).
///
/// A general-purpose transfer runs to completion inside the FF55 write
/// that starts it, so the only state that survives between bus accesses
/// is an armed HBlank transfer draining one block at a time.
#[derive(Debug)]
struct VramDma {
    /// Source pointer; its low nibble is forced to zero.
    src: u16,
    /// VRAM destination, kept 16-byte aligned between blocks.
    dst: u16,
    /// Blocks still owed to an armed HBlank transfer.
    blocks: u8,
    /// Set while an HBlank transfer has blocks outstanding.
    hblank_armed: bool,
    /// Set when the last transfer ended by abort rather than completion.
    aborted: bool,
}

pub struct Mmu {
    pub wram: [[u8; WRAM_BANK_SIZE]; 8],
    pub wram_bank: usize,
    pub hram: [u8; 0x7F],
    pub cart: Option<Cartridge>,
    pub if_reg: u8,
    pub ie_reg: u8,
    pub ppu: Ppu,
    pub apu: Apu,
    pub timer: Timer,
    pub serial: Serial,
    pub input: Input,
    vram_dma: VramDma,
    dma_cycles: u16,
    dma_source: u16,
    pending_dma: Option<u16>,
    pending_delay: u16,
}

impl Mmu {
    pub fn new() -> Self {
        Self {
            wram: [[0; WRAM_BANK_SIZE]; 8],
            wram_bank: 1,
            hram: [0; 0x7F],
            cart: None,
            if_reg: 0,
            ie_reg: 0,
            ppu: Ppu::new(),
            apu: Apu::new(),
            timer: Timer::new(),
            serial: Serial::new(),
            input: Input::new(),
            vram_dma: VramDma {
                src: 0,
                dst: Self::align_vram_dma_dest(0),
                blocks: 0,
                hblank_armed: false,
                aborted: false,
            },
            dma_cycles: 0,
            dma_source: 0,
            pending_dma: None,
            pending_delay: 0,
        }
    }

    pub fn load_cart(&mut self, cart: Cartridge) {
        self.cart = Some(cart);
    }

    pub fn read_byte(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x7FFF | 0xA000..=0xBFFF => {
                self.cart.as_ref().map(|c| c.read(addr)).unwrap_or(0xFF)
            }
            0x8000..=0x9FFF => self.ppu.read_vram(addr),
            0xC000..=0xDFFF => self.wram_read(addr),
            // Echo RAM mirrors 0xC000-0xDDFF.
            0xE000..=0xFDFF => self.wram_read(addr - 0x2000),
            0xFE00..=0xFE9F => self.ppu.read_oam(addr),
            0xFF00 => self.input.read(),
            0xFF01 | 0xFF02 => self.serial.read(addr),
            0xFF04..=0xFF07 => self.timer.read(addr),
            0xFF0F => self.if_reg,
            0xFF10..=0xFF26 | 0xFF30..=0xFF3F => self.apu.read_reg(addr),
            0xFF40..=0xFF45 | 0xFF47..=0xFF4B | 0xFF4F | 0xFF68..=0xFF6B => {
                self.ppu.read_reg(addr)
            }
            0xFF46 => self.ppu.dma,
            0xFF51..=0xFF55 => self.read_vram_dma(addr),
            0xFF70 => self.wram_bank as u8,
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize],
            0xFFFF => self.ie_reg,
            _ => {
                log::debug!(target: LOG_TARGET, "unmapped read at {addr:04X}");
                0xFF
            }
        }
    }

    pub fn write_byte(&mut self, addr: u16, val: u8) {
        let gpu = Self::is_gpu_addr(addr);
        let lyc_before = self.ppu.lyc_flag();

        match addr {
            0x0000..=0x7FFF | 0xA000..=0xBFFF => {
                if let Some(cart) = self.cart.as_mut() {
                    cart.write(addr, val);
                }
            }
            0x8000..=0x9FFF => self.ppu.write_vram(addr, val),
            0xC000..=0xDFFF => self.wram_write(addr, val),
            0xE000..=0xFDFF => self.wram_write(addr - 0x2000, val),
            0xFE00..=0xFE9F => self.ppu.write_oam(addr, val),
            0xFF00 => self.input.write(val),
            0xFF01 | 0xFF02 => self.serial.write(addr, val),
            0xFF04..=0xFF07 => self.timer.write(addr, val),
            0xFF0F => self.if_reg = val & 0x1F,
            0xFF10..=0xFF26 | 0xFF30..=0xFF3F => self.apu.write_reg(addr, val),
            0xFF40 => {
                let was_on = self.ppu.lcd_enabled();
                self.ppu.write_reg(addr, val);
                if was_on && !self.ppu.lcd_enabled() {
                    self.flush_armed_vram_dma();
                }
            }
            0xFF41..=0xFF45 | 0xFF47..=0xFF4B | 0xFF4F | 0xFF68..=0xFF6B => {
                self.ppu.write_reg(addr, val)
            }
            0xFF46 => {
                self.ppu.dma = val;
                self.pending_dma = Some(u16::from(val) << 8);
                self.pending_delay = OAM_DMA_START_DELAY;
            }
            0xFF51..=0xFF55 => self.write_vram_dma(addr, val),
            0xFF70 => {
                let bank = (val & 0x07) as usize;
                self.wram_bank = if bank == 0 { 1 } else { bank };
            }
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize] = val,
            0xFFFF => self.ie_reg = val,
            _ => {
                log::debug!(target: LOG_TARGET, "dropped unmapped write {addr:04X} <- {val:02X}");
            }
        }

        // Any write landing in GPU memory re-evaluates LY==LYC; a rising
        // edge with the LYC source enabled raises the LCD request.
        if gpu {
            self.ppu.cmp_lyc();
            if !lyc_before && self.ppu.lyc_flag() && self.ppu.stat_source(STAT_SOURCE_LYC) {
                self.request(Interrupt::LcdStat);
            }
        }
    }

    /// Read a 16-bit word, low byte first (little-endian).
    pub fn read_word(&self, addr: u16) -> u16 {
        let lo = self.read_byte(addr);
        let hi = self.read_byte(addr.wrapping_add(1));
        u16::from_le_bytes([lo, hi])
    }

    /// Write a 16-bit word, low byte first. Side effects of the low-byte
    /// write are visible to the high-byte write.
    pub fn write_word(&mut self, addr: u16, val: u16) {
        let [lo, hi] = val.to_le_bytes();
        self.write_byte(addr, lo);
        self.write_byte(addr.wrapping_add(1), hi);
    }

    fn is_gpu_addr(addr: u16) -> bool {
        matches!(
            addr,
            0x8000..=0x9FFF
                | 0xFE00..=0xFE9F
                | 0xFF40..=0xFF45
                | 0xFF47..=0xFF4B
                | 0xFF4F
                | 0xFF68..=0xFF6B
        )
    }

    fn wram_read(&self, addr: u16) -> u8 {
        match addr {
            0xC000..=0xCFFF => self.wram[0][(addr - 0xC000) as usize],
            _ => self.wram[self.wram_bank][(addr - 0xD000) as usize],
        }
    }

    fn wram_write(&mut self, addr: u16, val: u8) {
        match addr {
            0xC000..=0xCFFF => self.wram[0][(addr - 0xC000) as usize] = val,
            _ => self.wram[self.wram_bank][(addr - 0xD000) as usize] = val,
        }
    }

    // ---- Interrupt requests ----

    /// Raise an interrupt request. Requests are gated on IE: a source
    /// whose enable bit is clear never reaches IF.
    pub fn request(&mut self, int: Interrupt) {
        if self.ie_reg & int.mask() != 0 {
            self.if_reg |= int.mask();
        }
    }

    pub fn interrupts_pending(&self) -> u8 {
        self.ie_reg & self.if_reg & 0x1F
    }

    // ---- Mode driving ----

    /// Drive the GPU into `mode`, projecting the code into STAT and
    /// raising the mode-entry interrupt requests. Entering HBlank also
    /// hands an armed VRAM DMA its slice for the line.
    pub fn change_mode(&mut self, mode: Mode) {
        self.ppu.change_mode(mode);
        match mode {
            Mode::HBlank { .. } => {
                if self.ppu.stat_source(STAT_SOURCE_HBLANK) {
                    self.request(Interrupt::LcdStat);
                }
                self.hblank_vram_dma();
            }
            Mode::VBlank { .. } => {
                self.request(Interrupt::VBlank);
                if self.ppu.stat_source(STAT_SOURCE_VBLANK) {
                    self.request(Interrupt::LcdStat);
                }
            }
            Mode::OamScan { .. } => {
                if self.ppu.stat_source(STAT_SOURCE_OAM) {
                    self.request(Interrupt::LcdStat);
                }
            }
            Mode::Drawing { .. } => {}
        }
    }

    /// Replace the mode tag without STAT or interrupt side effects.
    pub fn update_mode(&mut self, mode: Mode) {
        self.ppu.update_mode(mode);
    }

    // ---- OAM DMA engine ----

    /// Advance the OAM DMA transfer by `cycles` dots if one is active.
    pub fn oam_dma_step(&mut self, cycles: u16) {
        for _ in 0..cycles {
            if self.pending_delay > 0 {
                self.pending_delay -= 1;
                if self.pending_delay == 0 {
                    if let Some(src) = self.pending_dma.take() {
                        self.dma_source = src;
                        self.dma_cycles = OAM_DMA_CYCLES;
                    }
                }
            }

            if self.dma_cycles == 0 {
                continue;
            }

            let elapsed = OAM_DMA_CYCLES - self.dma_cycles;
            if elapsed % 4 == 0 {
                let idx = elapsed / 4;
                if idx < 0xA0 {
                    let byte = self.read_byte(self.dma_source.wrapping_add(idx));
                    self.ppu.oam[idx as usize] = byte;
                }
            }
            self.dma_cycles -= 1;
        }
    }

    /// Return true if an OAM DMA transfer is armed or in progress.
    pub fn oam_dma_active(&self) -> bool {
        self.dma_cycles > 0 || self.pending_delay > 0
    }

    // ---- VRAM DMA engine ----

    /// Clamp a destination latch to the writable window: 16-byte aligned,
    /// inside VRAM.
    #[inline]
    fn align_vram_dma_dest(addr: u16) -> u16 {
        0x8000 | (addr & 0x1FF0)
    }

    /// Step the destination one byte without leaving VRAM.
    #[inline]
    fn advance_vram_dma_dest(addr: u16) -> u16 {
        0x8000 | (addr.wrapping_add(1) & 0x1FFF)
    }

    fn read_vram_dma(&self, addr: u16) -> u8 {
        match addr {
            0xFF51 => (self.vram_dma.src >> 8) as u8,
            0xFF52 => (self.vram_dma.src & 0x00F0) as u8,
            0xFF53 => ((self.vram_dma.dst & 0x1F00) >> 8) as u8,
            0xFF54 => (self.vram_dma.dst & 0x00F0) as u8,
            _ => {
                if self.vram_dma.hblank_armed {
                    // Armed implies at least one block outstanding; the
                    // status byte counts the blocks left after this line.
                    (self.vram_dma.blocks - 1) & 0x7F
                } else if self.vram_dma.aborted {
                    0x80
                } else {
                    0xFF
                }
            }
        }
    }

    fn write_vram_dma(&mut self, addr: u16, val: u8) {
        // The four pointer latches are frozen while blocks are owed.
        let armed = self.vram_dma.hblank_armed;
        match addr {
            0xFF51 => {
                if !armed {
                    self.vram_dma.src = (u16::from(val) << 8) | (self.vram_dma.src & 0x00FF);
                }
            }
            0xFF52 => {
                if !armed {
                    self.vram_dma.src = (self.vram_dma.src & 0xFF00) | u16::from(val & 0xF0);
                }
            }
            0xFF53 => {
                if !armed {
                    let raw = (u16::from(val & 0x1F) << 8) | (self.vram_dma.dst & 0x00F0);
                    self.vram_dma.dst = Self::align_vram_dma_dest(raw);
                }
            }
            0xFF54 => {
                if !armed {
                    let raw = (self.vram_dma.dst & 0x1F00) | u16::from(val & 0xF0);
                    self.vram_dma.dst = Self::align_vram_dma_dest(raw);
                }
            }
            _ => {
                let blocks = (val & 0x7F) + 1;
                if armed && val & 0x80 == 0 {
                    // Abort; the status byte answers 0x80 from here on.
                    self.vram_dma.hblank_armed = false;
                    self.vram_dma.blocks = 0;
                    self.vram_dma.aborted = true;
                } else if val & 0x80 == 0 {
                    self.run_general_dma(blocks);
                } else {
                    self.vram_dma.blocks = blocks;
                    self.vram_dma.hblank_armed = true;
                    self.vram_dma.aborted = false;
                    // With the LCD off there are no HBlanks to wait for;
                    // inside one, this line's slice is already due.
                    if !self.ppu.lcd_enabled() || matches!(self.ppu.mode(), Mode::HBlank { .. }) {
                        self.step_hblank_dma();
                    }
                }
            }
        }
    }

    /// Copy one 16-byte burst from the source pointer into VRAM, leaving
    /// the destination aligned for the next block.
    fn copy_vram_dma_block(&mut self) {
        for _ in 0..0x10 {
            let byte = self.read_byte(self.vram_dma.src);
            self.ppu.write_vram(self.vram_dma.dst, byte);
            self.vram_dma.src = self.vram_dma.src.wrapping_add(1);
            self.vram_dma.dst = Self::advance_vram_dma_dest(self.vram_dma.dst);
        }
        self.vram_dma.dst = Self::align_vram_dma_dest(self.vram_dma.dst);
    }

    /// Run a general-purpose transfer to completion on the spot.
    fn run_general_dma(&mut self, blocks: u8) {
        for _ in 0..blocks {
            self.copy_vram_dma_block();
        }
        self.vram_dma.blocks = 0;
        self.vram_dma.hblank_armed = false;
        self.vram_dma.aborted = false;
    }

    /// Deliver this line's block of an armed transfer, retiring the
    /// transfer when the last block lands.
    fn step_hblank_dma(&mut self) {
        self.copy_vram_dma_block();
        self.vram_dma.blocks = self.vram_dma.blocks.saturating_sub(1);
        if self.vram_dma.blocks == 0 {
            self.vram_dma.hblank_armed = false;
            self.vram_dma.aborted = false;
        }
    }

    /// HBlank-entry hook. No-op unless an HBlank transfer is armed.
    pub fn hblank_vram_dma(&mut self) {
        if self.vram_dma.hblank_armed {
            self.step_hblank_dma();
        }
    }

    /// A disabled LCD produces no further HBlanks, so anything an armed
    /// transfer still owes is delivered immediately.
    fn flush_armed_vram_dma(&mut self) {
        while self.vram_dma.hblank_armed {
            self.step_hblank_dma();
        }
    }
}

impl Default for Mmu {
    fn default() -> Self {
        Self::new()
    }
}
