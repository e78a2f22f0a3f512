use crate::EmulatorError;
use crate::apu::Apu;
use crate::joypad::{Button, Joypad};
use crate::mbc::Mbc;
use crate::memory_map::*;
use crate::rtc::RtcRegisters;
use crate::timer::Timer;
use log;
use std::fmt;

/// Represents the Game Boy's memory map: fixed RAM regions, the switchable
/// cartridge window, and I/O register dispatch to the timer/joypad/PPU/APU.
#[derive(Clone)]
pub struct MemoryBus {
    // Core Memory Areas
    rom_bank_0: Box<[u8; ROM_BANK_0_SIZE]>,
    vram: Box<[u8; VRAM_SIZE]>,
    wram_bank_0: Box<[u8; WRAM_BANK_0_SIZE]>,
    wram_bank_n: Box<[u8; WRAM_BANK_N_SIZE]>,
    oam: Box<[u8; OAM_SIZE]>,
    io_registers: Box<[u8; IO_REGISTERS_SIZE]>,
    hram: Box<[u8; HRAM_SIZE]>,
    interrupt_enable: u8,

    // Cartridge Data & State
    full_rom_data: Vec<u8>,
    external_ram: Vec<u8>,
    mbc: Mbc,
    has_ram: bool,
    has_battery: bool,

    rtc: RtcRegisters,
    rtc_latched: RtcRegisters,

    pub joypad: Joypad,
    pub timer: Timer,
    pub apu: Apu,

    num_rom_banks: usize,
    num_ram_banks: usize,
}

impl MemoryBus {
    pub fn new() -> Self {
        let mut io_regs = [0u8; IO_REGISTERS_SIZE];
        io_regs[(SB_ADDR - IO_REGISTERS_START) as usize] = 0x00;
        io_regs[(SC_ADDR - IO_REGISTERS_START) as usize] = 0x7E;
        io_regs[(IF_ADDR - IO_REGISTERS_START) as usize] = 0xE1;
        io_regs[(LCDC_ADDR - IO_REGISTERS_START) as usize] = 0x91;
        io_regs[(STAT_ADDR - IO_REGISTERS_START) as usize] = 0x85;
        io_regs[(SCY_ADDR - IO_REGISTERS_START) as usize] = 0x00;
        io_regs[(SCX_ADDR - IO_REGISTERS_START) as usize] = 0x00;
        io_regs[(LY_ADDR - IO_REGISTERS_START) as usize] = 0x00;
        io_regs[(LYC_ADDR - IO_REGISTERS_START) as usize] = 0x00;
        io_regs[(DMA_ADDR - IO_REGISTERS_START) as usize] = 0xFF;
        io_regs[(BGP_ADDR - IO_REGISTERS_START) as usize] = 0xFC;
        io_regs[(OBP0_ADDR - IO_REGISTERS_START) as usize] = 0xFF;
        io_regs[(OBP1_ADDR - IO_REGISTERS_START) as usize] = 0xFF;
        io_regs[(WY_ADDR - IO_REGISTERS_START) as usize] = 0x00;
        io_regs[(WX_ADDR - IO_REGISTERS_START) as usize] = 0x00;

        let mut bus = MemoryBus {
            rom_bank_0: Box::new([0; ROM_BANK_0_SIZE]),
            vram: Box::new([0; VRAM_SIZE]),
            wram_bank_0: Box::new([0; WRAM_BANK_0_SIZE]),
            wram_bank_n: Box::new([0; WRAM_BANK_N_SIZE]),
            oam: Box::new([0; OAM_SIZE]),
            io_registers: Box::new(io_regs),
            hram: Box::new([0; HRAM_SIZE]),
            interrupt_enable: 0x00,

            full_rom_data: Vec::new(),
            external_ram: Vec::new(),
            mbc: Mbc::NoMbc,
            has_ram: false,
            has_battery: false,

            rtc: RtcRegisters::new(),
            rtc_latched: RtcRegisters::default(),

            joypad: Joypad::new(),
            timer: Timer::new(),
            apu: Apu::new(),

            num_rom_banks: 2,
            num_ram_banks: 0,
        };

        let joyp_val = bus.joypad.read_p1();
        bus.io_registers[(P1_JOYP_ADDR - IO_REGISTERS_START) as usize] = joyp_val;
        bus
    }

    /// Loads ROM data and configures the MBC based on the cartridge header.
    pub fn load_rom(&mut self, rom_data: &[u8]) -> Result<(), EmulatorError> {
        if rom_data.len() < 0x150 {
            return Err(EmulatorError::RomTooSmall(rom_data.len()));
        }

        let cartridge_type_code = rom_data[0x0147];
        let rom_size_code = rom_data[0x0148];
        let ram_size_code = rom_data[0x0149];

        let (mbc, has_ram, has_battery) = Mbc::from_cartridge_type(cartridge_type_code)?;
        self.mbc = mbc;
        self.has_ram = has_ram;
        self.has_battery = has_battery;

        self.num_rom_banks = match rom_size_code {
            0x00..=0x08 => 2usize << rom_size_code,
            0x52 => 72,
            0x53 => 80,
            0x54 => 96,
            _ => return Err(EmulatorError::InvalidRomSizeCode(rom_size_code)),
        };
        let expected_rom_size = self.num_rom_banks * ROM_BANK_N_SIZE;
        if rom_data.len() < expected_rom_size {
            log::warn!(
                "ROM file size ({}) is smaller than expected ({}) based on header.",
                rom_data.len(),
                expected_rom_size
            );
        } else if rom_data.len() > expected_rom_size {
            return Err(EmulatorError::RomTooLarge {
                actual: rom_data.len(),
                expected: expected_rom_size,
            });
        }

        let ram_size = match ram_size_code {
            0x00 => 0,
            0x01 => 2 * 1024,
            0x02 => 8 * 1024,
            0x03 => 32 * 1024,
            0x04 => 128 * 1024,
            0x05 => 64 * 1024,
            _ => return Err(EmulatorError::InvalidRamSizeCode(ram_size_code)),
        };

        self.full_rom_data = rom_data.to_vec();
        if self.full_rom_data.len() >= ROM_BANK_0_SIZE {
            self.rom_bank_0
                .copy_from_slice(&self.full_rom_data[0..ROM_BANK_0_SIZE]);
        } else {
            return Err(EmulatorError::RomTooSmall(self.full_rom_data.len()));
        }

        if self.has_ram && ram_size > 0 {
            self.external_ram = vec![0u8; ram_size];
            self.num_ram_banks = ram_size.max(EXT_RAM_SIZE) / EXT_RAM_SIZE;
        } else {
            self.has_ram = false;
            self.external_ram = Vec::new();
            self.num_ram_banks = 0;
        }

        self.rtc = RtcRegisters::new();
        self.rtc_latched = RtcRegisters::default();

        log::info!(
            "Loaded ROM: {} bytes, cartridge type {:#04X}, {} ROM bank(s), {} RAM bank(s), battery: {}",
            self.full_rom_data.len(),
            cartridge_type_code,
            self.num_rom_banks,
            self.num_ram_banks,
            self.has_battery
        );
        Ok(())
    }

    /// Returns the battery-backed save RAM, if the cartridge has any. This is
    /// either the standard external RAM window or, for MBC2, its built-in
    /// 512-nibble RAM.
    pub fn ram(&self) -> Option<&[u8]> {
        if !self.has_battery {
            return None;
        }
        if let Some(ram) = self.mbc.mbc2_ram() {
            return Some(ram.as_slice());
        }
        if !self.external_ram.is_empty() {
            Some(&self.external_ram)
        } else {
            None
        }
    }

    /// Restores battery-backed save RAM from a previous save.
    pub fn load_ram(&mut self, bytes: &[u8]) {
        if let Some(ram) = self.mbc.mbc2_ram_mut() {
            if ram.len() == bytes.len() {
                ram.copy_from_slice(bytes);
            } else {
                log::warn!(
                    "Save data size ({}) does not match MBC2 RAM size ({}); ignoring.",
                    bytes.len(),
                    ram.len()
                );
            }
            return;
        }
        if self.external_ram.len() == bytes.len() {
            self.external_ram.copy_from_slice(bytes);
        } else {
            log::warn!(
                "Save data size ({}) does not match cartridge RAM size ({}); ignoring.",
                bytes.len(),
                self.external_ram.len()
            );
        }
    }

    /// Sets the corresponding interrupt flag bit (0-4) in the IF register (0xFF0F).
    pub fn request_interrupt(&mut self, bit: u8) {
        if bit < 5 {
            let if_reg_offset = (IF_ADDR - IO_REGISTERS_START) as usize;
            let current_if = self.io_registers[if_reg_offset];
            self.io_registers[if_reg_offset] = current_if | (1 << bit);
        }
    }

    pub fn read_byte(&self, addr: u16) -> u8 {
        match addr {
            ROM_BANK_0_START..=ROM_BANK_0_END => self.rom_bank_0[addr as usize],
            ROM_BANK_N_START..=ROM_BANK_N_END => {
                let effective_rom_bank = self.mbc.rom_bank(self.num_rom_banks);
                let rom_offset =
                    (effective_rom_bank * ROM_BANK_N_SIZE) + (addr - ROM_BANK_N_START) as usize;
                self.full_rom_data
                    .get(rom_offset)
                    .copied()
                    .unwrap_or(0xFF)
            }
            VRAM_START..=VRAM_END => self.vram[(addr - VRAM_START) as usize],
            EXT_RAM_START..=EXT_RAM_END => {
                if !self.mbc.ram_enabled() {
                    return 0xFF;
                }
                if let Some(ram) = self.mbc.mbc2_ram() {
                    // MBC2's built-in RAM is 512 4-bit nibbles, mirrored across the window;
                    // reads return the low nibble with the upper nibble forced high.
                    let offset = (addr - EXT_RAM_START) as usize % 512;
                    return ram[offset] | 0xF0;
                }
                if let Some(reg) = self.mbc.mapped_rtc_register() {
                    return self.rtc_latched.read(reg);
                }
                match self.mbc.ram_bank(self.num_ram_banks) {
                    Some(bank) if self.has_ram && !self.external_ram.is_empty() => {
                        let ram_offset = (bank * EXT_RAM_SIZE) + (addr - EXT_RAM_START) as usize;
                        self.external_ram.get(ram_offset).copied().unwrap_or(0xFF)
                    }
                    _ => 0xFF,
                }
            }
            WRAM_BANK_0_START..=WRAM_BANK_0_END => {
                self.wram_bank_0[(addr - WRAM_BANK_0_START) as usize]
            }
            WRAM_BANK_N_START..=WRAM_BANK_N_END => {
                self.wram_bank_n[(addr - WRAM_BANK_N_START) as usize]
            }
            ECHO_RAM_START..=ECHO_RAM_END => self.read_byte(addr - 0x2000),
            OAM_START..=OAM_END => self.oam[(addr - OAM_START) as usize],
            NOT_USABLE_START..=NOT_USABLE_END => 0x00,
            IO_REGISTERS_START..=IO_REGISTERS_END => {
                let offset = (addr - IO_REGISTERS_START) as usize;
                match addr {
                    P1_JOYP_ADDR => self.joypad.read_p1(),
                    DIV_ADDR => self.timer.read_div(),
                    TIMA_ADDR => self.timer.read_tima(),
                    TMA_ADDR => self.timer.read_tma(),
                    TAC_ADDR => self.timer.read_tac(),
                    STAT_ADDR => self.io_registers[offset] | 0x80,
                    0xFF10..=0xFF26 | 0xFF30..=0xFF3F => self.apu.read_byte(addr),
                    _ => self.io_registers[offset],
                }
            }
            HRAM_START..=HRAM_END => self.hram[(addr - HRAM_START) as usize],
            INTERRUPT_ENABLE_REGISTER => self.interrupt_enable,
        }
    }

    pub fn write_byte(&mut self, addr: u16, value: u8) {
        match addr {
            0x0000..=0x7FFF => {
                if self.mbc.write_register(addr, value) {
                    self.rtc.update();
                    self.rtc_latched = self.rtc.clone();
                }
            }
            VRAM_START..=VRAM_END => {
                self.vram[(addr - VRAM_START) as usize] = value;
            }
            EXT_RAM_START..=EXT_RAM_END => {
                if !self.mbc.ram_enabled() {
                    return;
                }
                if let Some(ram) = self.mbc.mbc2_ram_mut() {
                    let offset = (addr - EXT_RAM_START) as usize % 512;
                    ram[offset] = value & 0x0F;
                    return;
                }
                if let Some(reg) = self.mbc.mapped_rtc_register() {
                    self.rtc.write(reg, value);
                    return;
                }
                if let Some(bank) = self.mbc.ram_bank(self.num_ram_banks) {
                    if self.has_ram && !self.external_ram.is_empty() {
                        let ram_offset = (bank * EXT_RAM_SIZE) + (addr - EXT_RAM_START) as usize;
                        if let Some(slot) = self.external_ram.get_mut(ram_offset) {
                            *slot = value;
                        }
                    }
                }
            }
            WRAM_BANK_0_START..=WRAM_BANK_0_END => {
                self.wram_bank_0[(addr - WRAM_BANK_0_START) as usize] = value;
            }
            WRAM_BANK_N_START..=WRAM_BANK_N_END => {
                self.wram_bank_n[(addr - WRAM_BANK_N_START) as usize] = value;
            }
            ECHO_RAM_START..=ECHO_RAM_END => self.write_byte(addr - 0x2000, value),
            OAM_START..=OAM_END => {
                self.oam[(addr - OAM_START) as usize] = value;
            }
            NOT_USABLE_START..=NOT_USABLE_END => {}
            IO_REGISTERS_START..=IO_REGISTERS_END => {
                let offset = (addr - IO_REGISTERS_START) as usize;
                match addr {
                    P1_JOYP_ADDR => self.joypad.write_p1(value),
                    DIV_ADDR => self.timer.write_div(),
                    TIMA_ADDR => self.timer.write_tima(value),
                    TMA_ADDR => self.timer.write_tma(value),
                    TAC_ADDR => self.timer.write_tac(value),
                    IF_ADDR => {
                        self.io_registers[offset] = (value & 0x1F) | (self.io_registers[offset] & 0xE0);
                    }
                    STAT_ADDR => {
                        self.io_registers[offset] =
                            (value & 0b0111_1000) | (self.io_registers[offset] & 0b1000_0111);
                    }
                    DMA_ADDR => {
                        self.io_registers[offset] = value;
                        self.perform_dma_transfer(value);
                    }
                    0xFF10..=0xFF26 | 0xFF30..=0xFF3F => self.apu.write_byte(addr, value),
                    _ => {
                        self.io_registers[offset] = value;
                    }
                }
            }
            HRAM_START..=HRAM_END => {
                self.hram[(addr - HRAM_START) as usize] = value;
            }
            INTERRUPT_ENABLE_REGISTER => {
                self.interrupt_enable = value & 0x1F;
            }
        }
    }

    /// Performs an OAM DMA transfer. Simplified: the copy happens instantly
    /// rather than stalling the CPU for the ~160 machine cycles real hardware takes.
    fn perform_dma_transfer(&mut self, source_high_byte: u8) {
        let source_start_addr = (source_high_byte as u16) << 8;
        for i in 0..OAM_SIZE {
            self.oam[i] = self.read_byte(source_start_addr + i as u16);
        }
    }

    pub fn read_word(&self, addr: u16) -> u16 {
        let low = self.read_byte(addr) as u16;
        let high = self.read_byte(addr.wrapping_add(1)) as u16;
        (high << 8) | low
    }

    pub fn write_word(&mut self, addr: u16, value: u16) {
        let low = (value & 0xFF) as u8;
        let high = (value >> 8) as u8;
        self.write_byte(addr, low);
        self.write_byte(addr.wrapping_add(1), high);
    }

    /// Updates a button's pressed state and requests a joypad interrupt if appropriate.
    pub fn set_button(&mut self, button: Button, pressed: bool) {
        if self.joypad.set_button(button, pressed) {
            self.request_interrupt(JOYPAD_INTERRUPT_BIT);
        }
        let p1_val = self.joypad.read_p1();
        self.io_registers[(P1_JOYP_ADDR - IO_REGISTERS_START) as usize] = p1_val;
    }

    pub fn get_io_reg(&self, addr: u16) -> u8 {
        if (IO_REGISTERS_START..=IO_REGISTERS_END).contains(&addr) {
            self.io_registers[(addr - IO_REGISTERS_START) as usize]
        } else if addr == INTERRUPT_ENABLE_REGISTER {
            self.interrupt_enable
        } else {
            0xFF
        }
    }

    /// Direct register write bypassing address-dispatch side effects (used by
    /// components, like the PPU, that own a register's semantics themselves).
    pub fn set_io_reg_direct(&mut self, addr: u16, value: u8) {
        if (IO_REGISTERS_START..=IO_REGISTERS_END).contains(&addr) {
            self.io_registers[(addr - IO_REGISTERS_START) as usize] = value;
        } else if addr == INTERRUPT_ENABLE_REGISTER {
            self.interrupt_enable = value & 0x1F;
        }
    }

    pub fn get_vram(&self) -> &[u8; VRAM_SIZE] {
        &self.vram
    }
    pub fn get_oam(&self) -> &[u8; OAM_SIZE] {
        &self.oam
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryBus")
            .field("mbc", &self.mbc)
            .field("rom_banks", &self.num_rom_banks)
            .field("ram_banks", &self.num_ram_banks)
            .field("has_ram", &self.has_ram)
            .field("has_battery", &self.has_battery)
            .field("IE", &format_args!("{:#04X}", self.interrupt_enable))
            .field("IF", &format_args!("{:#04X}", self.get_io_reg(IF_ADDR)))
            .field("joypad", &self.joypad)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_rom() -> Vec<u8> {
        let mut rom = vec![0u8; 0x8000];
        rom[0x0147] = 0x00; // ROM only
        rom[0x0148] = 0x00; // 32 KiB, 2 banks
        rom[0x0149] = 0x00; // no RAM
        rom
    }

    fn bus_with_minimal_rom() -> MemoryBus {
        let mut bus = MemoryBus::new();
        bus.load_rom(&minimal_rom()).unwrap();
        bus
    }

    #[test]
    fn unusable_region_reads_zero() {
        let bus = bus_with_minimal_rom();
        assert_eq!(bus.read_byte(NOT_USABLE_START), 0x00);
        assert_eq!(bus.read_byte(NOT_USABLE_END), 0x00);
    }

    #[test]
    fn dma_copies_from_echo_ram_source() {
        let mut bus = bus_with_minimal_rom();
        // Write a known pattern into WRAM bank 0, then DMA from its echo alias.
        bus.write_byte(WRAM_BANK_0_START, 0x42);
        bus.write_byte(DMA_ADDR, (ECHO_RAM_START >> 8) as u8);
        assert_eq!(bus.get_oam()[0], 0x42);
    }

    #[test]
    fn dma_copies_from_restricted_high_page_without_skipping() {
        // The source page (0xFF00) used to be treated as "restricted" and the
        // whole copy silently skipped; it must go through like any other page.
        let mut bus = bus_with_minimal_rom();
        bus.write_byte(HRAM_START, 0x7A);
        bus.write_byte(DMA_ADDR, (HRAM_START >> 8) as u8);
        assert_eq!(bus.get_oam()[0], 0x7A);
    }
}
