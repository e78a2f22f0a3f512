//! The top-level emulator: owns the CPU, PPU, APU and memory bus, and
//! drives them one CPU instruction at a time.

use crate::cpu::Cpu;
use crate::joypad::Button;
use crate::memory_bus::MemoryBus;
use crate::ppu::Ppu;
use std::error::Error;
use std::fmt;

/// Errors that can occur while constructing or feeding a cartridge to an `Emulator`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmulatorError {
    /// The cartridge header (0x0147) names a controller type this crate doesn't implement.
    InvalidCartridgeType(u8),
    /// The cartridge header's ROM size byte (0x0148) is not a recognized code.
    InvalidRomSizeCode(u8),
    /// The cartridge header's RAM size byte (0x0149) is not a recognized code.
    InvalidRamSizeCode(u8),
    /// The ROM is too small to contain a valid 0x150-byte header.
    RomTooSmall(usize),
    /// The ROM is larger than its header's ROM-size byte declares.
    RomTooLarge { actual: usize, expected: usize },
}

impl fmt::Display for EmulatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmulatorError::InvalidCartridgeType(code) => {
                write!(f, "unsupported cartridge type: {:#04X}", code)
            }
            EmulatorError::InvalidRomSizeCode(code) => {
                write!(f, "unrecognized ROM size code: {:#04X}", code)
            }
            EmulatorError::InvalidRamSizeCode(code) => {
                write!(f, "unrecognized RAM size code: {:#04X}", code)
            }
            EmulatorError::RomTooSmall(len) => {
                write!(f, "ROM is too small ({} bytes) to contain a valid header", len)
            }
            EmulatorError::RomTooLarge { actual, expected } => write!(
                f,
                "ROM is larger ({} bytes) than its header declares ({} bytes)",
                actual, expected
            ),
        }
    }
}

impl Error for EmulatorError {}

/// T-cycles in one 59.7275 Hz Game Boy frame (4.194304 MHz / 59.7275 Hz).
pub const CYCLES_PER_FRAME: u32 = 70224;

/// Owns the CPU, PPU, APU and memory bus, and drives them one CPU
/// instruction at a time via `step`.
#[derive(Debug)]
pub struct Emulator {
    cpu: Cpu,
    ppu: Ppu,
    memory_bus: MemoryBus,
}

impl Emulator {
    /// Parses the cartridge header, builds the matching MBC, and resets every
    /// component to its documented post-boot-ROM state. The boot ROM itself is
    /// never executed.
    pub fn new(rom_bytes: &[u8]) -> Result<Self, EmulatorError> {
        let mut memory_bus = MemoryBus::new();
        memory_bus.load_rom(rom_bytes)?;

        let cpu = Cpu::new(true);
        Cpu::initialize_post_boot_io(&mut memory_bus);

        let ppu = Ppu::new();

        Ok(Emulator { cpu, ppu, memory_bus })
    }

    /// Restores battery-backed cartridge RAM from a previous save.
    pub fn load_ram(&mut self, bytes: &[u8]) {
        self.memory_bus.load_ram(bytes);
    }

    /// Returns the cartridge's battery-backed RAM, if it has any.
    pub fn ram(&self) -> Option<&[u8]> {
        self.memory_bus.ram()
    }

    /// Updates a single button's pressed state. This is the entire host-input
    /// surface; no host windowing/keyboard type appears anywhere else in the
    /// public API.
    pub fn set_button(&mut self, button: Button, pressed: bool) {
        self.memory_bus.set_button(button, pressed);
    }

    /// Executes exactly one CPU instruction (including interrupt dispatch and
    /// HALT/STOP idling as a pseudo-instruction), then advances the PPU,
    /// timer, and APU by the same number of T-cycles. Returns the number of
    /// T-cycles consumed, so a host can drive a frame by summing returned
    /// cycles until it reaches [`CYCLES_PER_FRAME`].
    pub fn step(&mut self) -> u32 {
        let cycles = match self.cpu.step(&mut self.memory_bus) {
            Ok(cycles) => cycles as u32,
            Err(error_message) => {
                log::error!("CPU execution halted: {}", error_message);
                4
            }
        };

        self.memory_bus.timer.step(cycles);
        if self.memory_bus.timer.take_interrupt() {
            self.memory_bus
                .request_interrupt(crate::memory_map::TIMER_INTERRUPT_BIT);
        }

        self.ppu.step(cycles, &mut self.memory_bus);
        self.memory_bus.apu.step(cycles);

        cycles
    }

    /// The most recently completed frame buffer (160x144, one grayscale byte
    /// per pixel). A host polling every VBlank always sees a complete frame.
    pub fn frame_buffer(&self) -> &[u8; crate::ppu::GB_WIDTH * crate::ppu::GB_HEIGHT] {
        self.ppu.get_frame_buffer()
    }

    /// Drains stereo audio samples generated since the last call.
    pub fn drain_audio_samples(&mut self) -> Vec<(i16, i16)> {
        self.memory_bus.apu.drain_samples()
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

    #[test]
    fn new_rejects_undersized_rom() {
        let err = Emulator::new(&[0u8; 16]).unwrap_err();
        assert_eq!(err, EmulatorError::RomTooSmall(16));
    }

    #[test]
    fn new_accepts_minimal_rom_only_cartridge() {
        assert!(Emulator::new(&minimal_rom()).is_ok());
    }

    #[test]
    fn step_advances_and_reports_cycles() {
        let mut emu = Emulator::new(&minimal_rom()).unwrap();
        let cycles = emu.step();
        assert!(cycles > 0);
    }
}
