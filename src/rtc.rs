/// Stub for the MBC3 real-time-clock registers.
///
/// Real wall-clock timekeeping and persistence are out of scope; the clock is
/// kept permanently halted and every register reads zero except the halt bit,
/// which stays set. This keeps the MBC3 register-address plumbing (and any
/// save file layout that reserves space for RTC state) intact without
/// depending on `std::time` or the host's clock.
#[derive(Clone, Debug, Default)]
pub struct RtcRegisters {
    latched_halt_bit: u8,
}

impl RtcRegisters {
    const HALT_BIT: u8 = 0b0100_0000;

    pub fn new() -> Self {
        RtcRegisters { latched_halt_bit: Self::HALT_BIT }
    }

    /// No-op: the clock never advances.
    pub fn update(&mut self) {}

    /// Reads the value of a selected RTC register (0x08-0x0C).
    pub fn read(&self, reg_select: u8) -> u8 {
        match reg_select {
            0x0C => self.latched_halt_bit,
            0x08..=0x0B => 0,
            _ => 0xFF,
        }
    }

    /// Writes are accepted (so games that probe RTC presence don't see bus errors)
    /// but never change what `read` returns beyond the halt bit.
    pub fn write(&mut self, reg_select: u8, value: u8) {
        if reg_select == 0x0C {
            self.latched_halt_bit = (value & Self::HALT_BIT) | Self::HALT_BIT;
        }
    }
}
