//! Peripheral devices and the controller that addresses them by id

pub mod devices;

use std::fmt;

use tracing::debug;

use crate::bitvector::{Word, WORD_WIDTH};
use crate::error::{DeviceError, SimulatorResult};
pub use devices::{CardReader, ConsoleKeyboard, ConsolePrinter};

/// Device ids on the I/O bus
pub const KEYBOARD_ID: u64 = 0;
pub const PRINTER_ID: u64 = 1;
pub const CARD_READER_ID: u64 = 2;

/// Status reported by CHK
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceStatus {
    Done = 0,
    Ready = 1,
    Busy = 2,
}

impl DeviceStatus {
    pub fn to_word(self) -> Word {
        Word::from_bits(WORD_WIDTH, self as u64)
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceStatus::Done => "DONE",
            DeviceStatus::Ready => "READY",
            DeviceStatus::Busy => "BUSY",
        };
        f.write_str(name)
    }
}

/// Device contract
pub trait IoDevice {
    fn input(&mut self) -> SimulatorResult<Word>;
    fn output(&mut self, value: Word) -> SimulatorResult<()>;
    fn check_status(&self) -> DeviceStatus;
    fn name(&self) -> &'static str;
}

/// I/O controller
///
/// DEVID   Device
///   0     Console Keyboard
///   1     Console Printer
///   2     Card Reader
#[derive(Debug, Default)]
pub struct InputOutputController {
    pub keyboard: ConsoleKeyboard,
    pub printer: ConsolePrinter,
    pub card_reader: Option<CardReader>,
}

impl InputOutputController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach_card_reader(&mut self, reader: CardReader) {
        self.card_reader = Some(reader);
    }

    fn device(&mut self, id: u64) -> SimulatorResult<&mut dyn IoDevice> {
        let device: &mut dyn IoDevice = match id {
            KEYBOARD_ID => &mut self.keyboard,
            PRINTER_ID => &mut self.printer,
            CARD_READER_ID => match self.card_reader.as_mut() {
                Some(reader) => reader,
                None => return Err(DeviceError::NoSuchDevice(id).into()),
            },
            _ => return Err(DeviceError::NoSuchDevice(id).into()),
        };
        Ok(device)
    }

    pub fn input(&mut self, id: u64) -> SimulatorResult<Word> {
        let device = self.device(id)?;
        let value = device.input()?;
        debug!(device = device.name(), %value, "device input");
        Ok(value)
    }

    pub fn output(&mut self, id: u64, value: Word) -> SimulatorResult<()> {
        let device = self.device(id)?;
        debug!(device = device.name(), %value, "device output");
        device.output(value)
    }

    pub fn check_status(&mut self, id: u64) -> SimulatorResult<DeviceStatus> {
        Ok(self.device(id)?.check_status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SimulatorError;

    #[test]
    fn test_routes_by_id() {
        let mut io = InputOutputController::new();
        io.keyboard.press(b'a');

        assert_eq!(io.check_status(KEYBOARD_ID).unwrap(), DeviceStatus::Ready);
        assert_eq!(io.input(KEYBOARD_ID).unwrap().unsigned(), 97);
        assert_eq!(io.check_status(KEYBOARD_ID).unwrap(), DeviceStatus::Busy);

        io.output(PRINTER_ID, Word::word(72).unwrap()).unwrap();
        assert_eq!(io.printer.text(), "H");
    }

    #[test]
    fn test_missing_device() {
        let mut io = InputOutputController::new();
        for id in [CARD_READER_ID, 3, 31] {
            let status = io.check_status(id);
            assert!(matches!(
                status,
                Err(SimulatorError::Device(DeviceError::NoSuchDevice(n)))
                    if n == id
            ));
        }
    }

    #[test]
    fn test_status_words() {
        assert_eq!(DeviceStatus::Done.to_word().unsigned(), 0);
        assert_eq!(DeviceStatus::Ready.to_word().unsigned(), 1);
        assert_eq!(DeviceStatus::Busy.to_word().unsigned(), 2);
        assert_eq!(DeviceStatus::Busy.to_string(), "BUSY");
    }
}
