//! Card reader, console keyboard and console printer

use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use super::{DeviceStatus, IoDevice};
use crate::bitvector::{Word, WORD_WIDTH};
use crate::error::{DeviceError, SimulatorResult};

/// Reads one 20-bit word per card. Only the first 20 characters of a card
/// are significant; anything after them is a comment.
#[derive(Clone, Debug, Default)]
pub struct CardReader {
    cards: VecDeque<Word>,
}

impl CardReader {
    pub fn from_file(path: impl AsRef<Path>) -> SimulatorResult<Self> {
        Self::from_text(&fs::read_to_string(path)?)
    }

    /// Parses a deck, one card per non-blank line
    pub fn from_text(text: &str) -> SimulatorResult<Self> {
        let mut cards = VecDeque::new();
        for (number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let digits: String =
                line.chars().take(WORD_WIDTH as usize).collect();
            if digits.len() < WORD_WIDTH as usize {
                return Err(DeviceError::InvalidCard {
                    line: number + 1,
                    reason: format!(
                        "expected {WORD_WIDTH} binary digits, found '{digits}'"
                    ),
                }
                .into());
            }
            let word = Word::from_binary_string(&digits).map_err(|e| {
                DeviceError::InvalidCard {
                    line: number + 1,
                    reason: e.to_string(),
                }
            })?;
            cards.push_back(word);
        }
        Ok(Self { cards })
    }

    pub fn from_words(words: impl IntoIterator<Item = Word>) -> Self {
        Self {
            cards: words.into_iter().map(|w| w.resize(WORD_WIDTH)).collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.cards.len()
    }
}

impl IoDevice for CardReader {
    fn input(&mut self) -> SimulatorResult<Word> {
        self.cards
            .pop_front()
            .ok_or_else(|| DeviceError::Starved(self.name()).into())
    }

    fn output(&mut self, _value: Word) -> SimulatorResult<()> {
        Err(DeviceError::Unsupported {
            device: self.name(),
            operation: "output",
        }
        .into())
    }

    fn check_status(&self) -> DeviceStatus {
        if self.cards.is_empty() {
            DeviceStatus::Done
        } else {
            DeviceStatus::Ready
        }
    }

    fn name(&self) -> &'static str {
        "card reader"
    }
}

/// Key presses waiting to be read
#[derive(Clone, Debug, Default)]
pub struct ConsoleKeyboard {
    buffer: VecDeque<u8>,
}

impl ConsoleKeyboard {
    pub fn press(&mut self, key: u8) {
        self.buffer.push_back(key);
    }

    pub fn type_text(&mut self, text: &str) {
        self.buffer.extend(text.bytes());
    }
}

impl IoDevice for ConsoleKeyboard {
    fn input(&mut self) -> SimulatorResult<Word> {
        let key = self
            .buffer
            .pop_front()
            .ok_or(DeviceError::Starved("console keyboard"))?;
        Ok(Word::from_bits(WORD_WIDTH, key as u64))
    }

    fn output(&mut self, _value: Word) -> SimulatorResult<()> {
        Err(DeviceError::Unsupported {
            device: self.name(),
            operation: "output",
        }
        .into())
    }

    fn check_status(&self) -> DeviceStatus {
        if self.buffer.is_empty() {
            DeviceStatus::Busy
        } else {
            DeviceStatus::Ready
        }
    }

    fn name(&self) -> &'static str {
        "console keyboard"
    }
}

/// Collects printed characters for the host to display
#[derive(Clone, Debug, Default)]
pub struct ConsolePrinter {
    text: String,
}

impl ConsolePrinter {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.text)
    }
}

impl IoDevice for ConsolePrinter {
    fn input(&mut self) -> SimulatorResult<Word> {
        Err(DeviceError::Unsupported {
            device: self.name(),
            operation: "input",
        }
        .into())
    }

    fn output(&mut self, value: Word) -> SimulatorResult<()> {
        let code = value.unsigned() as u32;
        let c = char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER);
        self.text.push(c);
        Ok(())
    }

    fn check_status(&self) -> DeviceStatus {
        DeviceStatus::Ready
    }

    fn name(&self) -> &'static str {
        "console printer"
    }
}
