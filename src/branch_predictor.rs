//! Static branch predictor: scans memory for conditional branches, predicts
//! each one taken, then tracks how often its last outcome repeats.
//! Diagnostic only; fetch never consults it.

use std::collections::BTreeMap;
use std::fmt::Write;

use crate::error::SimulatorResult;
use crate::instruction::{DecodedInstruction, Opcode};
use crate::memory::{MemoryControlUnit, MEMORY_SIZE};

/// One row of the branch history table
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BranchHistoryEntry {
    pub address: u64,
    pub taken: bool,
    pub mnemonic: &'static str,
}

#[derive(Clone, Debug, Default)]
pub struct BranchPredictor {
    history: BTreeMap<u64, bool>,
    descriptors: BTreeMap<u64, &'static str>,
    counts: BTreeMap<u64, u64>,
    accurate: BTreeMap<u64, u64>,
}

impl BranchPredictor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Walk every address and register the conditional branches found.
    /// Words that do not decode are data and are skipped.
    pub fn scan_memory(
        &mut self,
        memory: &mut MemoryControlUnit,
    ) -> SimulatorResult<()> {
        for address in 0..MEMORY_SIZE as u64 {
            let word = memory.engineer_fetch(address)?;
            let Ok(instruction) = DecodedInstruction::decode(word) else {
                continue;
            };
            if instruction.opcode.is_conditional_branch() {
                self.register(address, instruction.opcode);
            }
        }
        Ok(())
    }

    /// Start tracking a branch, predicted taken until it is seen
    pub fn register(&mut self, address: u64, opcode: Opcode) {
        self.descriptors.insert(address, opcode.mnemonic());
        self.history.entry(address).or_insert(true);
        self.counts.entry(address).or_insert(0);
        self.accurate.entry(address).or_insert(0);
    }

    pub fn predict(&self, address: u64) -> Option<bool> {
        self.history.get(&address).copied()
    }

    pub fn descriptor(&self, address: u64) -> Option<&'static str> {
        self.descriptors.get(&address).copied()
    }

    /// Score the stored prediction against the outcome, then remember the
    /// outcome as the next prediction. Unknown addresses are registered
    /// first.
    pub fn record_outcome(
        &mut self,
        address: u64,
        opcode: Opcode,
        taken: bool,
    ) {
        if !self.descriptors.contains_key(&address) {
            self.register(address, opcode);
        }
        if self.history.get(&address) == Some(&taken) {
            *self.accurate.entry(address).or_insert(0) += 1;
        }
        *self.counts.entry(address).or_insert(0) += 1;
        self.history.insert(address, taken);
    }

    /// Percentage of outcomes that matched the prediction, rounded
    pub fn accuracy(&self, address: u64) -> u64 {
        let count = self.counts.get(&address).copied().unwrap_or_default();
        if count == 0 {
            return 0;
        }
        let accurate = self.accurate.get(&address).copied().unwrap_or_default();
        ((accurate as f64 / count as f64) * 100.0).round() as u64
    }

    pub fn entries(&self) -> Vec<BranchHistoryEntry> {
        self.descriptors
            .iter()
            .map(|(address, mnemonic)| BranchHistoryEntry {
                address: *address,
                taken: self.history.get(address).copied().unwrap_or(true),
                mnemonic: *mnemonic,
            })
            .collect()
    }

    /// One line per branch, sorted by address
    pub fn prediction_table(&self) -> String {
        let mut table = String::new();
        for entry in self.entries() {
            let prediction = if entry.taken {
                "Branch Predicted"
            } else {
                "No Branch"
            };
            // Writing to a String cannot fail
            let _ = writeln!(
                table,
                "{:04} - {}: {} {}%",
                entry.address,
                entry.mnemonic,
                prediction,
                self.accuracy(entry.address)
            );
        }
        table
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::encode;
    use crate::memory::cache::CachePolicy;
    use pretty_assertions::assert_eq;

    fn memory_with_branches() -> MemoryControlUnit {
        let mut memory = MemoryControlUnit::make(Some(CachePolicy::default()));
        let words = [
            (70, encode(Opcode::JNE, 0, 0, false, 64)),
            (65, encode(Opcode::SOB, 1, 0, false, 64)),
            (66, encode(Opcode::JMP, 0, 0, false, 64)),
            (67, encode(Opcode::JZ, 0, 0, false, 64)),
            (1500, encode(Opcode::JGE, 2, 0, false, 3)),
            (300, encode(Opcode::JCC, 3, 0, false, 9)),
        ];
        for (address, word) in words {
            memory.engineer_store(address, word).unwrap();
        }
        memory
    }

    #[test]
    fn test_scan_finds_conditional_branches() {
        let mut memory = memory_with_branches();
        let mut predictor = BranchPredictor::new();
        predictor.scan_memory(&mut memory).unwrap();

        let found: Vec<_> = predictor
            .entries()
            .iter()
            .map(|e| (e.address, e.mnemonic))
            .collect();
        assert_eq!(
            found,
            vec![(65, "SOB"), (70, "JNE"), (300, "JCC"), (1500, "JGE")]
        );
        assert_eq!(predictor.predict(70), Some(true));
        assert_eq!(predictor.predict(66), None);
        assert_eq!(predictor.descriptor(1500), Some("JGE"));
    }

    #[test]
    fn test_record_outcome_scores_then_updates() {
        let mut predictor = BranchPredictor::new();
        predictor.register(65, Opcode::SOB);

        predictor.record_outcome(65, Opcode::SOB, true);
        predictor.record_outcome(65, Opcode::SOB, true);
        predictor.record_outcome(65, Opcode::SOB, false);
        predictor.record_outcome(65, Opcode::SOB, false);

        // Hits: taken/taken, taken/taken, taken/not, not/not
        assert_eq!(predictor.accuracy(65), 75);
        assert_eq!(predictor.predict(65), Some(false));
    }

    #[test]
    fn test_prediction_table() {
        let mut predictor = BranchPredictor::new();
        predictor.register(70, Opcode::JNE);
        predictor.register(65, Opcode::SOB);
        predictor.record_outcome(70, Opcode::JNE, false);

        assert_eq!(
            predictor.prediction_table(),
            "0065 - SOB: Branch Predicted 0%\n0070 - JNE: No Branch 0%\n"
        );
    }

    #[test]
    fn test_unregistered_outcome_is_tracked() {
        let mut predictor = BranchPredictor::new();
        predictor.record_outcome(12, Opcode::JGE, true);
        assert_eq!(predictor.accuracy(12), 100);
        assert_eq!(predictor.descriptor(12), Some("JGE"));
    }
}
