//! A simulator wrapper

use std::path::Path;

use crate::computer::Computer;
use crate::cpu::CPUPolicy;
use crate::error::SimulatorResult;
use crate::io::CardReader;

/// Tick limit when the policy leaves it open
pub const DEFAULT_MAX_TICKS: u64 = 1_000_000;

/// Totals gathered at the end of a run
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunStats {
    pub ticks: u64,
    pub instructions: u64,
    pub stalls: u64,
    pub faults: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_writebacks: u64,
    pub printer_output: String,
}

impl RunStats {
    pub fn collect(computer: &Computer) -> Self {
        let cache = computer.memory.cache_history();
        Self {
            ticks: computer.history.cycle_count,
            instructions: computer.history.inst_count,
            stalls: computer.history.mem_stall_count,
            faults: computer.history.fault_count,
            cache_hits: cache.num_hit,
            cache_misses: cache.num_miss,
            cache_writebacks: cache.num_writeback,
            printer_output: computer.printer_output().to_string(),
        }
    }
}

/// Build a computer with `deck` on the card reader and IPL it
pub fn prepare(
    deck: CardReader,
    mut policy: CPUPolicy,
) -> SimulatorResult<Computer> {
    policy.max_ticks.get_or_insert(DEFAULT_MAX_TICKS);
    let mut computer = Computer::make(policy)?;
    computer.attach_card_reader(deck);
    computer.ipl()?;
    Ok(computer)
}

/// Run an IPL'd computer to HLT and report
pub fn finish(computer: &mut Computer) -> SimulatorResult<RunStats> {
    computer.run()?;
    let stats = RunStats::collect(computer);

    if computer.policy.history {
        eprintln!("[HISTORY] # ticks = {}", stats.ticks);
        eprintln!("[HISTORY] # instructions = {}", stats.instructions);
        eprintln!(
            "[HISTORY] CPI = {:.2}, stalls = {}, faults = {}",
            computer.history.get_cpi(),
            stats.stalls,
            stats.faults
        );
        if let Some(cache) = computer.memory.cache() {
            eprintln!("[HISTORY] {:?}", cache.history);
            eprintln!("[HISTORY] miss rate = {:.2}", cache.get_miss_rate());
        }
    }
    Ok(stats)
}

/// Run simulation on the given card deck
pub fn run(deck: CardReader, policy: CPUPolicy) -> SimulatorResult<RunStats> {
    let mut computer = prepare(deck, policy)?;
    finish(&mut computer)
}

/// Write `stats` as a header row plus one record
pub fn write_stats_csv(
    path: impl AsRef<Path>,
    stats: &RunStats,
) -> SimulatorResult<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([
        "ticks",
        "instructions",
        "stalls",
        "faults",
        "cache_hits",
        "cache_misses",
        "cache_writebacks",
        "printer_output",
    ])?;
    writer.write_record([
        stats.ticks.to_string(),
        stats.instructions.to_string(),
        stats.stalls.to_string(),
        stats.faults.to_string(),
        stats.cache_hits.to_string(),
        stats.cache_misses.to_string(),
        stats.cache_writebacks.to_string(),
        stats.printer_output.clone(),
    ])?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ExecutionError, SimulatorError};
    use pretty_assertions::assert_eq;

    // Prints "OK" then halts. The 'O' takes a detour through address 300,
    // outside the blocks IPL leaves in the cache:
    //   64 LDX 0,1,72      X1 <- 300
    //   65 LDR 0,0,73      R0 <- 'O'
    //   66 STR 0,1,71      c(300) <- R0
    //   67 LDR 1,1,71      R1 <- c(300)
    //   68 OUT 1,1
    //   69 LDR 0,0,74      R0 <- 'K'
    //   70 OUT 0,1
    //   71 HLT             also the zero offset for 66 and 67
    const DECK: &str = "\
101001 00 01 0 0 01001000
000001 00 00 0 0 01001001
000010 00 01 0 0 01000111
000001 01 01 0 0 01000111
111110 01 00 0 0 00000001
000001 00 00 0 0 01001010
111110 00 00 0 0 00000001
000000 00 00 0 0 00000000
00000000000100101100
00000000000001001111
00000000000001001011
11111111111111111111
";

    fn deck() -> CardReader {
        // Strip the field separators
        let text: String = DECK
            .lines()
            .map(|line| line.replace(' ', "") + "\n")
            .collect();
        CardReader::from_text(&text).unwrap()
    }

    #[test]
    fn test_run_deck() {
        let stats = run(deck(), CPUPolicy::default()).unwrap();
        assert_eq!(stats.printer_output, "OK");
        assert!(stats.cache_misses > 0);
        assert!(stats.stalls > 0);
        assert!(stats.cache_hits > stats.cache_misses);
        assert_eq!(stats.faults, 0);
    }

    #[test]
    fn test_cache_does_not_change_results() {
        let cached = run(deck(), CPUPolicy::default()).unwrap();
        let policy = CPUPolicy {
            cache_enabled: false,
            ..Default::default()
        };
        let uncached = run(deck(), policy).unwrap();

        assert_eq!(cached.printer_output, uncached.printer_output);
        assert_eq!(cached.instructions, uncached.instructions);
        assert_eq!(uncached.stalls, 0);
        assert_eq!(uncached.cache_hits + uncached.cache_misses, 0);
        assert!(cached.ticks > uncached.ticks);
    }

    #[test]
    fn test_default_tick_limit_applied() {
        let computer = prepare(deck(), CPUPolicy::default()).unwrap();
        assert_eq!(computer.policy.max_ticks, Some(DEFAULT_MAX_TICKS));
    }

    #[test]
    fn test_tick_limit_error() {
        let policy = CPUPolicy {
            max_ticks: Some(100),
            ..Default::default()
        };
        let error = run(deck(), policy).unwrap_err();
        assert!(matches!(
            error,
            SimulatorError::Execution(ExecutionError::TickLimitReached(100))
        ));
    }

    #[test]
    fn test_write_stats_csv() {
        let stats = RunStats {
            ticks: 900,
            instructions: 120,
            stalls: 14,
            faults: 1,
            cache_hits: 300,
            cache_misses: 7,
            cache_writebacks: 0,
            printer_output: "FERR".into(),
        };
        let file = tempfile::NamedTempFile::new().unwrap();
        write_stats_csv(file.path(), &stats).unwrap();

        let written = std::fs::read_to_string(file.path()).unwrap();
        let mut lines = written.lines();
        assert_eq!(
            lines.next(),
            Some(
                "ticks,instructions,stalls,faults,cache_hits,cache_misses,\
                 cache_writebacks,printer_output"
            )
        );
        assert_eq!(lines.next(), Some("900,120,14,1,300,7,0,FERR"));
        assert_eq!(lines.next(), None);
    }
}
