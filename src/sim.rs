use std::error::Error;
use std::path::PathBuf;

use clap::Parser;
use text_io::try_read;
use tracing_subscriber::EnvFilter;

use sim_lib::bitvector::Word;
use sim_lib::computer::Computer;
use sim_lib::cpu::CPUPolicy;
use sim_lib::error::SimulatorResult;
use sim_lib::io::CardReader;
use sim_lib::registers::RegisterId;
use sim_lib::run_wrapper::{self, RunStats};

/// Cycle-level simulator for a 20-bit von Neumann machine
#[derive(Debug, Parser)]
#[command(version)]
struct Cli {
    /// Card deck: one 20-digit binary word per line, ending with the sentinel
    deck: PathBuf,

    /// Disable the cache
    #[arg(long)]
    no_cache: bool,

    /// Stop with an error after this many ticks
    #[arg(long, value_name = "N")]
    max_ticks: Option<u64>,

    /// Text queued on the console keyboard
    #[arg(long, value_name = "TEXT")]
    keys: Option<String>,

    /// Write run statistics as CSV
    #[arg(long, value_name = "FILE")]
    stats: Option<PathBuf>,

    /// Interactive single-step console
    #[arg(long)]
    step: bool,

    /// Print statistics on exit
    #[arg(long)]
    history: bool,

    /// Print the branch prediction table on exit
    #[arg(long)]
    predictions: bool,

    #[arg(short, long)]
    verbose: bool,
}

fn print_registers(computer: &Computer) {
    for id in RegisterId::ALL {
        let value = computer.register(id);
        println!(
            "{:>3} = {} ({})",
            id,
            value.to_binary_string(),
            value.unsigned()
        );
    }
}

fn step_console(computer: &mut Computer) -> SimulatorResult<()> {
    loop {
        eprint!("[{:04}] > ", computer.register(RegisterId::Pc).unsigned());
        // End of input quits
        let line: String = match try_read!("{}\n") {
            Ok(line) => line,
            Err(_) => return Ok(()),
        };
        let mut words = line.split_whitespace();
        match words.next() {
            Some("s") => {
                let ticks = computer.step_instruction()?;
                eprintln!("{ticks} ticks");
            }
            Some("t") => computer.clock_cycle()?,
            Some("r") => {
                let outcome = computer.run()?;
                eprintln!("halted after {} ticks", outcome.ticks);
            }
            Some("p") => print_registers(computer),
            Some("m") => match words.next().and_then(|a| a.parse().ok()) {
                Some(address) => match computer.read_memory(address) {
                    Ok(word) => println!(
                        "{:04}: {} ({})",
                        address,
                        word.to_binary_string(),
                        word.signed()
                    ),
                    Err(error) => eprintln!("{error}"),
                },
                None => eprintln!("usage: m ADDR"),
            },
            Some("w") => {
                let address = words.next().and_then(|a| a.parse().ok());
                let value = words.next().and_then(|v| v.parse().ok());
                let (Some(address), Some(value)) = (address, value) else {
                    eprintln!("usage: w ADDR VALUE");
                    continue;
                };
                let written = Word::word(value)
                    .map_err(Into::into)
                    .and_then(|word| computer.write_memory(address, word));
                if let Err(error) = written {
                    eprintln!("{error}");
                }
            }
            Some("q") => return Ok(()),
            Some(other) => {
                eprintln!("unknown command '{other}'");
                eprintln!("commands: s, t, r, p, m ADDR, w ADDR VALUE, q");
            }
            None => {}
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let policy = CPUPolicy {
        verbose: cli.verbose,
        history: cli.history,
        cache_enabled: !cli.no_cache,
        max_ticks: cli.max_ticks,
        ..Default::default()
    };

    let deck = CardReader::from_file(&cli.deck)?;
    let mut computer = run_wrapper::prepare(deck, policy)?;
    if let Some(keys) = &cli.keys {
        computer.io.keyboard.type_text(keys);
    }

    let stats = if cli.step {
        step_console(&mut computer)?;
        RunStats::collect(&computer)
    } else {
        run_wrapper::finish(&mut computer)?
    };

    println!("{}", stats.printer_output);

    if cli.predictions {
        computer.scan_branches()?;
        print!("{}", computer.predictor.prediction_table());
    }
    if let Some(path) = &cli.stats {
        run_wrapper::write_stats_csv(path, &stats)?;
    }

    Ok(())
}
