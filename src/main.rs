use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};

use p4::{
    asm::{self, AssembleResult},
    disasm,
    emu::{
        debugger::{parse_address, Debugger},
        scheduler::{Scheduler, SchedulerConfig, StopReason},
        Emulator,
    },
    image::{package, Image},
    plat::{Word, MEMORY_WORDS},
};

/// Assembler, disassembler and emulator for the P4 CPU.
#[derive(Parser)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Log more; repeat for more detail
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Assemble a source file into a `.p4z` package
    Asm {
        input: PathBuf,
        /// Package to write (defaults to the input with a `.p4z` extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Print every label and constant with its value
        #[arg(long)]
        show_refs: bool,
    },
    /// Print the source reconstructed from a `.p4z` package
    Disasm { package: PathBuf },
    /// Run a source file or `.p4z` package
    Run {
        input: PathBuf,
        /// Clock rate in Hz; unlimited when omitted
        #[arg(long)]
        hz: Option<f64>,
        /// Stop after this many clocks
        #[arg(long)]
        steps: Option<u64>,
        /// Break when the program counter reaches ADDR (decimal, or hex with an h suffix)
        #[arg(short, long = "break", value_name = "ADDR", value_parser = parse_address)]
        breakpoints: Vec<Word>,
        /// Enter the debug REPL
        #[arg(long)]
        debug: bool,
    },
}

fn log_level(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn assemble_file(input: &Path) -> Result<AssembleResult> {
    let source = fs::read_to_string(input)
        .with_context(|| format!("could not read {}", input.display()))?;
    Ok(asm::assemble(&source))
}

fn print_usage(name: &str, used: usize) {
    println!(
        "{}: {}/{} ({:.2}%)",
        name,
        used,
        MEMORY_WORDS,
        AssembleResult::usage_percent(used)
    );
}

fn print_report(result: &AssembleResult, show_refs: bool) {
    for diagnostic in &result.diagnostics {
        println!("{}", diagnostic);
    }
    let stats = &result.stats;
    println!("Errors: {}", stats.errors);
    println!("Warnings: {}", stats.warnings);
    println!("References: {}", result.labels.len());
    println!("Pseudo instructions: {}", stats.pseudo_instructions);
    println!("Instructions: {}", stats.instructions);
    print_usage("Program memory", stats.program_usage());
    print_usage("Data memory", stats.data_usage);
    if show_refs {
        for (name, value) in &result.labels {
            println!("{:<24} {:04X}h", name, value);
        }
    }
}

fn write_package(input: &Path, output: Option<PathBuf>, show_refs: bool) -> Result<()> {
    let result = assemble_file(input)?;
    print_report(&result, show_refs);
    let output = output.unwrap_or_else(|| input.with_extension("p4z"));
    package::save(&output, &Image::from(&result))
        .with_context(|| format!("could not write {}", output.display()))?;
    log::info!("wrote {}", output.display());
    Ok(())
}

fn load_image(input: &Path) -> Result<Image> {
    if input.extension().is_some_and(|ext| ext == "p4z") {
        return package::load(input).with_context(|| format!("could not load {}", input.display()));
    }
    let result = assemble_file(input)?;
    if result.has_errors() {
        for diagnostic in result.errors() {
            eprintln!("{}", diagnostic);
        }
        bail!("{} has {} errors", input.display(), result.stats.errors);
    }
    Ok(Image::from(&result))
}

fn run(
    input: &Path,
    hz: Option<f64>,
    steps: Option<u64>,
    breakpoints: Vec<Word>,
    debug: bool,
) -> Result<()> {
    let image = load_image(input)?;
    let config = match hz {
        Some(hz) if hz > 0.0 => SchedulerConfig::with_rate(hz),
        Some(hz) => bail!("clock rate must be positive, got {}", hz),
        None => SchedulerConfig::default(),
    };
    let mut emu = Emulator::from_image(&image)?;
    let mut scheduler = Scheduler::new(config);
    scheduler.breakpoints.extend(breakpoints);

    if debug {
        return Debugger::new(&mut emu, scheduler).repl();
    }

    let reason = scheduler.run(&mut emu, steps);
    let text = emu.io.terminal.text();
    if !text.is_empty() {
        println!("{}", text);
    }
    eprintln!("{}", emu.snapshot());
    match reason {
        StopReason::Fault(err) => Err(err.into()),
        StopReason::Breakpoint(addr) => {
            eprintln!("Breakpoint at {:04X}h", addr);
            Ok(())
        }
        StopReason::Stopped | StopReason::StepsExhausted => Ok(()),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    TermLogger::init(
        log_level(args.verbose),
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )?;

    match args.command {
        Command::Asm {
            input,
            output,
            show_refs,
        } => write_package(&input, output, show_refs),
        Command::Disasm { package: path } => {
            let image = package::load(&path)
                .with_context(|| format!("could not load {}", path.display()))?;
            print!("{}", disasm::decode_image(&image.program, &image.data)?);
            Ok(())
        }
        Command::Run {
            input,
            hz,
            steps,
            breakpoints,
            debug,
        } => run(&input, hz, steps, breakpoints, debug),
    }
}
