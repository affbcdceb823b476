//! The offline compiler: reads an ELF file's DWARF CFI, canonicalizes it,
//! and emits a self-contained `.c` eh_elf source (spec.md §2, §6).

use std::io::Write;
use std::path::PathBuf;

use clap::Parser;
use eh_elf::codegen::{CodegenOptions, Policy};
use eh_elf::codegen::row::DerefStyle;
use eh_elf::filters::{canonicalize, PipelineSettings};
use eh_elf::switch_compiler::FactoredSwitchCompiler;
use eh_elf::Error;

/// Ahead-of-time compiles DWARF CFI into a C eh_elf source file.
#[derive(Parser)]
#[command(name = "eh_elf_compile")]
struct Cli {
    /// ELF file to compile.
    elf_path: PathBuf,

    /// Emit one function per FDE plus a `_fde_lookup` table.
    #[arg(long, conflicts_with = "global_switch")]
    switch_per_func: bool,

    /// Emit a single `_eh_elf` function covering every FDE.
    #[arg(long)]
    global_switch: bool,

    /// Emit handlers taking a `deref` callback instead of dereferencing
    /// stack memory directly.
    #[arg(long)]
    enable_deref_arg: bool,

    /// Disable `PcHoleFiller`, leaving inter-FDE gaps unfilled.
    #[arg(long)]
    keep_holes: bool,

    /// Restrict generation to FDEs covering at least one PC from this
    /// little-endian 8-byte-per-entry file.
    #[arg(long, value_name = "PATH")]
    pc_list: Option<PathBuf>,

    /// Write the generated C source here instead of stdout.
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,
}

fn parse_args() -> Cli {
    match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            let code = match e.kind() {
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            std::process::exit(code);
        }
    }
}

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = parse_args();
    if !cli.switch_per_func && !cli.global_switch {
        eprintln!("error: exactly one of --switch-per-func or --global-switch is required");
        std::process::exit(1);
    }

    let dwarf = eh_elf::reader::read_elf(&cli.elf_path)?;
    let dwarf = canonicalize(
        dwarf,
        PipelineSettings {
            fill_holes: !cli.keep_holes,
        },
    );

    let dwarf = match &cli.pc_list {
        Some(path) => {
            let pcs = eh_elf::pc_list::read_pc_list(path)?;
            let mut filtered = dwarf;
            filtered
                .fdes
                .retain(|fde| pcs.iter().any(|&pc| fde.beg_ip <= pc && pc < fde.end_ip));
            filtered
        }
        None => dwarf,
    };

    let policy = if cli.global_switch {
        Policy::GlobalSwitch
    } else {
        Policy::SwitchPerFunc
    };
    let mut opts = CodegenOptions::new(policy, Box::new(FactoredSwitchCompiler));
    opts.deref = if cli.enable_deref_arg {
        DerefStyle::Callback
    } else {
        DerefStyle::Raw
    };
    opts.source_path = cli.elf_path.display().to_string();

    let source = eh_elf::codegen::generate(&dwarf, &opts);

    match cli.output {
        Some(path) => std::fs::write(&path, source)?,
        None => {
            std::io::stdout().write_all(source.as_bytes())?;
        }
    }

    Ok(())
}
