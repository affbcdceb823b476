//! Demo/integration harness for component F (SPEC_FULL.md §2): walks its own
//! call stack using already-compiled eh_elf shared objects and prints the
//! frames it recovers, so the runtime can be exercised outside `cargo test`.

use clap::Parser;
use eh_elf::runtime::StackWalker;
use eh_elf::Error;

#[derive(Parser)]
#[command(name = "eh_elf_walk")]
struct Cli {
    /// Stop after this many frames even if the walk hasn't ended.
    #[arg(long, default_value_t = 256)]
    max_frames: usize,
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
    let walker = StackWalker::init()?;

    let mut frame = 0usize;
    let max_frames = cli.max_frames;
    let ctx = walker.get_context();
    walker.walk_stack(ctx, |ctx| {
        if frame >= max_frames {
            return;
        }
        println!(
            "#{frame:<3} rip=0x{:016x} rsp=0x{:016x} rbp=0x{:016x} flags=0x{:02x}",
            ctx.rip, ctx.rsp, ctx.rbp, ctx.flags
        );
        frame += 1;
    });

    Ok(())
}
