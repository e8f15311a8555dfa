//! mysh - shell with a paged process scheduler
//!
//! Usage: mysh [OPTIONS] [BATCH_FILE]
//!
//! Reads commands from BATCH_FILE, or standard input when none is given.
//! Scripts started with `run` and `exec` are scheduled as processes whose
//! code lives in a paged frame store.

use std::fs::File;
use std::io::{self, BufRead, BufReader, IsTerminal};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;
use log::{LevelFilter, debug};

use vm_shell::{Console, Kernel, KernelConfig, ScriptSharing, Shell};

/// Command-line configuration
#[derive(Parser)]
#[command(name = "mysh")]
#[command(about = "Shell with a paged process scheduler")]
#[command(version)]
struct Cli {
    /// File of commands to run instead of reading standard input
    batch: Option<PathBuf>,

    /// Frame store size in lines (a multiple of the page size)
    #[arg(long, default_value_t = vm_shell::FRAME_STORE_SIZE)]
    frame_store_size: usize,

    /// Lines per page
    #[arg(long, default_value_t = vm_shell::PAGE_SIZE)]
    page_size: usize,

    /// Pages of each new script loaded before it first runs
    #[arg(long, default_value_t = vm_shell::PAGES_LOADED_NUMBER)]
    pages_loaded: usize,

    /// Number of shell variables that can be held at once
    #[arg(long, default_value_t = vm_shell::VAR_STORE_SIZE)]
    var_store_size: usize,

    /// Worker threads used by `exec ... MT`
    #[arg(long, default_value_t = vm_shell::WORKERS_NUMBER)]
    workers: usize,

    /// Give every process its own copy of its script's pages
    #[arg(long)]
    private_scripts: bool,

    /// Log scheduler activity and print a summary on exit
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(&cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { LevelFilter::Debug } else { LevelFilter::Warn };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let sharing = if cli.private_scripts {
        ScriptSharing::Private
    } else {
        ScriptSharing::Shared
    };
    let config = KernelConfig::default()
        .with_page_size(cli.page_size)
        .with_pages_loaded(cli.pages_loaded)
        .with_frame_store_size(cli.frame_store_size)
        .with_var_store_size(cli.var_store_size)
        .with_workers(cli.workers)
        .with_sharing(sharing);

    let console = Console::stdout();
    let kernel = Arc::new(Kernel::new(config, console.clone())?);

    console.println(&format!(
        "Frame Store Size = {}; Variable Store Size = {}",
        cli.frame_store_size, cli.var_store_size
    ));

    let (input, interactive): (Box<dyn BufRead + Send>, bool) = match &cli.batch {
        Some(path) => (Box::new(BufReader::new(File::open(path)?)), false),
        None => {
            let stdin = io::stdin();
            let interactive = stdin.is_terminal();
            (Box::new(BufReader::new(stdin)), interactive)
        }
    };

    let shell = Shell::new(Arc::clone(&kernel), input);
    let flow = shell.run_loop(interactive);
    debug!("shell loop ended with {:?}", flow);

    kernel.join_all_threads();
    if cli.verbose {
        eprintln!();
        eprint!("{}", kernel.stats().snapshot());
    }
    Ok(())
}
