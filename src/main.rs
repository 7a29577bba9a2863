use std::io::{IsTerminal, Read};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use argh::FromArgs;
use tracing_subscriber::EnvFilter;

use jish::runtime::Environment;
use jish::shell::{Shell, ShellConfig, ShellError, ShellErrorKind};
use jish::Engine;

#[derive(FromArgs)]
/// Command shell that compiles every command line to native code.
struct Args {
    /// run COMMAND and exit
    #[argh(option, short = 'c')]
    command: Option<String>,

    /// print each lowered chain program to stderr before running it
    #[argh(switch)]
    dump_steps: bool,

    /// milliseconds to sleep while a command waits on a running child
    #[argh(option, default = "5")]
    poll_ms: u64,

    /// script to run instead of reading commands from the terminal
    #[argh(positional)]
    script: Option<PathBuf>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("JISH_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(args: Args) -> Result<i32> {
    let config = ShellConfig {
        poll_interval: Duration::from_millis(args.poll_ms),
        dump_steps: args.dump_steps,
        ..ShellConfig::default()
    };
    let interactive =
        args.command.is_none() && args.script.is_none() && std::io::stdin().is_terminal();
    let mut shell = Shell::new(
        Engine::default(),
        Environment::from_process(interactive),
        config,
    );

    let status = if let Some(command) = args.command {
        shell.run_source(&command)?
    } else if let Some(path) = args.script {
        let source = std::fs::read_to_string(&path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        shell.run_source(&source)?
    } else if interactive {
        shell.interactive()?
    } else {
        let mut source = String::new();
        std::io::stdin()
            .read_to_string(&mut source)
            .context("cannot read standard input")?;
        shell.run_source(&source)?
    };
    Ok(status)
}

fn main() -> ExitCode {
    let args: Args = argh::from_env();
    init_tracing();
    match run(args) {
        Ok(status) => ExitCode::from((status & 0xFF) as u8),
        Err(error) => {
            eprintln!("jish: {error:#}");
            let syntax = error
                .downcast_ref::<ShellError>()
                .is_some_and(|error| error.kind == ShellErrorKind::Parse);
            ExitCode::from(if syntax { 2 } else { 1 })
        }
    }
}
