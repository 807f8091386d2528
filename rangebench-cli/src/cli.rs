use std::path::PathBuf;

use anyhow::Result;
use argh::FromArgs;

use crate::config::{Config, Preset};
use crate::{observability, session};

/// Benchmark randomized range reads against S3-compatible object storage.
#[derive(Debug, FromArgs)]
struct Args {
    /// path to the YAML configuration file
    #[argh(option, short = 'c')]
    pub config: Option<PathBuf>,

    #[argh(subcommand)]
    pub command: Command,
}

#[derive(Debug, FromArgs)]
#[argh(subcommand)]
enum Command {
    Run(RunCommand),
    PrintConfig(PrintConfigCommand),
    Version(VersionCommand),
}

/// run the benchmark
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "run")]
struct RunCommand {
    /// walk the sweep and report planned runs without reading or writing anything
    #[argh(switch)]
    dry_run: bool,

    /// sweep every thread count from 1 to 48 for payloads from 1 to 256 MiB
    #[argh(switch)]
    full: bool,

    /// repeat a single thread reading 20 MiB payloads until interrupted
    #[argh(switch)]
    throttling: bool,
}

/// print the resolved configuration with secrets redacted
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "print-config")]
struct PrintConfigCommand {}

/// print the rangebench version
#[derive(Default, Debug, FromArgs)]
#[argh(subcommand, name = "version")]
struct VersionCommand {}

/// Bootstrap the runtime and execute the CLI command.
pub fn execute() -> Result<()> {
    let args: Args = argh::from_env();

    // Special switch to just print the version and exit.
    if let Command::Version(_) = args.command {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let mut config = Config::load(args.config.as_deref())?;

    let run = match args.command {
        Command::Run(run) => run,
        Command::PrintConfig(_) => {
            println!("{config:#?}");
            return Ok(());
        }
        Command::Version(_) => unreachable!(),
    };

    if run.full && run.throttling {
        anyhow::bail!("--full and --throttling cannot be combined");
    }
    if run.full {
        config.apply_preset(Preset::Full);
    }
    if run.throttling {
        config.apply_preset(Preset::Throttling);
    }

    // Sentry should be initialized before creating the async runtime.
    let _sentry_guard = observability::init_sentry(&config);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("main-rt")
        .enable_all()
        .build()?;
    let _runtime_guard = runtime.enter();

    observability::init_tracing(&config);
    tracing::debug!(?config);

    runtime.block_on(session::run(config, run.dry_run))
}
