//! `certdir` - poll a certificate directory and print each renewal.
//!
//! Every time `fullchain.pem` or `privkey.pem` changes, the pair is written
//! to stdout as an indented JSON object with base64 `CertPEMBlock` and
//! `KeyPEMBlock` fields. Closing stdin stops the tool with exit status 0.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{ArgAction, Parser, ValueHint};
use hotswap_tls::CancellationToken;
use hotswap_tls::core::{CertWatcher, ENV_PREFIX, SettingsOverrides, WatchConfig};
use hotswap_tls::error::{CertError, Result};
use hotswap_tls::sources::X509KeyPair;
use tracing::{debug, error};

const AFTER_HELP: &str = "\
Settings are layered: defaults, then --config, then CERTDIR_* variables, then DIR and --interval.

Closing stdin stops certdir with exit status 0; this is a normal shutdown, not an error. \
Any other failure exits with status 1.";

/// Poll a directory for renewed TLS certificates
///
/// Emits one JSON key pair on stdout per detected change.
#[derive(Debug, Parser)]
#[command(name = "certdir", version, about, long_about = None, after_help = AFTER_HELP)]
struct Cli {
    /// Increase verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Settings file (TOML, YAML or JSON)
    #[arg(short, long, env = "CERTDIR_CONFIG", value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Directory polling interval, e.g. `1h` or `90s`
    #[arg(short, long, value_parser = humantime::parse_duration)]
    interval: Option<Duration>,

    /// Directory containing fullchain.pem and privkey.pem
    #[arg(value_hint = ValueHint::DirPath)]
    dir: Option<PathBuf>,
}

impl Cli {
    fn settings(&self) -> Result<WatchConfig> {
        let overrides = SettingsOverrides {
            dir: self.dir.clone(),
            interval: self.interval,
        };
        WatchConfig::load_layered(self.config.as_deref(), ENV_PREFIX, &overrides)
    }

    fn watcher(&self, shutdown: CancellationToken) -> Result<CertWatcher> {
        CertWatcher::builder()
            .with_config(self.settings()?)
            .with_shutdown(shutdown)
            .build()
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("failed to create Tokio runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let shutdown = CancellationToken::new();
    let watcher = cli.watcher(shutdown.clone())?;
    watch_stdin(shutdown);

    let mut stream = watcher.stream();
    while let Some(cert) = stream.next().await {
        emit(&mut io::stdout().lock(), cert.pem())?;
    }

    match stream.finish().await {
        // Closing stdin is how certdir is asked to stop.
        Err(CertError::Shutdown) => Ok(()),
        outcome => outcome,
    }
}

/// Write one key pair as indented JSON followed by a newline.
fn emit<W: Write>(out: &mut W, pair: &X509KeyPair) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, pair).map_err(|e| CertError::Emit(e.into()))?;
    writeln!(out).map_err(CertError::Emit)?;
    out.flush().map_err(CertError::Emit)
}

/// Cancel `shutdown` once stdin reaches end of file.
fn watch_stdin(shutdown: CancellationToken) {
    std::thread::spawn(move || {
        let _ = io::copy(&mut io::stdin().lock(), &mut io::sink());
        debug!("stdin closed, shutting down");
        shutdown.cancel();
    });
}

fn init_tracing(verbose: u8) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr).with_target(verbose >= 2))
        .init();
}
