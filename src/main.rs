use agora_logger::app::{Options, RunError, run_with_io};
use agora_logger::channel::ChannelRegistry;
use agora_logger::phase::PhaseCell;
use agora_logger::sink::{CsvSink, RecordSink};
use agora_logger::{shutdown, spinner, transport};
use clap::Parser;
use std::fs::OpenOptions;
use std::panic::{self, PanicHookInfo};
use std::sync::Mutex;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Exit codes for the application
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_PANIC: i32 = 2;

/// Install the diagnostic logger.
///
/// `RUST_LOG` takes precedence over `--verbose`. Diagnostics go to stderr
/// unless `--log-file` is given, in which case they are appended to that file.
///
/// # Errors
/// Returns an `io::Error` if the log file cannot be opened
fn init_logging(options: &Options) -> std::io::Result<()> {
    let level = if options.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match &options.log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }

    Ok(())
}

/// Wire up the real transport, sink, status display and Ctrl-C handling,
/// then run one logging session.
///
/// # Errors
/// Returns `RunError` if Bluetooth initialization, the session or the output
/// file fails
async fn run(options: Options) -> Result<(), RunError> {
    let registry = ChannelRegistry::agora();
    let transport = transport::default_transport(registry.service()).await?;
    let mut sink: Box<dyn RecordSink> = match &options.output_file {
        Some(path) => Box::new(CsvSink::append(path)?),
        None => Box::new(CsvSink::stdout()),
    };

    let phase = PhaseCell::new();
    let (stop, session_shutdown) = shutdown::channel();
    let (done, display_shutdown) = shutdown::channel();

    let display = tokio::spawn(spinner::run(
        phase.clone(),
        display_shutdown,
        std::io::stderr(),
        spinner::REFRESH_INTERVAL,
    ));

    tokio::spawn(async move {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(%error, "cannot listen for interrupt signal");
            return;
        }
        info!("Received interrupt, shutting down");
        stop.trigger();

        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received second interrupt, exiting without cleanup");
            std::process::exit(EXIT_ERROR);
        }
    });

    let result = run_with_io(
        &options,
        &registry,
        transport.as_ref(),
        sink.as_mut(),
        &phase,
        session_shutdown,
    )
    .await;

    done.trigger();
    let _ = display.await;

    let summary = result?;
    info!(
        rounds = summary.rounds,
        records = summary.records,
        "Logging finished"
    );
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Set up panic hook to ensure clean exit codes for process managers
    panic::set_hook(Box::new(move |info: &PanicHookInfo| {
        eprintln!("Panic! {}", info);
        std::process::exit(EXIT_PANIC);
    }));

    let options = Options::parse();

    if let Err(error) = init_logging(&options) {
        eprintln!("error: cannot open log file: {}", error);
        std::process::exit(EXIT_ERROR);
    }

    match run(options).await {
        Ok(()) => std::process::exit(EXIT_SUCCESS),
        Err(why) => {
            eprintln!("error: {}", why);
            std::process::exit(EXIT_ERROR);
        }
    }
}
