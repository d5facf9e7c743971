//! bittorrent-client - Main entry point

use anyhow::{Context, Result};
use bittorrent_client::cli::execute;
use bittorrent_client::{CliArgs, Config};
use tracing::{debug, error};

/// Set up panic handler for unexpected errors
fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|panic_info| {
        let backtrace = std::backtrace::Backtrace::capture();
        match panic_info.location() {
            Some(location) => error!(
                "PANIC occurred at {}:{}:{}",
                location.file(),
                location.line(),
                location.column()
            ),
            None => error!("PANIC occurred at unknown location"),
        }
        let payload = panic_info.payload();
        if let Some(s) = payload.downcast_ref::<&str>() {
            error!("Panic message: {}", s);
        } else if let Some(s) = payload.downcast_ref::<String>() {
            error!("Panic message: {}", s);
        } else {
            error!("Panic message: unknown");
        }
        error!("Backtrace:\n{:?}", backtrace);
    }));
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_panic_handler();

    let args = CliArgs::parse_args();
    init_logging(&args);
    debug!("CLI arguments: {:?}", args);

    let config = Config::from_args(&args);
    config.validate().context("Invalid configuration")?;

    let mut stdout = std::io::stdout();
    execute(&args.command, &config, &mut stdout)
        .await
        .with_context(|| format!("{} failed", command_name(&args)))?;
    Ok(())
}

/// Initialize logging based on verbosity settings
///
/// Logs go to stderr so command output on stdout stays machine-readable.
fn init_logging(args: &CliArgs) {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(args.log_level())
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if args.is_verbose() {
        subscriber.pretty().init();
    } else {
        subscriber.compact().init();
    }
}

fn command_name(args: &CliArgs) -> &'static str {
    use bittorrent_client::Command;
    match args.command {
        Command::Decode { .. } => "decode",
        Command::Encode { .. } => "encode",
        Command::Info { .. } => "info",
        Command::Peers { .. } => "peers",
        Command::Handshake { .. } => "handshake",
        Command::DownloadPiece { .. } => "download_piece",
        Command::Download { .. } => "download",
        Command::MagnetParse { .. } => "magnet_parse",
        Command::MagnetHandshake { .. } => "magnet_handshake",
        Command::MagnetInfo { .. } => "magnet_info",
        Command::MagnetDownloadPiece { .. } => "magnet_download_piece",
        Command::MagnetDownload { .. } => "magnet_download",
    }
}
