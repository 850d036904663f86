use anyhow::bail;
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use logstreamer::ansi::AnsiDecoder;
use logstreamer::cli::{Cli, init_config, load_config};
use logstreamer::date_range::shrink_until;
use logstreamer::instances::{InstancesManager, StaticInstancesSource};
use logstreamer::log::LogRecord;
use logstreamer::stream::{LogsStream, LogsStreamListener, LogsStreamState, RawRecordConverter};
use logstreamer::transport::ReplayTransport;
use logstreamer::viewer::LogsController;

/// Prints records as they become visible in the viewer
struct ConsoleListener {
    controller: LogsController,
    decoder: AnsiDecoder,
    printed: u64,
}

impl ConsoleListener {
    fn print(&mut self, record: &LogRecord) {
        let instance = record
            .metadata_value("instance")
            .map(|name| format!(" [{}]", name))
            .unwrap_or_default();
        // Re-render from tokens so unsupported escape sequences never reach the terminal
        let message: String = self
            .decoder
            .decode(&record.message)
            .iter()
            .map(|token| token.text.as_str())
            .collect();
        println!("{}{} {}", record.formatted_date(), instance, message);
        self.printed += 1;
    }
}

impl LogsStreamListener for ConsoleListener {
    fn on_state_change(&mut self, state: &LogsStreamState) {
        info!(state = state.name(), progress = ?state.progress(), "stream state");
    }

    fn on_logs(&mut self, logs: Vec<LogRecord>) {
        for record in &logs {
            if self.controller.is_visible(record) {
                self.print(record);
            }
        }
        self.controller.append(logs);
    }
}

/// `LSV_LOG` > `RUST_LOG` > -v/-q
fn init_tracing(default_level: &str) {
    let filter = std::env::var("LSV_LOG")
        .ok()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level());

    if cli.init {
        return init_config(&cli.config);
    }

    let config = load_config(&cli.config)?;
    let Some(file) = cli.file.clone() else {
        bail!("No log file given. Run 'lsv --help' for usage.");
    };
    let range = cli.date_range()?;

    let mut controller = LogsController::new(config.viewer_options());
    controller.set_message_filter(cli.message_filter()?);
    controller.set_metadata_filter(cli.metadata_filter());
    let listener = ConsoleListener {
        controller,
        decoder: AnsiDecoder::new(config.viewer.ansi_cache_size),
        printed: 0,
    };

    let source = Arc::new(StaticInstancesSource::new(config.instances.known.clone(), Vec::new()));
    let instances = Arc::new(InstancesManager::new(source, config.refresh_interval()));
    if let Err(err) = instances.start(&range).await {
        warn!(error = %err, "instances unavailable, records keep raw instance ids");
    }

    let converter = RawRecordConverter::with_lookup(instances.clone());
    let mut stream = LogsStream::new(ReplayTransport::new(file), converter, listener, config.stream_options())?;
    stream.open_logs_stream(range);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("interrupted, stopping stream");
                stream.stop();
                break;
            }
            more = stream.tick() => {
                if !more {
                    break;
                }
            }
        }

        if stream.state().is_paused_for_overflow() {
            if cli.accept_overflow {
                stream.accept_overflow();
            } else {
                stream.discard_overflow();
                if let Some(last_log_date) = stream.last_log_date() {
                    eprintln!(
                        "Stopped at the overflow watermark ({} records). Shown range: {}",
                        config.stream.overflow_watermark,
                        shrink_until(&range, last_log_date)
                    );
                }
            }
        }
    }
    instances.stop();

    let listener = stream.listener();
    info!(kept = listener.controller.len(), printed = listener.printed, "done");

    if let LogsStreamState::Error { message } = stream.state() {
        bail!("Log stream failed: {}", message);
    }
    Ok(())
}
