use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

use resibox::Pipeline;
use resibox::actuator::ActuatorClient;
use resibox::bot::CommandDispatcher;
use resibox::config::Config;
use resibox::detection::ocr::{DisabledRecognizer, OcrsRecognizer, TextRecognizer};
use resibox::server::{AppState, build_router};
use resibox::telegram::TelegramClient;

#[derive(Parser)]
#[command(name = "resibox")]
#[command(about = "Read shipment tracking numbers from parcel photos and drive the drop box")]
struct Cli {
    /// Path to configuration file (defaults to ./resibox.toml when present)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract resi numbers from a single image file
    Scan {
        /// Path to input image file
        #[arg(value_name = "IMAGE")]
        image_path: PathBuf,

        /// Save debug outputs to directory (must be empty)
        #[arg(long, value_name = "DIR")]
        debug_out: Option<PathBuf>,

        /// Skip OCR step (barcodes only)
        #[arg(long)]
        skip_ocr: bool,
    },

    /// Run the HTTP server and the Telegram command bot
    Serve {
        /// Address to listen on
        #[arg(long, env = "RESIBOX_BIND")]
        bind: Option<String>,

        /// Telegram bot token
        #[arg(long, env = "RESIBOX_BOT_TOKEN", hide_env_values = true)]
        bot_token: Option<String>,

        /// Telegram chat that receives upload notifications
        #[arg(long, env = "RESIBOX_CHAT_ID")]
        chat_id: Option<String>,

        /// Base URL of the ESP32 servo controller
        #[arg(long, env = "RESIBOX_ACTUATOR_URL")]
        actuator_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let default_level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .init();

    let config = Config::load_or_default(args.config.as_deref()).context("Failed to load configuration")?;

    match args.command {
        Command::Scan {
            image_path,
            debug_out,
            skip_ocr,
        } => scan(config, args.verbose, image_path, debug_out, skip_ocr).await,
        Command::Serve {
            bind,
            bot_token,
            chat_id,
            actuator_url,
        } => {
            let mut config = config;
            if let Some(bind) = bind {
                config.server.bind_addr = bind;
            }
            if bot_token.is_some() {
                config.telegram.bot_token = bot_token;
            }
            if chat_id.is_some() {
                config.telegram.chat_id = chat_id;
            }
            if let Some(url) = actuator_url {
                config.actuator.base_url = url;
            }
            serve(config, args.verbose).await
        }
    }
}

fn build_pipeline(config: &Config, verbose: bool, skip_ocr: bool) -> anyhow::Result<Pipeline> {
    let recognizer: Arc<dyn TextRecognizer> = if skip_ocr || !config.ocr.enabled {
        Arc::new(DisabledRecognizer)
    } else {
        Arc::new(OcrsRecognizer::new(config.ocr.resolved_model_dir()?))
    };

    Ok(Pipeline::new()
        .with_verbose(verbose)
        .with_recognizer(recognizer)
        .with_binarizer(config.preprocess.binarizer()))
}

async fn scan(
    config: Config,
    verbose: bool,
    image_path: PathBuf,
    debug_out: Option<PathBuf>,
    skip_ocr: bool,
) -> anyhow::Result<()> {
    let photo = std::fs::read(&image_path)
        .with_context(|| format!("Failed to read image {}", image_path.display()))?;

    let mut pipeline = build_pipeline(&config, verbose, skip_ocr)?;
    if let Some(debug_dir) = debug_out {
        pipeline = pipeline.with_debug(debug_dir)?;
    }

    let report = pipeline.process(photo).await?;

    println!("{}", report.summary());
    for fault in &report.faults {
        println!("(skipped {} channel: {})", fault.channel, fault.reason);
    }

    Ok(())
}

async fn serve(config: Config, verbose: bool) -> anyhow::Result<()> {
    info!("Starting resibox v{}", env!("CARGO_PKG_VERSION"));

    let pipeline = build_pipeline(&config, verbose, false)?;
    let actuator = Arc::new(ActuatorClient::from_config(&config.actuator)?);
    info!("Actuator at {}", actuator.base_url());

    let telegram = TelegramClient::from_config(&config.telegram)?.map(Arc::new);
    let shutdown = CancellationToken::new();

    let bot_task = match &telegram {
        Some(client) => {
            let dispatcher = CommandDispatcher::new(client.clone(), actuator.clone());
            Some(tokio::spawn(dispatcher.run(shutdown.clone())))
        }
        None => {
            info!("Telegram not configured, notifications and bot disabled");
            None
        }
    };

    let state = AppState {
        pipeline,
        actuator,
        notifier: telegram,
        pipeline_timeout: config.pipeline_timeout(),
        max_upload_bytes: config.server.max_upload_bytes,
    };
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.server.bind_addr))?;
    info!("resibox listening on http://{}", config.server.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .context("Server error")?;

    shutdown.cancel();
    if let Some(task) = bot_task {
        let _ = task.await;
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
        _ = shutdown.cancelled() => {},
    }
    shutdown.cancel();
}
