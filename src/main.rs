use anyhow::Result;
use clap::Parser;
use horizon_scan::{cli, launch};
use tokio_util::sync::CancellationToken;

fn init_tracing(verbose: bool, log_level: &str, json: bool) -> Result<()> {
    let level = if verbose { "debug" } else { log_level };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let initialised = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    initialised.map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = cli::Args::parse();
    init_tracing(args.verbose, &args.log_level, args.log_json)?;
    let config = args.into_config()?;

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n🛑 收到中断信号，正在取消运行...");
            interrupt.cancel();
        }
    });

    launch(&config, cancel).await
}
