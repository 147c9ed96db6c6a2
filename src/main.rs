use clap::Parser;
use log::{error, info};
use meter2prom::dsmr::{serial, telegram_spec};
use meter2prom::{ApiManager, DsmrManager, MetricRegistry, SerialSettings, TelegramReader};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Parser)]
#[command(
    name = "meter2prom",
    about = "Monitoring process for reading Dutch smart meters and exposing data for Prometheus to scrape"
)]
struct Cli {
    /// Prometheus endpoint port
    port: u16,
    /// P1 USB device (i.e. "/dev/ttyUSB0")
    device: String,
    /// Seconds without meter data before the device counts as dead
    #[arg(long, default_value_t = 60)]
    read_timeout: u64,
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    // Initialize logging
    let default_filter = std::env::var("M2P_LOG_LEVEL").unwrap_or("info".to_string());
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(default_filter));

    let cli = Cli::parse();
    info!("Smart meter monitoring started");

    let registry = Arc::new(MetricRegistry::new());

    // Bind before touching the device so a taken port fails fast.
    let server = ApiManager::new(registry.clone(), cli.port).start()?;
    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    // V5 line parameters (the V4 settings of the original describe the
    // same 115200 8N1 line) with the V5 field layout.
    let port = serial::open(&cli.device, &SerialSettings::v5())
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
    info!("Reading smart meter on {}", cli.device);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let manager = DsmrManager::new(registry, &telegram_spec::V5, shutdown_rx);
    let mut reader =
        TelegramReader::with_read_timeout(port, Duration::from_secs(cli.read_timeout));
    let mut ingest = tokio::spawn(async move { manager.run(&mut reader).await });

    let mut exit: io::Result<()> = Ok(());
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Stopping smart meter exporter");
            let _ = shutdown_tx.send(true);
            if let Ok(Err(e)) = (&mut ingest).await {
                error!("ingestion ended with error during shutdown: {}", e);
            }
        }
        result = &mut ingest => {
            match result {
                Ok(Ok(())) => info!("ingestion ended"),
                Ok(Err(e)) => {
                    error!("serial ingestion failed: {}", e);
                    exit = Err(io::Error::new(io::ErrorKind::Other, e.to_string()));
                }
                Err(e) => {
                    error!("ingestion task panicked: {}", e);
                    exit = Err(io::Error::new(io::ErrorKind::Other, e.to_string()));
                }
            }
        }
    }

    server_handle.stop(true).await;
    let _ = server_task.await;

    exit
}
