use ble_peripheral_sim::domain::catalog::standard_catalog;
use ble_peripheral_sim::domain::codec::time::DateTime;
use ble_peripheral_sim::domain::models::{MessageSeverity, PeripheralEvent};
use ble_peripheral_sim::domain::settings::SettingsService;
use ble_peripheral_sim::infrastructure::bluetooth::host::DeviceId;
use ble_peripheral_sim::infrastructure::bluetooth::{LoopbackHost, PeripheralService};
use ble_peripheral_sim::infrastructure::logging;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

const REGISTRATION_TIMEOUT: Duration = Duration::from_secs(5);

fn log_event(event: PeripheralEvent) {
    match event {
        PeripheralEvent::Status(status) => match status.severity {
            MessageSeverity::Info | MessageSeverity::Success => info!("{}", status.message),
            MessageSeverity::Warning => warn!("{}", status.message),
            MessageSeverity::Error => error!("{}", status.message),
        },
        other => debug!(event = ?other, "peripheral event"),
    }
}

async fn wait_for_registration(peripheral: &PeripheralService) -> bool {
    let all_registered = || {
        peripheral
            .database()
            .services()
            .iter()
            .all(|service| peripheral.is_registered(&service.uuid()))
    };
    let wait = async {
        let mut poll = tokio::time::interval(Duration::from_millis(20));
        while !all_registered() {
            poll.tick().await;
        }
    };
    tokio::time::timeout(REGISTRATION_TIMEOUT, wait).await.is_ok()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Optional first argument overrides the settings location
    let settings_service = match std::env::args().nth(1) {
        Some(path) => SettingsService::from_path(PathBuf::from(path)),
        None => SettingsService::new()?,
    };
    let settings = settings_service.get().clone();

    let _logging_guard = logging::init_logger(&settings.log_settings)
        .map_err(|e| eprintln!("Failed to initialize logging: {}", e))
        .ok();

    info!(
        settings = %settings_service.path().display(),
        "Starting BLE peripheral simulator"
    );

    let database = standard_catalog(
        &settings.device_info,
        &DateTime::now(),
        settings.simulation.medical_float,
    );
    let host = Arc::new(
        LoopbackHost::new().with_auto_confirm(settings.loopback.auto_confirm_registrations),
    );
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let peripheral = PeripheralService::new(
        host.clone(),
        database,
        settings.simulation.clone(),
        event_tx,
        Handle::current(),
    );

    let host_events = host
        .take_events()
        .ok_or_else(|| anyhow::anyhow!("loopback host events already taken"))?;
    LoopbackHost::pump(host_events, peripheral.clone());
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            log_event(event);
        }
    });

    peripheral.open_server()?;
    peripheral.register_all_services();
    if !wait_for_registration(&peripheral).await {
        warn!("Not every service was confirmed by the host");
    }

    let central = DeviceId::new(settings.loopback.central_address.clone());
    if settings.loopback.simulate_central {
        let subscribed = host.connect_central(&central, peripheral.database());
        info!(%central, subscribed, "Simulated central connected");
        if !settings.simulation.auto_simulate_on_connect {
            peripheral.start();
        }
    } else {
        peripheral.start();
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    if settings.loopback.simulate_central {
        host.disconnect_central(&central);
    }
    peripheral.stop();
    peripheral.close_server();

    Ok(())
}
