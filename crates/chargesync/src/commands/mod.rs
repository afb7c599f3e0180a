//! Command handlers.
//!
//! Every online command runs the same lifecycle: validate arguments,
//! start the coordinator, do the work, shut down. Argument errors are
//! reported before any network call.

pub mod config_cmd;
pub mod devices;
pub mod diag;
pub mod fields;
pub mod values;
pub mod watch;

use chargesync_core::{Coordinator, CoordinatorConfig, DeviceId};
use tracing::debug;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

pub async fn dispatch(
    cmd: Command,
    config: CoordinatorConfig,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let coordinator = Coordinator::new(config)?;

    let result = match cmd {
        Command::Devices(args) => devices::handle(args, &coordinator, global).await,
        Command::Get(args) => values::get(args, &coordinator, global).await,
        Command::State(args) => values::state(args, &coordinator, global).await,
        Command::Set(args) => values::set(args, &coordinator, global).await,
        Command::Watch(args) => watch::handle(args, &coordinator, global).await,
        Command::Diag => diag::handle(&coordinator, global).await,
        Command::Config(_) | Command::Fields => unreachable_offline(),
    };

    coordinator.shutdown().await;
    result
}

fn unreachable_offline() -> Result<(), CliError> {
    Err(CliError::Internal(
        "offline command routed to the coordinator".into(),
    ))
}

/// Start the coordinator, running the first cloud cycle.
pub(crate) async fn start(coordinator: &Coordinator) -> Result<(), CliError> {
    coordinator.start().await?;
    debug!(
        devices = coordinator.list_devices().len(),
        interval_secs = coordinator.interval().as_secs(),
        "coordinator ready"
    );
    Ok(())
}

/// Poll one device's LAN endpoint once. A failure only means reads fall
/// back to the cloud view, so it is logged rather than returned.
pub(crate) async fn poll_local(coordinator: &Coordinator, device: &DeviceId) {
    if let Err(e) = coordinator.refresh_local(device).await {
        debug!(device = %device, error = %e, "local poll failed, using cloud view");
    }
}

/// Fail with a not-found error unless the coordinator knows `device`.
pub(crate) fn require_device(coordinator: &Coordinator, device: &DeviceId) -> Result<(), CliError> {
    if coordinator.store().contains(device) {
        Ok(())
    } else {
        Err(CliError::NotFound {
            resource_type: "charger".into(),
            identifier: device.to_string(),
            list_command: "devices".into(),
        })
    }
}
