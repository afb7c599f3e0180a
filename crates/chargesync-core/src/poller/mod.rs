// ── Background pollers ──
//
// One cloud poller shared by every device, one local poller per device.
// Both run as independent tasks and only meet in the `DataStore`.

pub(crate) mod cloud;
pub(crate) mod local;

use std::time::Duration;

use tokio_util::sync::CancellationToken;

pub use cloud::CycleReport;

/// Sleep for `delay` unless cancelled first. Returns `false` on cancel.
pub(crate) async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(delay) => true,
    }
}
