//! SIGWINCH forwarding.

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use crate::events::AppEvent;

/// Posts [`AppEvent::Resize`] whenever the process receives `SIGWINCH`.
///
/// The listener is a task on the current runtime and is aborted when the
/// watcher is dropped.
pub struct ResizeWatcher {
    task: JoinHandle<()>,
}

impl ResizeWatcher {
    pub fn spawn(events: UnboundedSender<AppEvent>) -> std::io::Result<Self> {
        let mut winch = signal(SignalKind::window_change())?;
        let task = tokio::spawn(async move {
            while winch.recv().await.is_some() {
                log::trace!("SIGWINCH");
                if events.send(AppEvent::Resize).is_err() {
                    break;
                }
            }
        });
        Ok(Self { task })
    }
}

impl Drop for ResizeWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}
