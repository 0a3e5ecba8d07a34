use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use panechat_vt::{Fragment, VtTerminal};
use tokio::io::unix::AsyncFd;
use tokio::io::Interest;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;

use crate::keys::decode_keystrokes;
use crate::ledger::OutputLedger;
use crate::pty::{PtyError, PtyFd, PtyHandle, PtyRead, SpawnConfig};

/// Smallest grid the child is ever given. Narrow panes show the left part of
/// the grid rather than making the shell wrap early.
pub const MIN_ROWS: u16 = 24;
pub const MIN_COLS: u16 = 120;

const BRACKETED_PASTE_START: &[u8] = b"\x1b[200~";
const BRACKETED_PASTE_END: &[u8] = b"\x1b[201~";
/// How long queued input may sit without the child taking a byte.
const INPUT_STALL: Duration = Duration::from_secs(2);

/// Notifications from the controller to its host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    Started,
    /// Sent exactly once per session, however it ended.
    Stopped,
    /// The screen changed.
    Redraw,
    /// A line for the user, e.g. "Terminal session started.".
    Message(String),
}

/// A running child plus its readiness registration.
///
/// `watch` is declared first so it is deregistered before the PTY closes the
/// descriptor it refers to.
struct ActiveSession {
    watch: AsyncFd<PtyFd>,
    pty: PtyHandle,
    input: PendingInput,
}

/// Input the child has not taken yet.
#[derive(Default)]
struct PendingInput {
    bytes: VecDeque<u8>,
    /// When the queue stops making progress it must be empty by then.
    deadline: Option<Instant>,
}

impl PendingInput {
    fn push(&mut self, bytes: &[u8]) {
        self.bytes.extend(bytes);
    }

    fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Write until the queue is empty or the child stops accepting.
    fn flush(&mut self, pty: &PtyHandle) -> Result<(), PtyError> {
        let mut progressed = false;
        while !self.bytes.is_empty() {
            let (front, _) = self.bytes.as_slices();
            let n = pty.write_nonblocking(front)?;
            if n == 0 {
                break;
            }
            self.bytes.drain(..n);
            progressed = true;
        }
        if self.bytes.is_empty() {
            self.deadline = None;
        } else if progressed || self.deadline.is_none() {
            self.deadline = Some(Instant::now() + INPUT_STALL);
        }
        Ok(())
    }

    fn stall_deadline(&self) -> Instant {
        self.deadline.unwrap_or_else(|| Instant::now() + INPUT_STALL)
    }
}

/// Owns the single embedded terminal session.
///
/// Pairs a [`PtyHandle`] with a [`VtTerminal`] and an [`OutputLedger`]. The
/// host drives it from its event loop: await [`data_ready`](Self::data_ready)
/// and hand the result to [`on_data_ready`](Self::on_data_ready). Emulator
/// and ledger outlive the session, so the last screen and the output history
/// stay readable after the child is gone.
pub struct SessionController {
    config: SpawnConfig,
    vt: VtTerminal,
    ledger: OutputLedger,
    active: Option<ActiveSession>,
    events: UnboundedSender<SessionEvent>,
}

impl SessionController {
    pub fn new(config: SpawnConfig, events: UnboundedSender<SessionEvent>) -> Self {
        Self {
            config,
            vt: VtTerminal::new(MIN_ROWS, MIN_COLS),
            ledger: OutputLedger::new(),
            active: None,
            events,
        }
    }

    /// Spawn the shell. Does nothing if a session is already running.
    ///
    /// `viewport` is the pane size in `(rows, cols)`; it is raised to at
    /// least [`MIN_ROWS`] × [`MIN_COLS`]. `None` keeps the current grid size.
    pub fn start_session(&mut self, viewport: Option<(u16, u16)>) -> Result<(), PtyError> {
        if self.active.is_some() {
            log::debug!("start_session ignored: a session is already running");
            return Ok(());
        }

        let screen = self.vt.screen();
        let (rows, cols) = clamp_viewport(viewport.unwrap_or((screen.rows(), screen.cols())));

        // The previous history stays until the new child is really running.
        let pty = PtyHandle::spawn(&self.config, rows, cols)?;
        let watch = AsyncFd::with_interest(pty.reactor_fd(), Interest::READABLE | Interest::WRITABLE)?;
        pty.resize(rows, cols)?;

        self.ledger.clear();
        self.vt.reset();
        self.vt.resize(rows, cols);
        log::info!("terminal session started (pid {:?})", pty.process_id());
        self.active = Some(ActiveSession {
            watch,
            pty,
            input: PendingInput::default(),
        });

        self.notify(SessionEvent::Message("Terminal session started.".to_string()));
        self.notify(SessionEvent::Started);
        self.notify(SessionEvent::Redraw);
        Ok(())
    }

    /// Stop the running session. Does nothing when idle.
    ///
    /// Output history and the last screen are kept.
    pub fn stop_session(&mut self) {
        if self.active.is_some() {
            self.teardown("Terminal session stopped.".to_string());
        }
    }

    /// Wait until the child has output, then read it.
    ///
    /// Never resolves while no session is running. The read happens while
    /// the readiness guard is held and readiness is only cleared on
    /// `WouldBlock`, so no wakeup is lost between the two.
    ///
    /// Queued input is flushed here as the child makes room for it. Output
    /// keeps being read in the meantime, since a child echoing a large paste
    /// stops reading once its own output backs up. Input that makes no
    /// progress for two seconds fails with `TimedOut`.
    pub async fn data_ready(&mut self) -> Result<PtyRead, PtyError> {
        let Some(active) = self.active.as_mut() else {
            return std::future::pending().await;
        };
        loop {
            if active.input.is_empty() {
                let mut guard = active.watch.readable().await?;
                match active.pty.read_nonblocking() {
                    Ok(PtyRead::WouldBlock) => guard.clear_ready(),
                    other => return other,
                }
                continue;
            }

            let stall = active.input.stall_deadline();
            tokio::select! {
                guard = active.watch.readable() => {
                    let mut guard = guard?;
                    match active.pty.read_nonblocking() {
                        Ok(PtyRead::WouldBlock) => guard.clear_ready(),
                        other => return other,
                    }
                }
                guard = active.watch.writable() => {
                    let mut guard = guard?;
                    active.input.flush(&active.pty)?;
                    if !active.input.is_empty() {
                        guard.clear_ready();
                    }
                }
                _ = tokio::time::sleep_until(stall) => {
                    let stalled = io::Error::new(io::ErrorKind::TimedOut, "child stopped reading input");
                    return Err(PtyError::Io(stalled));
                }
            }
        }
    }

    /// Apply the result of [`data_ready`](Self::data_ready).
    pub fn on_data_ready(&mut self, result: Result<PtyRead, PtyError>) {
        if self.active.is_none() {
            return;
        }
        match result {
            Ok(PtyRead::Data(bytes)) => {
                self.ledger.append(&bytes);
                self.vt.feed(&bytes);
                let responses = self.vt.take_responses();
                if !responses.is_empty() {
                    self.write_input(&responses);
                }
                self.notify(SessionEvent::Redraw);
            }
            Ok(PtyRead::WouldBlock) => {}
            Ok(PtyRead::Eof) => self.teardown("Terminal session ended.".to_string()),
            Err(e) => {
                log::warn!("terminal I/O failed: {e}");
                self.teardown(format!("Terminal I/O error: {e}"));
            }
        }
    }

    /// Send raw bytes to the child. Ignored when idle.
    ///
    /// Whatever the child does not take at once is queued and written from
    /// [`data_ready`](Self::data_ready).
    pub fn write_input(&mut self, bytes: &[u8]) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        active.input.push(bytes);
        if let Err(e) = active.input.flush(&active.pty) {
            log::warn!("terminal write failed: {e}");
            self.teardown(format!("Error writing to terminal: {e}"));
        }
    }

    /// Bytes of input still waiting for the child to take them.
    pub fn pending_input(&self) -> usize {
        self.active.as_ref().map_or(0, |active| active.input.len())
    }

    /// Send keys written in escaped notation (`\n`, `\e`, `\x03`, ...).
    pub fn write_keystrokes(&mut self, text: &str) {
        if self.active.is_some() {
            self.write_input(&decode_keystrokes(text));
        }
    }

    /// Send pasted text, bracketed when the child asked for it.
    pub fn paste(&mut self, text: &str) {
        if self.active.is_some() {
            let bytes = paste_bytes(text, self.vt.bracketed_paste());
            self.write_input(&bytes);
        }
    }

    /// Resize child and emulator to the pane size, with the same floor as
    /// [`start_session`](Self::start_session). Ignored when idle.
    pub fn resize(&mut self, rows: u16, cols: u16) {
        let Some(active) = self.active.as_ref() else {
            return;
        };
        let (rows, cols) = clamp_viewport((rows, cols));
        if let Err(e) = active.pty.resize(rows, cols) {
            log::warn!("terminal resize failed: {e}");
            self.teardown(format!("Error resizing terminal: {e}"));
            return;
        }
        self.vt.resize(rows, cols);
        self.notify(SessionEvent::Redraw);
    }

    /// Everything the current (or last) session wrote.
    pub fn get_full_output(&self) -> String {
        self.ledger.read_all()
    }

    /// Output since the previous call.
    pub fn get_new_output(&mut self) -> String {
        self.ledger.read_new()
    }

    /// Styled runs of the current screen for rendering.
    pub fn project(&self) -> Vec<Fragment> {
        panechat_vt::project(&self.vt.screen(), &self.vt.cursor())
    }

    pub fn vt(&self) -> &VtTerminal {
        &self.vt
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn process_id(&self) -> Option<u32> {
        self.active.as_ref().and_then(|active| active.pty.process_id())
    }

    fn teardown(&mut self, message: String) {
        let Some(ActiveSession { watch, mut pty, input }) = self.active.take() else {
            return;
        };
        drop(watch);
        if !input.is_empty() {
            log::debug!("dropping {} bytes of unsent input", input.len());
        }
        pty.terminate();
        log::info!("{message}");

        self.notify(SessionEvent::Message(message));
        self.notify(SessionEvent::Stopped);
        self.notify(SessionEvent::Redraw);
    }

    fn notify(&self, event: SessionEvent) {
        // A host that went away no longer cares.
        let _ = self.events.send(event);
    }
}

fn clamp_viewport((rows, cols): (u16, u16)) -> (u16, u16) {
    (rows.max(MIN_ROWS), cols.max(MIN_COLS))
}

/// Bytes for a paste. Line breaks become carriage returns, as a keyboard
/// would send them.
fn paste_bytes(text: &str, bracketed: bool) -> Vec<u8> {
    let body = text.replace("\r\n", "\r").replace('\n', "\r");
    let mut bytes = Vec::with_capacity(body.len() + 12);
    if bracketed {
        bytes.extend_from_slice(BRACKETED_PASTE_START);
    }
    bytes.extend_from_slice(body.as_bytes());
    if bracketed {
        bytes.extend_from_slice(BRACKETED_PASTE_END);
    }
    bytes
}
