use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::time::{Duration, Instant};

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};

/// Largest chunk taken from the master in one read.
const READ_CHUNK: usize = 16 * 1024;
/// Time a child gets to exit after SIGHUP before it is killed.
const TERMINATE_GRACE: Duration = Duration::from_millis(500);
const REAP_POLL: Duration = Duration::from_millis(25);

/// Errors from PTY operations.
#[derive(Debug)]
pub enum PtyError {
    SpawnFailed(String),
    Io(io::Error),
    ResizeFailed(String),
    /// The handle has already been terminated.
    Inactive,
}

impl std::fmt::Display for PtyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PtyError::SpawnFailed(msg) => write!(f, "PTY spawn failed: {msg}"),
            PtyError::Io(err) => write!(f, "PTY I/O error: {err}"),
            PtyError::ResizeFailed(msg) => write!(f, "PTY resize failed: {msg}"),
            PtyError::Inactive => write!(f, "PTY session is not active"),
        }
    }
}

impl std::error::Error for PtyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PtyError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for PtyError {
    fn from(err: io::Error) -> Self {
        PtyError::Io(err)
    }
}

/// Outcome of one non-blocking read from the master.
#[derive(Debug, PartialEq, Eq)]
pub enum PtyRead {
    Data(Vec<u8>),
    /// Nothing available right now.
    WouldBlock,
    /// The child side is closed.
    Eof,
}

/// How to launch the child shell.
#[derive(Clone, Debug)]
pub struct SpawnConfig {
    /// Program to run. `None` uses `$SHELL`, then `/bin/sh`.
    pub shell: Option<String>,
    /// Value of `TERM` in the child's environment.
    pub term: String,
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self {
            shell: None,
            term: "xterm-256color".to_string(),
        }
    }
}

/// The master descriptor, borrowed for reactor registration.
///
/// Does not own the descriptor; the [`PtyHandle`] it came from must outlive
/// any registration built on it.
#[derive(Clone, Copy, Debug)]
pub struct PtyFd(RawFd);

impl AsRawFd for PtyFd {
    fn as_raw_fd(&self) -> RawFd {
        self.0
    }
}

/// Owns a portable-pty child process and its master side.
///
/// The master descriptor is non-blocking: reads and writes go through
/// [`read_nonblocking`](Self::read_nonblocking) and
/// [`write_nonblocking`](Self::write_nonblocking) once the reactor reports
/// readiness.
pub struct PtyHandle {
    master: Option<Box<dyn MasterPty + Send>>,
    child: Option<Box<dyn Child + Send + Sync>>,
    fd: RawFd,
    pid: Option<u32>,
}

impl PtyHandle {
    /// Spawn the configured shell on a new PTY of `rows × cols`.
    pub fn spawn(config: &SpawnConfig, rows: u16, cols: u16) -> Result<Self, PtyError> {
        let pty_system = native_pty_system();

        let pair = pty_system
            .openpty(pty_size(rows, cols))
            .map_err(|e| PtyError::SpawnFailed(format!("failed to open PTY: {e}")))?;

        let program = config.shell.clone().unwrap_or_else(default_shell);
        let mut cmd = CommandBuilder::new(&program);
        cmd.env("TERM", &config.term);
        if let Ok(cwd) = std::env::current_dir() {
            cmd.cwd(cwd);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| PtyError::SpawnFailed(format!("failed to spawn {program}: {e}")))?;
        // The child holds its own copy; keeping ours would stop EOF from
        // ever reaching the master.
        drop(pair.slave);

        let fd = pair
            .master
            .as_raw_fd()
            .ok_or_else(|| PtyError::SpawnFailed("PTY master has no descriptor".to_string()))?;
        set_nonblocking(fd)?;

        let pid = child.process_id();
        log::info!("spawned {program} (pid {pid:?}) on a {rows}x{cols} PTY");

        Ok(Self {
            master: Some(pair.master),
            child: Some(child),
            fd,
            pid,
        })
    }

    /// Read whatever the child has written, without blocking.
    pub fn read_nonblocking(&self) -> Result<PtyRead, PtyError> {
        if self.master.is_none() {
            return Err(PtyError::Inactive);
        }
        let mut buf = vec![0u8; READ_CHUNK];
        // SAFETY: `fd` stays open while `master` is Some, and `buf` is a valid
        // writable region of `buf.len()` bytes.
        let n = unsafe { libc::read(self.fd, buf.as_mut_ptr().cast(), buf.len()) };
        if n > 0 {
            buf.truncate(n as usize);
            return Ok(PtyRead::Data(buf));
        }
        if n == 0 {
            return Ok(PtyRead::Eof);
        }
        let err = io::Error::last_os_error();
        // Linux reports a hung-up subordinate side as EIO rather than EOF.
        if err.raw_os_error() == Some(libc::EIO) {
            return Ok(PtyRead::Eof);
        }
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => Ok(PtyRead::WouldBlock),
            _ => Err(err.into()),
        }
    }

    /// Write as much of `data` as the child's input queue takes, without
    /// blocking. Returns the number of bytes accepted, `0` when the queue is
    /// full.
    pub fn write_nonblocking(&self, data: &[u8]) -> Result<usize, PtyError> {
        if self.master.is_none() {
            return Err(PtyError::Inactive);
        }
        if data.is_empty() {
            return Ok(0);
        }
        // SAFETY: `fd` stays open while `master` is Some, and `data` is a
        // valid readable region of `data.len()` bytes.
        let n = unsafe { libc::write(self.fd, data.as_ptr().cast(), data.len()) };
        if n >= 0 {
            return Ok(n as usize);
        }
        let err = io::Error::last_os_error();
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => Ok(0),
            _ => Err(err.into()),
        }
    }

    /// Resize the PTY to new dimensions.
    pub fn resize(&self, rows: u16, cols: u16) -> Result<(), PtyError> {
        let master = self.master.as_ref().ok_or(PtyError::Inactive)?;
        master
            .resize(pty_size(rows, cols))
            .map_err(|e| PtyError::ResizeFailed(format!("{e}")))
    }

    /// The master descriptor, for registering read readiness.
    pub fn reactor_fd(&self) -> PtyFd {
        PtyFd(self.fd)
    }

    pub fn raw_fd(&self) -> RawFd {
        self.fd
    }

    pub fn process_id(&self) -> Option<u32> {
        self.pid
    }

    pub fn is_terminated(&self) -> bool {
        self.child.is_none()
    }

    /// Get the child process exit status if it has exited.
    ///
    /// Returns `None` if the process is still running or was already handed
    /// to the reaper.
    pub fn try_wait(&mut self) -> Option<u32> {
        match self.child.as_mut()?.try_wait() {
            Ok(Some(status)) => Some(status.exit_code()),
            _ => None,
        }
    }

    /// Hang up on the child and close the master. Safe to call repeatedly.
    ///
    /// The child gets [`TERMINATE_GRACE`] to exit before it is killed. Inside
    /// a tokio runtime the wait happens on a task; otherwise it blocks.
    pub fn terminate(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        let pid = self.pid;
        signal(pid, libc::SIGHUP);
        self.master = None;

        if let Ok(Some(status)) = child.try_wait() {
            log::debug!("child {pid:?} already exited with {}", status.exit_code());
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(reap(child, pid));
            }
            Err(_) => reap_blocking(child, pid),
        }
    }
}

impl Drop for PtyHandle {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn pty_size(rows: u16, cols: u16) -> PtySize {
    PtySize {
        rows,
        cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

/// Returns the user's default shell, falling back to `/bin/sh`.
fn default_shell() -> String {
    std::env::var("SHELL")
        .ok()
        .filter(|shell| !shell.is_empty())
        .unwrap_or_else(|| "/bin/sh".to_string())
}

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    // SAFETY: plain fcntl flag manipulation on a descriptor we own.
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags < 0 {
            return Err(io::Error::last_os_error());
        }
        if libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

fn signal(pid: Option<u32>, sig: libc::c_int) {
    let Some(pid) = pid.and_then(|pid| libc::pid_t::try_from(pid).ok()) else {
        return;
    };
    // SAFETY: kill(2) has no memory-safety preconditions.
    if unsafe { libc::kill(pid, sig) } < 0 {
        log::debug!("kill({pid}, {sig}) failed: {}", io::Error::last_os_error());
    }
}

async fn reap(mut child: Box<dyn Child + Send + Sync>, pid: Option<u32>) {
    let deadline = Instant::now() + TERMINATE_GRACE;
    while Instant::now() < deadline {
        match child.try_wait() {
            Ok(Some(status)) => {
                log::debug!("child {pid:?} exited with {}", status.exit_code());
                return;
            }
            Ok(None) => tokio::time::sleep(REAP_POLL).await,
            Err(e) => {
                log::warn!("failed to poll child {pid:?}: {e}");
                return;
            }
        }
    }
    log::warn!("child {pid:?} ignored SIGHUP, killing");
    signal(pid, libc::SIGKILL);
    if let Err(e) = tokio::task::spawn_blocking(move || child.wait()).await {
        log::warn!("reaper for {pid:?} failed: {e}");
    }
}

fn reap_blocking(mut child: Box<dyn Child + Send + Sync>, pid: Option<u32>) {
    let deadline = Instant::now() + TERMINATE_GRACE;
    while Instant::now() < deadline {
        match child.try_wait() {
            Ok(Some(_)) => return,
            Ok(None) => std::thread::sleep(REAP_POLL),
            Err(_) => return,
        }
    }
    signal(pid, libc::SIGKILL);
    let _ = child.wait();
}
