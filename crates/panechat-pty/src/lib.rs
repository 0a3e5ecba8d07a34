//! panechat-pty: the embedded shell session for panechat.
//!
//! This crate sits between the PTY (real shell process) and the VT terminal
//! (screen state). The host's event loop waits on PTY readiness, the
//! controller reads what the shell wrote, records it and feeds it into
//! `VtTerminal`, and user input flows back the other way.
//!
//! # Architecture
//!
//! - [`PtyHandle`]: low-level PTY process management (spawn, non-blocking
//!   read, write, resize, terminate).
//! - [`OutputLedger`]: raw output history with a read cursor.
//! - [`SessionController`]: owns at most one running session and everything
//!   it produced, and reports lifecycle changes as [`SessionEvent`]s.

pub mod keys;
pub mod ledger;
pub mod pty;
pub mod session;

pub use keys::{decode_keystrokes, escape_keystrokes};
pub use ledger::OutputLedger;
pub use pty::{PtyError, PtyFd, PtyHandle, PtyRead, SpawnConfig};
pub use session::{SessionController, SessionEvent, MIN_COLS, MIN_ROWS};
