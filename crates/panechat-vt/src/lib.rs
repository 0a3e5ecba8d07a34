//! panechat-vt: terminal emulation engine for panechat.
//!
//! A byte-level escape-sequence parser drives a fixed-size grid of styled
//! cells with cursor tracking. The subset implemented is what an interactive
//! shell and common full-screen programs need. The [`project`] module turns
//! the grid into styled text runs for rendering.

pub mod cell;
mod dispatch;
pub mod parser;
pub mod project;
pub mod screen;
pub mod terminal;

pub use cell::{Cell, CellFlags, Color, Pen, Rgb};
pub use project::{lines, project, Fragment, Style, StyleRun};
pub use screen::{CursorState, ScreenView};
pub use terminal::VtTerminal;
