//! Maps parsed actions onto screen operations.

use crate::cell::{CellFlags, Color, Pen, Rgb};
use crate::parser::{CsiSequence, Perform};
use crate::screen::{Screen, TermMode};

impl Perform for Screen {
    fn print(&mut self, ch: char) {
        self.put_char(ch);
    }

    fn execute(&mut self, byte: u8) {
        match byte {
            0x07 => self.bell = true,
            0x08 => self.backspace(),
            0x09 => self.tab(),
            0x0A..=0x0C => self.linefeed(),
            0x0D => self.carriage_return(),
            _ => {}
        }
    }

    fn csi_dispatch(&mut self, csi: &CsiSequence<'_>) {
        match (csi.private, csi.intermediates, csi.action) {
            (None, [], action) => self.csi_plain(csi, action),
            (Some(b'?'), [], b'h') => self.set_private_modes(csi.params, true),
            (Some(b'?'), [], b'l') => self.set_private_modes(csi.params, false),
            (Some(b'>'), [], b'c') => self.respond("\x1b[>0;0;0c"),
            (None, [b'!'], b'p') => self.soft_reset(),
            _ => log::trace!("ignoring CSI {:?}", csi),
        }
    }

    fn esc_dispatch(&mut self, intermediates: &[u8], byte: u8) {
        // Charset designators and DECALN arrive with an intermediate; none of
        // them change what this emulator draws.
        if !intermediates.is_empty() {
            return;
        }
        match byte {
            b'7' => self.save_cursor(),
            b'8' => self.restore_cursor(),
            b'D' => self.index(),
            b'E' => {
                self.index();
                self.carriage_return();
            }
            b'M' => self.reverse_index(),
            b'c' => self.reset(),
            b'=' | b'>' => {}
            _ => log::trace!("ignoring ESC {:?}", byte as char),
        }
    }

    fn osc_dispatch(&mut self, payload: &[u8]) {
        let mut parts = payload.splitn(2, |&b| b == b';');
        let command = parts.next().unwrap_or_default();
        let Some(text) = parts.next() else {
            return;
        };
        if command == b"0" || command == b"2" {
            self.title = Some(String::from_utf8_lossy(text).into_owned());
        }
    }
}

impl Screen {
    fn csi_plain(&mut self, csi: &CsiSequence<'_>, action: u8) {
        match action {
            b'A' => self.move_up(csi.count(0)),
            b'B' | b'e' => self.move_down(csi.count(0)),
            b'C' | b'a' => self.move_forward(csi.count(0)),
            b'D' => self.move_back(csi.count(0)),
            b'E' => {
                self.move_down(csi.count(0));
                self.carriage_return();
            }
            b'F' => {
                self.move_up(csi.count(0));
                self.carriage_return();
            }
            b'G' | b'`' => self.move_to(self.row, csi.count(0) - 1),
            b'd' => self.move_to(csi.count(0) - 1, self.col),
            b'H' | b'f' => self.move_to(csi.count(0) - 1, csi.count(1) - 1),
            b'J' => self.erase_display(csi.param(0, 0)),
            b'K' => self.erase_line(csi.param(0, 0)),
            b'L' => self.insert_lines(csi.count(0)),
            b'M' => self.delete_lines(csi.count(0)),
            b'@' => self.insert_chars(csi.count(0)),
            b'P' => self.delete_chars(csi.count(0)),
            b'X' => self.erase_chars(csi.count(0)),
            b'S' => self.scroll_up(csi.count(0)),
            b'T' => self.scroll_down(csi.count(0)),
            b'r' => self.set_scroll_region(csi.param(0, 0), csi.param(1, 0)),
            b's' => self.save_cursor(),
            b'u' => self.restore_cursor(),
            b'm' => self.select_graphic_rendition(csi.params),
            b'h' => self.set_ansi_modes(csi.params, true),
            b'l' => self.set_ansi_modes(csi.params, false),
            b'n' => match csi.param(0, 0) {
                5 => self.respond("\x1b[0n"),
                6 => {
                    let reply = format!("\x1b[{};{}R", self.row + 1, self.col + 1);
                    self.respond(&reply);
                }
                _ => {}
            },
            b'c' if csi.param(0, 0) == 0 => self.respond("\x1b[?1;2c"),
            _ => log::trace!("ignoring CSI {:?}", action as char),
        }
    }

    fn set_ansi_modes(&mut self, params: &[u16], enable: bool) {
        for &mode in params {
            if mode == 20 {
                self.mode.set(TermMode::NEWLINE, enable);
            }
        }
    }

    fn set_private_modes(&mut self, params: &[u16], enable: bool) {
        for &mode in params {
            match mode {
                1 => self.mode.set(TermMode::APP_CURSOR, enable),
                7 => self.mode.set(TermMode::AUTOWRAP, enable),
                25 => self.mode.set(TermMode::SHOW_CURSOR, enable),
                47 | 1047 => self.set_alternate_screen(enable, false),
                1049 => self.set_alternate_screen(enable, true),
                2004 => self.mode.set(TermMode::BRACKETED_PASTE, enable),
                _ => log::trace!("ignoring private mode {}", mode),
            }
        }
    }

    fn select_graphic_rendition(&mut self, params: &[u16]) {
        if params.is_empty() {
            self.pen = Pen::default();
            return;
        }
        let mut iter = params.iter().copied();
        while let Some(param) = iter.next() {
            let pen = &mut self.pen;
            match param {
                0 => *pen = Pen::default(),
                1 => pen.flags.insert(CellFlags::BOLD),
                2 => pen.flags.insert(CellFlags::DIM),
                3 => pen.flags.insert(CellFlags::ITALIC),
                4 | 21 => pen.flags.insert(CellFlags::UNDERLINE),
                7 => pen.flags.insert(CellFlags::REVERSE),
                9 => pen.flags.insert(CellFlags::STRIKETHROUGH),
                22 => pen.flags.remove(CellFlags::BOLD | CellFlags::DIM),
                23 => pen.flags.remove(CellFlags::ITALIC),
                24 => pen.flags.remove(CellFlags::UNDERLINE),
                27 => pen.flags.remove(CellFlags::REVERSE),
                29 => pen.flags.remove(CellFlags::STRIKETHROUGH),
                30..=37 => pen.fg = Color::Indexed((param - 30) as u8),
                38 => {
                    if let Some(color) = extended_color(&mut iter) {
                        pen.fg = color;
                    }
                }
                39 => pen.fg = Color::Default,
                40..=47 => pen.bg = Color::Indexed((param - 40) as u8),
                48 => {
                    if let Some(color) = extended_color(&mut iter) {
                        pen.bg = color;
                    }
                }
                49 => pen.bg = Color::Default,
                90..=97 => pen.fg = Color::Indexed((param - 90 + 8) as u8),
                100..=107 => pen.bg = Color::Indexed((param - 100 + 8) as u8),
                _ => {}
            }
        }
    }
}

/// Parse the tail of `38;5;n` or `38;2;r;g;b`, consuming what it uses.
fn extended_color(iter: &mut impl Iterator<Item = u16>) -> Option<Color> {
    let channel = |value: Option<u16>| value.map(|v| v.min(255) as u8);
    match iter.next()? {
        5 => channel(iter.next()).map(Color::Indexed),
        2 => {
            let r = channel(iter.next())?;
            let g = channel(iter.next())?;
            let b = channel(iter.next())?;
            Some(Color::Rgb(Rgb::new(r, g, b)))
        }
        _ => None,
    }
}
