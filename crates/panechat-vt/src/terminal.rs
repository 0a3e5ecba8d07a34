use crate::parser::Parser;
use crate::screen::{CursorState, Screen, ScreenView, TermMode};

/// The core terminal emulator.
///
/// Owns the escape-sequence parser and the screen grid it drives. Bytes from
/// the child go in through [`feed`](Self::feed); the host reads the result
/// through [`screen`](Self::screen) and [`cursor`](Self::cursor).
#[derive(Debug)]
pub struct VtTerminal {
    parser: Parser,
    screen: Screen,
}

impl VtTerminal {
    /// Create a new terminal with the given dimensions. Zero is treated as
    /// one.
    pub fn new(rows: u16, cols: u16) -> Self {
        Self {
            parser: Parser::new(),
            screen: Screen::new(rows, cols),
        }
    }

    /// Feed raw PTY output bytes into the terminal.
    ///
    /// The bytes may be split anywhere, including inside an escape sequence
    /// or a UTF-8 glyph.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.parser.advance(&mut self.screen, bytes);
    }

    /// Resize the terminal, keeping the top-left content.
    pub fn resize(&mut self, rows: u16, cols: u16) {
        self.screen.resize(rows, cols);
    }

    /// Back to the power-on state at the current size.
    pub fn reset(&mut self) {
        self.parser = Parser::new();
        self.screen.reset();
    }

    /// Get a read-only view of the terminal screen.
    pub fn screen(&self) -> ScreenView<'_> {
        ScreenView::new(&self.screen)
    }

    pub fn cursor(&self) -> CursorState {
        self.screen.cursor()
    }

    /// Title set by OSC 0 or OSC 2, if any.
    pub fn title(&self) -> Option<&str> {
        self.screen.title.as_deref()
    }

    /// Drain replies to device queries (DSR, DA). These must be written back
    /// to the child.
    pub fn take_responses(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.screen.responses)
    }

    /// Check and clear the bell flag.
    ///
    /// Returns `true` if the bell has rung since the last call.
    pub fn has_bell(&mut self) -> bool {
        std::mem::replace(&mut self.screen.bell, false)
    }

    /// Whether cursor keys should be sent in application mode (DECCKM).
    pub fn application_cursor(&self) -> bool {
        self.screen.mode.contains(TermMode::APP_CURSOR)
    }

    pub fn bracketed_paste(&self) -> bool {
        self.screen.mode.contains(TermMode::BRACKETED_PASTE)
    }

    pub fn alternate_screen(&self) -> bool {
        self.screen.mode.contains(TermMode::ALTERNATE_SCREEN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{CellFlags, Color, Rgb};
    use proptest::prelude::*;

    fn term_with(rows: u16, cols: u16, bytes: &[u8]) -> VtTerminal {
        let mut term = VtTerminal::new(rows, cols);
        term.feed(bytes);
        term
    }

    #[test]
    fn test_create_terminal_dimensions() {
        let term = VtTerminal::new(24, 80);
        let screen = term.screen();
        assert_eq!(screen.rows(), 24);
        assert_eq!(screen.cols(), 80);
    }

    #[test]
    fn test_write_hello() {
        let term = term_with(24, 80, b"hello");
        let screen = term.screen();
        assert_eq!(screen.cell(0, 0).glyph, 'h');
        assert_eq!(screen.cell(0, 4).glyph, 'o');
        assert_eq!(screen.cell(0, 5).glyph, ' ');
        assert_eq!(term.cursor().col, 5);
    }

    #[test]
    fn test_newline_moves_to_column_zero() {
        let term = term_with(24, 80, b"ok\n");
        let cursor = term.cursor();
        assert_eq!((cursor.row, cursor.col), (1, 0));
        assert_eq!(term.screen().row_text(0), "ok");

        let term = term_with(24, 80, b"ok\n$ ");
        assert_eq!(term.screen().row_text(1), "$");
        assert_eq!(term.cursor().col, 2);
    }

    #[test]
    fn test_linefeed_without_newline_mode_keeps_column() {
        let term = term_with(5, 10, b"\x1b[20lab\ncd");
        assert_eq!(term.screen().row_text(1), "  cd");
    }

    #[test]
    fn test_deferred_wrap() {
        let mut term = term_with(5, 10, b"0123456789");
        // Cursor parks on the last column until the next glyph arrives.
        assert_eq!((term.cursor().row, term.cursor().col), (0, 9));
        term.feed(b"AB");
        assert_eq!((term.cursor().row, term.cursor().col), (1, 2));
        assert_eq!(term.screen().row_text(1), "AB");

        // A carriage return cancels the pending wrap.
        let term = term_with(5, 10, b"0123456789\rX");
        assert_eq!(term.screen().row_text(0), "X123456789");
    }

    #[test]
    fn test_autowrap_disabled_overwrites_last_column() {
        let term = term_with(5, 5, b"\x1b[?7labcdefg");
        assert_eq!(term.screen().row_text(0), "abcdg");
        assert_eq!(term.cursor().row, 0);
    }

    #[test]
    fn test_wide_glyphs_take_two_cells() {
        let term = term_with(2, 20, "漢字ab".as_bytes());
        assert_eq!(term.cursor().col, 6);
        let screen = term.screen();
        assert_eq!(screen.row_text(0), "漢字ab");
        assert!(screen.cell(0, 0).is_wide());
        assert!(screen.cell(0, 1).is_spacer());
        assert_eq!(screen.cell(0, 4).glyph, 'a');
    }

    #[test]
    fn test_wide_glyph_wraps_before_margin() {
        let term = term_with(2, 5, "abcd漢".as_bytes());
        let screen = term.screen();
        assert_eq!(screen.row_text(0), "abcd");
        assert_eq!(screen.row_text(1), "漢");
        assert_eq!((term.cursor().row, term.cursor().col), (1, 2));
    }

    #[test]
    fn test_overwriting_half_of_wide_glyph() {
        let term = term_with(2, 10, "漢\rx".as_bytes());
        let screen = term.screen();
        assert_eq!(screen.cell(0, 0).glyph, 'x');
        assert_eq!(screen.cell(0, 1).glyph, ' ');
        assert_eq!(screen.cell(0, 1).width, 1);

        let term = term_with(2, 10, "漢\x1b[2Gy".as_bytes());
        let screen = term.screen();
        assert_eq!(screen.row_text(0), " y");
        assert!(!screen.cell(0, 0).is_wide());
    }

    #[test]
    fn test_combining_marks_are_dropped() {
        let term = term_with(2, 10, "e\u{301}x".as_bytes());
        assert_eq!(term.screen().row_text(0), "ex");
        assert_eq!(term.cursor().col, 2);
    }

    #[test]
    fn test_scrolls_at_bottom() {
        let term = term_with(3, 10, b"a\nb\nc\nd");
        let screen = term.screen();
        assert_eq!(screen.text(), "b\nc\nd");
        assert_eq!(term.cursor().row, 2);
    }

    #[test]
    fn test_scroll_region() {
        // Region rows 2..=3; row 1 and row 4 stay put.
        let mut term = term_with(4, 10, b"top\r\n1\r\n2\r\nbottom");
        term.feed(b"\x1b[2;3r\x1b[3;1H\nnew");
        assert_eq!(term.screen().text(), "top\n2\nnew\nbottom");
    }

    #[test]
    fn test_erase_display_blanks_and_homes() {
        let mut term = term_with(4, 10, b"\x1b[44mone\r\ntwo\r\nthree");
        term.feed(b"\x1b[2J");
        let screen = term.screen();
        for row in 0..screen.rows() {
            for col in 0..screen.cols() {
                assert_eq!(screen.cell(row, col).glyph, ' ');
            }
        }
        assert_eq!((term.cursor().row, term.cursor().col), (0, 0));
        // Back-color-erase keeps the current background.
        assert_eq!(term.screen().cell(3, 9).bg, Color::Indexed(4));
    }

    #[test]
    fn test_erase_line_variants() {
        let mut term = term_with(2, 10, b"abcdefghij\x1b[1;5H");
        term.feed(b"\x1b[K");
        assert_eq!(term.screen().row_text(0), "abcd");
        term.feed(b"\x1b[1;2H\x1b[1K");
        assert_eq!(term.screen().row_text(0), "  cd");
        term.feed(b"\x1b[2K");
        assert_eq!(term.screen().row_text(0), "");
    }

    #[test]
    fn test_cursor_movement_clamps() {
        let mut term = term_with(5, 10, b"\x1b[99;99H");
        assert_eq!((term.cursor().row, term.cursor().col), (4, 9));
        term.feed(b"\x1b[99A\x1b[99D");
        assert_eq!((term.cursor().row, term.cursor().col), (0, 0));
        term.feed(b"\x1b[3G\x1b[2d");
        assert_eq!((term.cursor().row, term.cursor().col), (1, 2));
    }

    #[test]
    fn test_insert_and_delete_chars() {
        let mut term = term_with(2, 10, b"abcdef\x1b[1;3H");
        term.feed(b"\x1b[2@");
        assert_eq!(term.screen().row_text(0), "ab  cdef");
        term.feed(b"\x1b[3P");
        assert_eq!(term.screen().row_text(0), "abdef");
        term.feed(b"\x1b[2X");
        assert_eq!(term.screen().row_text(0), "ab  f");
    }

    #[test]
    fn test_insert_and_delete_lines() {
        let mut term = term_with(4, 10, b"a\r\nb\r\nc\r\nd\x1b[2;1H");
        term.feed(b"\x1b[L");
        assert_eq!(term.screen().text(), "a\n\nb\nc");
        term.feed(b"\x1b[2M");
        assert_eq!(term.screen().text(), "a\nc\n\n");
    }

    #[test]
    fn test_tab_stops() {
        let term = term_with(2, 20, b"a\tb");
        assert_eq!(term.screen().cell(0, 8).glyph, 'b');
        let term = term_with(2, 10, b"\t\t\tx");
        assert_eq!(term.screen().cell(0, 9).glyph, 'x');
    }

    #[test]
    fn test_sgr_attributes_and_colors() {
        let term = term_with(2, 20, b"\x1b[1;4;31mA\x1b[22;24;39mB\x1b[38;5;200;48;2;1;2;3mC\x1b[0mD");
        let screen = term.screen();
        let a = screen.cell(0, 0);
        assert!(a.flags.contains(CellFlags::BOLD | CellFlags::UNDERLINE));
        assert_eq!(a.fg, Color::Indexed(1));

        let b = screen.cell(0, 1);
        assert!(b.flags.is_empty());
        assert_eq!(b.fg, Color::Default);

        let c = screen.cell(0, 2);
        assert_eq!(c.fg, Color::Indexed(200));
        assert_eq!(c.bg, Color::Rgb(Rgb::new(1, 2, 3)));

        let d = screen.cell(0, 3);
        assert_eq!(d.fg, Color::Default);
        assert_eq!(d.bg, Color::Default);
    }

    #[test]
    fn test_bright_colors() {
        let term = term_with(1, 4, b"\x1b[91;102mX");
        let cell = term.screen().cell(0, 0);
        assert_eq!(cell.fg, Color::Indexed(9));
        assert_eq!(cell.bg, Color::Indexed(10));
    }

    #[test]
    fn test_save_restore_cursor() {
        let mut term = term_with(5, 10, b"\x1b[2;3H\x1b[1m\x1b7\x1b[5;5H\x1b[0m");
        term.feed(b"\x1b8x");
        assert_eq!(term.screen().cell(1, 2).glyph, 'x');
        assert!(term.screen().cell(1, 2).flags.contains(CellFlags::BOLD));

        term.feed(b"\x1b[4;1H\x1b[s\x1b[1;1H\x1b[uy");
        assert_eq!(term.screen().cell(3, 0).glyph, 'y');
    }

    #[test]
    fn test_alternate_screen_restores_primary() {
        let mut term = term_with(3, 10, b"shell$ ");
        term.feed(b"\x1b[?1049h\x1b[2J\x1b[Hfull screen");
        assert!(term.alternate_screen());
        assert_eq!(term.screen().row_text(0), "full scree");

        term.feed(b"\x1b[?1049l");
        assert!(!term.alternate_screen());
        assert_eq!(term.screen().row_text(0), "shell$");
        assert_eq!((term.cursor().row, term.cursor().col), (0, 7));
    }

    #[test]
    fn test_resize_preserves_top_left_and_clamps_cursor() {
        let mut term = term_with(5, 10, b"abcdefghij\r\nklm\x1b[5;10H");
        term.resize(3, 4);
        let screen = term.screen();
        assert_eq!((screen.rows(), screen.cols()), (3, 4));
        assert_eq!(screen.row_text(0), "abcd");
        assert_eq!(screen.row_text(1), "klm");
        assert_eq!((term.cursor().row, term.cursor().col), (2, 3));

        term.resize(6, 12);
        let screen = term.screen();
        assert_eq!((screen.rows(), screen.cols()), (6, 12));
        assert_eq!(screen.row_text(0), "abcd");
        assert_eq!(screen.cell(5, 11).glyph, ' ');
    }

    #[test]
    fn test_resize_in_alternate_screen_keeps_primary() {
        let mut term = term_with(4, 8, b"prompt\x1b[?1049hvim");
        term.resize(2, 3);
        term.feed(b"\x1b[?1049l");
        assert_eq!(term.screen().row_text(0), "pro");
    }

    #[test]
    fn test_device_status_responses() {
        let mut term = term_with(24, 80, b"\x1b[3;7H\x1b[6n");
        assert_eq!(term.take_responses(), b"\x1b[3;7R");
        assert!(term.take_responses().is_empty());

        term.feed(b"\x1b[5n\x1b[c");
        assert_eq!(term.take_responses(), b"\x1b[0n\x1b[?1;2c");
    }

    #[test]
    fn test_modes() {
        let mut term = VtTerminal::new(24, 80);
        assert!(!term.application_cursor());
        assert!(!term.bracketed_paste());
        assert!(term.cursor().visible);

        term.feed(b"\x1b[?1h\x1b[?2004h\x1b[?25l");
        assert!(term.application_cursor());
        assert!(term.bracketed_paste());
        assert!(!term.cursor().visible);

        term.feed(b"\x1b[!p");
        assert!(!term.application_cursor());
        assert!(term.cursor().visible);
    }

    #[test]
    fn test_title_change() {
        let mut term = term_with(24, 80, b"\x1b]0;My Terminal\x07");
        assert_eq!(term.title(), Some("My Terminal"));
        term.feed(b"\x1b]2;other\x1b\\");
        assert_eq!(term.title(), Some("other"));
        // OSC 8 hyperlinks are dropped.
        term.feed(b"\x1b]8;;http://x\x07");
        assert_eq!(term.title(), Some("other"));
    }

    #[test]
    fn test_bell() {
        let mut term = VtTerminal::new(24, 80);
        assert!(!term.has_bell());
        term.feed(b"\x07");
        assert!(term.has_bell());
        assert!(!term.has_bell());
    }

    #[test]
    fn test_full_reset() {
        let mut term = term_with(3, 10, b"\x1b[31mtext\x1b[?1h");
        term.feed(b"\x1bc");
        assert_eq!(term.screen().text(), "\n\n");
        assert!(!term.application_cursor());
        assert_eq!((term.cursor().row, term.cursor().col), (0, 0));
    }

    #[test]
    fn test_interrupted_sequence_keeps_following_text() {
        let term = term_with(2, 20, b"\x1b[12\nok");
        assert_eq!(term.screen().row_text(1), "ok");
    }

    fn escape_heavy() -> impl Strategy<Value = Vec<u8>> {
        let token = prop_oneof![
            Just(b"\x1b[".to_vec()),
            Just(b"\x1b]0;t".to_vec()),
            Just(b"\x1b[?1049h".to_vec()),
            Just(b"\x1b[2J".to_vec()),
            Just(b"\x07".to_vec()),
            Just(b"\r\n".to_vec()),
            Just("é漢".as_bytes().to_vec()),
            Just(b";".to_vec()),
            Just(b"\x1b".to_vec()),
            (0u8..=9).prop_map(|d| vec![b'0' + d]),
            (0x20u8..0x7f).prop_map(|b| vec![b]),
        ];
        prop::collection::vec(token, 0..64).prop_map(|tokens| tokens.concat())
    }

    fn snapshot(term: &VtTerminal) -> (String, Vec<crate::cell::Cell>, CursorState) {
        let screen = term.screen();
        let cells = (0..screen.rows())
            .flat_map(|row| screen.row_cells(row).to_vec())
            .collect();
        (screen.text(), cells, term.cursor())
    }

    proptest! {
        #[test]
        fn split_feed_is_deterministic(bytes in prop::collection::vec(any::<u8>(), 0..256), split in any::<prop::sample::Index>()) {
            let at = split.index(bytes.len() + 1);
            let whole = term_with(6, 12, &bytes);
            let mut parts = VtTerminal::new(6, 12);
            parts.feed(&bytes[..at]);
            parts.feed(&bytes[at..]);
            prop_assert_eq!(snapshot(&whole), snapshot(&parts));
        }

        #[test]
        fn split_feed_is_deterministic_for_escapes(bytes in escape_heavy(), split in any::<prop::sample::Index>()) {
            let at = split.index(bytes.len() + 1);
            let mut whole = term_with(6, 12, &bytes);
            let mut parts = VtTerminal::new(6, 12);
            parts.feed(&bytes[..at]);
            parts.feed(&bytes[at..]);
            prop_assert_eq!(snapshot(&whole), snapshot(&parts));
            prop_assert_eq!(whole.take_responses(), parts.take_responses());
            prop_assert_eq!(whole.title(), parts.title());
        }

        #[test]
        fn cursor_stays_in_bounds(bytes in escape_heavy(), rows in 1u16..8, cols in 1u16..8) {
            let term = term_with(rows, cols, &bytes);
            let cursor = term.cursor();
            prop_assert!(cursor.row < rows && cursor.col < cols);
        }
    }
}
