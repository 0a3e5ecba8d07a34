use bitflags::bitflags;
use unicode_width::UnicodeWidthChar;

use crate::cell::{Cell, Pen};

/// Column interval of horizontal tab stops.
const TAB_WIDTH: u16 = 8;

bitflags! {
    /// Terminal modes toggled by SM/RM and DECSET/DECRST.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct TermMode: u8 {
        /// DECAWM: wrap to the next row at the right margin.
        const AUTOWRAP           = 0b0000_0001;
        /// LNM: line feed also returns to column 0.
        const NEWLINE            = 0b0000_0010;
        /// DECCKM: cursor keys send `ESC O x` instead of `ESC [ x`.
        const APP_CURSOR         = 0b0000_0100;
        const BRACKETED_PASTE    = 0b0000_1000;
        /// DECTCEM.
        const SHOW_CURSOR        = 0b0001_0000;
        const ALTERNATE_SCREEN   = 0b0010_0000;
    }
}

impl Default for TermMode {
    fn default() -> Self {
        TermMode::AUTOWRAP | TermMode::NEWLINE | TermMode::SHOW_CURSOR
    }
}

/// Current state of the cursor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CursorState {
    pub row: u16,
    pub col: u16,
    pub visible: bool,
}

/// Cursor position plus rendition saved by DECSC / `CSI s`.
#[derive(Clone, Copy, Debug)]
struct SavedCursor {
    row: u16,
    col: u16,
    pen: Pen,
}

/// Grid state mutated by the parser's actions.
#[derive(Debug)]
pub(crate) struct Screen {
    rows: u16,
    cols: u16,
    lines: Vec<Vec<Cell>>,
    pub(crate) row: u16,
    pub(crate) col: u16,
    /// Set after writing the last column; the next glyph wraps first.
    wrap_pending: bool,
    pub(crate) pen: Pen,
    scroll_top: u16,
    scroll_bottom: u16,
    saved: Option<SavedCursor>,
    /// Primary screen contents while the alternate screen is active.
    primary: Option<Vec<Vec<Cell>>>,
    pub(crate) mode: TermMode,
    pub(crate) title: Option<String>,
    pub(crate) bell: bool,
    /// Replies to device queries, waiting to be written back to the child.
    pub(crate) responses: Vec<u8>,
}

fn blank_grid(rows: u16, cols: u16, cell: Cell) -> Vec<Vec<Cell>> {
    vec![vec![cell; cols as usize]; rows as usize]
}

/// Crop or pad `lines` to `rows × cols`, keeping the top-left content.
fn reshape(lines: &mut Vec<Vec<Cell>>, rows: u16, cols: u16) {
    lines.truncate(rows as usize);
    for line in lines.iter_mut() {
        line.resize(cols as usize, Cell::default());
    }
    while lines.len() < rows as usize {
        lines.push(vec![Cell::default(); cols as usize]);
    }
}

impl Screen {
    pub(crate) fn new(rows: u16, cols: u16) -> Self {
        let rows = rows.max(1);
        let cols = cols.max(1);
        Self {
            rows,
            cols,
            lines: blank_grid(rows, cols, Cell::default()),
            row: 0,
            col: 0,
            wrap_pending: false,
            pen: Pen::default(),
            scroll_top: 0,
            scroll_bottom: rows - 1,
            saved: None,
            primary: None,
            mode: TermMode::default(),
            title: None,
            bell: false,
            responses: Vec::new(),
        }
    }

    pub(crate) fn rows(&self) -> u16 {
        self.rows
    }

    pub(crate) fn cols(&self) -> u16 {
        self.cols
    }

    pub(crate) fn line(&self, row: u16) -> Option<&[Cell]> {
        self.lines.get(row as usize).map(Vec::as_slice)
    }

    pub(crate) fn cursor(&self) -> CursorState {
        CursorState {
            row: self.row,
            col: self.col,
            visible: self.mode.contains(TermMode::SHOW_CURSOR),
        }
    }

    /// Full reset (RIS). Dimensions are kept.
    pub(crate) fn reset(&mut self) {
        *self = Screen::new(self.rows, self.cols);
    }

    /// Soft reset (DECSTR): rendition, modes and margins, but not content.
    pub(crate) fn soft_reset(&mut self) {
        self.pen = Pen::default();
        self.mode.insert(TermMode::AUTOWRAP | TermMode::SHOW_CURSOR);
        self.mode.remove(TermMode::APP_CURSOR);
        self.reset_scroll_region();
        self.saved = None;
        self.wrap_pending = false;
    }

    /// Change dimensions, preserving top-left content and padding or
    /// cropping the rest.
    pub(crate) fn resize(&mut self, rows: u16, cols: u16) {
        let rows = rows.max(1);
        let cols = cols.max(1);
        if rows == self.rows && cols == self.cols {
            return;
        }
        reshape(&mut self.lines, rows, cols);
        if let Some(primary) = self.primary.as_mut() {
            reshape(primary, rows, cols);
        }
        self.rows = rows;
        self.cols = cols;
        self.row = self.row.min(rows - 1);
        self.col = self.col.min(cols - 1);
        self.wrap_pending = false;
        if let Some(saved) = self.saved.as_mut() {
            saved.row = saved.row.min(rows - 1);
            saved.col = saved.col.min(cols - 1);
        }
        self.reset_scroll_region();
    }

    // Writing

    pub(crate) fn put_char(&mut self, ch: char) {
        let width: u16 = match UnicodeWidthChar::width(ch) {
            // Combining marks and other zero-width code points are dropped.
            Some(0) => return,
            Some(2) if self.cols >= 2 => 2,
            _ => 1,
        };
        if self.wrap_pending {
            self.wrap_pending = false;
            self.col = 0;
            self.index();
        }
        // A wide glyph never straddles the right margin.
        if width == 2 && self.col + 1 >= self.cols {
            if self.mode.contains(TermMode::AUTOWRAP) {
                self.break_wide_pair(self.row, self.col);
                self.lines[self.row as usize][self.col as usize] = self.pen.blank();
                self.col = 0;
                self.index();
            } else {
                self.col = self.cols - 2;
            }
        }

        self.break_wide_pair(self.row, self.col);
        let mut cell = self.pen.cell(ch);
        if width == 2 {
            self.break_wide_pair(self.row, self.col + 1);
            cell.width = 2;
            let spacer = Cell {
                glyph: ' ',
                width: 0,
                ..cell
            };
            self.lines[self.row as usize][self.col as usize + 1] = spacer;
        }
        self.lines[self.row as usize][self.col as usize] = cell;

        let next = self.col + width;
        if next < self.cols {
            self.col = next;
        } else {
            self.col = self.cols - 1;
            if self.mode.contains(TermMode::AUTOWRAP) {
                self.wrap_pending = true;
            }
        }
    }

    /// Blank both halves of a wide glyph covering `col` before part of it is
    /// overwritten.
    fn break_wide_pair(&mut self, row: u16, col: u16) {
        let blank = self.pen.blank();
        let line = &mut self.lines[row as usize];
        let col = col as usize;
        let Some(cell) = line.get(col).copied() else {
            return;
        };
        if cell.is_spacer() && col > 0 && line[col - 1].is_wide() {
            line[col - 1] = blank;
            line[col] = blank;
        } else if cell.is_wide() && line.get(col + 1).is_some_and(Cell::is_spacer) {
            line[col] = blank;
            line[col + 1] = blank;
        }
    }

    pub(crate) fn carriage_return(&mut self) {
        self.col = 0;
        self.wrap_pending = false;
    }

    pub(crate) fn backspace(&mut self) {
        self.col = self.col.saturating_sub(1);
        self.wrap_pending = false;
    }

    pub(crate) fn tab(&mut self) {
        let next = (self.col / TAB_WIDTH + 1).saturating_mul(TAB_WIDTH);
        self.col = next.min(self.cols - 1);
        self.wrap_pending = false;
    }

    pub(crate) fn linefeed(&mut self) {
        self.index();
        if self.mode.contains(TermMode::NEWLINE) {
            self.col = 0;
        }
        self.wrap_pending = false;
    }

    /// Move down one row, scrolling the region at its bottom margin.
    pub(crate) fn index(&mut self) {
        if self.row == self.scroll_bottom {
            self.scroll_up(1);
        } else if self.row + 1 < self.rows {
            self.row += 1;
        }
        self.wrap_pending = false;
    }

    /// Move up one row, scrolling the region down at its top margin.
    pub(crate) fn reverse_index(&mut self) {
        if self.row == self.scroll_top {
            self.scroll_down(1);
        } else {
            self.row = self.row.saturating_sub(1);
        }
        self.wrap_pending = false;
    }

    // Cursor movement

    /// Move to an absolute position, clamped into the grid.
    pub(crate) fn move_to(&mut self, row: u16, col: u16) {
        self.row = row.min(self.rows - 1);
        self.col = col.min(self.cols - 1);
        self.wrap_pending = false;
    }

    pub(crate) fn move_up(&mut self, n: u16) {
        // Stops at the top margin when starting inside the region.
        let floor = if self.row >= self.scroll_top { self.scroll_top } else { 0 };
        self.move_to(self.row.saturating_sub(n).max(floor), self.col);
    }

    pub(crate) fn move_down(&mut self, n: u16) {
        let ceiling = if self.row <= self.scroll_bottom {
            self.scroll_bottom
        } else {
            self.rows - 1
        };
        self.move_to(self.row.saturating_add(n).min(ceiling), self.col);
    }

    pub(crate) fn move_forward(&mut self, n: u16) {
        self.move_to(self.row, self.col.saturating_add(n));
    }

    pub(crate) fn move_back(&mut self, n: u16) {
        self.move_to(self.row, self.col.saturating_sub(n));
    }

    pub(crate) fn save_cursor(&mut self) {
        self.saved = Some(SavedCursor {
            row: self.row,
            col: self.col,
            pen: self.pen,
        });
    }

    pub(crate) fn restore_cursor(&mut self) {
        match self.saved {
            Some(saved) => {
                self.pen = saved.pen;
                self.move_to(saved.row, saved.col);
            }
            None => {
                self.pen = Pen::default();
                self.move_to(0, 0);
            }
        }
    }

    // Scrolling

    /// DECSTBM with 1-based, inclusive margins; zero means "edge". Invalid
    /// regions are ignored. A valid region homes the cursor.
    pub(crate) fn set_scroll_region(&mut self, top: u16, bottom: u16) {
        let top = top.saturating_sub(1);
        let bottom = if bottom == 0 {
            self.rows - 1
        } else {
            (bottom - 1).min(self.rows - 1)
        };
        if top >= bottom {
            return;
        }
        self.scroll_top = top;
        self.scroll_bottom = bottom;
        self.move_to(0, 0);
    }

    fn reset_scroll_region(&mut self) {
        self.scroll_top = 0;
        self.scroll_bottom = self.rows - 1;
    }

    fn blank_line(&self) -> Vec<Cell> {
        vec![self.pen.blank(); self.cols as usize]
    }

    fn region_height(&self) -> u16 {
        self.scroll_bottom - self.scroll_top + 1
    }

    /// Scroll the region up: its top row is dropped, a blank row appears at
    /// its bottom.
    pub(crate) fn scroll_up(&mut self, n: u16) {
        let top = self.scroll_top as usize;
        let bottom = self.scroll_bottom as usize;
        for _ in 0..n.min(self.region_height()) {
            self.lines.remove(top);
            self.lines.insert(bottom, self.blank_line());
        }
    }

    pub(crate) fn scroll_down(&mut self, n: u16) {
        let top = self.scroll_top as usize;
        let bottom = self.scroll_bottom as usize;
        for _ in 0..n.min(self.region_height()) {
            self.lines.remove(bottom);
            self.lines.insert(top, self.blank_line());
        }
    }

    /// IL: insert blank rows at the cursor, pushing rows below it out of the
    /// region. No effect outside the region.
    pub(crate) fn insert_lines(&mut self, n: u16) {
        if self.row < self.scroll_top || self.row > self.scroll_bottom {
            return;
        }
        let row = self.row as usize;
        let bottom = self.scroll_bottom as usize;
        for _ in 0..n.min(self.scroll_bottom - self.row + 1) {
            self.lines.remove(bottom);
            self.lines.insert(row, self.blank_line());
        }
        self.carriage_return();
    }

    /// DL: delete rows at the cursor, pulling rows below it up.
    pub(crate) fn delete_lines(&mut self, n: u16) {
        if self.row < self.scroll_top || self.row > self.scroll_bottom {
            return;
        }
        let row = self.row as usize;
        let bottom = self.scroll_bottom as usize;
        for _ in 0..n.min(self.scroll_bottom - self.row + 1) {
            self.lines.remove(row);
            self.lines.insert(bottom, self.blank_line());
        }
        self.carriage_return();
    }

    // Editing within the cursor row

    pub(crate) fn insert_chars(&mut self, n: u16) {
        let blank = self.pen.blank();
        let col = self.col as usize;
        let cols = self.cols as usize;
        let line = &mut self.lines[self.row as usize];
        for _ in 0..n.min(self.cols - self.col) {
            line.insert(col, blank);
        }
        line.truncate(cols);
        self.wrap_pending = false;
    }

    pub(crate) fn delete_chars(&mut self, n: u16) {
        let blank = self.pen.blank();
        let col = self.col as usize;
        let line = &mut self.lines[self.row as usize];
        for _ in 0..n.min(self.cols - self.col) {
            line.remove(col);
            line.push(blank);
        }
        self.wrap_pending = false;
    }

    pub(crate) fn erase_chars(&mut self, n: u16) {
        let end = self.col.saturating_add(n).min(self.cols);
        self.blank_cells(self.row, self.col, end);
    }

    fn blank_cells(&mut self, row: u16, from: u16, to: u16) {
        let blank = self.pen.blank();
        let line = &mut self.lines[row as usize];
        for cell in &mut line[from as usize..to as usize] {
            *cell = blank;
        }
    }

    // Erasing

    /// EL: 0 = cursor to end, 1 = start to cursor, 2 = whole row.
    pub(crate) fn erase_line(&mut self, mode: u16) {
        match mode {
            0 => self.blank_cells(self.row, self.col, self.cols),
            1 => self.blank_cells(self.row, 0, self.col + 1),
            2 => self.blank_cells(self.row, 0, self.cols),
            _ => return,
        }
        self.wrap_pending = false;
    }

    /// ED: 0 = cursor to end, 1 = start to cursor, 2/3 = whole screen. The
    /// whole-screen forms also home the cursor.
    pub(crate) fn erase_display(&mut self, mode: u16) {
        match mode {
            0 => {
                self.blank_cells(self.row, self.col, self.cols);
                for row in self.row + 1..self.rows {
                    self.blank_cells(row, 0, self.cols);
                }
            }
            1 => {
                for row in 0..self.row {
                    self.blank_cells(row, 0, self.cols);
                }
                self.blank_cells(self.row, 0, self.col + 1);
            }
            2 | 3 => {
                for row in 0..self.rows {
                    self.blank_cells(row, 0, self.cols);
                }
                self.move_to(0, 0);
            }
            _ => return,
        }
        self.wrap_pending = false;
    }

    // Modes

    /// Enter or leave the alternate screen. `save_cursor` gives the 1049
    /// behavior of saving the cursor on entry and restoring it on exit.
    pub(crate) fn set_alternate_screen(&mut self, enable: bool, save_cursor: bool) {
        if enable == self.mode.contains(TermMode::ALTERNATE_SCREEN) {
            return;
        }
        if enable {
            if save_cursor {
                self.save_cursor();
            }
            let alternate = blank_grid(self.rows, self.cols, Cell::default());
            self.primary = Some(std::mem::replace(&mut self.lines, alternate));
            self.mode.insert(TermMode::ALTERNATE_SCREEN);
        } else {
            if let Some(primary) = self.primary.take() {
                self.lines = primary;
            }
            self.mode.remove(TermMode::ALTERNATE_SCREEN);
            if save_cursor {
                self.restore_cursor();
            }
        }
        self.reset_scroll_region();
        self.wrap_pending = false;
    }

    pub(crate) fn respond(&mut self, reply: &str) {
        self.responses.extend_from_slice(reply.as_bytes());
    }
}

/// A read-only view into the terminal screen.
pub struct ScreenView<'a> {
    screen: &'a Screen,
}

impl<'a> ScreenView<'a> {
    pub(crate) fn new(screen: &'a Screen) -> Self {
        Self { screen }
    }

    /// Number of visible rows.
    pub fn rows(&self) -> u16 {
        self.screen.rows()
    }

    /// Number of columns.
    pub fn cols(&self) -> u16 {
        self.screen.cols()
    }

    /// Get a single cell at the given row and column.
    ///
    /// Row 0 is the top of the visible screen. Out-of-range positions read
    /// as a blank cell.
    pub fn cell(&self, row: u16, col: u16) -> Cell {
        self.screen
            .line(row)
            .and_then(|line| line.get(col as usize))
            .copied()
            .unwrap_or_default()
    }

    /// Get all cells in a row.
    pub fn row_cells(&self, row: u16) -> &'a [Cell] {
        self.screen.line(row).unwrap_or(&[])
    }

    /// The glyphs of a row with trailing blanks removed. Wide glyphs appear
    /// once.
    pub fn row_text(&self, row: u16) -> String {
        let cells = self.row_cells(row);
        let text: String = cells
            .iter()
            .enumerate()
            .filter(|(col, cell)| !(cell.is_spacer() && *col > 0 && cells[col - 1].is_wide()))
            .map(|(_, cell)| if cell.is_spacer() { ' ' } else { cell.glyph })
            .collect();
        text.trim_end().to_string()
    }

    /// All rows joined with newlines, trailing blanks removed per row.
    pub fn text(&self) -> String {
        (0..self.rows())
            .map(|row| self.row_text(row))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn cursor(&self) -> CursorState {
        self.screen.cursor()
    }
}
