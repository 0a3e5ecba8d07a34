//! Turns the screen grid into styled text runs for a host UI.

use crate::cell::{Cell, CellFlags, Color};
use crate::screen::{CursorState, ScreenView};

/// Resolved rendition of a run of cells.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Style {
    pub fg: Color,
    pub bg: Color,
    pub flags: CellFlags,
}

impl From<&Cell> for Style {
    fn from(cell: &Cell) -> Self {
        Self {
            fg: cell.fg,
            bg: cell.bg,
            flags: cell.flags,
        }
    }
}

/// Consecutive cells of one row sharing a style.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StyleRun {
    pub style: Style,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Fragment {
    Run(StyleRun),
    /// End of a screen row.
    RowBreak,
}

/// Project the screen into style runs, row by row, with a
/// [`Fragment::RowBreak`] between rows.
///
/// The cell under a visible cursor is drawn reversed.
pub fn project(screen: &ScreenView<'_>, cursor: &CursorState) -> Vec<Fragment> {
    let mut fragments = Vec::new();
    for row in 0..screen.rows() {
        if row > 0 {
            fragments.push(Fragment::RowBreak);
        }
        let cells = screen.row_cells(row);
        let mut current: Option<StyleRun> = None;
        for (col, cell) in cells.iter().enumerate() {
            // The right half of a wide glyph is covered by its lead cell.
            if cell.is_spacer() && col > 0 && cells[col - 1].is_wide() {
                continue;
            }
            let glyph = if cell.is_spacer()
                || (cell.is_wide() && !cells.get(col + 1).is_some_and(Cell::is_spacer))
            {
                ' '
            } else {
                cell.glyph
            };
            let mut style = Style::from(cell);
            if cursor.visible && cursor.row == row && cursor.col as usize == col {
                style.flags.insert(CellFlags::REVERSE);
            }
            match current.as_mut() {
                Some(run) if run.style == style => run.text.push(glyph),
                _ => {
                    if let Some(run) = current.replace(StyleRun {
                        style,
                        text: glyph.to_string(),
                    }) {
                        fragments.push(Fragment::Run(run));
                    }
                }
            }
        }
        if let Some(run) = current {
            fragments.push(Fragment::Run(run));
        }
    }
    fragments
}

/// Group projected fragments into one list of runs per row.
pub fn lines(fragments: &[Fragment]) -> Vec<Vec<StyleRun>> {
    let mut rows = vec![Vec::new()];
    for fragment in fragments {
        match fragment {
            Fragment::Run(run) => {
                if let Some(row) = rows.last_mut() {
                    row.push(run.clone());
                }
            }
            Fragment::RowBreak => rows.push(Vec::new()),
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminal::VtTerminal;

    fn runs_of(term: &VtTerminal) -> Vec<Vec<StyleRun>> {
        lines(&project(&term.screen(), &term.cursor()))
    }

    #[test]
    fn test_coalesces_equal_styles() {
        let mut term = VtTerminal::new(2, 6);
        term.feed(b"ab\x1b[1mcd\x1b[0m\x1b[?25l");
        let rows = runs_of(&term);
        assert_eq!(rows.len(), 2);

        let first = &rows[0];
        assert_eq!(first.len(), 3);
        assert_eq!(first[0].text, "ab");
        assert_eq!(first[1].text, "cd");
        assert!(first[1].style.flags.contains(CellFlags::BOLD));
        assert_eq!(first[2].text, "  ");

        assert_eq!(rows[1].len(), 1);
        assert_eq!(rows[1][0].text, "      ");
    }

    #[test]
    fn test_cursor_cell_is_reversed() {
        let mut term = VtTerminal::new(1, 4);
        term.feed(b"ab");
        let rows = runs_of(&term);
        let texts: Vec<&str> = rows[0].iter().map(|run| run.text.as_str()).collect();
        assert_eq!(texts, ["ab", " ", " "]);
        assert!(rows[0][1].style.flags.contains(CellFlags::REVERSE));
        assert!(!rows[0][2].style.flags.contains(CellFlags::REVERSE));
    }

    #[test]
    fn test_hidden_cursor_is_not_drawn() {
        let mut term = VtTerminal::new(1, 4);
        term.feed(b"\x1b[?25lab");
        let fragments = project(&term.screen(), &term.cursor());
        assert_eq!(fragments.len(), 1);
        assert!(!fragments.contains(&Fragment::RowBreak));
    }

    #[test]
    fn test_wide_glyphs_are_emitted_once() {
        let mut term = VtTerminal::new(2, 20);
        term.feed("\x1b[?25l漢字ab".as_bytes());
        let rows = runs_of(&term);
        assert_eq!(rows[0].len(), 1);
        assert_eq!(rows[0][0].text, format!("漢字ab{}", " ".repeat(14)));
    }

    #[test]
    fn test_cursor_after_wide_glyph() {
        let mut term = VtTerminal::new(1, 6);
        term.feed("漢".as_bytes());
        let rows = runs_of(&term);
        let texts: Vec<&str> = rows[0].iter().map(|run| run.text.as_str()).collect();
        assert_eq!(texts, ["漢", " ", "   "]);
        assert!(rows[0][1].style.flags.contains(CellFlags::REVERSE));
    }

    #[test]
    fn test_row_breaks_between_rows_only() {
        let term = VtTerminal::new(3, 2);
        let fragments = project(&term.screen(), &term.cursor());
        let breaks = fragments
            .iter()
            .filter(|f| matches!(f, Fragment::RowBreak))
            .count();
        assert_eq!(breaks, 2);
        assert_ne!(fragments.last(), Some(&Fragment::RowBreak));
    }
}
