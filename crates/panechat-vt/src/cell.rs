use bitflags::bitflags;

/// RGB color value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Color of a cell's foreground or background.
///
/// Colors stay symbolic (palette index or "default") so the host decides how
/// they look. Direct RGB only appears when a program asks for it via
/// `38;2;r;g;b` / `48;2;r;g;b`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Color {
    #[default]
    Default,
    /// xterm-256 palette index. 0-7 are the ANSI colors, 8-15 their bright
    /// variants.
    Indexed(u8),
    Rgb(Rgb),
}

bitflags! {
    /// Cell attribute flags, packed into a single byte.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct CellFlags: u8 {
        const BOLD          = 0b0000_0001;
        const ITALIC        = 0b0000_0010;
        const UNDERLINE     = 0b0000_0100;
        const STRIKETHROUGH = 0b0000_1000;
        const REVERSE       = 0b0001_0000;
        const DIM           = 0b0010_0000;
    }
}

/// A single cell in the terminal grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cell {
    /// The character displayed in this cell.
    pub glyph: char,
    pub fg: Color,
    pub bg: Color,
    /// Cell attribute flags (bold, italic, etc.).
    pub flags: CellFlags,
    /// Columns the glyph covers: 1 normally, 2 for a wide (CJK, emoji)
    /// glyph, 0 for the spacer cell to the right of a wide glyph.
    pub width: u8,
}

impl Cell {
    pub fn is_wide(&self) -> bool {
        self.width == 2
    }

    pub fn is_spacer(&self) -> bool {
        self.width == 0
    }
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            glyph: ' ',
            fg: Color::Default,
            bg: Color::Default,
            flags: CellFlags::empty(),
            width: 1,
        }
    }
}

/// Graphic rendition applied to every glyph written after it is set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Pen {
    pub fg: Color,
    pub bg: Color,
    pub flags: CellFlags,
}

impl Pen {
    /// A cell carrying `glyph` in this pen's colors and attributes.
    pub fn cell(&self, glyph: char) -> Cell {
        Cell {
            glyph,
            fg: self.fg,
            bg: self.bg,
            flags: self.flags,
            width: 1,
        }
    }

    /// An erased cell. Erasure keeps the current background color and
    /// nothing else (xterm's back-color-erase).
    pub fn blank(&self) -> Cell {
        Cell {
            bg: self.bg,
            ..Cell::default()
        }
    }
}
