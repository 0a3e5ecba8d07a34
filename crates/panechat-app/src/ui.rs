//! Frame rendering.
//!
//! Layout: a one-line header, the chat panel (transcript over a `>>> ` input
//! line) and, while split, the terminal panel on the right.

use panechat_vt::parser::{CsiSequence, Parser, Perform};
use panechat_vt::{CellFlags, Color as VtColor, Style as VtStyle};
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::app::{App, Focus};
use crate::transcript::{Role, Transcript};

const PROMPT: &str = ">>> ";

/// Screen regions for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Areas {
    pub header: Rect,
    pub chat: Rect,
    pub transcript: Rect,
    pub input: Rect,
    pub terminal: Option<Rect>,
    /// Inside the terminal panel's border; the emulator grid is drawn here.
    pub terminal_inner: Option<Rect>,
}

pub fn areas(area: Rect, split: bool) -> Areas {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(0)])
        .split(area);
    let header = rows[0];
    let body = rows[1];

    let (chat, terminal) = if split {
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
            .split(body);
        (columns[0], Some(columns[1]))
    } else {
        (body, None)
    };

    let chat_inner = panel(String::new(), false).inner(chat);
    let chat_rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)])
        .split(chat_inner);

    Areas {
        header,
        chat,
        transcript: chat_rows[0],
        input: chat_rows[1],
        terminal,
        terminal_inner: terminal.map(|outer| panel(String::new(), false).inner(outer)),
    }
}

/// Size of the terminal grid area as `(rows, cols)` for a frame of `area`.
pub fn terminal_pane_size(area: Rect) -> (u16, u16) {
    areas(area, true)
        .terminal_inner
        .map(|inner| (inner.height, inner.width))
        .unwrap_or_default()
}

pub fn render(app: &App, frame: &mut Frame) {
    let areas = areas(frame.area(), app.split);

    render_header(app, frame, areas.header);
    frame.render_widget(panel("Chat".to_string(), app.focus == Focus::Chat), areas.chat);
    render_transcript(app, frame, areas.transcript);
    render_input(app, frame, areas.input);

    if let (Some(outer), Some(inner)) = (areas.terminal, areas.terminal_inner) {
        let title = match app.controller.vt().title() {
            Some(title) if !title.is_empty() => format!("Terminal: {}", sanitize(title)),
            _ => "Terminal".to_string(),
        };
        frame.render_widget(panel(title, app.focus == Focus::Terminal), outer);
        render_terminal(app, frame, inner);
    }
}

fn panel(title: String, focused: bool) -> Block<'static> {
    let border = if focused {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    Block::default()
        .borders(Borders::ALL)
        .title(title)
        .border_style(border)
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let model = app.settings.model.as_deref().unwrap_or("not set");
    let hint = if app.split {
        "Ctrl+G: switch focus  /help"
    } else {
        "/split: open terminal  /help"
    };
    let line = Line::from(vec![
        Span::styled(" panechat ", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(format!("model: {model}  ")),
        Span::styled(hint, Style::default().fg(Color::DarkGray)),
    ]);
    frame.render_widget(
        Paragraph::new(line).style(Style::default().bg(Color::Black).fg(Color::White)),
        area,
    );
}

fn render_transcript(app: &App, frame: &mut Frame, area: Rect) {
    let lines = transcript_lines(&app.transcript, area.width as usize);
    let height = area.height as usize;
    let bottom = lines.len().saturating_sub(height);
    let start = bottom - app.scroll.min(bottom);
    let visible: Vec<Line> = lines.into_iter().skip(start).take(height).collect();
    frame.render_widget(Paragraph::new(visible), area);
}

fn transcript_lines(transcript: &Transcript, width: usize) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    for entry in transcript.entries() {
        let style = role_style(entry.role);
        for row in wrap_text(&sanitize(&entry.text), width) {
            lines.push(Line::styled(row, style));
        }
    }
    lines
}

/// Rows the transcript occupies at `width`.
pub fn transcript_height(transcript: &Transcript, width: u16) -> usize {
    transcript
        .entries()
        .iter()
        .map(|entry| wrap_text(&sanitize(&entry.text), width as usize).len())
        .sum()
}

fn role_style(role: Role) -> Style {
    match role {
        Role::User => Style::default().fg(Color::Cyan),
        Role::Assistant => Style::default().fg(Color::Green),
        Role::System => Style::default().fg(Color::Yellow),
    }
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let available = (area.width as usize).saturating_sub(PROMPT.len()).max(1);
    let (shown, cursor_x) = input_window(&app.editor.text(), app.editor.cursor(), available);

    let line = Line::from(vec![
        Span::styled(PROMPT, Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(shown),
    ]);
    frame.render_widget(Paragraph::new(line), area);

    if app.focus == Focus::Chat && area.width > 0 && area.height > 0 {
        let x = area.x + (PROMPT.len() + cursor_x) as u16;
        frame.set_cursor_position((x.min(area.right() - 1), area.y));
    }
}

/// The part of the input that fits in `available` columns with the cursor
/// (a char index) in view, and the cursor's column within it.
fn input_window(text: &str, cursor: usize, available: usize) -> (String, usize) {
    let chars: Vec<(char, usize)> = text.chars().map(|ch| (ch, char_width(ch))).collect();
    let cursor = cursor.min(chars.len());

    // Scroll just far enough that the cursor cell fits.
    let mut offset = 0;
    let mut before: usize = chars[..cursor].iter().map(|(_, w)| w).sum();
    while offset < cursor && before + 1 > available {
        before -= chars[offset].1;
        offset += 1;
    }

    let mut shown = String::new();
    let mut used = 0;
    for &(ch, w) in &chars[offset..] {
        if used + w > available {
            break;
        }
        shown.push(ch);
        used += w;
    }
    (shown, before)
}

fn render_terminal(app: &App, frame: &mut Frame, area: Rect) {
    let rows = panechat_vt::lines(&app.controller.project());
    let cursor = app.controller.vt().cursor();
    // The grid can be taller than the pane; keep the cursor row visible.
    let top = (cursor.row + 1).saturating_sub(area.height);
    let lines: Vec<Line> = rows
        .into_iter()
        .map(|runs| {
            Line::from(
                runs.into_iter()
                    .map(|run| Span::styled(run.text, to_style(&run.style)))
                    .collect::<Vec<_>>(),
            )
        })
        .collect();
    frame.render_widget(Paragraph::new(lines).scroll((top, 0)), area);
}

/// Map an emulator style onto ratatui's.
pub fn to_style(style: &VtStyle) -> Style {
    let mut out = Style::default().fg(to_color(style.fg)).bg(to_color(style.bg));
    let modifiers = [
        (CellFlags::BOLD, Modifier::BOLD),
        (CellFlags::DIM, Modifier::DIM),
        (CellFlags::ITALIC, Modifier::ITALIC),
        (CellFlags::UNDERLINE, Modifier::UNDERLINED),
        (CellFlags::STRIKETHROUGH, Modifier::CROSSED_OUT),
        (CellFlags::REVERSE, Modifier::REVERSED),
    ];
    for (flag, modifier) in modifiers {
        if style.flags.contains(flag) {
            out = out.add_modifier(modifier);
        }
    }
    out
}

fn to_color(color: VtColor) -> Color {
    match color {
        VtColor::Default => Color::Reset,
        VtColor::Indexed(idx) => Color::Indexed(idx),
        VtColor::Rgb(rgb) => Color::Rgb(rgb.r, rgb.g, rgb.b),
    }
}

fn char_width(ch: char) -> usize {
    UnicodeWidthChar::width(ch).unwrap_or(0)
}

/// Word-wrap `text` to `width` display columns. Words longer than a row are
/// split; a wide glyph never straddles two rows.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let mut rows = Vec::new();
    for line in text.split('\n') {
        if width == 0 {
            rows.push(line.to_string());
            continue;
        }
        let mut current = String::new();
        let mut len = 0;
        for word in line.split(' ') {
            let word_len = UnicodeWidthStr::width(word);
            if len > 0 && len + 1 + word_len > width {
                rows.push(std::mem::take(&mut current));
                len = 0;
            }
            if len > 0 {
                current.push(' ');
                len += 1;
            }
            for ch in word.chars() {
                let w = char_width(ch);
                if len > 0 && len + w > width {
                    rows.push(std::mem::take(&mut current));
                    len = 0;
                }
                current.push(ch);
                len += w;
            }
        }
        rows.push(current);
    }
    rows
}

/// Collects the printable text of a byte stream.
#[derive(Default)]
struct PlainText(String);

impl Perform for PlainText {
    fn print(&mut self, ch: char) {
        if !ch.is_control() {
            self.0.push(ch);
        }
    }

    fn execute(&mut self, byte: u8) {
        match byte {
            b'\n' => self.0.push('\n'),
            b'\t' => self.0.push_str("    "),
            _ => {}
        }
    }

    fn csi_dispatch(&mut self, _csi: &CsiSequence<'_>) {}

    fn esc_dispatch(&mut self, _intermediates: &[u8], _byte: u8) {}

    fn osc_dispatch(&mut self, _payload: &[u8]) {}
}

/// Strip escape sequences and control bytes so raw shell output can be shown
/// as text. Tabs become spaces.
pub fn sanitize(text: &str) -> String {
    let mut plain = PlainText::default();
    Parser::new().advance(&mut plain, text.as_bytes());
    plain.0
}
