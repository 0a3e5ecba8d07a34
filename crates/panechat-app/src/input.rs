//! Input encoding for the embedded shell.
//!
//! Converts crossterm key events into the byte sequences an xterm would send.
//! Cursor keys follow the child's DECCKM setting.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// Convert a key event to bytes for the PTY.
///
/// Returns None for keys with no terminal encoding (e.g. media keys).
pub fn key_event_to_bytes(key: KeyEvent, application_cursor: bool) -> Option<Vec<u8>> {
    let modifiers = key.modifiers;
    match key.code {
        KeyCode::Char(ch) => Some(encode_char(ch, modifiers)),
        KeyCode::Enter => Some(with_alt_prefix(modifiers, vec![b'\r'])),
        KeyCode::Tab if modifiers.contains(KeyModifiers::SHIFT) => Some(b"\x1b[Z".to_vec()),
        KeyCode::Tab => Some(with_alt_prefix(modifiers, vec![b'\t'])),
        KeyCode::BackTab => Some(b"\x1b[Z".to_vec()),
        KeyCode::Backspace => Some(with_alt_prefix(modifiers, vec![0x7f])),
        KeyCode::Esc => Some(with_alt_prefix(modifiers, vec![0x1b])),
        KeyCode::Up => Some(encode_cursor_key(modifiers, b'A', application_cursor)),
        KeyCode::Down => Some(encode_cursor_key(modifiers, b'B', application_cursor)),
        KeyCode::Right => Some(encode_cursor_key(modifiers, b'C', application_cursor)),
        KeyCode::Left => Some(encode_cursor_key(modifiers, b'D', application_cursor)),
        KeyCode::Home => Some(encode_cursor_key(modifiers, b'H', application_cursor)),
        KeyCode::End => Some(encode_cursor_key(modifiers, b'F', application_cursor)),
        KeyCode::Insert => Some(encode_tilde_key(modifiers, 2)),
        KeyCode::Delete => Some(encode_tilde_key(modifiers, 3)),
        KeyCode::PageUp => Some(encode_tilde_key(modifiers, 5)),
        KeyCode::PageDown => Some(encode_tilde_key(modifiers, 6)),
        KeyCode::F(n) => encode_function_key(modifiers, n),
        _ => None,
    }
}

fn encode_char(ch: char, modifiers: KeyModifiers) -> Vec<u8> {
    let bytes = if modifiers.contains(KeyModifiers::CONTROL) {
        match control_code(ch) {
            Some(code) => vec![code],
            None => utf8(ch),
        }
    } else {
        utf8(ch)
    };
    with_alt_prefix(modifiers, bytes)
}

/// C0 code for Ctrl+`ch`, following the xterm table.
fn control_code(ch: char) -> Option<u8> {
    match ch.to_ascii_lowercase() {
        c @ 'a'..='z' => Some(c as u8 - b'a' + 1),
        ' ' | '@' | '2' => Some(0x00),
        '[' | '3' => Some(0x1b),
        '\\' | '4' => Some(0x1c),
        ']' | '5' => Some(0x1d),
        '^' | '6' => Some(0x1e),
        '_' | '7' | '/' => Some(0x1f),
        '8' | '?' => Some(0x7f),
        _ => None,
    }
}

fn utf8(ch: char) -> Vec<u8> {
    let mut buffer = [0u8; 4];
    ch.encode_utf8(&mut buffer).as_bytes().to_vec()
}

fn with_alt_prefix(modifiers: KeyModifiers, bytes: Vec<u8>) -> Vec<u8> {
    if !modifiers.contains(KeyModifiers::ALT) {
        return bytes;
    }
    let mut prefixed = Vec::with_capacity(bytes.len() + 1);
    prefixed.push(0x1b);
    prefixed.extend(bytes);
    prefixed
}

fn modifier_param(modifiers: KeyModifiers) -> Option<u8> {
    let mut value = 1;
    if modifiers.contains(KeyModifiers::SHIFT) {
        value += 1;
    }
    if modifiers.contains(KeyModifiers::ALT) {
        value += 2;
    }
    if modifiers.contains(KeyModifiers::CONTROL) {
        value += 4;
    }
    (value > 1).then_some(value)
}

/// Arrows, Home and End: `CSI x`, `SS3 x` in application mode, or
/// `CSI 1;m x` with modifiers.
fn encode_cursor_key(modifiers: KeyModifiers, final_byte: u8, application_cursor: bool) -> Vec<u8> {
    if let Some(param) = modifier_param(modifiers) {
        return format!("\x1b[1;{param}{}", final_byte as char).into_bytes();
    }
    let introducer = if application_cursor { b'O' } else { b'[' };
    vec![0x1b, introducer, final_byte]
}

fn encode_tilde_key(modifiers: KeyModifiers, code: u8) -> Vec<u8> {
    match modifier_param(modifiers) {
        Some(param) => format!("\x1b[{code};{param}~").into_bytes(),
        None => format!("\x1b[{code}~").into_bytes(),
    }
}

fn encode_function_key(modifiers: KeyModifiers, n: u8) -> Option<Vec<u8>> {
    let ss3 = match n {
        1 => Some(b'P'),
        2 => Some(b'Q'),
        3 => Some(b'R'),
        4 => Some(b'S'),
        _ => None,
    };
    if let Some(final_byte) = ss3 {
        return Some(match modifier_param(modifiers) {
            Some(param) => format!("\x1b[1;{param}{}", final_byte as char).into_bytes(),
            None => vec![0x1b, b'O', final_byte],
        });
    }
    let code = match n {
        5 => 15,
        6 => 17,
        7 => 18,
        8 => 19,
        9 => 20,
        10 => 21,
        11 => 23,
        12 => 24,
        _ => return None,
    };
    Some(encode_tilde_key(modifiers, code))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, modifiers)
    }

    fn plain(code: KeyCode) -> Option<Vec<u8>> {
        key_event_to_bytes(key(code, KeyModifiers::NONE), false)
    }

    #[test]
    fn test_characters_and_controls() {
        assert_eq!(plain(KeyCode::Char('a')), Some(b"a".to_vec()));
        assert_eq!(plain(KeyCode::Char('é')), Some("é".as_bytes().to_vec()));
        assert_eq!(
            key_event_to_bytes(key(KeyCode::Char('c'), KeyModifiers::CONTROL), false),
            Some(vec![0x03])
        );
        assert_eq!(
            key_event_to_bytes(key(KeyCode::Char('['), KeyModifiers::CONTROL), false),
            Some(vec![0x1b])
        );
        assert_eq!(
            key_event_to_bytes(key(KeyCode::Char('b'), KeyModifiers::ALT), false),
            Some(b"\x1bb".to_vec())
        );
    }

    #[test]
    fn test_editing_keys() {
        assert_eq!(plain(KeyCode::Enter), Some(b"\r".to_vec()));
        assert_eq!(plain(KeyCode::Backspace), Some(vec![0x7f]));
        assert_eq!(plain(KeyCode::Tab), Some(b"\t".to_vec()));
        assert_eq!(plain(KeyCode::BackTab), Some(b"\x1b[Z".to_vec()));
        assert_eq!(plain(KeyCode::Delete), Some(b"\x1b[3~".to_vec()));
        assert_eq!(plain(KeyCode::PageUp), Some(b"\x1b[5~".to_vec()));
    }

    #[test]
    fn test_cursor_keys_follow_application_mode() {
        assert_eq!(plain(KeyCode::Up), Some(b"\x1b[A".to_vec()));
        assert_eq!(
            key_event_to_bytes(key(KeyCode::Up, KeyModifiers::NONE), true),
            Some(b"\x1bOA".to_vec())
        );
        assert_eq!(
            key_event_to_bytes(key(KeyCode::Home, KeyModifiers::NONE), true),
            Some(b"\x1bOH".to_vec())
        );
        // Modified arrows always use the CSI form.
        assert_eq!(
            key_event_to_bytes(key(KeyCode::Left, KeyModifiers::CONTROL), true),
            Some(b"\x1b[1;5D".to_vec())
        );
    }

    #[test]
    fn test_function_keys() {
        assert_eq!(plain(KeyCode::F(1)), Some(b"\x1bOP".to_vec()));
        assert_eq!(plain(KeyCode::F(5)), Some(b"\x1b[15~".to_vec()));
        assert_eq!(plain(KeyCode::F(12)), Some(b"\x1b[24~".to_vec()));
        assert_eq!(
            key_event_to_bytes(key(KeyCode::F(2), KeyModifiers::SHIFT), false),
            Some(b"\x1b[1;2Q".to_vec())
        );
        assert_eq!(plain(KeyCode::F(20)), None);
        assert_eq!(plain(KeyCode::CapsLock), None);
    }
}
