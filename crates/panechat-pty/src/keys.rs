//! Escaped keystroke notation used by `/type`.
//!
//! `\n` `\r` `\t` `\e` `\\` `\xHH` and the bracketed-paste markers `\[200~` /
//! `\[201~` are recognised. Any other backslash is passed through literally.

const PASTE_START: &str = "[200~";
const PASTE_END: &str = "[201~";

/// Turn escaped notation into the bytes to write to the child.
pub fn decode_keystrokes(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('\\') {
        out.extend_from_slice(&rest.as_bytes()[..pos]);
        let after = &rest[pos + 1..];
        let (bytes, used): (Vec<u8>, usize) = match after.chars().next() {
            Some('n') => (vec![b'\n'], 1),
            Some('r') => (vec![b'\r'], 1),
            Some('t') => (vec![b'\t'], 1),
            Some('e') => (vec![0x1b], 1),
            Some('\\') => (vec![b'\\'], 1),
            Some('x') => match after
                .get(1..3)
                .filter(|hex| hex.bytes().all(|b| b.is_ascii_hexdigit()))
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
            {
                Some(byte) => (vec![byte], 3),
                None => (vec![b'\\'], 0),
            },
            Some('[') if after.starts_with(PASTE_START) || after.starts_with(PASTE_END) => {
                let mut marker = vec![0x1b];
                marker.extend_from_slice(&after.as_bytes()[..PASTE_START.len()]);
                (marker, PASTE_START.len())
            }
            _ => (vec![b'\\'], 0),
        };
        out.extend_from_slice(&bytes);
        rest = &after[used..];
    }
    out.extend_from_slice(rest.as_bytes());
    out
}

/// Render bytes back into escaped notation for display.
pub fn escape_keystrokes(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let mut out = String::with_capacity(text.len());
    let mut rest: &str = &text;
    while let Some(ch) = rest.chars().next() {
        if let Some(tail) = rest.strip_prefix('\x1b') {
            if tail.starts_with(PASTE_START) || tail.starts_with(PASTE_END) {
                out.push('\\');
                out.push_str(&tail[..PASTE_START.len()]);
                rest = &tail[PASTE_START.len()..];
                continue;
            }
        }
        match ch {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\x1b' => out.push_str("\\e"),
            '\\' => out.push_str("\\\\"),
            c if c.is_control() => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
        rest = &rest[ch.len_utf8()..];
    }
    out
}
