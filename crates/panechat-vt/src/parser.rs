//! Byte-level escape sequence state machine.
//!
//! The parser turns an arbitrary byte stream into high-level actions (print a
//! glyph, execute a control byte, dispatch a CSI/ESC/OSC sequence) and hands
//! them to a [`Perform`] implementation. All in-flight state, including a
//! partially received UTF-8 glyph, lives in the parser, so a stream split at
//! any byte boundary yields the same actions as the unsplit stream.

/// Maximum number of numeric parameters in one CSI sequence.
const MAX_PARAMS: usize = 16;
/// Maximum number of intermediate bytes in one ESC/CSI sequence.
const MAX_INTERMEDIATES: usize = 2;
/// Maximum retained OSC payload; longer strings are consumed and dropped.
const MAX_STRING_LEN: usize = 4096;

const ESC: u8 = 0x1b;
const BEL: u8 = 0x07;
const CAN: u8 = 0x18;
const SUB: u8 = 0x1a;

/// Receiver of parsed actions.
pub trait Perform {
    /// Draw a glyph at the cursor.
    fn print(&mut self, ch: char);

    /// Execute a C0 control byte.
    fn execute(&mut self, byte: u8);

    /// A complete `CSI ... final` sequence.
    fn csi_dispatch(&mut self, csi: &CsiSequence<'_>);

    /// A complete `ESC [intermediates] final` sequence.
    fn esc_dispatch(&mut self, intermediates: &[u8], byte: u8);

    /// A complete OSC string, without its introducer and terminator.
    fn osc_dispatch(&mut self, payload: &[u8]);
}

/// A fully collected control sequence.
#[derive(Debug, Clone, Copy)]
pub struct CsiSequence<'a> {
    pub params: &'a [u16],
    /// Private marker (`?`, `>`, `<`, `=`) if the sequence started with one.
    pub private: Option<u8>,
    pub intermediates: &'a [u8],
    /// Final byte.
    pub action: u8,
}

impl CsiSequence<'_> {
    /// Parameter `idx`, or `default` when it was omitted.
    pub fn param(&self, idx: usize, default: u16) -> u16 {
        self.params.get(idx).copied().unwrap_or(default)
    }

    /// Parameter `idx` used as a repeat count: omitted or zero means one.
    pub fn count(&self, idx: usize) -> u16 {
        self.param(idx, 1).max(1)
    }
}

/// Kind of string sequence being consumed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StringKind {
    /// Operating system command (`ESC ]`), dispatched on termination.
    Osc,
    /// DCS, SOS, PM or APC: consumed and dropped.
    Ignored,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    /// Accepting literal bytes.
    Ground,
    /// Inside a multi-byte UTF-8 glyph, `remaining` continuation bytes to go.
    Utf8 { remaining: u8 },
    /// Saw ESC.
    EscapeStart,
    /// Saw ESC followed by one or more intermediate bytes.
    EscapeIntermediate,
    /// Saw `ESC [`, accumulating parameters until a final byte.
    CollectingParams,
    ControlString(StringKind),
    /// Saw ESC inside a string; only `\` (string terminator) is expected.
    ControlStringEscape(StringKind),
}

/// Escape sequence parser.
#[derive(Debug)]
pub struct Parser {
    state: State,
    params: Vec<u16>,
    current: Option<u16>,
    private: Option<u8>,
    intermediates: Vec<u8>,
    payload: Vec<u8>,
    utf8: Vec<u8>,
    /// Set when the sequence being collected overflowed a limit; it is
    /// consumed to its end and then dropped.
    malformed: bool,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    pub fn new() -> Self {
        Self {
            state: State::Ground,
            params: Vec::with_capacity(MAX_PARAMS),
            current: None,
            private: None,
            intermediates: Vec::with_capacity(MAX_INTERMEDIATES),
            payload: Vec::new(),
            utf8: Vec::with_capacity(4),
            malformed: false,
        }
    }

    /// Whether the parser is between sequences.
    pub fn is_ground(&self) -> bool {
        self.state == State::Ground
    }

    /// Feed bytes through the state machine.
    pub fn advance<P: Perform>(&mut self, performer: &mut P, bytes: &[u8]) {
        for &byte in bytes {
            self.advance_byte(performer, byte);
        }
    }

    fn advance_byte<P: Perform>(&mut self, performer: &mut P, byte: u8) {
        match self.state {
            State::Ground => self.ground(performer, byte),
            State::Utf8 { remaining } => self.utf8(performer, byte, remaining),
            State::EscapeStart => self.escape_start(performer, byte),
            State::EscapeIntermediate => self.escape_intermediate(performer, byte),
            State::CollectingParams => self.collecting_params(performer, byte),
            State::ControlString(kind) => self.control_string(performer, kind, byte),
            State::ControlStringEscape(kind) => self.control_string_escape(performer, kind, byte),
        }
    }

    /// Drop the sequence in progress and reprocess `byte` from `Ground`, so
    /// an interrupting newline or ESC still takes effect.
    fn abort<P: Perform>(&mut self, performer: &mut P, byte: u8) {
        log::trace!("aborting escape sequence in {:?} at byte {byte:#04x}", self.state);
        self.state = State::Ground;
        self.ground(performer, byte);
    }

    fn ground<P: Perform>(&mut self, performer: &mut P, byte: u8) {
        match byte {
            ESC => {
                self.intermediates.clear();
                self.malformed = false;
                self.state = State::EscapeStart;
            }
            0x00..=0x1f => performer.execute(byte),
            0x20..=0x7e => performer.print(byte as char),
            0x7f => {}
            0xc2..=0xdf => self.begin_utf8(byte, 1),
            0xe0..=0xef => self.begin_utf8(byte, 2),
            0xf0..=0xf4 => self.begin_utf8(byte, 3),
            _ => performer.print(char::REPLACEMENT_CHARACTER),
        }
    }

    fn begin_utf8(&mut self, byte: u8, remaining: u8) {
        self.utf8.clear();
        self.utf8.push(byte);
        self.state = State::Utf8 { remaining };
    }

    fn utf8<P: Perform>(&mut self, performer: &mut P, byte: u8, remaining: u8) {
        if !(0x80..=0xbf).contains(&byte) {
            performer.print(char::REPLACEMENT_CHARACTER);
            self.abort(performer, byte);
            return;
        }

        self.utf8.push(byte);
        if remaining > 1 {
            self.state = State::Utf8 {
                remaining: remaining - 1,
            };
            return;
        }

        self.state = State::Ground;
        match std::str::from_utf8(&self.utf8) {
            Ok(decoded) => decoded.chars().for_each(|ch| performer.print(ch)),
            Err(_) => performer.print(char::REPLACEMENT_CHARACTER),
        }
    }

    fn escape_start<P: Perform>(&mut self, performer: &mut P, byte: u8) {
        match byte {
            b'[' => {
                self.params.clear();
                self.current = None;
                self.private = None;
                self.state = State::CollectingParams;
            }
            b']' => {
                self.payload.clear();
                self.state = State::ControlString(StringKind::Osc);
            }
            b'P' | b'X' | b'^' | b'_' => {
                self.state = State::ControlString(StringKind::Ignored);
            }
            0x20..=0x2f => {
                self.intermediates.push(byte);
                self.state = State::EscapeIntermediate;
            }
            0x30..=0x7e => {
                self.state = State::Ground;
                performer.esc_dispatch(&[], byte);
            }
            // ESC ESC restarts the sequence.
            ESC => {}
            _ => self.abort(performer, byte),
        }
    }

    fn escape_intermediate<P: Perform>(&mut self, performer: &mut P, byte: u8) {
        match byte {
            0x20..=0x2f => self.push_intermediate(byte),
            0x30..=0x7e => {
                self.state = State::Ground;
                if !self.malformed {
                    performer.esc_dispatch(&self.intermediates, byte);
                }
            }
            _ => self.abort(performer, byte),
        }
    }

    fn collecting_params<P: Perform>(&mut self, performer: &mut P, byte: u8) {
        match byte {
            b'0'..=b'9' if self.intermediates.is_empty() => {
                let digit = u16::from(byte - b'0');
                let value = self.current.unwrap_or(0);
                self.current = Some(value.saturating_mul(10).saturating_add(digit));
            }
            // Sub-parameters (`38:5:n`) are flattened into the parameter list.
            b';' | b':' if self.intermediates.is_empty() => self.push_param(),
            b'<'..=b'?'
                if self.params.is_empty()
                    && self.current.is_none()
                    && self.private.is_none()
                    && self.intermediates.is_empty() =>
            {
                self.private = Some(byte);
            }
            0x20..=0x2f => self.push_intermediate(byte),
            0x40..=0x7e => {
                if self.current.is_some() || !self.params.is_empty() {
                    self.push_param();
                }
                self.state = State::Ground;
                if self.malformed {
                    log::trace!("dropping malformed CSI sequence ending in {:?}", byte as char);
                    return;
                }
                let csi = CsiSequence {
                    params: &self.params,
                    private: self.private,
                    intermediates: &self.intermediates,
                    action: byte,
                };
                performer.csi_dispatch(&csi);
            }
            _ => self.abort(performer, byte),
        }
    }

    fn push_param(&mut self) {
        let value = self.current.take().unwrap_or(0);
        if self.params.len() < MAX_PARAMS {
            self.params.push(value);
        } else {
            self.malformed = true;
        }
    }

    fn push_intermediate(&mut self, byte: u8) {
        if self.intermediates.len() < MAX_INTERMEDIATES {
            self.intermediates.push(byte);
        } else {
            self.malformed = true;
        }
    }

    fn control_string<P: Perform>(&mut self, performer: &mut P, kind: StringKind, byte: u8) {
        match byte {
            BEL => self.finish_string(performer, kind),
            ESC => self.state = State::ControlStringEscape(kind),
            CAN | SUB => self.state = State::Ground,
            _ if kind == StringKind::Osc => {
                if self.payload.len() < MAX_STRING_LEN {
                    self.payload.push(byte);
                } else {
                    self.malformed = true;
                }
            }
            _ => {}
        }
    }

    fn control_string_escape<P: Perform>(&mut self, performer: &mut P, kind: StringKind, byte: u8) {
        if byte == b'\\' {
            self.finish_string(performer, kind);
            return;
        }
        // The ESC did not terminate the string: drop the string and treat
        // the ESC as the start of a new sequence.
        log::trace!("unterminated control string dropped");
        self.intermediates.clear();
        self.malformed = false;
        self.state = State::EscapeStart;
        self.escape_start(performer, byte);
    }

    fn finish_string<P: Perform>(&mut self, performer: &mut P, kind: StringKind) {
        self.state = State::Ground;
        if kind == StringKind::Osc && !self.malformed {
            performer.osc_dispatch(&self.payload);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Eq)]
    enum Action {
        Print(char),
        Execute(u8),
        Csi {
            params: Vec<u16>,
            private: Option<u8>,
            intermediates: Vec<u8>,
            action: char,
        },
        Esc(Vec<u8>, char),
        Osc(String),
    }

    #[derive(Default)]
    struct Recorder {
        actions: Vec<Action>,
    }

    impl Perform for Recorder {
        fn print(&mut self, ch: char) {
            self.actions.push(Action::Print(ch));
        }

        fn execute(&mut self, byte: u8) {
            self.actions.push(Action::Execute(byte));
        }

        fn csi_dispatch(&mut self, csi: &CsiSequence<'_>) {
            self.actions.push(Action::Csi {
                params: csi.params.to_vec(),
                private: csi.private,
                intermediates: csi.intermediates.to_vec(),
                action: csi.action as char,
            });
        }

        fn esc_dispatch(&mut self, intermediates: &[u8], byte: u8) {
            self.actions.push(Action::Esc(intermediates.to_vec(), byte as char));
        }

        fn osc_dispatch(&mut self, payload: &[u8]) {
            self.actions
                .push(Action::Osc(String::from_utf8_lossy(payload).into_owned()));
        }
    }

    fn parse(bytes: &[u8]) -> Vec<Action> {
        let mut parser = Parser::new();
        let mut recorder = Recorder::default();
        parser.advance(&mut recorder, bytes);
        recorder.actions
    }

    fn csi(params: &[u16], private: Option<u8>, action: char) -> Action {
        Action::Csi {
            params: params.to_vec(),
            private,
            intermediates: Vec::new(),
            action,
        }
    }

    #[test]
    fn test_plain_text_and_controls() {
        assert_eq!(
            parse(b"ok\r\n"),
            vec![
                Action::Print('o'),
                Action::Print('k'),
                Action::Execute(b'\r'),
                Action::Execute(b'\n'),
            ]
        );
    }

    #[test]
    fn test_csi_params() {
        assert_eq!(parse(b"\x1b[12;40H"), vec![csi(&[12, 40], None, 'H')]);
        assert_eq!(parse(b"\x1b[m"), vec![csi(&[], None, 'm')]);
        assert_eq!(parse(b"\x1b[;5H"), vec![csi(&[0, 5], None, 'H')]);
        assert_eq!(parse(b"\x1b[?25l"), vec![csi(&[25], Some(b'?'), 'l')]);
        assert_eq!(parse(b"\x1b[38:5:196m"), vec![csi(&[38, 5, 196], None, 'm')]);
    }

    #[test]
    fn test_csi_intermediate() {
        assert_eq!(
            parse(b"\x1b[!p"),
            vec![Action::Csi {
                params: vec![],
                private: None,
                intermediates: vec![b'!'],
                action: 'p',
            }]
        );
    }

    #[test]
    fn test_param_overflow_saturates() {
        assert_eq!(parse(b"\x1b[99999999A"), vec![csi(&[u16::MAX], None, 'A')]);
    }

    #[test]
    fn test_too_many_params_is_dropped() {
        let mut seq = b"\x1b[".to_vec();
        for _ in 0..40 {
            seq.extend_from_slice(b"1;");
        }
        seq.extend_from_slice(b"mX");
        assert_eq!(parse(&seq), vec![Action::Print('X')]);
    }

    #[test]
    fn test_unexpected_byte_aborts_and_is_reprocessed() {
        // A newline in the middle of a CSI aborts it without effect, and the
        // newline itself is still executed.
        assert_eq!(
            parse(b"\x1b[12\nA"),
            vec![Action::Execute(b'\n'), Action::Print('A')]
        );
        // A new ESC interrupts the pending sequence.
        assert_eq!(parse(b"\x1b[3\x1b[2J"), vec![csi(&[2], None, 'J')]);
    }

    #[test]
    fn test_private_marker_after_digits_is_malformed() {
        assert_eq!(
            parse(b"\x1b[1?hZ"),
            vec![Action::Print('?'), Action::Print('h'), Action::Print('Z')]
        );
    }

    #[test]
    fn test_esc_dispatch() {
        assert_eq!(parse(b"\x1b7"), vec![Action::Esc(vec![], '7')]);
        assert_eq!(parse(b"\x1b(B"), vec![Action::Esc(vec![b'('], 'B')]);
        assert_eq!(parse(b"\x1b\x1bM"), vec![Action::Esc(vec![], 'M')]);
    }

    #[test]
    fn test_osc_terminators() {
        assert_eq!(
            parse(b"\x1b]0;title one\x07"),
            vec![Action::Osc("0;title one".into())]
        );
        assert_eq!(
            parse(b"\x1b]2;title two\x1b\\"),
            vec![Action::Osc("2;title two".into())]
        );
    }

    #[test]
    fn test_unterminated_osc_is_dropped() {
        assert_eq!(parse(b"\x1b]0;abc\x1b[1m"), vec![csi(&[1], None, 'm')]);
    }

    #[test]
    fn test_dcs_is_swallowed() {
        assert_eq!(parse(b"\x1bPq#0;2;0;0;0\x1b\\x"), vec![Action::Print('x')]);
    }

    #[test]
    fn test_utf8_split_across_calls() {
        let bytes = "h\u{e9}\u{2500}\u{1f600}".as_bytes();
        for split in 0..=bytes.len() {
            let mut parser = Parser::new();
            let mut recorder = Recorder::default();
            parser.advance(&mut recorder, &bytes[..split]);
            parser.advance(&mut recorder, &bytes[split..]);
            assert_eq!(
                recorder.actions,
                vec![
                    Action::Print('h'),
                    Action::Print('\u{e9}'),
                    Action::Print('\u{2500}'),
                    Action::Print('\u{1f600}'),
                ],
                "split at {split}"
            );
            assert!(parser.is_ground());
        }
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        assert_eq!(
            parse(b"\xc3(\xff"),
            vec![
                Action::Print(char::REPLACEMENT_CHARACTER),
                Action::Print('('),
                Action::Print(char::REPLACEMENT_CHARACTER),
            ]
        );
    }
}
