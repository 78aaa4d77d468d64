// SPDX-License-Identifier: MIT
//
// Keyboard input parser.
//
// Turns raw stdin bytes into key events. Handles what a plain terminal in
// raw mode sends:
//
// - Legacy CSI sequences (arrows, editing keys, function keys, Shift+Tab)
// - SS3 sequences (arrows and F1-F4 from some terminals)
// - Alt+key (ESC followed by a printable character)
// - Control characters (Ctrl+letter)
// - UTF-8 multi-byte characters
//
// The parser keeps a small byte buffer because an escape sequence can be
// split across `read()` calls. Feed bytes with [`Parser::advance`]. A lone
// ESC is ambiguous until more bytes arrive or a short timeout passes; call
// [`Parser::flush`] after the timeout to emit it as an Escape key.

use bitflags::bitflags;

// ─── Key types ──────────────────────────────────────────────────────────────

/// A key press with its modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyEvent {
    pub code: KeyCode,
    pub modifiers: Modifiers,
}

impl KeyEvent {
    /// A key with no modifiers.
    #[inline]
    #[must_use]
    pub const fn new(code: KeyCode) -> Self {
        Self {
            code,
            modifiers: Modifiers::empty(),
        }
    }

    #[inline]
    #[must_use]
    pub const fn with_modifiers(code: KeyCode, modifiers: Modifiers) -> Self {
        Self { code, modifiers }
    }

    /// A printable character with no modifiers.
    #[inline]
    #[must_use]
    pub const fn char(ch: char) -> Self {
        Self::new(KeyCode::Char(ch))
    }

    /// Tab without Shift.
    #[must_use]
    pub fn is_tab(&self) -> bool {
        self.code == KeyCode::Tab && !self.modifiers.contains(Modifiers::SHIFT)
    }

    /// Shift+Tab, however the terminal reported it.
    #[must_use]
    pub fn is_back_tab(&self) -> bool {
        self.code == KeyCode::BackTab
            || (self.code == KeyCode::Tab && self.modifiers.contains(Modifiers::SHIFT))
    }
}

impl From<KeyCode> for KeyEvent {
    fn from(code: KeyCode) -> Self {
        Self::new(code)
    }
}

/// Identity of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    /// A Unicode character.
    Char(char),
    // ── Named keys ──────────────────────────────────────────────
    Enter,
    Tab,
    /// Shift+Tab as reported by `CSI Z`.
    BackTab,
    Backspace,
    Escape,
    Delete,
    Insert,
    // ── Navigation ──────────────────────────────────────────────
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    /// F1 through F20.
    F(u8),
}

bitflags! {
    /// Keyboard modifier flags, in xterm's CSI encoding (`param = 1 + bits`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct Modifiers: u8 {
        const SHIFT = 0b0000_0001;
        const ALT   = 0b0000_0010;
        const CTRL  = 0b0000_0100;
    }
}

// ─── Parser ─────────────────────────────────────────────────────────────────

/// Incremental key parser.
///
/// # Examples
///
/// ```
/// use cellpump_term::input::{KeyCode, Parser};
///
/// let mut p = Parser::new();
/// let keys = p.advance(b"a\x1b[A");
/// assert_eq!(keys[0].code, KeyCode::Char('a'));
/// assert_eq!(keys[1].code, KeyCode::Up);
///
/// assert!(p.advance(b"\x1b").is_empty());
/// assert_eq!(p.flush()[0].code, KeyCode::Escape);
/// ```
#[derive(Debug)]
pub struct Parser {
    buf: Vec<u8>,
}

impl Parser {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(64),
        }
    }

    /// Feed raw bytes and return every key that can be decoded.
    ///
    /// Incomplete sequences stay buffered for the next call.
    pub fn advance(&mut self, data: &[u8]) -> Vec<KeyEvent> {
        self.buf.extend_from_slice(data);
        let mut keys = Vec::new();
        let mut pos = 0;

        while pos < self.buf.len() {
            match try_parse(&self.buf[pos..]) {
                Parsed::Key(key, consumed) => {
                    keys.push(key);
                    pos += consumed;
                }
                Parsed::Incomplete => break,
                Parsed::Skip(n) => pos += n,
            }
        }

        if pos > 0 {
            self.buf.drain(..pos);
        }
        keys
    }

    /// Whether bytes are waiting for the rest of a sequence.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.buf.is_empty()
    }

    /// Emit pending bytes as literal keys.
    ///
    /// A lone ESC becomes Escape; any other leftover printable or control
    /// byte becomes the key it stands for.
    pub fn flush(&mut self) -> Vec<KeyEvent> {
        let keys = self
            .buf
            .iter()
            .filter_map(|&byte| match byte {
                0x1B => Some(KeyEvent::new(KeyCode::Escape)),
                0x7F => Some(KeyEvent::new(KeyCode::Backspace)),
                b @ 0x01..=0x1A => Some(ctrl(b)),
                b @ 0x20..=0x7E => Some(KeyEvent::char(char::from(b))),
                _ => None,
            })
            .collect();
        self.buf.clear();
        keys
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Stateless parsing ──────────────────────────────────────────────────────

enum Parsed {
    Key(KeyEvent, usize),
    Incomplete,
    Skip(usize),
}

fn try_parse(buf: &[u8]) -> Parsed {
    let Some(&first) = buf.first() else {
        return Parsed::Skip(0);
    };
    match first {
        0x1B => parse_escape(buf),
        0x08 | 0x7F => Parsed::Key(KeyEvent::new(KeyCode::Backspace), 1),
        0x09 => Parsed::Key(KeyEvent::new(KeyCode::Tab), 1),
        0x0A | 0x0D => Parsed::Key(KeyEvent::new(KeyCode::Enter), 1),
        b @ (0x01..=0x07 | 0x0B..=0x0C | 0x0E..=0x1A) => Parsed::Key(ctrl(b), 1),
        b @ 0x20..=0x7E => Parsed::Key(KeyEvent::char(char::from(b)), 1),
        0xC0..=0xFF => parse_utf8(buf),
        _ => Parsed::Skip(1),
    }
}

fn parse_escape(buf: &[u8]) -> Parsed {
    let Some(&second) = buf.get(1) else {
        return Parsed::Incomplete;
    };
    match second {
        b'[' => parse_csi(buf),
        b'O' => parse_ss3(buf),
        0x1B => Parsed::Key(KeyEvent::with_modifiers(KeyCode::Escape, Modifiers::ALT), 2),
        b @ 0x20..=0x7E => Parsed::Key(
            KeyEvent::with_modifiers(KeyCode::Char(char::from(b)), Modifiers::ALT),
            2,
        ),
        _ => Parsed::Key(KeyEvent::new(KeyCode::Escape), 1),
    }
}

fn parse_csi(buf: &[u8]) -> Parsed {
    // Final byte is in 0x40..=0x7E; parameters and intermediates below it.
    let mut end = 2;
    while end < buf.len() {
        let b = buf[end];
        if (0x40..=0x7E).contains(&b) {
            break;
        }
        if !(0x20..=0x3F).contains(&b) {
            return Parsed::Skip(end + 1);
        }
        end += 1;
    }
    if end >= buf.len() {
        return Parsed::Incomplete;
    }

    let params = parse_params(&buf[2..end]);
    let consumed = end + 1;
    let modifiers = params.get(1).map_or(Modifiers::empty(), |&p| decode_modifiers(p));

    let code = match buf[end] {
        b'~' => match params.first().copied().unwrap_or(0) {
            1 | 7 => KeyCode::Home,
            2 => KeyCode::Insert,
            3 => KeyCode::Delete,
            4 | 8 => KeyCode::End,
            5 => KeyCode::PageUp,
            6 => KeyCode::PageDown,
            15 => KeyCode::F(5),
            17..=21 => KeyCode::F(tilde_fkey(params[0], 17, 6)),
            23..=26 => KeyCode::F(tilde_fkey(params[0], 23, 11)),
            28 | 29 => KeyCode::F(tilde_fkey(params[0], 28, 15)),
            31..=34 => KeyCode::F(tilde_fkey(params[0], 31, 17)),
            _ => return Parsed::Skip(consumed),
        },
        b'A' => KeyCode::Up,
        b'B' => KeyCode::Down,
        b'C' => KeyCode::Right,
        b'D' => KeyCode::Left,
        b'H' => KeyCode::Home,
        b'F' => KeyCode::End,
        b'P' => KeyCode::F(1),
        b'Q' => KeyCode::F(2),
        b'R' => KeyCode::F(3),
        b'S' => KeyCode::F(4),
        b'Z' => KeyCode::BackTab,
        _ => return Parsed::Skip(consumed),
    };
    Parsed::Key(KeyEvent::with_modifiers(code, modifiers), consumed)
}

fn parse_ss3(buf: &[u8]) -> Parsed {
    let Some(&third) = buf.get(2) else {
        return Parsed::Incomplete;
    };
    let code = match third {
        b'A' => KeyCode::Up,
        b'B' => KeyCode::Down,
        b'C' => KeyCode::Right,
        b'D' => KeyCode::Left,
        b'H' => KeyCode::Home,
        b'F' => KeyCode::End,
        b'P' => KeyCode::F(1),
        b'Q' => KeyCode::F(2),
        b'R' => KeyCode::F(3),
        b'S' => KeyCode::F(4),
        _ => return Parsed::Skip(3),
    };
    Parsed::Key(KeyEvent::new(code), 3)
}

fn parse_utf8(buf: &[u8]) -> Parsed {
    let expected = match buf[0] {
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF7 => 4,
        _ => return Parsed::Skip(1),
    };
    if buf.len() < expected {
        return Parsed::Incomplete;
    }
    std::str::from_utf8(&buf[..expected])
        .ok()
        .and_then(|s| s.chars().next())
        .map_or(Parsed::Skip(1), |ch| Parsed::Key(KeyEvent::char(ch), expected))
}

// ─── Helpers ────────────────────────────────────────────────────────────────

/// Ctrl+letter from its control byte (0x01 → Ctrl+a).
fn ctrl(byte: u8) -> KeyEvent {
    KeyEvent::with_modifiers(KeyCode::Char(char::from(byte + b'a' - 1)), Modifiers::CTRL)
}

/// Function key number for tilde codes in a contiguous run.
#[allow(clippy::cast_possible_truncation)]
const fn tilde_fkey(code: u16, run_start: u16, first_key: u16) -> u8 {
    (code - run_start + first_key) as u8
}

/// Semicolon-separated numeric parameters. Empty fields read as 0.
fn parse_params(raw: &[u8]) -> Vec<u16> {
    if raw.is_empty() {
        return Vec::new();
    }
    raw.split(|&b| b == b';')
        .map(|field| {
            field
                .iter()
                .take_while(|b| b.is_ascii_digit())
                .fold(0u16, |acc, &b| {
                    acc.saturating_mul(10).saturating_add(u16::from(b - b'0'))
                })
        })
        .collect()
}

/// `1 + bits` encoding; 0 and 1 mean no modifiers.
#[allow(clippy::cast_possible_truncation)]
const fn decode_modifiers(param: u16) -> Modifiers {
    let bits = if param > 0 { param - 1 } else { 0 };
    Modifiers::from_bits_truncate(bits as u8)
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(bytes: &[u8]) -> Vec<KeyEvent> {
        Parser::new().advance(bytes)
    }

    fn codes(bytes: &[u8]) -> Vec<KeyCode> {
        parse(bytes).into_iter().map(|k| k.code).collect()
    }

    // ── Plain bytes ─────────────────────────────────────────────────────

    #[test]
    fn printable_ascii() {
        assert_eq!(
            codes(b"hi!"),
            vec![KeyCode::Char('h'), KeyCode::Char('i'), KeyCode::Char('!')]
        );
    }

    #[test]
    fn named_control_bytes() {
        assert_eq!(
            codes(b"\t\r\n\x7f"),
            vec![KeyCode::Tab, KeyCode::Enter, KeyCode::Enter, KeyCode::Backspace]
        );
    }

    #[test]
    fn ctrl_letters() {
        let keys = parse(b"\x03");
        assert_eq!(keys, vec![KeyEvent::with_modifiers(KeyCode::Char('c'), Modifiers::CTRL)]);
    }

    #[test]
    fn utf8_characters() {
        assert_eq!(codes("é✓".as_bytes()), vec![KeyCode::Char('é'), KeyCode::Char('✓')]);
    }

    #[test]
    fn split_utf8_waits_for_rest() {
        let mut p = Parser::new();
        let bytes = "✓".as_bytes();
        assert!(p.advance(&bytes[..1]).is_empty());
        assert!(p.has_pending());
        assert_eq!(p.advance(&bytes[1..]), vec![KeyEvent::char('✓')]);
        assert!(!p.has_pending());
    }

    // ── Escape sequences ────────────────────────────────────────────────

    #[test]
    fn csi_arrows_and_navigation() {
        assert_eq!(
            codes(b"\x1b[A\x1b[B\x1b[C\x1b[D\x1b[H\x1b[F"),
            vec![
                KeyCode::Up,
                KeyCode::Down,
                KeyCode::Right,
                KeyCode::Left,
                KeyCode::Home,
                KeyCode::End
            ]
        );
    }

    #[test]
    fn csi_modified_arrow() {
        let keys = parse(b"\x1b[1;5C");
        assert_eq!(keys, vec![KeyEvent::with_modifiers(KeyCode::Right, Modifiers::CTRL)]);
    }

    #[test]
    fn csi_z_is_back_tab() {
        let keys = parse(b"\x1b[Z");
        assert_eq!(keys[0].code, KeyCode::BackTab);
        assert!(keys[0].is_back_tab());
        assert!(!keys[0].is_tab());
    }

    #[test]
    fn shift_tab_counts_as_back_tab() {
        let k = KeyEvent::with_modifiers(KeyCode::Tab, Modifiers::SHIFT);
        assert!(k.is_back_tab());
        assert!(!k.is_tab());
        assert!(KeyEvent::new(KeyCode::Tab).is_tab());
    }

    #[test]
    fn tilde_keys() {
        assert_eq!(
            codes(b"\x1b[3~\x1b[5~\x1b[6~\x1b[15~\x1b[24~"),
            vec![
                KeyCode::Delete,
                KeyCode::PageUp,
                KeyCode::PageDown,
                KeyCode::F(5),
                KeyCode::F(12)
            ]
        );
    }

    #[test]
    fn ss3_function_keys() {
        assert_eq!(codes(b"\x1bOP\x1bOA"), vec![KeyCode::F(1), KeyCode::Up]);
    }

    #[test]
    fn alt_char() {
        let keys = parse(b"\x1bx");
        assert_eq!(keys, vec![KeyEvent::with_modifiers(KeyCode::Char('x'), Modifiers::ALT)]);
    }

    #[test]
    fn unknown_csi_is_skipped() {
        assert_eq!(codes(b"\x1b[99~a"), vec![KeyCode::Char('a')]);
    }

    // ── Lone ESC ────────────────────────────────────────────────────────

    #[test]
    fn lone_escape_needs_flush() {
        let mut p = Parser::new();
        assert!(p.advance(b"\x1b").is_empty());
        assert_eq!(p.flush(), vec![KeyEvent::new(KeyCode::Escape)]);
        assert!(!p.has_pending());
    }

    #[test]
    fn split_csi_completes() {
        let mut p = Parser::new();
        assert!(p.advance(b"\x1b[").is_empty());
        assert_eq!(p.advance(b"A"), vec![KeyEvent::new(KeyCode::Up)]);
    }
}
