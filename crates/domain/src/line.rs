//! Line classifier for interpreter output.
//!
//! Every line the interpreter prints is one of:
//!
//! | Kind | Shape | Example |
//! |------|-------|---------|
//! | Prompt | `[state][MAC][type]` | `[CON][00:11:22:33:44:55][LE]>` |
//! | Result | `TAG(XXXX): payload` | `CHAR-READ-HND(0000): 0a 1b` |
//! | Error | `ERROR(XXXX)...:...(line,col):...` | `ERROR(0003) parse: bad (1,4): x` |
//!
//! The three matchers are tried in that order; the first hit wins and
//! anything else is [`InboundLine::Unrecognized`]. Matching is anchored
//! anywhere in the line, the output format is fixed and unversioned, so the
//! field widths (17-character MAC field, 4-character codes) are exact.

use serde::Serialize;

const MAC_FIELD_LEN: usize = 17;
const CODE_LEN: usize = 4;

/// A classified output line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundLine {
    /// Interactive prompt; informational only.
    Prompt(Prompt),
    /// Command result or asynchronous event.
    Result(ResultLine),
    /// Interpreter-level error report.
    Error(ShellError),
    /// Anything else, including results whose code is not hexadecimal.
    Unrecognized,
}

/// The `[state][MAC][type]` prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    /// Connection status field (e.g. `CON`).
    pub state: String,
    /// 17-character address field; blank while disconnected.
    pub address: String,
    /// Address/transport type field (e.g. `LE`).
    pub kind: String,
}

/// A `TAG(XXXX): payload` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultLine {
    /// Upper-case tag, possibly empty.
    pub tag: String,
    /// Handle or status code, parsed from 4 hex digits.
    pub code: u16,
    /// Everything after the colon, leading whitespace removed.
    pub payload: String,
}

/// An `ERROR(XXXX)...` report from the interpreter's command parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShellError {
    /// Error code, parsed from 4 hex digits.
    pub code: u16,
    /// Reported line, when present.
    pub line: Option<u32>,
    /// Reported column, when present.
    pub column: Option<u32>,
    /// The raw line.
    pub message: String,
}

/// Classify one line of interpreter output. Never fails.
#[must_use]
pub fn classify(line: &str) -> InboundLine {
    let line = line.trim_end_matches(['\r', '\n']);

    if let Some(prompt) = match_prompt(line) {
        return InboundLine::Prompt(prompt);
    }
    if let Some(candidate) = match_result(line) {
        return candidate.map_or(InboundLine::Unrecognized, InboundLine::Result);
    }
    if let Some(candidate) = match_error(line) {
        return candidate.map_or(InboundLine::Unrecognized, InboundLine::Error);
    }
    InboundLine::Unrecognized
}

fn is_mac_field_byte(b: u8) -> bool {
    b.is_ascii_digit() || (b'A'..=b'F').contains(&b) || b == b':' || b.is_ascii_whitespace()
}

fn match_prompt(line: &str) -> Option<Prompt> {
    for (open, _) in line.match_indices('[') {
        let rest = &line[open + 1..];
        for (sep, _) in rest.match_indices("][") {
            let after = &rest[sep + 2..];
            let bytes = after.as_bytes();
            if bytes.len() < MAC_FIELD_LEN + 2
                || !bytes[..MAC_FIELD_LEN].iter().copied().all(is_mac_field_byte)
                || &bytes[MAC_FIELD_LEN..MAC_FIELD_LEN + 2] != b"]["
            {
                continue;
            }
            let tail = &after[MAC_FIELD_LEN + 2..];
            let Some(close) = tail.rfind(']') else {
                continue;
            };
            return Some(Prompt {
                state: rest[..sep].to_string(),
                address: after[..MAC_FIELD_LEN].to_string(),
                kind: tail[..close].to_string(),
            });
        }
    }
    None
}

/// Position of a `(XXXX)` group at `open` whose 4 characters are
/// alphanumeric, returning the 4 characters.
fn code_group(line: &str, open: usize) -> Option<&str> {
    let bytes = line.as_bytes();
    let end = open + 1 + CODE_LEN;
    if bytes.len() <= end || bytes[end] != b')' {
        return None;
    }
    let code = &bytes[open + 1..end];
    code.iter()
        .all(u8::is_ascii_alphanumeric)
        .then(|| &line[open + 1..end])
}

fn parse_code(code: &str) -> Option<u16> {
    u16::from_str_radix(code, 16).ok()
}

/// Outer `None`: no result shape. Inner `None`: shape matched but the code
/// is not hexadecimal.
fn match_result(line: &str) -> Option<Option<ResultLine>> {
    let bytes = line.as_bytes();
    for (open, _) in line.match_indices('(') {
        let Some(code) = code_group(line, open) else {
            continue;
        };
        let colon = open + 1 + CODE_LEN + 1;
        if bytes.get(colon) != Some(&b':') {
            continue;
        }

        let tag_start = bytes[..open]
            .iter()
            .rposition(|b| !(b.is_ascii_uppercase() || *b == b'-'))
            .map_or(0, |pos| pos + 1);

        return Some(parse_code(code).map(|code| ResultLine {
            tag: line[tag_start..open].to_string(),
            code,
            payload: line[colon + 1..].trim_start().to_string(),
        }));
    }
    None
}

/// Parse `(digits,digits):` at `open`.
fn position_group(text: &str, open: usize) -> Option<(Option<u32>, Option<u32>)> {
    let inner = &text[open + 1..];
    let close = inner.find(')')?;
    if inner.as_bytes().get(close + 1) != Some(&b':') {
        return None;
    }
    let (line, column) = inner[..close].split_once(',')?;
    let digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if !digits(line) || !digits(column) {
        return None;
    }
    Some((line.parse().ok(), column.parse().ok()))
}

fn match_error(line: &str) -> Option<Option<ShellError>> {
    for (start, _) in line.match_indices("ERROR(") {
        let open = start + "ERROR".len();
        let Some(code) = code_group(line, open) else {
            continue;
        };
        let rest_start = open + 1 + CODE_LEN + 1;
        let rest = &line[rest_start..];
        let Some(first_colon) = rest.find(':') else {
            continue;
        };

        let position = rest
            .match_indices('(')
            .map(|(idx, _)| idx)
            .filter(|idx| *idx > first_colon)
            .filter_map(|idx| position_group(rest, idx))
            .last();
        let Some((line_no, column)) = position else {
            continue;
        };

        return Some(parse_code(code).map(|code| ShellError {
            code,
            line: line_no,
            column,
            message: line.to_string(),
        }));
    }
    None
}
