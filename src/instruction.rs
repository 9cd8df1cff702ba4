//! Line-oriented instruction text carried in `diff` entries.
//!
//! A diff body is the baseline-relative path on its own line, followed by one
//! instruction per line:
//!
//! - `=N` copy N bytes from the baseline read position
//! - `-N` skip N bytes of the baseline
//! - `+text` emit `text` after unquoting it
//!
//! Inserted text is quoted so that it never contains a line break.

use std::io::{BufRead, Write};

use crate::edit_script::{EditScript, SpanKind};
use crate::error::PatchError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    Equal(u64),
    Delete(u64),
    Insert(Vec<u8>),
}

/// Escape backslash, newline and carriage return. Every other byte passes
/// through untouched.
pub fn quote(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    for &b in raw {
        match b {
            b'\\' => out.extend_from_slice(b"\\\\"),
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            _ => out.push(b),
        }
    }
    out
}

/// Exact inverse of [`quote`].
pub fn unquote(quoted: &[u8]) -> Result<Vec<u8>, PatchError> {
    let mut out = Vec::with_capacity(quoted.len());
    let mut bytes = quoted.iter().copied();
    while let Some(b) = bytes.next() {
        if b != b'\\' {
            out.push(b);
            continue;
        }
        match bytes.next() {
            Some(b'\\') => out.push(b'\\'),
            Some(b'n') => out.push(b'\n'),
            Some(b'r') => out.push(b'\r'),
            Some(other) => return Err(PatchError::InvalidEscape(char::from(other))),
            None => return Err(PatchError::TrailingBackslash),
        }
    }
    Ok(out)
}

fn parse_count(digits: &[u8]) -> Result<u64, PatchError> {
    let invalid = || PatchError::InvalidCount(String::from_utf8_lossy(digits).into_owned());
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Err(invalid());
    }
    std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(invalid)
}

impl Instruction {
    /// Parse one instruction line (without its line terminator).
    pub fn parse(line: &[u8]) -> Result<Self, PatchError> {
        match line.split_first() {
            Some((b'=', rest)) => Ok(Instruction::Equal(parse_count(rest)?)),
            Some((b'-', rest)) => Ok(Instruction::Delete(parse_count(rest)?)),
            Some((b'+', rest)) => Ok(Instruction::Insert(unquote(rest)?)),
            _ => Err(PatchError::UnknownInstruction(
                String::from_utf8_lossy(line).into_owned(),
            )),
        }
    }

    /// Write the instruction followed by a newline.
    pub fn write_line<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        match self {
            Instruction::Equal(n) => writeln!(out, "={n}"),
            Instruction::Delete(n) => writeln!(out, "-{n}"),
            Instruction::Insert(text) => {
                out.write_all(b"+")?;
                out.write_all(&quote(text))?;
                out.write_all(b"\n")
            }
        }
    }
}

/// Translate an edit script into instructions, one per span, in order.
pub fn encode(script: &EditScript) -> Vec<Instruction> {
    script
        .spans()
        .iter()
        .map(|span| match span.kind {
            SpanKind::Equal => Instruction::Equal(span.text.len() as u64),
            SpanKind::Delete => Instruction::Delete(span.text.len() as u64),
            SpanKind::Insert => Instruction::Insert(span.text.clone()),
        })
        .collect()
}

/// Serialize a complete `diff` entry body. The path line is unquoted, so a
/// path containing `\n` is refused.
pub fn encode_diff_body(baseline_rel: &str, script: &EditScript) -> Result<Vec<u8>, PatchError> {
    if baseline_rel.contains('\n') {
        return Err(PatchError::LineBreakInPath(baseline_rel.to_string()));
    }
    let mut body = Vec::new();
    body.extend_from_slice(baseline_rel.as_bytes());
    body.push(b'\n');
    for instruction in encode(script) {
        // Writing into a Vec cannot fail.
        let _ = instruction.write_line(&mut body);
    }
    Ok(body)
}

/// Streaming reader over a `diff` entry body.
pub struct DiffBodyReader<R> {
    inner: R,
    line: Vec<u8>,
}

impl<R: BufRead> DiffBodyReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            line: Vec::new(),
        }
    }

    fn next_line(&mut self) -> Result<Option<&[u8]>, PatchError> {
        self.line.clear();
        if self.inner.read_until(b'\n', &mut self.line)? == 0 {
            return Ok(None);
        }
        if self.line.last() == Some(&b'\n') {
            self.line.pop();
        }
        Ok(Some(self.line.as_slice()))
    }

    /// Read the leading baseline path line. Must be called before
    /// [`next_instruction`](Self::next_instruction).
    pub fn baseline_path(&mut self) -> Result<String, PatchError> {
        match self.next_line()? {
            Some(line) if !line.is_empty() => String::from_utf8(line.to_vec())
                .map_err(|_| PatchError::MissingBaselinePath),
            _ => Err(PatchError::MissingBaselinePath),
        }
    }

    pub fn next_instruction(&mut self) -> Result<Option<Instruction>, PatchError> {
        match self.next_line()? {
            Some(line) => Instruction::parse(line).map(Some),
            None => Ok(None),
        }
    }
}
