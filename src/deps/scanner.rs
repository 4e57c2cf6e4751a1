//! Byte-level import scanner.
//!
//! Extracts `import Some.Module` names from raw source bytes without a real
//! parser. Sources are frequently half-edited, so the scanner never fails:
//! anything it does not understand either ends the scan or is skipped.
//!
//! Only column-0 words are considered. The module header (`module`,
//! `port module`, `effect module`) is skipped; the first top-level
//! declaration that is not an import ends the scan.
//!
//! # Example
//!
//! ```ignore
//! let names: Vec<_> = Imports::new(b"import Html.Events\nimport Json.Decode as D")
//!     .map(|m| m.to_string())
//!     .collect();
//! assert_eq!(names, ["Html.Events", "Json.Decode"]);
//! ```

use std::fmt;
use std::iter::FusedIterator;
use std::path::PathBuf;

use smallvec::SmallVec;

/// A dotted module name, e.g. `Html.Events` as `["Html", "Events"]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleName(SmallVec<[String; 4]>);

impl ModuleName {
    #[cfg(test)]
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Path of the defining file relative to a source directory.
    pub fn relative_path(&self) -> PathBuf {
        let mut path: PathBuf = self.0.iter().collect();
        path.set_extension("elm");
        path
    }

    /// Parse a dotted name. Returns `None` unless every segment is a valid
    /// module segment.
    pub fn parse(dotted: &str) -> Option<Self> {
        let segments: SmallVec<[String; 4]> = dotted
            .split('.')
            .map(|s| valid_segment(s.as_bytes()).map(str::to_owned))
            .collect::<Option<_>>()?;
        Some(Self(segments))
    }
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            f.write_str(segment)?;
        }
        Ok(())
    }
}

/// Where to continue once a comment closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resume {
    LineStart,
    Rest,
    AfterImport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Column 0. `indented` allows leading blanks (after a closed comment).
    LineStart { indented: bool },
    /// Remainder of a logical line, including indented continuation lines
    Rest,
    LineComment { resume: Resume },
    BlockComment { depth: u32, resume: Resume },
    Str,
    TripleStr,
    Char,
    /// Between the `import` keyword and the module name
    AfterImport,
    Done,
}

/// Lazy iterator over the imports of one source file.
///
/// Yields the same sequence for the same bytes.
#[derive(Debug, Clone)]
pub struct Imports<'a> {
    bytes: &'a [u8],
    pos: usize,
    state: State,
    seen_header: bool,
    seen_import: bool,
    non_import: bool,
}

impl<'a> Imports<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            pos: 0,
            state: State::LineStart { indented: false },
            seen_header: false,
            seen_import: false,
            non_import: false,
        }
    }

    /// Rewind to the start of the input.
    #[cfg(test)]
    pub fn restart(&mut self) {
        *self = Self::new(self.bytes);
    }

    /// A top-level token that is not an import was reached: no further
    /// imports can follow.
    pub fn is_non_import(&self) -> bool {
        self.non_import
    }

    fn at(&self, pattern: &[u8]) -> bool {
        self.bytes[self.pos..].starts_with(pattern)
    }

    fn stop(&mut self, non_import: bool) {
        self.state = State::Done;
        self.non_import = non_import;
    }

    fn resume(&mut self, resume: Resume) {
        self.state = match resume {
            Resume::LineStart => State::LineStart { indented: true },
            Resume::Rest => State::Rest,
            Resume::AfterImport => State::AfterImport,
        };
    }

    /// Handle a column-0 word.
    fn top_level_word(&mut self) {
        let end = ident_end(self.bytes, self.pos);
        let word = &self.bytes[self.pos..end];

        match word {
            b"import" => {
                self.seen_import = true;
                self.pos = end;
                let follows_blank = match self.bytes.get(end) {
                    None => true,
                    Some(&b) => is_blank(b) || is_newline(b) || self.at(b"--") || self.at(b"{-"),
                };
                self.state = if follows_blank {
                    State::AfterImport
                } else {
                    State::Rest
                };
            }
            b"module" | b"port" | b"effect" if !self.seen_header && !self.seen_import => {
                self.seen_header = true;
                self.pos = end;
                self.state = State::Rest;
            }
            _ => self.stop(true),
        }
    }

    /// Read the module name at `pos`. Always moves into `Rest`.
    fn module_name(&mut self) -> Option<ModuleName> {
        self.state = State::Rest;
        let bytes = self.bytes;
        let mut segments: SmallVec<[String; 4]> = SmallVec::new();

        loop {
            let start = self.pos;
            let end = ident_end(bytes, start);
            let Some(segment) = valid_segment(&bytes[start..end]) else {
                // Lowercase or garbage: discard when first, truncate otherwise
                self.pos = end;
                return (!segments.is_empty()).then(|| ModuleName(segments));
            };
            segments.push(segment.to_owned());
            self.pos = end;

            match bytes.get(end) {
                None => return Some(ModuleName(segments)),
                Some(b'.') => {
                    if bytes.get(end + 1).is_some_and(|&b| is_ident_byte(b)) {
                        self.pos = end + 1;
                        continue;
                    }
                    // Trailing dot, `A. B`, `A..B`
                    self.pos = end + 1;
                    return None;
                }
                Some(&b) if is_blank(b) || is_newline(b) => return Some(ModuleName(segments)),
                Some(_) if self.at(b"--") || self.at(b"{-") => {
                    return Some(ModuleName(segments));
                }
                Some(_) => return None,
            }
        }
    }
}

impl Iterator for Imports<'_> {
    type Item = ModuleName;

    fn next(&mut self) -> Option<ModuleName> {
        loop {
            if self.state == State::Done {
                return None;
            }
            let Some(&byte) = self.bytes.get(self.pos) else {
                self.stop(self.non_import);
                return None;
            };

            match self.state {
                State::LineStart { indented } => {
                    if is_newline(byte) {
                        self.pos += 1;
                        self.state = State::LineStart { indented: false };
                    } else if is_blank(byte) {
                        if indented {
                            self.pos += 1;
                        } else {
                            self.state = State::Rest;
                        }
                    } else if self.at(b"--") {
                        self.pos += 2;
                        self.state = State::LineComment {
                            resume: Resume::LineStart,
                        };
                    } else if self.at(b"{-") {
                        self.pos += 2;
                        self.state = State::BlockComment {
                            depth: 1,
                            resume: Resume::LineStart,
                        };
                    } else if is_ident_byte(byte) {
                        self.top_level_word();
                    } else {
                        self.stop(true);
                    }
                }

                State::Rest => {
                    if is_newline(byte) {
                        self.pos += 1;
                        self.state = State::LineStart { indented: false };
                    } else if self.at(b"--") {
                        self.pos += 2;
                        self.state = State::LineComment {
                            resume: Resume::LineStart,
                        };
                    } else if self.at(b"{-") {
                        self.pos += 2;
                        self.state = State::BlockComment {
                            depth: 1,
                            resume: Resume::Rest,
                        };
                    } else if self.at(b"\"\"\"") {
                        self.pos += 3;
                        self.state = State::TripleStr;
                    } else if byte == b'"' {
                        self.pos += 1;
                        self.state = State::Str;
                    } else if byte == b'\'' {
                        self.pos += 1;
                        self.state = State::Char;
                    } else {
                        self.pos += 1;
                    }
                }

                State::LineComment { resume } => {
                    self.pos += 1;
                    if is_newline(byte) {
                        self.state = match resume {
                            Resume::AfterImport => State::AfterImport,
                            _ => State::LineStart { indented: false },
                        };
                    }
                }

                State::BlockComment { depth, resume } => {
                    if self.at(b"{-") {
                        self.pos += 2;
                        self.state = State::BlockComment {
                            depth: depth + 1,
                            resume,
                        };
                    } else if self.at(b"-}") {
                        self.pos += 2;
                        if depth == 1 {
                            self.resume(resume);
                        } else {
                            self.state = State::BlockComment {
                                depth: depth - 1,
                                resume,
                            };
                        }
                    } else {
                        self.pos += 1;
                    }
                }

                State::Str | State::Char => {
                    let close = if self.state == State::Str { b'"' } else { b'\'' };
                    if byte == b'\\' {
                        self.pos += 2;
                    } else if byte == close {
                        self.pos += 1;
                        self.state = State::Rest;
                    } else if is_newline(byte) {
                        // Unterminated single-line literal
                        self.pos += 1;
                        self.state = State::LineStart { indented: false };
                    } else {
                        self.pos += 1;
                    }
                }

                State::TripleStr => {
                    if byte == b'\\' {
                        self.pos += 2;
                    } else if self.at(b"\"\"\"") {
                        self.pos += 3;
                        self.state = State::Rest;
                    } else {
                        self.pos += 1;
                    }
                }

                State::AfterImport => {
                    if is_blank(byte) || is_newline(byte) {
                        self.pos += 1;
                    } else if self.at(b"--") {
                        self.pos += 2;
                        self.state = State::LineComment {
                            resume: Resume::AfterImport,
                        };
                    } else if self.at(b"{-") {
                        self.pos += 2;
                        self.state = State::BlockComment {
                            depth: 1,
                            resume: Resume::AfterImport,
                        };
                    } else if let Some(name) = self.module_name() {
                        return Some(name);
                    }
                }

                State::Done => return None,
            }
        }
    }
}

impl FusedIterator for Imports<'_> {}

/// Collect all imports of a source file.
#[cfg(test)]
pub fn parse_imports(bytes: &[u8]) -> Vec<ModuleName> {
    Imports::new(bytes).collect()
}

#[inline]
fn is_newline(b: u8) -> bool {
    b == b'\n' || b == b'\r'
}

#[inline]
fn is_blank(b: u8) -> bool {
    b == b' ' || b == b'\t'
}

/// Bytes that may be part of an identifier. Non-ASCII bytes are accepted
/// here and validated per segment.
#[inline]
fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80
}

fn ident_end(bytes: &[u8], start: usize) -> usize {
    bytes[start..]
        .iter()
        .position(|&b| !is_ident_byte(b))
        .map_or(bytes.len(), |n| start + n)
}

/// An uppercase-initial run of letters, digits and underscores.
fn valid_segment(raw: &[u8]) -> Option<&str> {
    let text = std::str::from_utf8(raw).ok()?;
    let mut chars = text.chars();
    let first = chars.next()?;
    (first.is_uppercase() && chars.all(|c| c.is_alphanumeric() || c == '_')).then_some(text)
}
