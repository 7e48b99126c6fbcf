//! Code masking.
//!
//! Pattern matching over raw PHP source cannot tell a `class Foo` in code
//! from the same words in a comment, a string or inline HTML.  Instead of
//! a full tokenizer we run a small forward state machine over the file and
//! produce a *mask*: a byte buffer of exactly the same length where every
//! byte that is not code has been replaced by a space (line breaks are
//! kept so line-anchored patterns still work).  Any offset found in the
//! mask is an offset into the original text.
//!
//! The functions here are pure; they take the source text and return a
//! result without any shared state.

/// What, besides comments and inline HTML, to blank out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskOptions {
    /// Blank string, heredoc and nowdoc bodies (the quotes stay).
    pub strings: bool,
}

impl MaskOptions {
    /// Comments and strings blanked: only executable code remains.
    pub const CODE_ONLY: MaskOptions = MaskOptions { strings: true };
    /// Comments blanked, string literals kept.
    pub const KEEP_STRINGS: MaskOptions = MaskOptions { strings: false };
}

#[derive(Debug, PartialEq)]
enum State {
    Html,
    Code,
    LineComment,
    BlockComment,
    SingleString,
    DoubleString,
    Backtick,
    Heredoc,
}

/// Returns `true` when `bytes[i..]` starts with `needle`, ignoring ASCII case.
fn starts_with_ci(bytes: &[u8], i: usize, needle: &[u8]) -> bool {
    bytes.len() >= i + needle.len() && bytes[i..i + needle.len()].eq_ignore_ascii_case(needle)
}

/// Whether `b` can appear in a PHP identifier (`[A-Za-z0-9_\x80-\xff]`).
pub(crate) fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80
}

/// Produce the mask for `content`.
///
/// A file that contains no `<?` open tag at all is treated as a bare code
/// snippet; otherwise scanning starts in inline HTML, as PHP does.
pub fn mask_code(content: &str, options: MaskOptions) -> Vec<u8> {
    let bytes = content.as_bytes();
    let len = bytes.len();
    let mut out = bytes.to_vec();
    let blank = |out: &mut Vec<u8>, from: usize, to: usize| {
        for b in &mut out[from..to.min(len)] {
            if *b != b'\n' && *b != b'\r' {
                *b = b' ';
            }
        }
    };

    let mut state = if memchr::memmem::find(bytes, b"<?").is_some() {
        State::Html
    } else {
        State::Code
    };
    let mut heredoc_label: Vec<u8> = Vec::new();
    let mut i = 0;

    while i < len {
        match state {
            State::Html => {
                let Some(rel) = memchr::memmem::find(&bytes[i..], b"<?") else {
                    blank(&mut out, i, len);
                    break;
                };
                let tag_start = i + rel;
                let tag_end = if starts_with_ci(bytes, tag_start, b"<?php") {
                    tag_start + 5
                } else if starts_with_ci(bytes, tag_start, b"<?=") {
                    tag_start + 3
                } else {
                    tag_start + 2
                };
                blank(&mut out, i, tag_end);
                i = tag_end;
                state = State::Code;
            }
            State::Code => {
                let b = bytes[i];
                if b == b'?' && i + 1 < len && bytes[i + 1] == b'>' {
                    blank(&mut out, i, i + 2);
                    i += 2;
                    state = State::Html;
                } else if (b == b'/' && i + 1 < len && bytes[i + 1] == b'/')
                    || (b == b'#' && !(i + 1 < len && bytes[i + 1] == b'['))
                {
                    state = State::LineComment;
                } else if b == b'/' && i + 1 < len && bytes[i + 1] == b'*' {
                    blank(&mut out, i, i + 2);
                    i += 2;
                    state = State::BlockComment;
                } else if b == b'\'' {
                    i += 1;
                    state = State::SingleString;
                } else if b == b'"' {
                    i += 1;
                    state = State::DoubleString;
                } else if b == b'`' {
                    i += 1;
                    state = State::Backtick;
                } else if b == b'<' && starts_with_ci(bytes, i, b"<<<") {
                    let start = i + 3;
                    let mut j = start;
                    while j < len && (bytes[j] == b' ' || bytes[j] == b'\t') {
                        j += 1;
                    }
                    let quote = if j < len && (bytes[j] == b'\'' || bytes[j] == b'"') {
                        j += 1;
                        Some(bytes[j - 1])
                    } else {
                        None
                    };
                    heredoc_label.clear();
                    while j < len && is_ident_byte(bytes[j]) {
                        heredoc_label.push(bytes[j]);
                        j += 1;
                    }
                    if heredoc_label.is_empty() {
                        i = start;
                        continue;
                    }
                    if quote.is_some() && j < len && Some(bytes[j]) == quote {
                        j += 1;
                    }
                    if options.strings {
                        blank(&mut out, start, j);
                    }
                    i = j;
                    state = State::Heredoc;
                } else {
                    i += 1;
                }
            }
            State::LineComment => {
                if bytes[i] == b'\n' {
                    i += 1;
                    state = State::Code;
                } else if bytes[i] == b'?' && i + 1 < len && bytes[i + 1] == b'>' {
                    // `?>` ends a line comment and the PHP block.
                    state = State::Code;
                } else {
                    blank(&mut out, i, i + 1);
                    i += 1;
                }
            }
            State::BlockComment => {
                if bytes[i] == b'*' && i + 1 < len && bytes[i + 1] == b'/' {
                    blank(&mut out, i, i + 2);
                    i += 2;
                    state = State::Code;
                } else {
                    blank(&mut out, i, i + 1);
                    i += 1;
                }
            }
            State::SingleString | State::DoubleString | State::Backtick => {
                let close = match state {
                    State::SingleString => b'\'',
                    State::DoubleString => b'"',
                    _ => b'`',
                };
                if bytes[i] == b'\\' && i + 1 < len {
                    if options.strings {
                        blank(&mut out, i, i + 2);
                    }
                    i += 2;
                } else if bytes[i] == close {
                    i += 1;
                    state = State::Code;
                } else {
                    if options.strings {
                        blank(&mut out, i, i + 1);
                    }
                    i += 1;
                }
            }
            State::Heredoc => {
                if bytes[i] == b'\n' {
                    i += 1;
                    let mut j = i;
                    while j < len && (bytes[j] == b' ' || bytes[j] == b'\t') {
                        j += 1;
                    }
                    let end = j + heredoc_label.len();
                    if end <= len
                        && bytes[j..end] == heredoc_label[..]
                        && (end == len || !is_ident_byte(bytes[end]))
                    {
                        if options.strings {
                            blank(&mut out, i, end);
                        }
                        i = end;
                        state = State::Code;
                    }
                } else {
                    if options.strings {
                        blank(&mut out, i, i + 1);
                    }
                    i += 1;
                }
            }
        }
    }

    out
}

/// Whether the non-whitespace byte at `offset` is code in the given mask
/// (and not a blanked comment, string or HTML byte).
pub fn is_code_at(content: &str, mask: &[u8], offset: usize) -> bool {
    let bytes = content.as_bytes();
    offset < bytes.len()
        && offset < mask.len()
        && mask[offset] == bytes[offset]
        && !bytes[offset].is_ascii_whitespace()
}
