//! Boundary delimiter scanning over a single byte window.
//!
//! The scanner is stateless: every call inspects one contiguous window and
//! reports whether it holds a complete delimiter, the beginning of one that
//! may continue in the next refill, or nothing at all. Callers that see
//! [`ScanResult::PartialMatch`] must refill and scan again with the retained
//! tail followed by the new bytes; the result never depends on how the
//! logical byte sequence was chunked.
//!
//! A delimiter is `"--" + boundary` followed either by a line break (a part
//! delimiter) or by `"--"` (the closing delimiter). A line break directly in
//! front of the dashes belongs to the delimiter, so part bodies never end
//! with the line break that precedes the next boundary.

use memchr::memchr_iter;

/// Number of dash bytes introducing a delimiter.
const DASHES: usize = 2;

/// Which flavour of delimiter was found.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DelimiterKind {
    /// `--boundary` followed by a line break; another part follows.
    Part,
    /// `--boundary--`; the multipart body is complete.
    End,
}

/// Location of a complete delimiter inside a window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DelimiterMatch {
    /// Offset of the first delimiter byte, including a leading line break.
    pub start: usize,
    /// Number of bytes covered by the delimiter.
    pub len: usize,
    /// Index of the matched boundary in the slice passed to [`scan_any`].
    pub boundary: usize,
    /// Part or end delimiter.
    pub kind: DelimiterKind,
}

impl DelimiterMatch {
    /// Offset one past the last delimiter byte.
    #[must_use]
    pub fn end(&self) -> usize { self.start + self.len }
}

/// Outcome of scanning one window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanResult {
    /// No delimiter starts in the window.
    NoMatch,
    /// A delimiter may start at `start` but more bytes are needed to decide.
    PartialMatch {
        /// Offset of the candidate, including a leading line break.
        start: usize,
    },
    /// A complete delimiter.
    Match(DelimiterMatch),
}

impl ScanResult {
    fn start(&self) -> Option<usize> {
        match self {
            Self::NoMatch => None,
            Self::PartialMatch { start } => Some(*start),
            Self::Match(found) => Some(found.start),
        }
    }

    fn with_boundary(self, index: usize) -> Self {
        match self {
            Self::Match(found) => Self::Match(DelimiterMatch {
                boundary: index,
                ..found
            }),
            other => other,
        }
    }
}

/// Bytes withheld from delivery on [`ScanResult::NoMatch`] while more input
/// may arrive: room for a `CRLF--` prefix plus the token itself.
///
/// # Examples
///
/// ```
/// use batchframe::scanner::reserved_tail;
///
/// assert_eq!(reserved_tail("batch_123"), 13);
/// ```
#[must_use]
pub fn reserved_tail(boundary: &str) -> usize { boundary.len() + 4 }

/// Scan `window` for the earliest delimiter of `boundary`.
///
/// # Examples
///
/// ```
/// use batchframe::scanner::{DelimiterKind, ScanResult, scan};
///
/// match scan(b"body\r\n--b1\r\nnext", "b1") {
///     ScanResult::Match(found) => {
///         assert_eq!(found.start, 4);
///         assert_eq!(found.kind, DelimiterKind::Part);
///     }
///     other => panic!("unexpected {other:?}"),
/// }
///
/// assert_eq!(scan(b"body\r\n--b", "b1"), ScanResult::PartialMatch { start: 4 });
/// assert_eq!(scan(b"plain body", "b1"), ScanResult::NoMatch);
/// ```
#[must_use]
pub fn scan(window: &[u8], boundary: &str) -> ScanResult {
    let token = boundary.as_bytes();
    let pattern_len = DASHES + token.len();

    for dash in memchr_iter(b'-', window) {
        let Some(candidate) = window.get(dash..) else {
            break;
        };
        let available = candidate.len().min(pattern_len);
        if !matches_pattern(&candidate[..available], token) {
            continue;
        }

        let start = anchor(window, dash);
        if available < pattern_len {
            // The window ends inside the token itself.
            return ScanResult::PartialMatch { start };
        }

        let trailer = &candidate[pattern_len..];
        match classify(trailer) {
            Trailer::Incomplete => return ScanResult::PartialMatch { start },
            Trailer::NotDelimiter => {}
            Trailer::Delimiter { kind, len } => {
                return ScanResult::Match(DelimiterMatch {
                    start,
                    len: dash - start + pattern_len + len,
                    boundary: 0,
                    kind,
                });
            }
        }
    }

    ScanResult::NoMatch
}

/// Scan `window` for the earliest delimiter of any boundary in `boundaries`.
///
/// A candidate that cannot yet be classified wins over a later complete
/// match, so callers refill before acting on the later one. On a tie the
/// complete match wins.
#[must_use]
pub fn scan_any<B: AsRef<str>>(window: &[u8], boundaries: &[B]) -> ScanResult {
    boundaries
        .iter()
        .enumerate()
        .map(|(index, boundary)| scan(window, boundary.as_ref()).with_boundary(index))
        .fold(ScanResult::NoMatch, earliest)
}

fn earliest(current: ScanResult, candidate: ScanResult) -> ScanResult {
    match (current.start(), candidate.start()) {
        (_, None) => current,
        (None, Some(_)) => candidate,
        (Some(held), Some(new)) if new < held => candidate,
        (Some(held), Some(new)) if new == held && matches!(candidate, ScanResult::Match(_)) => {
            candidate
        }
        _ => current,
    }
}

fn matches_pattern(candidate: &[u8], token: &[u8]) -> bool {
    candidate.iter().enumerate().all(|(index, byte)| {
        if index < DASHES {
            *byte == b'-'
        } else {
            token.get(index - DASHES) == Some(byte)
        }
    })
}

fn anchor(window: &[u8], dash: usize) -> usize {
    let before = &window[..dash];
    if before.ends_with(b"\r\n") {
        dash - 2
    } else if before.ends_with(b"\n") {
        dash - 1
    } else {
        dash
    }
}

enum Trailer {
    Incomplete,
    NotDelimiter,
    Delimiter { kind: DelimiterKind, len: usize },
}

fn classify(trailer: &[u8]) -> Trailer {
    match trailer {
        [] | [b'\r' | b'-'] => Trailer::Incomplete,
        [b'\n', ..] => Trailer::Delimiter {
            kind: DelimiterKind::Part,
            len: 1,
        },
        [b'\r', b'\n', ..] => Trailer::Delimiter {
            kind: DelimiterKind::Part,
            len: 2,
        },
        [b'-', b'-', ..] => Trailer::Delimiter {
            kind: DelimiterKind::End,
            len: 2,
        },
        _ => Trailer::NotDelimiter,
    }
}
