//! Line cursor and whitespace tokenizer shared by the page parser and the header scanner.

/// A whitespace-delimited token and its byte offset within the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Token<'a> {
    pub text: &'a str,
    pub start: usize,
}

pub(crate) fn tokenize(line: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut start = None;
    for (idx, ch) in line.char_indices() {
        match (ch.is_whitespace(), start) {
            (true, Some(s)) => {
                tokens.push(Token {
                    text: &line[s..idx],
                    start: s,
                });
                start = None;
            }
            (false, None) => start = Some(idx),
            _ => {}
        }
    }
    if let Some(s) = start {
        tokens.push(Token {
            text: &line[s..],
            start: s,
        });
    }
    tokens
}

/// The remainder of `line` starting at token `index`, trailing whitespace removed. Used for
/// fields that may contain spaces (reference targets, free text).
pub(crate) fn rest_from<'a>(line: &'a str, tokens: &[Token<'a>], index: usize) -> &'a str {
    tokens
        .get(index)
        .map(|token| line[token.start..].trim_end())
        .unwrap_or("")
}

/// One source line with its 1-based number.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SourceLine<'a> {
    pub number: usize,
    pub text: &'a str,
}

/// Forward-only cursor over the lines of a source, tracking consumed bytes for progress
/// reporting. A line can be peeked and left in place for the next page.
#[derive(Debug)]
pub(crate) struct LineCursor<'a> {
    lines: Vec<&'a str>,
    next: usize,
    consumed: usize,
    total: usize,
}

impl<'a> LineCursor<'a> {
    pub fn new(source: &'a str) -> Self {
        LineCursor {
            lines: source.lines().collect(),
            next: 0,
            consumed: 0,
            total: source.len().max(1),
        }
    }

    pub fn peek(&self) -> Option<SourceLine<'a>> {
        self.lines.get(self.next).map(|text| SourceLine {
            number: self.next + 1,
            text,
        })
    }

    pub fn advance(&mut self) -> Option<SourceLine<'a>> {
        let line = self.peek()?;
        self.next += 1;
        self.consumed += line.text.len() + 1;
        Some(line)
    }

    pub fn is_at_end(&self) -> bool {
        self.next >= self.lines.len()
    }

    /// Bytes consumed so far scaled to 0..=`scale`.
    pub fn progress(&self, scale: usize) -> u8 {
        (self.consumed.min(self.total) * scale / self.total) as u8
    }
}
