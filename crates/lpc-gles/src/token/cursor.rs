//! Navigation over significant tokens.

use alloc::vec::Vec;
use core::ops::Range;

use super::{TokenBuffer, TokenKind};

/// Index view over the non-trivia tokens of a buffer.
///
/// Positions in the view are dense (`0..len`), each mapping to a token index in
/// the underlying buffer. The view is a snapshot: rebuild it after removals if
/// removed tokens must be skipped.
#[derive(Debug, Clone)]
pub struct Significant {
    idx: Vec<usize>,
}

impl Significant {
    pub fn new(buffer: &TokenBuffer) -> Self {
        let idx = (0..buffer.len())
            .filter(|&i| buffer.is_significant(i))
            .collect();
        Self { idx }
    }

    /// Token index at view position `k`.
    pub fn at(&self, k: usize) -> Option<usize> {
        self.idx.get(k).copied()
    }

    pub fn len(&self) -> usize {
        self.idx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.idx.is_empty()
    }

    /// View position of a token index, if the token is significant.
    pub fn position_of(&self, token: usize) -> Option<usize> {
        self.idx.binary_search(&token).ok()
    }

    /// First significant token strictly after `token`.
    pub fn next_after(&self, token: usize) -> Option<usize> {
        let k = self.idx.partition_point(|&i| i <= token);
        self.at(k)
    }

    /// Last significant token strictly before `token`.
    pub fn prev_before(&self, token: usize) -> Option<usize> {
        let k = self.idx.partition_point(|&i| i < token);
        k.checked_sub(1).and_then(|k| self.at(k))
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.idx.iter().copied()
    }
}

fn closer_for(open: &str) -> Option<&'static str> {
    match open {
        "(" => Some(")"),
        "[" => Some("]"),
        "{" => Some("}"),
        _ => None,
    }
}

/// Find the token that closes the bracket at `open`, honoring nesting.
///
/// Returns `None` if `open` is not an opening bracket or the input ends first.
pub fn matching_close(buffer: &TokenBuffer, open: usize) -> Option<usize> {
    let open_text = buffer.text(open);
    let close_text = closer_for(open_text)?;
    let mut depth = 0usize;
    for index in open..buffer.len() {
        if buffer.kind(index) != TokenKind::Punctuation {
            continue;
        }
        let text = buffer.text(index);
        if text == open_text {
            depth += 1;
        } else if text == close_text {
            depth -= 1;
            if depth == 0 {
                return Some(index);
            }
        }
    }
    None
}

/// Split the tokens strictly between `open` and `close` on top-level commas.
///
/// Commas nested in parentheses, brackets or braces do not split. An empty
/// argument list yields no ranges.
pub fn split_arguments(buffer: &TokenBuffer, open: usize, close: usize) -> Vec<Range<usize>> {
    let mut args = Vec::new();
    let mut depth = 0i32;
    let mut start = open + 1;
    let mut saw_content = false;
    for index in open + 1..close {
        if buffer.is_significant(index) {
            saw_content = true;
        }
        if buffer.kind(index) != TokenKind::Punctuation {
            continue;
        }
        match buffer.text(index) {
            "(" | "[" | "{" => depth += 1,
            ")" | "]" | "}" => depth -= 1,
            "," if depth == 0 => {
                args.push(start..index);
                start = index + 1;
            }
            _ => {}
        }
    }
    if saw_content || !args.is_empty() {
        args.push(start..close);
    }
    args
}

/// First significant token in `range`.
pub fn first_significant(buffer: &TokenBuffer, range: Range<usize>) -> Option<usize> {
    range.into_iter().find(|&i| buffer.is_significant(i))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::tokenize;

    #[test]
    fn test_matching_close_nested() {
        let (buf, _) = tokenize("f(a, g(b, c), (d))").unwrap();
        let open = (0..buf.len()).find(|&i| buf.is(i, "(")).unwrap();
        let close = matching_close(&buf, open).unwrap();
        assert_eq!(close, buf.len() - 2);
    }

    #[test]
    fn test_split_top_level_commas() {
        let (buf, _) = tokenize("f(a, g(b, c), v[1])").unwrap();
        let open = (0..buf.len()).find(|&i| buf.is(i, "(")).unwrap();
        let close = matching_close(&buf, open).unwrap();
        let args = split_arguments(&buf, open, close);
        assert_eq!(args.len(), 3);
        assert_eq!(buf.render_range(args[1].clone()).trim(), "g(b, c)");
        assert_eq!(buf.render_range(args[2].clone()).trim(), "v[1]");
    }

    #[test]
    fn test_split_empty() {
        let (buf, _) = tokenize("f( )").unwrap();
        let close = matching_close(&buf, 1).unwrap();
        assert!(split_arguments(&buf, 1, close).is_empty());
    }

    #[test]
    fn test_significant_view() {
        let (buf, _) = tokenize("a /* c */ b\n c").unwrap();
        let sig = Significant::new(&buf);
        assert_eq!(sig.len(), 3);
        let b = sig.at(1).unwrap();
        assert_eq!(buf.text(b), "b");
        assert_eq!(sig.position_of(b), Some(1));
        assert_eq!(sig.next_after(b).map(|i| buf.text(i)), Some("c"));
        assert_eq!(sig.prev_before(b).map(|i| buf.text(i)), Some("a"));
    }
}
