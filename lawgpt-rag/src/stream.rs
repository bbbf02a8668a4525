//! Fragmenting a finished answer for incremental display.

/// A lazy iterator over fixed-size character fragments of a text.
///
/// Fragments never split a Unicode scalar value. The iterator is finite and
/// consumes itself; call [`fragments`] again to start over.
///
/// # Example
///
/// ```rust,ignore
/// use lawgpt_rag::fragments;
///
/// let parts: Vec<&str> = fragments("abcde", 2).collect();
/// assert_eq!(parts, ["ab", "cd", "e"]);
/// ```
#[derive(Debug, Clone)]
pub struct Fragments<'a> {
    rest: &'a str,
    size: usize,
}

/// Split `text` into fragments of `size` characters; a size of zero is treated as one.
pub fn fragments(text: &str, size: usize) -> Fragments<'_> {
    Fragments { rest: text, size: size.max(1) }
}

impl<'a> Iterator for Fragments<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        let end = self.rest.char_indices().nth(self.size).map_or(self.rest.len(), |(i, _)| i);
        let (fragment, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(fragment)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.rest.is_empty() {
            (0, Some(0))
        } else {
            (1, Some(self.rest.len().div_ceil(self.size)))
        }
    }
}

impl std::iter::FusedIterator for Fragments<'_> {}
