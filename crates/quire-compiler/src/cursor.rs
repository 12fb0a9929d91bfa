use quire_common::utf16_len;

/// Where the next inserted character will land in the document being built.
///
/// Starts at 1, just after the implicit document start. Every insert must be
/// followed by an [`advance`](Cursor::advance) of its emitted length before
/// any later position is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    index: usize,
}

impl Default for Cursor {
    fn default() -> Self {
        Self::new()
    }
}

impl Cursor {
    pub const START: usize = 1;

    pub fn new() -> Self {
        Self::at(Self::START)
    }

    /// Cursor seeded from a position read off a committed snapshot.
    pub fn at(index: usize) -> Self {
        Self { index }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn advance(&mut self, units: usize) {
        self.index += units;
    }

    /// Advance past `text`, returning the index it was inserted at.
    pub fn advance_text(&mut self, text: &str) -> usize {
        let at = self.index;
        self.advance(utf16_len(text));
        at
    }
}
