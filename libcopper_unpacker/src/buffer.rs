use super::error::{DecodeError, Extent};

/// BufferView is a read-only, bounds-checked window onto a caller-owned word buffer.
///
/// The view never copies or frees the words; every accessor returns either a word value or
/// a sub-slice borrowed from the original buffer, so the view (and anything derived from it)
/// cannot outlive the buffer. All reads are checked against the buffer length and fail with
/// [`DecodeError::OutOfRange`] instead of reading past the end.
#[derive(Debug, Clone, Copy)]
pub struct BufferView<'a> {
    words: &'a [u32],
}

impl<'a> BufferView<'a> {
    pub fn new(words: &'a [u32]) -> Self {
        Self { words }
    }

    pub fn nwords(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// The complete underlying buffer
    pub fn words(&self) -> &'a [u32] {
        self.words
    }

    /// Read the word at index
    pub fn word_at(&self, index: usize) -> Result<u32, DecodeError> {
        self.words
            .get(index)
            .copied()
            .ok_or_else(|| self.out_of_range(index))
    }

    /// Borrow the buffer from index to its end.
    ///
    /// The index must address an existing word, so an index equal to the buffer length
    /// fails just like any other out-of-range index.
    pub fn slice_from(&self, index: usize) -> Result<&'a [u32], DecodeError> {
        if index >= self.words.len() {
            return Err(self.out_of_range(index));
        }
        Ok(&self.words[index..])
    }

    /// Borrow nwords words starting at index
    pub fn slice(&self, index: usize, nwords: usize) -> Result<&'a [u32], DecodeError> {
        let end = index
            .checked_add(nwords)
            .ok_or_else(|| self.out_of_range(usize::MAX))?;
        if end > self.words.len() {
            return Err(self.out_of_range(end - 1));
        }
        Ok(&self.words[index..end])
    }

    fn out_of_range(&self, index: usize) -> DecodeError {
        DecodeError::OutOfRange {
            extent: Extent::Word,
            index,
            limit: self.words.len(),
        }
    }
}
