//! Correlation tag carried in io_uring `user_data`

use core::fmt;

/// Identifies one in-flight request within an event loop.
///
/// `index` addresses a slot in the loop's correlation table; `generation`
/// is stamped when the slot is handed out, so a completion for a recycled
/// slot never resolves the wrong request.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag {
    index: u32,
    generation: u32,
}

impl Tag {
    #[inline]
    pub const fn new(index: u32, generation: u32) -> Self {
        Tag { index, generation }
    }

    #[inline]
    pub const fn index(self) -> u32 {
        self.index
    }

    #[inline]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    /// Pack into the 64-bit `user_data` word: generation high, index low.
    #[inline]
    pub const fn to_user_data(self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }

    #[inline]
    pub const fn from_user_data(data: u64) -> Self {
        Tag {
            index: data as u32,
            generation: (data >> 32) as u32,
        }
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({}@{})", self.index, self.generation)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.index, self.generation)
    }
}
