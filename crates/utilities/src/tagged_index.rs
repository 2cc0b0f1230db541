use std::cmp::Ordering;
use std::fmt;
use std::hash::Hash;
use std::hash::Hasher;
use std::marker::PhantomData;
use std::ops::Deref;
use std::ops::Index;
use std::ops::IndexMut;

/// A dense index that can only be compared with indices carrying the same tag,
/// so that a state index cannot accidentally be used where a hole index is
/// expected.
///
/// Anyone can construct a tagged index, it is not a proof that the index is
/// in bounds for some container. Arithmetic is deliberately not implemented,
/// use [`TagIndex::value`] or dereference to obtain the underlying value.
pub struct TagIndex<T, Tag> {
    index: T,

    /// Ensures that the tag is used by the struct without owning one.
    marker: PhantomData<fn() -> Tag>,
}

impl<T, Tag> TagIndex<T, Tag> {
    pub fn new(index: T) -> Self {
        Self {
            index,
            marker: PhantomData,
        }
    }
}

impl<T: Copy, Tag> TagIndex<T, Tag> {
    /// Returns the underlying value of the index.
    pub fn value(&self) -> T {
        self.index
    }
}

impl<Tag> TagIndex<usize, Tag> {
    /// Returns the index that directly follows this one.
    pub fn next(&self) -> Self {
        Self::new(self.index + 1)
    }

    /// Iterates over all indices in `0..end`.
    pub fn range(end: usize) -> impl DoubleEndedIterator<Item = Self> + ExactSizeIterator {
        (0..end).map(Self::new)
    }
}

impl<T: Default, Tag> Default for TagIndex<T, Tag> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Clone, Tag> Clone for TagIndex<T, Tag> {
    fn clone(&self) -> Self {
        Self::new(self.index.clone())
    }
}

impl<T: Copy, Tag> Copy for TagIndex<T, Tag> {}

impl<T: PartialEq, Tag> PartialEq for TagIndex<T, Tag> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T: PartialEq, Tag> Eq for TagIndex<T, Tag> {}

impl<T: PartialEq, Tag> PartialEq<T> for TagIndex<T, Tag> {
    fn eq(&self, other: &T) -> bool {
        self.index == *other
    }
}

impl<T: Ord, Tag> Ord for TagIndex<T, Tag> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.index.cmp(&other.index)
    }
}

impl<T: PartialOrd, Tag> PartialOrd for TagIndex<T, Tag> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.index.partial_cmp(&other.index)
    }
}

impl<T: PartialOrd, Tag> PartialOrd<T> for TagIndex<T, Tag> {
    fn partial_cmp(&self, other: &T) -> Option<Ordering> {
        self.index.partial_cmp(other)
    }
}

impl<T: Hash, Tag> Hash for TagIndex<T, Tag> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<T: fmt::Debug, Tag> fmt::Debug for TagIndex<T, Tag> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.index.fmt(f)
    }
}

impl<T: fmt::Display, Tag> fmt::Display for TagIndex<T, Tag> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.index.fmt(f)
    }
}

impl<T, Tag> Deref for TagIndex<T, Tag> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.index
    }
}

// Dense per-index records are stored in vectors and slices, so allow indexing them directly.
impl<U, Tag> Index<TagIndex<usize, Tag>> for [U] {
    type Output = U;

    fn index(&self, index: TagIndex<usize, Tag>) -> &Self::Output {
        &self[index.index]
    }
}

impl<U, Tag> IndexMut<TagIndex<usize, Tag>> for [U] {
    fn index_mut(&mut self, index: TagIndex<usize, Tag>) -> &mut Self::Output {
        &mut self[index.index]
    }
}

impl<U, Tag> Index<TagIndex<usize, Tag>> for Vec<U> {
    type Output = U;

    fn index(&self, index: TagIndex<usize, Tag>) -> &Self::Output {
        &self[index.index]
    }
}

impl<U, Tag> IndexMut<TagIndex<usize, Tag>> for Vec<U> {
    fn index_mut(&mut self, index: TagIndex<usize, Tag>) -> &mut Self::Output {
        &mut self[index.index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FirstTag;

    type FirstIndex = TagIndex<usize, FirstTag>;

    #[test]
    fn test_tag_index_indexing() {
        let mut values = vec![10, 20, 30];
        let index = FirstIndex::new(1);

        assert_eq!(values[index], 20);
        values[index.next()] = 40;
        assert_eq!(values, vec![10, 20, 40]);
        assert_eq!(*index, 1);
        assert!(index < 2);
    }

    #[test]
    fn test_tag_index_range() {
        let indices: Vec<FirstIndex> = FirstIndex::range(3).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }
}
