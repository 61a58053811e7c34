//! Capacity-capped vector.
//!
//! [`BoundedVec`] rejects any insertion that would take it past `max_size`,
//! reporting the overflow with a caller-supplied error. Sub-views created with
//! [`BoundedVec::view`] insert into the same storage and are checked against
//! the root length, so a view can never be used to exceed the cap.

use std::ops::{Deref, Range};

/// A `Vec<T>` that refuses to grow beyond `max_size`.
#[derive(Debug, Clone)]
pub struct BoundedVec<T, E> {
    items: Vec<T>,
    max_size: usize,
    overflow: fn(usize) -> E,
}

impl<T, E> BoundedVec<T, E> {
    /// Create an empty collection. `overflow` receives `max_size` and builds
    /// the error returned for rejected insertions.
    pub fn new(max_size: usize, overflow: fn(usize) -> E) -> Self {
        Self {
            items: Vec::new(),
            max_size,
            overflow,
        }
    }

    #[inline]
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Free slots left before the cap.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.max_size.saturating_sub(self.items.len())
    }

    fn check(&self, additional: usize) -> Result<(), E> {
        if self.items.len().saturating_add(additional) > self.max_size {
            return Err((self.overflow)(self.max_size));
        }
        Ok(())
    }

    /// Append one item.
    pub fn push(&mut self, item: T) -> Result<(), E> {
        self.check(1)?;
        self.items.push(item);
        Ok(())
    }

    /// Append every item, or none of them if they do not all fit.
    pub fn extend<I: IntoIterator<Item = T>>(&mut self, items: I) -> Result<(), E> {
        let items: Vec<T> = items.into_iter().collect();
        self.check(items.len())?;
        self.items.extend(items);
        Ok(())
    }

    /// Remove and return every item, leaving the collection empty.
    pub fn take(&mut self) -> Vec<T> {
        std::mem::take(&mut self.items)
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn retain<F: FnMut(&T) -> bool>(&mut self, keep: F) {
        self.items.retain(keep);
    }

    /// A window over `range` that inserts at the end of the window.
    ///
    /// # Panics
    ///
    /// Panics if `range` is out of bounds, like slice indexing.
    pub fn view(&mut self, range: Range<usize>) -> BoundedView<'_, T, E> {
        assert!(
            range.start <= range.end && range.end <= self.items.len(),
            "view range {range:?} out of bounds for length {}",
            self.items.len()
        );
        BoundedView { root: self, range }
    }
}

impl<T, E> Deref for BoundedVec<T, E> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.items
    }
}

impl<T, E> IntoIterator for BoundedVec<T, E> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a, T, E> IntoIterator for &'a BoundedVec<T, E> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// A mutable window into a [`BoundedVec`].
#[derive(Debug)]
pub struct BoundedView<'a, T, E> {
    root: &'a mut BoundedVec<T, E>,
    range: Range<usize>,
}

impl<T, E> BoundedView<'_, T, E> {
    #[inline]
    pub fn len(&self) -> usize {
        self.range.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.root.items[self.range.clone()]
    }

    /// Insert at the end of this window. Capacity is the root's.
    pub fn push(&mut self, item: T) -> Result<(), E> {
        self.root.check(1)?;
        self.root.items.insert(self.range.end, item);
        self.range.end += 1;
        Ok(())
    }

    /// Insert every item at the end of this window, or none of them.
    pub fn extend<I: IntoIterator<Item = T>>(&mut self, items: I) -> Result<(), E> {
        let items: Vec<T> = items.into_iter().collect();
        self.root.check(items.len())?;
        let added = items.len();
        let at = self.range.end;
        self.root.items.splice(at..at, items);
        self.range.end += added;
        Ok(())
    }

    /// A narrower window, relative to this one.
    pub fn view(&mut self, range: Range<usize>) -> BoundedView<'_, T, E> {
        assert!(
            range.start <= range.end && range.end <= self.len(),
            "view range {range:?} out of bounds for length {}",
            self.len()
        );
        let start = self.range.start;
        BoundedView {
            root: &mut *self.root,
            range: start + range.start..start + range.end,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, PartialEq, Eq)]
    struct Full(usize);

    fn bounded(max: usize) -> BoundedVec<u32, Full> {
        BoundedVec::new(max, Full)
    }

    #[test]
    fn push_until_full() {
        let mut list = bounded(2);
        list.push(1).unwrap();
        list.push(2).unwrap();
        assert_eq!(list.push(3), Err(Full(2)));
        assert_eq!(&*list, &[1, 2]);
        assert_eq!(list.remaining(), 0);
    }

    #[test]
    fn extend_is_all_or_nothing() {
        let mut list = bounded(3);
        list.push(1).unwrap();
        assert_eq!(list.extend([2, 3, 4]), Err(Full(3)));
        assert_eq!(list.len(), 1);
        list.extend([2, 3]).unwrap();
        assert_eq!(&*list, &[1, 2, 3]);
    }

    #[test]
    fn view_checks_root_capacity() {
        let mut list = bounded(3);
        list.extend([1, 2]).unwrap();
        {
            let mut view = list.view(0..1);
            assert_eq!(view.len(), 1);
            view.push(9).unwrap();
            assert_eq!(view.as_slice(), &[1, 9]);
            // Root now holds 3 items; the view is only 2 long but still full.
            assert_eq!(view.push(10), Err(Full(3)));
        }
        assert_eq!(&*list, &[1, 9, 2]);
    }

    #[test]
    fn nested_view_checks_root_capacity() {
        let mut list = bounded(4);
        list.extend([1, 2, 3]).unwrap();
        let mut outer = list.view(1..3);
        let mut inner = outer.view(0..0);
        inner.push(7).unwrap();
        assert_eq!(inner.push(8), Err(Full(4)));
        assert_eq!(inner.as_slice(), &[7]);
    }

    #[test]
    fn take_empties_and_frees_capacity() {
        let mut list = bounded(2);
        list.extend([1, 2]).unwrap();
        assert_eq!(list.take(), vec![1, 2]);
        assert!(list.is_empty());
        list.push(3).unwrap();
    }

    #[derive(Debug, Clone)]
    enum Op {
        Push,
        Extend(usize),
        ViewPush(usize),
        ViewExtend(usize, usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Push),
            (0usize..5).prop_map(Op::Extend),
            (0usize..8).prop_map(Op::ViewPush),
            ((0usize..8), (0usize..5)).prop_map(|(at, n)| Op::ViewExtend(at, n)),
        ]
    }

    proptest! {
        #[test]
        fn never_exceeds_capacity(max in 0usize..16, ops in proptest::collection::vec(op(), 0..64)) {
            let mut list = bounded(max);
            let mut accepted = 0usize;
            for op in ops {
                let before = list.len();
                let (wanted, result) = match op {
                    Op::Push => (1, list.push(0)),
                    Op::Extend(n) => (n, list.extend(vec![0; n])),
                    Op::ViewPush(at) => {
                        let at = at.min(list.len());
                        (1, list.view(0..at).push(0))
                    }
                    Op::ViewExtend(at, n) => {
                        let len = list.len();
                        let at = at.min(len);
                        (n, list.view(at..len).extend(vec![0; n]))
                    }
                };
                if before + wanted <= max {
                    prop_assert!(result.is_ok());
                    accepted += wanted;
                } else {
                    prop_assert_eq!(result, Err(Full(max)));
                }
                prop_assert_eq!(list.len(), accepted);
                prop_assert!(list.len() <= max);
            }
        }
    }
}
