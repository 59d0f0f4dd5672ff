//! Nested coordinate groups as they arrive from annotation files.

use serde::{Deserialize, Serialize};

/// An arbitrarily nested grouping of values, e.g. `((x1, y1), (x2, y2))`.
///
/// Leaves are atomic: a `Nested<&str>` yields whole strings, never their
/// characters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Nested<T> {
    Leaf(T),
    Group(Vec<Nested<T>>),
}

impl<T> Nested<T> {
    pub fn leaf(value: T) -> Self {
        Nested::Leaf(value)
    }

    pub fn group<I: IntoIterator<Item = Nested<T>>>(items: I) -> Self {
        Nested::Group(items.into_iter().collect())
    }

    /// Depth-first iterator over the leaves.
    ///
    /// Uses an explicit stack, so nesting depth is not bounded by the call
    /// stack.
    pub fn flatten_iter(&self) -> FlattenIter<'_, T> {
        FlattenIter {
            stack: vec![std::slice::from_ref(self).iter()],
        }
    }
}

impl<T: Clone> Nested<T> {
    /// Leaves in order.
    pub fn flatten(&self) -> Vec<T> {
        self.flatten_iter().cloned().collect()
    }
}

impl Nested<f32> {
    /// `[(x, y), ...]` as a two-level group.
    pub fn from_pairs(pairs: &[(f32, f32)]) -> Self {
        Nested::group(
            pairs
                .iter()
                .map(|&(x, y)| Nested::group([Nested::leaf(x), Nested::leaf(y)])),
        )
    }
}

/// Iterator returned by [`Nested::flatten_iter`].
pub struct FlattenIter<'a, T> {
    stack: Vec<std::slice::Iter<'a, Nested<T>>>,
}

impl<'a, T> Iterator for FlattenIter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        while let Some(top) = self.stack.last_mut() {
            match top.next() {
                Some(Nested::Leaf(value)) => return Some(value),
                Some(Nested::Group(children)) => self.stack.push(children.iter()),
                None => {
                    self.stack.pop();
                }
            }
        }
        None
    }
}
