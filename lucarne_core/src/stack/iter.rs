// Copyright 2026 the Lucarne Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Stacking-order traversal.

use super::id::{INVALID, WindowId};
use super::store::WindowStack;

/// An iterator over windows from top to bottom.
///
/// Created by [`WindowStack::iter`].
#[derive(Debug)]
pub struct StackIter<'a> {
    stack: &'a WindowStack,
    current: u32,
}

impl<'a> StackIter<'a> {
    pub(crate) fn new(stack: &'a WindowStack, first: u32) -> Self {
        Self {
            stack,
            current: first,
        }
    }
}

impl Iterator for StackIter<'_> {
    type Item = WindowId;

    fn next(&mut self) -> Option<WindowId> {
        if self.current == INVALID {
            return None;
        }
        let idx = self.current;
        self.current = self.stack.below[idx as usize];
        Some(WindowId {
            idx,
            generation: self.stack.generation[idx as usize],
        })
    }
}

impl<'a> IntoIterator for &'a WindowStack {
    type Item = WindowId;
    type IntoIter = StackIter<'a>;

    fn into_iter(self) -> StackIter<'a> {
        self.iter()
    }
}
