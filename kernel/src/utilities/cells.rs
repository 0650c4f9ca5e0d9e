// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright picofreq Contributors 2025.

//! Cell types for sharing references without compile-time borrow tracking.

use core::cell::Cell;

/// A `Cell` around an `Option`, for values that are installed after
/// construction (late binding of collaborators at board-wiring time).
pub struct OptionalCell<T> {
    value: Cell<Option<T>>,
}

impl<T> OptionalCell<T> {
    /// Create a new, empty cell.
    pub const fn empty() -> OptionalCell<T> {
        OptionalCell {
            value: Cell::new(None),
        }
    }

    /// Create a cell that already holds `value`.
    pub const fn new(value: T) -> OptionalCell<T> {
        OptionalCell {
            value: Cell::new(Some(value)),
        }
    }

    /// Store `value`, dropping any previous contents.
    pub fn set(&self, value: T) {
        self.value.set(Some(value));
    }

    /// Empty the cell.
    pub fn clear(&self) {
        self.value.set(None);
    }

    pub fn is_none(&self) -> bool {
        let inner = self.value.take();
        let result = inner.is_none();
        self.value.set(inner);
        result
    }

    pub fn is_some(&self) -> bool {
        !self.is_none()
    }

    /// Call `closure` on the contained value, if there is one, leaving the
    /// cell unchanged.
    pub fn map<F, R>(&self, closure: F) -> Option<R>
    where
        F: FnOnce(&T) -> R,
    {
        let inner = self.value.take();
        let result = inner.as_ref().map(closure);
        self.value.set(inner);
        result
    }
}

impl<T: Copy> OptionalCell<T> {
    /// Return a copy of the contained value.
    pub fn get(&self) -> Option<T> {
        self.value.get()
    }

    /// Return the contained value or `default` if the cell is empty.
    pub fn unwrap_or(&self, default: T) -> T {
        self.value.get().unwrap_or(default)
    }
}

/// A shared reference to a mutable reference.
///
/// A `TakeCell` wraps a potential `&mut` that multiple clients may hold a
/// handle to, while guaranteeing at most one of them accesses the underlying
/// memory at a time: the reference is either moved out or borrowed inside a
/// closure.
pub struct TakeCell<'a, T: 'a + ?Sized> {
    value: Cell<Option<&'a mut T>>,
}

impl<'a, T: ?Sized> TakeCell<'a, T> {
    pub const fn empty() -> TakeCell<'a, T> {
        TakeCell {
            value: Cell::new(None),
        }
    }

    pub const fn new(value: &'a mut T) -> TakeCell<'a, T> {
        TakeCell {
            value: Cell::new(Some(value)),
        }
    }

    pub fn is_none(&self) -> bool {
        let inner = self.take();
        let result = inner.is_none();
        self.value.set(inner);
        result
    }

    pub fn is_some(&self) -> bool {
        !self.is_none()
    }

    /// Take the mutable reference out of the cell, leaving `None` behind.
    pub fn take(&self) -> Option<&'a mut T> {
        self.value.replace(None)
    }

    /// Store `value` in the cell.
    pub fn replace(&self, value: &'a mut T) -> Option<&'a mut T> {
        self.value.replace(Some(value))
    }

    /// Borrow the contents inside `closure` if-and-only-if the reference has
    /// not been taken. The cell holds the reference again afterwards.
    pub fn map<F, R>(&self, closure: F) -> Option<R>
    where
        F: FnOnce(&mut T) -> R,
    {
        self.take().map(|mut value| {
            let result = closure(&mut value);
            self.value.set(Some(value));
            result
        })
    }

    /// Like [`TakeCell::map`], returning `default` when the cell is empty.
    pub fn map_or<F, R>(&self, default: R, closure: F) -> R
    where
        F: FnOnce(&mut T) -> R,
    {
        self.map(closure).unwrap_or(default)
    }
}
