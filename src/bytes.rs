//! A typed payload that either borrows directly into the source buffer or
//! owns its data, expressed as a discriminated enum rather than a flag next
//! to a raw pointer.

use core::mem;

#[derive(Clone)]
pub(crate) enum Bytes<'a, T> {
    Borrowed(&'a [T]),
    Owned(Vec<T>),
}

impl<'a, T: Copy> Bytes<'a, T> {
    pub(crate) fn owned(values: Vec<T>) -> Self {
        Bytes::Owned(values)
    }

    pub(crate) fn as_slice(&self) -> &[T] {
        match self {
            Bytes::Borrowed(s) => s,
            Bytes::Owned(v) => v,
        }
    }

    pub(crate) fn is_borrowed(&self) -> bool {
        matches!(self, Bytes::Borrowed(_))
    }

    pub(crate) fn byte_len(&self) -> usize {
        self.as_slice().len() * mem::size_of::<T>()
    }

    /// If this payload currently borrows from an external buffer, allocate
    /// an owned copy and detach from it. A no-op if already owned.
    pub(crate) fn unmap_or_clone(&mut self) {
        if let Bytes::Borrowed(slice) = *self {
            *self = Bytes::Owned(slice.to_vec());
        }
    }

    /// Returns a mutable, growable view of the owned payload, detaching
    /// first if the payload is currently borrowed.
    pub(crate) fn to_mut(&mut self) -> &mut Vec<T> {
        self.unmap_or_clone();
        match self {
            Bytes::Owned(v) => v,
            Bytes::Borrowed(_) => unreachable!("unmap_or_clone just ran"),
        }
    }

}
