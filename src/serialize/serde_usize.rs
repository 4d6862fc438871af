//! `#[serde(with = "serde_usize")]` for raw pointers: written as the plain
//! integer address.

use serde::Serializer;

pub trait AsUsize: Copy {
    fn as_usize(self) -> usize;
}

impl<T> AsUsize for *const T {
    fn as_usize(self) -> usize {
        self as usize
    }
}

impl<T> AsUsize for *mut T {
    fn as_usize(self) -> usize {
        self as usize
    }
}

pub fn serialize<S, T>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: AsUsize,
{
    serializer.serialize_u64(value.as_usize() as u64)
}
