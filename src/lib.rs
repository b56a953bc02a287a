//! A persistent compressed-bitset engine: a Roaring-style base image of
//! array, bitmap, and run containers, with an append-only log of
//! mutations layered on top.
//!
//! The base image can be decoded zero-copy from a borrowed buffer (for
//! example a memory-mapped file); any container an op touches is
//! transparently detached into owned memory the moment it is first
//! written to. See [`Bitmap::decode`] and [`inspect::inspect`] for the two
//! entry points.

mod bitmap;
mod bytes;
mod checksum;
mod container;
mod error;
mod format;
mod inspect;
mod oplog;
mod reader;
mod store;
mod util;

pub use bitmap::{Bitmap, DecodeOutcome};
pub use container::{Container, ContainerInfo, ContainerIter, ContainerKind, Interval16};
pub use error::DecodeError;
pub use inspect::{inspect, OpInfo, Report};
pub use util::{join, split, Key};
