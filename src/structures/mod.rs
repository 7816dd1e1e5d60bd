//! # Structures
//!
//! The two leaf value types the rest of the engine is built on: [`FloatArray`],
//! a growable buffer of 32-bit floats, and [`SparseMap`], the sparse
//! `slot -> FloatArray` encoding that represents one block of one key both
//! in memory and on the wire.
//!
//! Both model the reference system's manual allocate/free discipline as an
//! owning value type whose buffer becomes `None` on disposal; every public
//! operation on a disposed instance fails fast with [`GaugedError::UseAfterRelease`](crate::error::GaugedError).

pub mod float_array;
pub mod sparse_map;

pub use float_array::FloatArray;
pub use sparse_map::SparseMap;
