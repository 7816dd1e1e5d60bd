//! The in-memory and on-wire representation of one block's payload for one
//! key: a sparse, strictly-increasing `slot -> FloatArray` mapping, plus the
//! block-local aggregate primitives the query engine composes over.
//!
//! ## Binary layout
//!
//! A `SparseMap` serializes as a flat sequence of self-delimiting segments,
//! each `[slot: u32][count: u32][value: f32 × count]`, little-endian, with
//! no outer framing — the on-disk bytes of a block are exactly a
//! `SparseMap`'s own buffer (see the block payload contract on
//! [`Store`](crate::store::Store)). This is a deliberately simpler envelope
//! than a sparse/run control-bit format: it is lossless, byte-countable,
//! concatenable, and supports O(n) iteration with a contiguous float slice
//! per slot, which is everything the rest of the engine needs.

use crate::encoding::{Decode, Encode};
use crate::error::GaugedError;
use crate::structures::float_array::FloatArray;

struct Segment {
    slot: u32,
    values: FloatArray,
}

/// The sparse `slot -> list<f32>` payload of one block, for one key.
#[derive(Default)]
pub struct SparseMap {
    segments: Option<Vec<Segment>>,
}

impl SparseMap {
    pub fn new() -> Self {
        Self {
            segments: Some(Vec::new()),
        }
    }

    /// Parses a buffer produced by [`SparseMap::to_bytes`].
    pub fn from_bytes(buf: &[u8]) -> Result<Self, GaugedError> {
        let mut segments = Vec::new();
        let mut offset = 0usize;
        while offset < buf.len() {
            let (slot, n) = u32::decode_from(&buf[offset..])?;
            offset += n;
            let (count, n) = u32::decode_from(&buf[offset..])?;
            offset += n;
            let mut values = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let (value, n) = f32::decode_from(&buf[offset..])?;
                offset += n;
                values.push(value);
            }
            if values.is_empty() {
                return Err(GaugedError::MalformedSparseMap(format!(
                    "segment at slot {slot} carries zero values"
                )));
            }
            segments.push(Segment {
                slot,
                values: FloatArray::from_floats(values),
            });
        }
        Ok(Self {
            segments: Some(segments),
        })
    }

    /// Builds a map from an arbitrarily-ordered `slot -> FloatArray` mapping;
    /// slots are sorted before packing.
    pub fn from_map(map: std::collections::BTreeMap<u32, FloatArray>) -> Result<Self, GaugedError> {
        let mut out = Self::new();
        for (slot, array) in map {
            out.append(slot, array)?;
        }
        Ok(out)
    }

    fn segs(&self) -> Result<&Vec<Segment>, GaugedError> {
        self.segments.as_ref().ok_or(GaugedError::UseAfterRelease)
    }

    fn segs_mut(&mut self) -> Result<&mut Vec<Segment>, GaugedError> {
        self.segments.as_mut().ok_or(GaugedError::UseAfterRelease)
    }

    /// The sole builder: appends `array` at `slot`, which must exceed every
    /// slot already present. Replacement and interleaving are disallowed.
    pub fn append(&mut self, slot: u32, array: FloatArray) -> Result<(), GaugedError> {
        if array.is_empty()? {
            return Ok(());
        }
        let segs = self.segs_mut()?;
        if let Some(last) = segs.last() {
            if slot <= last.slot {
                return Err(GaugedError::SparseMapOrder(format!(
                    "slot {slot} is not greater than last appended slot {}",
                    last.slot
                )));
            }
        }
        segs.push(Segment {
            slot,
            values: array,
        });
        Ok(())
    }

    /// Total encoded byte length.
    pub fn byte_length(&self) -> Result<usize, GaugedError> {
        let mut total = 0;
        for seg in self.segs()? {
            total += 8 + seg.values.byte_length()?;
        }
        Ok(total)
    }

    /// Serializes to the wire format described in the module docs.
    pub fn to_bytes(&self) -> Result<Vec<u8>, GaugedError> {
        let mut out = Vec::with_capacity(self.byte_length()?);
        for seg in self.segs()? {
            seg.slot.encode_to(&mut out)?;
            (seg.values.len()? as u32).encode_to(&mut out)?;
            for value in seg.values.values()? {
                value.encode_to(&mut out)?;
            }
        }
        Ok(out)
    }

    /// Returns a new map covering `[start, end)`; `end == 0` means unbounded.
    /// Slots in the result retain their absolute positions.
    pub fn slice(&self, start: u32, end: u32) -> Result<Self, GaugedError> {
        let end = if end == 0 { u32::MAX } else { end };
        let mut out = Self::new();
        for seg in self.segs()? {
            if seg.slot < start || seg.slot >= end {
                continue;
            }
            out.append(seg.slot, FloatArray::from_floats(seg.values.values()?.to_vec()))?;
        }
        Ok(out)
    }

    /// Appends a slice of `other` into `self`, shifting each retained slot by
    /// `offset`. The shifted slots must all exceed the largest slot already
    /// in `self` — this is what lets `Context::query` concatenate
    /// consecutive blocks into one materialized map.
    pub fn concat(&mut self, other: &Self, start: u32, end: u32, offset: u32) -> Result<(), GaugedError> {
        let sliced = other.slice(start, end)?;
        for seg in sliced.segs()? {
            self.append(seg.slot + offset, FloatArray::from_floats(seg.values.values()?.to_vec()))?;
        }
        Ok(())
    }

    pub fn clear(&mut self) -> Result<(), GaugedError> {
        self.segs_mut()?.clear();
        Ok(())
    }

    pub fn release(&mut self) {
        self.segments = None;
    }

    fn all_values(&self) -> Result<impl Iterator<Item = f32> + '_, GaugedError> {
        Ok(self.segs()?.iter().flat_map(|seg| {
            // `values()` cannot fail here: `seg.values` is never released
            // independently of the owning `SparseMap`.
            seg.values.values().unwrap_or(&[]).iter().copied()
        }))
    }

    pub fn first(&self) -> Result<Option<f32>, GaugedError> {
        Ok(self
            .segs()?
            .first()
            .and_then(|seg| seg.values.values().ok().and_then(|v| v.first().copied())))
    }

    pub fn last(&self) -> Result<Option<f32>, GaugedError> {
        Ok(self
            .segs()?
            .last()
            .and_then(|seg| seg.values.values().ok().and_then(|v| v.last().copied())))
    }

    pub fn sum(&self) -> Result<f32, GaugedError> {
        Ok(self.all_values()?.sum())
    }

    pub fn count(&self) -> Result<u64, GaugedError> {
        Ok(self.all_values()?.count() as u64)
    }

    pub fn min(&self) -> Result<Option<f32>, GaugedError> {
        Ok(self.all_values()?.fold(None, |acc, v| match acc {
            None => Some(v),
            Some(m) if v < m => Some(v),
            acc => acc,
        }))
    }

    pub fn max(&self) -> Result<Option<f32>, GaugedError> {
        Ok(self.all_values()?.fold(None, |acc, v| match acc {
            None => Some(v),
            Some(m) if v > m => Some(v),
            acc => acc,
        }))
    }

    pub fn mean(&self) -> Result<Option<f32>, GaugedError> {
        let count = self.count()?;
        if count == 0 {
            return Ok(None);
        }
        Ok(Some(self.sum()? / count as f32))
    }

    /// `Σ(x - mean)²` over every stored value.
    pub fn sum_of_squares(&self, mean: f32) -> Result<f32, GaugedError> {
        Ok(self.all_values()?.map(|v| (v - mean) * (v - mean)).sum())
    }

    pub fn stddev(&self) -> Result<Option<f32>, GaugedError> {
        let count = self.count()?;
        if count == 0 {
            return Ok(None);
        }
        let mean = self.mean()?.expect("count > 0 implies a mean");
        Ok(Some((self.sum_of_squares(mean)? / count as f32).sqrt()))
    }

    /// Linear-interpolated percentile `0 <= p <= 100`. Consumes `self`: the
    /// in-place partial sort this performs makes the receiver single-use,
    /// per the component contract — encoded here in the type signature
    /// rather than a runtime flag.
    pub fn percentile(mut self, p: f64) -> Result<Option<f32>, GaugedError> {
        if p.is_nan() || !(0.0..=100.0).contains(&p) {
            return Err(GaugedError::InvalidPercentile(p));
        }
        let segs = self.segs_mut()?;
        let mut values: Vec<f32> = Vec::new();
        for seg in segs.drain(..) {
            values.extend_from_slice(seg.values.values()?);
        }
        if values.is_empty() {
            return Ok(None);
        }
        let rank = (values.len() - 1) as f64 * p / 100.0;
        let lo = rank.floor() as usize;
        let hi = rank.ceil() as usize;
        if lo == hi {
            let (_, nth, _) = values.select_nth_unstable_by(lo, |a, b| a.total_cmp(b));
            return Ok(Some(*nth));
        }
        let (_, lo_val, upper) = values.select_nth_unstable_by(lo, |a, b| a.total_cmp(b));
        let lo_val = *lo_val;
        let hi_val = upper
            .iter()
            .copied()
            .fold(f32::INFINITY, f32::min);
        let frac = (rank - lo as f64) as f32;
        Ok(Some(lo_val + (hi_val - lo_val) * frac))
    }

    /// `percentile(50)`.
    pub fn median(self) -> Result<Option<f32>, GaugedError> {
        self.percentile(50.0)
    }

    /// Yields `(slot, values)` in ascending slot order.
    pub fn iter_items(&self) -> Result<impl Iterator<Item = (u32, &[f32])>, GaugedError> {
        Ok(self.segs()?.iter().filter_map(|seg| {
            seg.values.values().ok().map(|v| (seg.slot, v))
        }))
    }
}

impl Drop for SparseMap {
    fn drop(&mut self) {
        self.release();
    }
}
