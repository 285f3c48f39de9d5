//! Approximate Membership Query Filter ([AMQ-Filter](https://en.wikipedia.org/wiki/Approximate_Membership_Query_Filter))
//! based on the [Cuckoo Filter](https://www.cs.cmu.edu/~dga/papers/cuckoo-conext2014.pdf), specialized for
//! keys that are already 32 byte digests (SHA-256, BLAKE2b, HighwayHash, etc).
//!
//! The filter has no false negatives, supports deletions and occupies a fixed amount of memory
//! regardless of how many items it holds. Its binary representation is the raw bucket array, which
//! can be decoded either into an owned [`Filter`] or borrowed in place as a [`FilterView`].
//!
//! ### Example
//!
//! ```rust
//! use cuckoo_digest::{Filter, FilterView};
//!
//! let mut f = Filter::new();
//! let id = [7u8; 32]; // normally the output of a cryptographic hash
//! assert!(f.insert(&id));
//! assert!(f.contains(&id));
//! assert!(!f.insert(&id));
//!
//! let bytes = f.encode();
//! let view = FilterView::decode(&bytes).unwrap();
//! assert!(view.contains(&id));
//!
//! assert!(f.remove(&id));
//! assert!(!f.contains(&id));
//! ```
//!
//! ### Hashing
//!
//! Items are never hashed by the filter. The first 8 bytes of a digest select the 1 byte fingerprint
//! and the next 8 bytes select the primary bucket, both read as big endian integers. The alternate
//! bucket is derived from the primary bucket and the fingerprint with
//! [Robert Jenkins' 32 bit integer hash](http://burtleburtle.net/bob/hash/integer.html),
//! so digests must be uniformly distributed for the filter to perform as advertised.
//!
//! ### Filter size
//!
//! | Buckets | Slots per bucket | Encoded size | Error probability when full |
//! |:---:|:---:|:---:|:---:|
//! | 524288 | 4 | 2 MiB | ~0.031 |
//!
//! ### Layout
//!
//! [`Filter::encode`] outputs exactly [`ENCODED_SIZE`] bytes: the buckets in order, one byte per slot,
//! `0` marking an empty slot. There's no header, length prefix or checksum.
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

use std::slice::ChunksExact;

use rand::{rngs::SmallRng, Rng, SeedableRng};
#[cfg(feature = "serde")]
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use mix::jenkins;

mod mix;

/// Number of fingerprint slots in each bucket.
pub const BUCKET_SIZE: usize = 4;

/// Number of buckets in a filter. Always a power of two.
pub const NUM_BUCKETS: usize = 524288;

/// Default number of relocations attempted before an insert gives up.
pub const MAX_INSERTION_ATTEMPTS: u32 = 500;

/// Size in bytes of an encoded filter.
pub const ENCODED_SIZE: usize = NUM_BUCKETS * BUCKET_SIZE;

const EMPTY: u8 = 0;

/// A 32 byte pre-hashed key.
pub type Digest = [u8; 32];

/// A group of fingerprint slots. A slot holding `0` is empty.
pub type Bucket = [u8; BUCKET_SIZE];

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The encoded filter doesn't have the expected size
    SizeMismatch { expected: usize, actual: usize },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::SizeMismatch { expected, actual } => {
                write!(f, "must be {expected} bytes, but got {actual} bytes")
            }
        }
    }
}

impl std::error::Error for Error {}

/// Linear scan operations over the slots of a [`Bucket`].
pub trait BucketExt {
    /// Stores `fp` in the first empty slot.
    /// Returns false, leaving the bucket untouched, if the bucket is full.
    fn insert_fingerprint(&mut self, fp: u8) -> bool;
    /// Empties the first slot holding `fp`.
    /// Returns whether a slot was emptied.
    fn remove_fingerprint(&mut self, fp: u8) -> bool;
    /// Index of the first slot holding `fp`.
    fn index_of(&self, fp: u8) -> Option<usize>;

    #[inline]
    fn contains_fingerprint(&self, fp: u8) -> bool {
        self.index_of(fp).is_some()
    }
}

impl BucketExt for Bucket {
    #[inline]
    fn insert_fingerprint(&mut self, fp: u8) -> bool {
        debug_assert_ne!(fp, EMPTY);
        match self.index_of(EMPTY) {
            Some(i) => {
                self[i] = fp;
                true
            }
            None => false,
        }
    }

    #[inline]
    fn remove_fingerprint(&mut self, fp: u8) -> bool {
        match self.index_of(fp) {
            Some(i) => {
                self[i] = EMPTY;
                true
            }
            None => false,
        }
    }

    #[inline]
    fn index_of(&self, fp: u8) -> Option<usize> {
        self.iter().position(|&stored| stored == fp)
    }
}

/// An iterator over the buckets of a [`Filter`] or [`FilterView`].
pub struct Buckets<'a> {
    chunks: ChunksExact<'a, u8>,
}

impl<'a> Buckets<'a> {
    fn new(buckets: &'a [u8]) -> Self {
        Buckets {
            chunks: buckets.chunks_exact(BUCKET_SIZE),
        }
    }
}

impl<'a> Iterator for Buckets<'a> {
    type Item = &'a Bucket;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.chunks.next().map(|chunk| chunk.try_into().unwrap())
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.chunks.size_hint()
    }
}

impl ExactSizeIterator for Buckets<'_> {}

/// Fingerprint, primary and alternate bucket of a digest.
#[inline]
fn locate(id: &Digest) -> (u8, usize, usize) {
    let fp = (u64::from_be_bytes(id[..8].try_into().unwrap()) % 255 + 1) as u8;
    let primary =
        (u64::from_be_bytes(id[8..16].try_into().unwrap()) % NUM_BUCKETS as u64) as usize;
    (fp, primary, alternate(primary, fp))
}

/// The other candidate bucket of a fingerprint stored in bucket `idx`.
/// Applying it twice yields `idx` again.
#[inline]
fn alternate(idx: usize, fp: u8) -> usize {
    (idx ^ jenkins(fp as u32) as usize) % NUM_BUCKETS
}

#[inline]
fn bucket(buckets: &[u8], idx: usize) -> &Bucket {
    (&buckets[idx * BUCKET_SIZE..][..BUCKET_SIZE])
        .try_into()
        .unwrap()
}

#[inline]
fn bucket_mut(buckets: &mut [u8], idx: usize) -> &mut Bucket {
    (&mut buckets[idx * BUCKET_SIZE..][..BUCKET_SIZE])
        .try_into()
        .unwrap()
}

#[inline]
fn check_size(buf: &[u8]) -> Result<(), Error> {
    if buf.len() != ENCODED_SIZE {
        return Err(Error::SizeMismatch {
            expected: ENCODED_SIZE,
            actual: buf.len(),
        });
    }
    Ok(())
}

fn count_nonzero(buf: &[u8]) -> u64 {
    buf.iter().filter(|&&b| b != EMPTY).count() as u64
}

fn contains_impl(buckets: &[u8], id: &Digest) -> bool {
    let (fp, a, b) = locate(id);
    bucket(buckets, a).contains_fingerprint(fp) || bucket(buckets, b).contains_fingerprint(fp)
}

/// Inserts the fingerprint of `id` relocating up to `max_kicks` fingerprints if both candidate
/// buckets are full. Returns whether a new fingerprint was admitted.
///
/// Every relocation moves a fingerprint to its other candidate bucket, so previously admitted
/// fingerprints stay reachable. The exception is an exhausted relocation chain, which drops the
/// fingerprint evicted last.
fn insert_impl<R: Rng>(buckets: &mut [u8], rng: &mut R, max_kicks: u32, id: &Digest) -> bool {
    let (mut fp, a, b) = locate(id);
    // Also rejects distinct digests with colliding fingerprints, these are indistinguishable.
    if bucket(buckets, a).contains_fingerprint(fp) || bucket(buckets, b).contains_fingerprint(fp)
    {
        return false;
    }
    if bucket_mut(buckets, a).insert_fingerprint(fp)
        || bucket_mut(buckets, b).insert_fingerprint(fp)
    {
        return true;
    }

    let mut idx = if rng.gen::<bool>() { a } else { b };
    for _ in 0..max_kicks {
        let slot = rng.gen_range(0..BUCKET_SIZE);
        std::mem::swap(&mut fp, &mut bucket_mut(buckets, idx)[slot]);
        idx = alternate(idx, fp);
        if bucket_mut(buckets, idx).insert_fingerprint(fp) {
            return true;
        }
    }

    tracing::debug!(
        attempts = max_kicks,
        dropped_fingerprint = fp,
        bucket = idx,
        "cuckoo filter relocation budget exhausted"
    );
    false
}

fn remove_impl(buckets: &mut [u8], id: &Digest) -> bool {
    let (fp, a, b) = locate(id);
    bucket_mut(buckets, a).remove_fingerprint(fp) || bucket_mut(buckets, b).remove_fingerprint(fp)
}

/// Cuckoo filter over pre-hashed 32 byte digests.
///
/// The filter stores a 1 byte fingerprint of each digest in one of two candidate buckets.
/// False positives happen when distinct digests share a fingerprint and a candidate bucket,
/// the same collisions also make a second insert of such a digest fail.
///
/// All buckets live in a single allocation of [`ENCODED_SIZE`] bytes.
///
/// `R` is the random source used to pick relocation victims when both candidate buckets
/// of an item are full. Supply a seeded one through [`Filter::with_rng`] for reproducible layouts.
#[derive(Clone)]
pub struct Filter<R = SmallRng> {
    buckets: Box<[u8]>,
    len: u64,
    max_kicks: u32,
    rng: R,
}

impl Filter {
    /// Creates an empty filter with an entropy seeded random source.
    pub fn new() -> Self {
        Self::with_rng(SmallRng::from_entropy())
    }

    /// Decodes a filter from `buf`, copying it into a new allocation.
    ///
    /// The number of items is recomputed from the number of occupied slots.
    ///
    /// Errors with `Error::SizeMismatch` if `buf` isn't exactly [`ENCODED_SIZE`] bytes long.
    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        check_size(buf)?;
        Self::decode_with_rng(buf, SmallRng::from_entropy())
    }
}

impl Default for Filter {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> Filter<R> {
    /// Creates an empty filter which uses `rng` to pick relocation victims.
    pub fn with_rng(rng: R) -> Self {
        Self {
            buckets: vec![EMPTY; ENCODED_SIZE].into_boxed_slice(),
            len: 0,
            max_kicks: MAX_INSERTION_ATTEMPTS,
            rng,
        }
    }

    /// Same as [`Filter::decode`] but using `rng` as the random source.
    pub fn decode_with_rng(buf: &[u8], rng: R) -> Result<Self, Error> {
        check_size(buf)?;
        let len = count_nonzero(buf);
        tracing::trace!(len, "decoded cuckoo filter");
        Ok(Self {
            buckets: buf.into(),
            len,
            max_kicks: MAX_INSERTION_ATTEMPTS,
            rng,
        })
    }

    /// Sets how many fingerprints an insert may relocate before giving up.
    /// Defaults to [`MAX_INSERTION_ATTEMPTS`].
    pub fn with_max_insertion_attempts(mut self, attempts: u32) -> Self {
        self.max_kicks = attempts;
        self
    }

    /// Inserts `id` in the filter if it's not already present (probabilistically).
    ///
    /// Returns `true` if the item was added to the filter.
    /// Returns `false` if the item is already contained (probabilistically) in the filter or if the
    /// filter is too full to admit it. In the latter case fingerprints may have been relocated and
    /// one previously admitted fingerprint may have been dropped.
    pub fn insert(&mut self, id: &Digest) -> bool {
        let added = insert_impl(&mut self.buckets, &mut self.rng, self.max_kicks, id);
        if added {
            self.len += 1;
        }
        added
    }

    /// Removes `id` from the filter.
    /// Returns whether item was actually found and removed.
    ///
    /// Note that removing an item who wasn't previously added to the filter
    /// may introduce **false negatives**. This is because it could be removing
    /// fingerprints from a colliding item!
    pub fn remove(&mut self, id: &Digest) -> bool {
        let removed = remove_impl(&mut self.buckets, id);
        if removed {
            self.len -= 1;
        }
        removed
    }
}

impl<R> Filter<R> {
    /// Returns whether `id` is present (probabilistically) in the filter.
    pub fn contains(&self, id: &Digest) -> bool {
        contains_impl(&self.buckets, id)
    }

    /// Whether the filter is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current number of items admitted to the filter.
    #[inline]
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Total number of fingerprint slots.
    #[inline]
    pub fn capacity(&self) -> u64 {
        ENCODED_SIZE as u64
    }

    /// Fraction of occupied slots.
    pub fn load_factor(&self) -> f64 {
        self.len as f64 / self.capacity() as f64
    }

    /// Max error ratio when at full capacity (len == capacity).
    pub fn max_error_ratio(&self) -> f64 {
        2.0 * BUCKET_SIZE as f64 / 255.0
    }

    /// Current error ratio at the current occupancy.
    pub fn current_error_ratio(&self) -> f64 {
        // A lookup compares against every occupied slot of two buckets.
        let compared = 2.0 * BUCKET_SIZE as f64 * self.load_factor();
        1.0 - (254.0f64 / 255.0).powf(compared)
    }

    /// Number of relocations an insert may perform before giving up.
    #[inline]
    pub fn max_insertion_attempts(&self) -> u32 {
        self.max_kicks
    }

    /// Resets/Clears the filter.
    pub fn clear(&mut self) {
        self.buckets.fill(EMPTY);
        self.len = 0;
    }

    /// Returns an iterator over the buckets of the filter.
    pub fn buckets(&self) -> Buckets<'_> {
        Buckets::new(&self.buckets)
    }

    /// The encoded representation of the filter, without copying.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buckets
    }

    /// Encodes the filter into a new buffer of [`ENCODED_SIZE`] bytes.
    pub fn encode(&self) -> Vec<u8> {
        self.buckets.to_vec()
    }

    #[doc(hidden)]
    #[cfg(any(fuzzing, test))]
    pub fn validate(&self) {
        assert_eq!(
            self.len,
            count_nonzero(&self.buckets),
            "len doesn't match the occupied slots"
        );
    }
}

impl<R> PartialEq for Filter<R> {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.buckets == other.buckets
    }
}

impl<R> Eq for Filter<R> {}

impl<R> std::fmt::Debug for Filter<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Filter")
            .field("buckets", &"[..]")
            .field("len", &self.len)
            .field("max_kicks", &self.max_kicks)
            .finish()
    }
}

#[cfg(feature = "serde")]
impl<R> Serialize for Filter<R> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serde_bytes::serialize(&self.buckets[..], serializer)
    }
}

#[cfg(feature = "serde")]
impl<'de, R: Rng + SeedableRng> Deserialize<'de> for Filter<R> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let buf: serde_bytes::ByteBuf = serde_bytes::deserialize(deserializer)?;
        Self::decode_with_rng(&buf, R::from_entropy()).map_err(serde::de::Error::custom)
    }
}

/// A filter decoded in place from a caller owned buffer.
///
/// Decoding a view only validates the buffer size, the buffer itself is used as the bucket array
/// and stays borrowed for the lifetime of the view. Unlike [`Filter`] a view doesn't keep track of
/// the number of items.
///
/// Views decoded with [`FilterView::decode_mut`] can also insert and remove items, writing
/// directly to the borrowed buffer.
pub struct FilterView<B, R = ()> {
    buckets: B,
    max_kicks: u32,
    rng: R,
}

impl<'a> FilterView<&'a [u8]> {
    /// Borrows `buf` as a read only filter.
    ///
    /// Errors with `Error::SizeMismatch` if `buf` isn't exactly [`ENCODED_SIZE`] bytes long.
    pub fn decode(buf: &'a [u8]) -> Result<Self, Error> {
        check_size(buf)?;
        tracing::trace!("borrowed cuckoo filter");
        Ok(Self {
            buckets: buf,
            max_kicks: MAX_INSERTION_ATTEMPTS,
            rng: (),
        })
    }
}

impl<'a> FilterView<&'a mut [u8], SmallRng> {
    /// Borrows `buf` as a mutable filter with an entropy seeded random source.
    ///
    /// Errors with `Error::SizeMismatch` if `buf` isn't exactly [`ENCODED_SIZE`] bytes long.
    pub fn decode_mut(buf: &'a mut [u8]) -> Result<Self, Error> {
        check_size(buf)?;
        Self::decode_mut_with_rng(buf, SmallRng::from_entropy())
    }
}

impl<'a, R: Rng> FilterView<&'a mut [u8], R> {
    /// Same as [`FilterView::decode_mut`] but using `rng` as the random source.
    pub fn decode_mut_with_rng(buf: &'a mut [u8], rng: R) -> Result<Self, Error> {
        check_size(buf)?;
        tracing::trace!("borrowed cuckoo filter for writing");
        Ok(Self {
            buckets: buf,
            max_kicks: MAX_INSERTION_ATTEMPTS,
            rng,
        })
    }

    /// Sets how many fingerprints an insert may relocate before giving up.
    /// Defaults to [`MAX_INSERTION_ATTEMPTS`].
    pub fn with_max_insertion_attempts(mut self, attempts: u32) -> Self {
        self.max_kicks = attempts;
        self
    }

    /// See [`Filter::insert`].
    pub fn insert(&mut self, id: &Digest) -> bool {
        insert_impl(&mut self.buckets[..], &mut self.rng, self.max_kicks, id)
    }

    /// See [`Filter::remove`].
    pub fn remove(&mut self, id: &Digest) -> bool {
        remove_impl(&mut self.buckets[..], id)
    }

    /// Empties every bucket of the borrowed buffer.
    pub fn clear(&mut self) {
        self.buckets.fill(EMPTY);
    }
}

impl<B: AsRef<[u8]>, R> FilterView<B, R> {
    /// Returns whether `id` is present (probabilistically) in the filter.
    pub fn contains(&self, id: &Digest) -> bool {
        contains_impl(self.buckets.as_ref(), id)
    }

    /// Returns an iterator over the buckets of the filter.
    pub fn buckets(&self) -> Buckets<'_> {
        Buckets::new(self.buckets.as_ref())
    }

    /// Views can't be re-encoded.
    ///
    /// The view aliases memory owned by the caller, which already holds the encoded filter.
    /// Use [`Filter::decode`] to obtain an owned, encodable filter instead.
    ///
    /// # Panics
    ///
    /// Always.
    #[track_caller]
    pub fn encode(&self) -> Vec<u8> {
        panic!("attempted to re-encode a zero-copy cuckoo filter view")
    }
}

impl<B, R> std::fmt::Debug for FilterView<B, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterView")
            .field("buckets", &"[..]")
            .field("max_kicks", &self.max_kicks)
            .finish()
    }
}
