//! Method identifiers and sampled call frames

use core::fmt;
use rand::seq::SliceRandom;
use rand::Rng;

/// Opaque host method identifier
///
/// The host hands these out (a `jmethodID`-like pointer value); the profiler
/// only compares and hashes them. Zero is reserved as "no method".
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct MethodId(usize);

impl MethodId {
    /// Sentinel value indicating no method
    pub const NONE: MethodId = MethodId(0);

    #[inline]
    pub const fn new(raw: usize) -> Self {
        MethodId(raw)
    }

    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0
    }

    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl From<usize> for MethodId {
    #[inline]
    fn from(raw: usize) -> Self {
        MethodId(raw)
    }
}

impl fmt::Debug for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "MethodId(NONE)")
        } else {
            write!(f, "MethodId({:#x})", self.0)
        }
    }
}

/// One sampled stack frame: a method and the bytecode offset executing in it.
///
/// Ordering is by method first, then offset, which is what dedup sorts on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(C)]
pub struct CallFrame {
    pub method: MethodId,
    pub offset: i32,
}

impl CallFrame {
    /// Zeroed frame used to pre-fill capture buffers
    pub const EMPTY: CallFrame = CallFrame {
        method: MethodId::NONE,
        offset: 0,
    };

    #[inline]
    pub const fn new(method: MethodId, offset: i32) -> Self {
        CallFrame { method, offset }
    }
}

/// Reduce a candidate batch to distinct frames in random order.
///
/// Sorting then dropping adjacent duplicates leaves each (method, offset)
/// exactly once; the shuffle keeps the scheduler from always preferring the
/// lowest method id when several call sites qualify.
pub fn dedup_frames<R: Rng + ?Sized>(mut frames: Vec<CallFrame>, rng: &mut R) -> Vec<CallFrame> {
    frames.sort_unstable();
    frames.dedup();
    frames.shuffle(rng);
    frames
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::BTreeSet;

    fn frame(m: usize, o: i32) -> CallFrame {
        CallFrame::new(MethodId::new(m), o)
    }

    #[test]
    fn test_order_is_method_then_offset() {
        assert!(frame(1, 99) < frame(2, 0));
        assert!(frame(2, 3) < frame(2, 4));
        assert_eq!(frame(5, 5), frame(5, 5));
        assert_ne!(frame(5, 5), frame(5, 6));
    }

    #[test]
    fn test_dedup_removes_duplicates() {
        let mut rng = StdRng::seed_from_u64(7);
        let frames = vec![frame(3, 1), frame(1, 2), frame(3, 1), frame(1, 2), frame(1, 3)];
        let mut out = dedup_frames(frames, &mut rng);
        out.sort();
        assert_eq!(out, vec![frame(1, 2), frame(1, 3), frame(3, 1)]);
    }

    #[test]
    fn test_dedup_empty() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(dedup_frames(Vec::new(), &mut rng).is_empty());
    }

    proptest! {
        #[test]
        fn prop_dedup_keeps_each_distinct_frame_once(
            raw in proptest::collection::vec((1usize..8, 0i32..6), 0..64),
            seed in any::<u64>(),
        ) {
            let frames: Vec<CallFrame> = raw.iter().map(|&(m, o)| frame(m, o)).collect();
            let expected: BTreeSet<CallFrame> = frames.iter().copied().collect();

            let mut forward = StdRng::seed_from_u64(seed);
            let out = dedup_frames(frames.clone(), &mut forward);
            prop_assert_eq!(out.len(), expected.len());
            let got: BTreeSet<CallFrame> = out.iter().copied().collect();
            prop_assert_eq!(&got, &expected);

            // Input order does not matter.
            let mut reversed = frames;
            reversed.reverse();
            let mut rng = StdRng::seed_from_u64(seed ^ 0x5a5a);
            let again: BTreeSet<CallFrame> = dedup_frames(reversed, &mut rng).into_iter().collect();
            prop_assert_eq!(again, expected);
        }
    }
}
