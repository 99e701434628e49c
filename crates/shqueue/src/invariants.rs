//! Debug assertion macros for the ring buffer's protocol invariants.
//!
//! Only active in debug builds (`#[cfg(debug_assertions)]`), so there is
//! zero overhead in release builds.
//!
//! Used by `Ring` (the byte-oriented SPSC protocol) and the mapping engine.

// =============================================================================
// INV-POS-01: Indices stay inside the data region
// =============================================================================

/// Assert that an index into the data region is strictly less than capacity.
///
/// **Invariant**: `0 ≤ pos < capacity`
macro_rules! debug_assert_index_in_bounds {
    ($name:literal, $pos:expr, $capacity:expr) => {
        debug_assert!(
            $pos < $capacity,
            "INV-POS-01 violated: {} = {} is not < capacity {}",
            $name,
            $pos,
            $capacity
        )
    };
}

// =============================================================================
// INV-CAP-01: Bounded occupancy
// =============================================================================

/// Assert that `available + space + 1 == capacity`.
///
/// Used in: `Ring::commit`/`Ring::pop` after advancing an index.
macro_rules! debug_assert_bounded_occupancy {
    ($available:expr, $space:expr, $capacity:expr) => {
        debug_assert!(
            $available + $space + 1 == $capacity,
            "INV-CAP-01 violated: available {} + space {} + 1 != capacity {}",
            $available,
            $space,
            $capacity
        )
    };
}

// =============================================================================
// INV-RES-01: Caller preconditions on alloc/commit/pop
// =============================================================================

/// Assert that a requested length is nonzero and leaves at least one slot free.
///
/// Used in: `Ring::alloc` before computing the reservation.
macro_rules! debug_assert_valid_len {
    ($n:expr, $capacity:expr) => {
        debug_assert!(
            $n > 0 && $n < $capacity,
            "INV-RES-01 violated: length {} must be in (0, capacity={})",
            $n,
            $capacity
        )
    };
}

/// Assert that a commit/pop length does not exceed what was reserved/available.
///
/// Used in: `AllocGuard::commit_n`, `Ring::pop`.
macro_rules! debug_assert_within_bound {
    ($name:literal, $n:expr, $bound:expr) => {
        debug_assert!(
            $n <= $bound,
            "INV-RES-01 violated: {} {} exceeds bound {}",
            $name,
            $n,
            $bound
        )
    };
}

pub(crate) use debug_assert_bounded_occupancy;
pub(crate) use debug_assert_index_in_bounds;
pub(crate) use debug_assert_valid_len;
pub(crate) use debug_assert_within_bound;
