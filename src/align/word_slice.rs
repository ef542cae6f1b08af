
use crate::align::bitvector::{
    self, ALL_ONES, ALL_ZEROS, CHUNK_BITS, LSB_MASK, SIGN_MASK, WORD_SIZE,
};

/// Score type of the DP; signed so chunked difference arithmetic stays simple
pub type Score = i64;

/// A w-tall column segment of the DP matrix in compressed bit form.
/// Starting from `score_before_start`, bit i of `vp` means the score grows by
/// one at position i and bit i of `vn` that it drops by one; unset bits leave
/// the score unchanged. `vp & vn == 0` and
/// `score_end == score_before_start + popcount(vp) - popcount(vn)` always hold.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct WordSlice {
    pub vp: u64,
    pub vn: u64,
    pub score_end: Score,
    pub score_before_start: Score,
}

impl WordSlice {
    pub fn new(vp: u64, vn: u64, score_end: Score, score_before_start: Score) -> Self {
        Self { vp, vn, score_end, score_before_start }
    }
}

/// Band-entry slice when no previous row exists at this node: any predecessor
/// is at least one worse per step, starting fresh at the given row index.
pub fn source_slice_without_before(row: usize) -> WordSlice {
    WordSlice::new(ALL_ONES, ALL_ZEROS, row as Score + WORD_SIZE as Score, row as Score)
}

/// Band-entry slice derived from a previous-row score.
pub fn source_slice_from_score(previous_score: Score) -> WordSlice {
    WordSlice::new(ALL_ONES, ALL_ZEROS, previous_score + WORD_SIZE as Score, previous_score)
}

/// Debug-build invariant checks for a freshly computed slice.
/// # Arguments
/// * `current` - the slice to check
/// * `up` - the same column in the previous row, only consulted when `previous_band` is set
/// * `previous_band` - whether the node was banded in the previous row
pub fn assert_slice_correctness(current: &WordSlice, up: &WordSlice, previous_band: bool) {
    debug_assert_eq!(
        current.score_end,
        current.score_before_start + bitvector::popcount(current.vp) - bitvector::popcount(current.vn)
    );
    debug_assert!(current.score_before_start >= 0);
    debug_assert!(current.score_end >= 0);
    debug_assert!(current.score_before_start <= current.score_end + WORD_SIZE as Score);
    debug_assert!(current.score_end <= current.score_before_start + WORD_SIZE as Score);
    debug_assert_eq!(current.vp & current.vn, ALL_ZEROS);
    debug_assert!(!previous_band || current.score_before_start <= up.score_end);
    let _ = (current, up, previous_band);
}

/// Myers' advance step: computes a column's slice from its left neighbor
/// `slice` and, when the node was banded in the previous row, the slice above
/// (`previous`) with the diagonal equality bit `previous_eq`.
/// Myers 1999, pages 405 and 408.
pub fn get_next_slice(
    mut eq: u64, mut slice: WordSlice, previous_inside_band: bool, previous_eq: bool, previous: WordSlice
) -> WordSlice {
    let last_bit_mask = 1u64 << (WORD_SIZE - 1);
    let old_value = slice.score_before_start;
    if !previous_inside_band {
        slice.score_before_start += 1;
    } else {
        debug_assert!(slice.score_before_start <= previous.score_end);
        let from_above = previous.score_end
            - Score::from(previous.vp & last_bit_mask != 0)
            + Score::from(previous.vn & last_bit_mask != 0)
            + Score::from(!previous_eq);
        slice.score_before_start = (slice.score_before_start + 1).min(from_above);
    }
    let hin = slice.score_before_start - old_value;

    let xv = eq | slice.vn;
    if hin < 0 {
        eq |= 1;
    }
    let xh = (((eq & slice.vp).wrapping_add(slice.vp)) ^ slice.vp) | eq;
    let mut ph = slice.vn | !(xh | slice.vp);
    let mut mh = slice.vp & xh;
    if ph & last_bit_mask != 0 {
        slice.score_end += 1;
    } else if mh & last_bit_mask != 0 {
        slice.score_end -= 1;
    }
    ph <<= 1;
    mh <<= 1;
    if hin < 0 {
        mh |= 1;
    } else if hin > 0 {
        ph |= 1;
    }
    slice.vp = mh | !(xv | ph);
    slice.vn = ph & xv;

    debug_assert_eq!(
        slice.score_end,
        slice.score_before_start + bitvector::popcount(slice.vp) - bitvector::popcount(slice.vn)
    );
    slice
}

/// Bitmasks of positions where one of two columns is strictly smaller than
/// the other. The inputs describe two slices whose start scores are
/// `score_difference` apart (left start + difference = right start). The
/// returned masks never overlap.
///
/// Works on chunked prefix sums: per-chunk differences are built first, then
/// one bit of each chunk is folded in per iteration, with the chunk sign bits
/// buffering the carries so additions and subtractions cannot cross chunk
/// boundaries.
pub fn difference_masks(
    mut left_vp: u64, mut left_vn: u64, mut right_vp: u64, mut right_vn: u64, score_difference: Score
) -> (u64, u64) {
    debug_assert!(score_difference >= 0);
    let vp_common = !(left_vp & right_vp);
    let vn_common = !(left_vn & right_vn);
    left_vp &= vp_common;
    left_vn &= vn_common;
    right_vp &= vp_common;
    right_vn &= vn_common;
    // left is lower everywhere
    if score_difference > bitvector::popcount(right_vn) + bitvector::popcount(left_vp) {
        return (ALL_ONES, ALL_ZEROS);
    }
    if score_difference == 128 && right_vn == ALL_ONES && left_vp == ALL_ONES {
        return (ALL_ONES ^ (1u64 << (WORD_SIZE - 1)), ALL_ZEROS);
    } else if score_difference == 0 && right_vn == ALL_ONES && left_vp == ALL_ONES {
        return (ALL_ZEROS, ALL_ONES);
    }
    debug_assert!(score_difference < 128);
    let byte_vpvn_sum_left = bitvector::byte_vpvn_sum(
        bitvector::byte_prefix_sums(bitvector::chunk_popcounts(left_vp), 0),
        bitvector::byte_prefix_sums(bitvector::chunk_popcounts(left_vn), 0),
    );
    let byte_vpvn_sum_right = bitvector::byte_vpvn_sum(
        bitvector::byte_prefix_sums(bitvector::chunk_popcounts(right_vp), score_difference),
        bitvector::byte_prefix_sums(bitvector::chunk_popcounts(right_vn), 0),
    );
    let mut difference = byte_vpvn_sum_left;
    {
        // split the right-hand sums into chunks that need to be added and
        // chunks that need to be deducted; smearmask is all-ones below the
        // sign bit in the chunks to deduct
        let smearmask = ((byte_vpvn_sum_right & SIGN_MASK) >> (CHUNK_BITS - 1))
            .wrapping_mul((1u64 << (CHUNK_BITS - 1)) - 1);
        debug_assert_eq!(smearmask & SIGN_MASK, 0);
        let deductions = !smearmask & byte_vpvn_sum_right & !SIGN_MASK;
        // negative chunks are stored in one's complement, so take the not-value plus one
        let additions = (smearmask & !byte_vpvn_sum_right).wrapping_add(smearmask & LSB_MASK);
        debug_assert_eq!(deductions & SIGN_MASK, 0);
        let mut signs_before = difference & SIGN_MASK;
        // unset the sign bits so additions don't interfere with other chunks
        difference &= !SIGN_MASK;
        difference = difference.wrapping_add(additions);
        // the sign bit flipped if the value crossed from <0 to >=0
        difference ^= signs_before;
        signs_before = difference & SIGN_MASK;
        // set the sign bits so deductions don't interfere with other chunks
        difference |= SIGN_MASK;
        difference = difference.wrapping_sub(deductions);
        // sign bit is 0 where the value crossed from >=0 to <0
        signs_before ^= SIGN_MASK & !difference;
        difference &= !SIGN_MASK;
        difference |= signs_before;
    }
    // difference now contains the prefix sum difference (left-right) per chunk
    let mut result_left_smaller = ALL_ZEROS;
    let mut result_right_smaller = ALL_ZEROS;
    for bit in 0..CHUNK_BITS {
        let mut signs_before = difference & SIGN_MASK;
        difference &= !SIGN_MASK;
        difference = difference.wrapping_add(left_vp & LSB_MASK);
        difference = difference.wrapping_add(right_vn & LSB_MASK);
        difference ^= signs_before;
        signs_before = difference & SIGN_MASK;
        difference |= SIGN_MASK;
        difference = difference.wrapping_sub(left_vn & LSB_MASK);
        difference = difference.wrapping_sub(right_vp & LSB_MASK);
        signs_before ^= SIGN_MASK & !difference;
        difference &= !SIGN_MASK;
        difference |= signs_before;
        left_vn >>= 1;
        left_vp >>= 1;
        right_vn >>= 1;
        right_vp >>= 1;
        // left < right where the prefix sum difference went negative
        let negative = difference & SIGN_MASK;
        result_left_smaller |= negative >> (CHUNK_BITS - 1 - bit);
        // zero test: subtracting one only flips the sign bit of non-zero chunks
        let not_equal_to_zero = ((difference | SIGN_MASK).wrapping_sub(LSB_MASK)) & SIGN_MASK;
        result_right_smaller |= (not_equal_to_zero & !negative) >> (CHUNK_BITS - 1 - bit);
    }
    (result_left_smaller, result_right_smaller)
}

/// Cell-wise minimum of two slices covering the same column.
pub fn merge_two_slices(left: WordSlice, right: WordSlice) -> WordSlice {
    // O(log w), because prefix sums need log w chunks of log w bits
    let (mut left, mut right) = if left.score_before_start > right.score_before_start {
        (right, left)
    } else {
        (left, right)
    };
    debug_assert_eq!(left.vp & left.vn, ALL_ZEROS);
    debug_assert_eq!(right.vp & right.vn, ALL_ZEROS);
    let (left_smaller, right_smaller) = difference_masks(
        left.vp, left.vn, right.vp, right.vn, right.score_before_start - left.score_before_start
    );
    debug_assert_eq!(left_smaller & right_smaller, 0);
    let mask = (right_smaller | ((left_smaller | right_smaller).wrapping_sub(right_smaller << 1)))
        & !left_smaller;
    let left_reduction = left_smaller & (right_smaller << 1);
    let mut right_reduction = right_smaller & (left_smaller << 1);
    if (right_smaller & 1) != 0 && left.score_before_start < right.score_before_start {
        right_reduction |= 1;
    }
    debug_assert_eq!(left_reduction & right.vp, left_reduction);
    debug_assert_eq!(right_reduction & left.vp, right_reduction);
    debug_assert_eq!(left_reduction & left.vn, left_reduction);
    debug_assert_eq!(right_reduction & right.vn, right_reduction);
    left.vn &= !left_reduction;
    right.vn &= !right_reduction;
    let result = WordSlice {
        vp: (left.vp & !mask) | (right.vp & mask),
        vn: (left.vn & !mask) | (right.vn & mask),
        score_before_start: left.score_before_start.min(right.score_before_start),
        score_end: left.score_end.min(right.score_end),
    };
    debug_assert_eq!(result.vp & result.vn, 0);
    debug_assert_eq!(
        result.score_end,
        result.score_before_start + bitvector::popcount(result.vp) - bitvector::popcount(result.vn)
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Expands a slice into its w+1 explicit scores
    fn expand_scores(slice: &WordSlice) -> Vec<Score> {
        let mut scores = vec![slice.score_before_start];
        for i in 0..WORD_SIZE {
            let mask = 1u64 << i;
            let mut score = *scores.last().unwrap();
            if slice.vp & mask != 0 {
                score += 1;
            } else if slice.vn & mask != 0 {
                score -= 1;
            }
            scores.push(score);
        }
        scores
    }

    /// Bit-by-bit reference for `difference_masks`
    fn difference_masks_cell_by_cell(
        mut left_vp: u64, mut left_vn: u64, mut right_vp: u64, mut right_vn: u64, score_difference: Score
    ) -> (u64, u64) {
        let mut left_score = 0;
        let mut right_score = score_difference;
        let mut left_smaller = 0u64;
        let mut right_smaller = 0u64;
        for i in 0..WORD_SIZE {
            left_score += (left_vp & 1) as Score;
            left_score -= (left_vn & 1) as Score;
            right_score += (right_vp & 1) as Score;
            right_score -= (right_vn & 1) as Score;
            left_vp >>= 1;
            left_vn >>= 1;
            right_vp >>= 1;
            right_vn >>= 1;
            if left_score < right_score {
                left_smaller |= 1u64 << i;
            }
            if right_score < left_score {
                right_smaller |= 1u64 << i;
            }
        }
        (left_smaller, right_smaller)
    }

    /// Cell-by-cell reference for `merge_two_slices`
    fn merge_two_slices_cell_by_cell(left: WordSlice, right: WordSlice) -> WordSlice {
        let left_scores = expand_scores(&left);
        let right_scores = expand_scores(&right);
        let mut merged = WordSlice::default();
        merged.score_before_start = left.score_before_start.min(right.score_before_start);
        let mut previous = merged.score_before_start;
        for i in 0..WORD_SIZE {
            let better = left_scores[i + 1].min(right_scores[i + 1]);
            if better == previous + 1 {
                merged.vp |= 1u64 << i;
            } else if better == previous - 1 {
                merged.vn |= 1u64 << i;
            }
            assert!(better >= previous - 1);
            assert!(better <= previous + 1);
            previous = better;
        }
        merged.score_end = previous;
        merged
    }

    fn random_slice(rng: &mut StdRng, score_before_start: Score) -> WordSlice {
        let vp: u64 = rng.gen();
        let vn: u64 = rng.gen::<u64>() & !vp;
        WordSlice::new(
            vp, vn,
            score_before_start + bitvector::popcount(vp) - bitvector::popcount(vn),
            score_before_start
        )
    }

    #[test]
    fn test_source_slices() {
        let slice = source_slice_without_before(7);
        assert_eq!(slice.score_before_start, 7);
        assert_eq!(slice.score_end, 71);
        assert_eq!(expand_scores(&slice), (7..=71).collect::<Vec<Score>>());
        let slice = source_slice_from_score(3);
        assert_eq!(slice.score_before_start, 3);
        assert_eq!(slice.score_end, 67);
    }

    #[test]
    fn test_next_slice_against_scalar_dp() {
        // no upper neighbor: the advance must match the scalar recurrence with
        // a +1 horizontal input
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..1000 {
            let before = rng.gen_range(0..50);
            let prev = random_slice(&mut rng, before);
            let eq: u64 = rng.gen();
            let next = get_next_slice(eq, prev, false, false, WordSlice::default());
            let prev_scores = expand_scores(&prev);
            let mut expected = vec![prev_scores[0] + 1];
            for i in 0..WORD_SIZE {
                let diagonal = prev_scores[i] + Score::from(eq & (1u64 << i) == 0);
                let vertical = prev_scores[i + 1] + 1;
                let horizontal = expected[i] + 1;
                expected.push(diagonal.min(vertical).min(horizontal));
            }
            assert_eq!(expand_scores(&next), expected);
            assert_eq!(next.vp & next.vn, 0);
            assert!((next.score_end - next.score_before_start).abs() <= WORD_SIZE as Score);
        }
    }

    #[test]
    fn test_difference_masks_against_reference() {
        let mut rng = StdRng::seed_from_u64(0xbead);
        for _ in 0..100_000 {
            let left_vp: u64 = rng.gen();
            let left_vn: u64 = rng.gen::<u64>() & !left_vp;
            let right_vp: u64 = rng.gen();
            let right_vn: u64 = rng.gen::<u64>() & !right_vp;
            let diff: Score = rng.gen_range(0..40);
            let fast = difference_masks(left_vp, left_vn, right_vp, right_vn, diff);
            let reference = difference_masks_cell_by_cell(left_vp, left_vn, right_vp, right_vn, diff);
            assert_eq!(fast, reference);
            assert_eq!(fast.0 & fast.1, 0);
        }
    }

    #[test]
    fn test_difference_masks_extremes() {
        // dominant left fast path
        assert_eq!(difference_masks(0, 0, 0, 0, 1), (ALL_ONES, ALL_ZEROS));
        assert_eq!(
            difference_masks(ALL_ONES, 0, 0, ALL_ONES, 0),
            difference_masks_cell_by_cell(ALL_ONES, 0, 0, ALL_ONES, 0)
        );
        assert_eq!(difference_masks(0, 0, 0, 0, 0), (ALL_ZEROS, ALL_ZEROS));
    }

    #[test]
    fn test_merge_against_reference() {
        let mut rng = StdRng::seed_from_u64(0xfeed);
        for _ in 0..10_000 {
            let left_before = rng.gen_range(0..30);
            let left = random_slice(&mut rng, left_before);
            let right_before = rng.gen_range(0..30);
            let right = random_slice(&mut rng, right_before);
            let merged = merge_two_slices(left, right);
            let reference = merge_two_slices_cell_by_cell(left, right);
            assert_eq!(merged, reference);
            assert!(merged.score_end <= left.score_end.min(right.score_end));
            assert_eq!(merged.vp & merged.vn, 0);
        }
    }

    #[test]
    fn test_merge_idempotent() {
        let mut rng = StdRng::seed_from_u64(0xabcd);
        for _ in 0..1000 {
            let before = rng.gen_range(0..30);
            let slice = random_slice(&mut rng, before);
            assert_eq!(merge_two_slices(slice, slice), slice);
        }
    }

    #[test]
    fn test_merge_with_source() {
        let source = source_slice_without_before(0);
        let better = WordSlice::new(0, 0, 5, 5);
        let merged = merge_two_slices(source, better);
        assert_eq!(merged.score_before_start, 0);
        // the source dominates the flat slice for the first five positions
        let scores = expand_scores(&merged);
        assert_eq!(scores[..6], [0, 1, 2, 3, 4, 5]);
        assert!(scores[6..].iter().all(|&s| s == 5));
    }
}
