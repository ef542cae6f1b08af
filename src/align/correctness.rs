
use num_bigint::BigInt;
use num_rational::BigRational;

use crate::align::bitvector::WORD_SIZE;
use crate::align::word_slice::Score;

fn ratio(numerator: i64, denominator: i64) -> BigRational {
    BigRational::new(BigInt::from(numerator), BigInt::from(denominator))
}

fn factorial(n: usize) -> BigInt {
    let mut result = BigInt::from(1);
    for i in 2..=n {
        result *= BigInt::from(i);
    }
    result
}

fn choose(n: usize, k: usize) -> BigInt {
    debug_assert!(k <= n);
    factorial(n) / factorial(k) / factorial(n - k)
}

fn power(base: &BigRational, exponent: usize) -> BigRational {
    if exponent == 0 {
        return ratio(1, 1);
    }
    if exponent == 1 {
        return base.clone();
    }
    let part = power(base, exponent / 2);
    if exponent % 2 == 0 {
        &part * &part
    } else {
        &part * &part * base
    }
}

/// Viterbi over a two-state HMM (correct / incorrect) on the per-row score
/// deltas. Emissions are Binomial(w, rate) with a 15% mismatch rate in the
/// correct state (long-read error rate) and 50% in the incorrect state
/// (empirical); both transitions are 1% and the prior is 30% correct. All
/// arithmetic is big-rational and renormalized every step so long reads
/// cannot underflow. Returns one flag per row, true where the alignment is
/// estimated correct.
pub fn estimate_correct_alignment_viterbi(scores: &[Score]) -> Vec<bool> {
    if scores.len() < 2 {
        return Vec::new();
    }
    let correct_mismatch_probability = ratio(15, 100);
    let false_mismatch_probability = ratio(50, 100);
    let false_to_correct_transition = ratio(1, 100);
    let correct_to_false_transition = ratio(1, 100);
    let one = ratio(1, 1);
    let mut correct_probability = ratio(30, 100);
    let mut false_probability = ratio(70, 100);
    let mut correct_from_correct_backtrace = Vec::with_capacity(scores.len() - 1);
    let mut false_from_correct_backtrace = Vec::with_capacity(scores.len() - 1);
    for i in 1..scores.len() {
        debug_assert!(scores[i] >= scores[i - 1]);
        let score_difference =
            ((scores[i] - scores[i - 1]).max(0) as usize).min(WORD_SIZE);
        // backpointers are taken from the transition comparison alone, before
        // the emission multipliers are applied
        correct_from_correct_backtrace.push(
            &correct_probability * (&one - &correct_to_false_transition)
                >= &false_probability * &false_to_correct_transition,
        );
        false_from_correct_backtrace.push(
            &correct_probability * &correct_to_false_transition
                >= &false_probability * (&one - &false_to_correct_transition),
        );
        let new_correct_probability = std::cmp::max(
            &correct_probability * (&one - &correct_to_false_transition),
            &false_probability * &false_to_correct_transition,
        );
        let new_false_probability = std::cmp::max(
            &correct_probability * &correct_to_false_transition,
            &false_probability * (&one - &false_to_correct_transition),
        );
        let choose_result = BigRational::from(choose(WORD_SIZE, score_difference));
        let correct_multiplier = &choose_result
            * power(&correct_mismatch_probability, score_difference)
            * power(&(&one - &correct_mismatch_probability), WORD_SIZE - score_difference);
        let false_multiplier = &choose_result
            * power(&false_mismatch_probability, score_difference)
            * power(&(&one - &false_mismatch_probability), WORD_SIZE - score_difference);
        correct_probability = new_correct_probability * correct_multiplier;
        false_probability = new_false_probability * false_multiplier;
        let normalizer = &correct_probability + &false_probability;
        correct_probability /= normalizer.clone();
        false_probability /= normalizer;
    }
    debug_assert_eq!(correct_from_correct_backtrace.len(), scores.len() - 1);
    debug_assert_eq!(false_from_correct_backtrace.len(), scores.len() - 1);
    let mut currently_correct = correct_probability > false_probability;
    let mut result = vec![false; scores.len() - 1];
    for i in (0..scores.len() - 1).rev() {
        result[i] = currently_correct;
        currently_correct = if currently_correct {
            correct_from_correct_backtrace[i]
        } else {
            false_from_correct_backtrace[i]
        };
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_choose_and_power() {
        assert_eq!(choose(64, 0), BigInt::from(1));
        assert_eq!(choose(64, 1), BigInt::from(64));
        assert_eq!(choose(5, 2), BigInt::from(10));
        assert_eq!(power(&ratio(1, 2), 3), ratio(1, 8));
        assert_eq!(power(&ratio(3, 4), 0), ratio(1, 1));
    }

    #[test]
    fn test_clean_alignment_is_correct() {
        // no score growth over twenty rows
        let scores: Vec<Score> = vec![0; 21];
        let flags = estimate_correct_alignment_viterbi(&scores);
        assert_eq!(flags.len(), 20);
        assert!(flags.iter().all(|&f| f));
    }

    #[test]
    fn test_garbage_alignment_is_incorrect() {
        // half the word mismatches every row
        let scores: Vec<Score> = (0..21).map(|i| i * 32).collect();
        let flags = estimate_correct_alignment_viterbi(&scores);
        assert_eq!(flags.len(), 20);
        assert!(flags.iter().all(|&f| !f));
    }

    #[test]
    fn test_mixed_alignment_splits() {
        // ten clean rows, ten garbage rows, ten clean rows
        let mut scores: Vec<Score> = vec![0; 11];
        for i in 0..10 {
            scores.push(scores.last().unwrap() + 32 * (i % 2));
        }
        let last = *scores.last().unwrap();
        for _ in 0..10 {
            scores.push(last);
        }
        let flags = estimate_correct_alignment_viterbi(&scores);
        assert_eq!(flags.len(), 30);
        assert!(flags[..10].iter().all(|&f| f));
        assert!(flags[20..].iter().all(|&f| f));
        assert!(!flags[10..20].iter().all(|&f| f));
    }

    #[test]
    fn test_short_inputs() {
        assert!(estimate_correct_alignment_viterbi(&[]).is_empty());
        assert!(estimate_correct_alignment_viterbi(&[0]).is_empty());
        let flags = estimate_correct_alignment_viterbi(&[0, 0]);
        assert_eq!(flags, vec![true]);
    }
}
