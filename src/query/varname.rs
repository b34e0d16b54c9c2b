//! Short variable labels for upsert condition blocks.
//!
//! Labels are the bijective base-4 numeral of the ordinal over `a..=d`, so
//! every ordinal has exactly one label and `"a"` is never a dead leading
//! digit: `0..=3` → `a..=d`, `4` → `aa`, `19` → `dd`, `20` → `aaa`.

const ALPHABET: [char; 4] = ['a', 'b', 'c', 'd'];

/// Label for ordinal `n`.
///
/// Equivalent to `label(n / 4 - 1) + label(n % 4)` for `n >= 4`, unrolled
/// from the least significant digit.
pub fn label(n: u64) -> String {
    let mut digits = Vec::new();
    let mut n = n;
    loop {
        digits.push(ALPHABET[(n % 4) as usize]);
        if n < 4 {
            break;
        }
        n = n / 4 - 1;
    }
    digits.iter().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn recursive(n: u64) -> String {
        if n < 4 {
            ALPHABET[n as usize].to_string()
        } else {
            format!("{}{}", recursive(n / 4 - 1), recursive(n % 4))
        }
    }

    #[test]
    fn single_letters() {
        assert_eq!(label(0), "a");
        assert_eq!(label(1), "b");
        assert_eq!(label(2), "c");
        assert_eq!(label(3), "d");
    }

    #[test]
    fn length_boundaries() {
        assert_eq!(label(4), "aa");
        assert_eq!(label(5), "ab");
        assert_eq!(label(19), "dd");
        assert_eq!(label(20), "aaa");
        assert_eq!(label(83), "ddd");
        assert_eq!(label(84), "aaaa");
        assert_eq!(label(339), "dddd");
        assert_eq!(label(340), "aaaaa");
    }

    #[test]
    fn matches_recursive_definition() {
        for n in 0..2_000 {
            assert_eq!(label(n), recursive(n), "mismatch at {n}");
        }
    }

    #[test]
    fn injective() {
        let mut seen = HashSet::new();
        for n in 0..10_000 {
            assert!(seen.insert(label(n)), "duplicate label for {n}");
        }
    }

    #[test]
    fn length_follows_digit_count() {
        // Lengths grow at 4, 20, 84, 340, ... (sum of 4^k).
        let mut boundary = 4u64;
        let mut width = 1usize;
        let mut prev_len = 0;
        for n in 0..1_400 {
            if n == boundary {
                width += 1;
                boundary = boundary * 4 + 4;
            }
            let len = label(n).len();
            assert_eq!(len, width, "wrong length at {n}");
            assert!(len >= prev_len);
            prev_len = len;
        }
    }

    #[test]
    fn large_ordinals_do_not_overflow() {
        let l = label(u64::MAX);
        assert!(l.chars().all(|c| ALPHABET.contains(&c)));
        assert_ne!(l, label(u64::MAX - 1));
    }
}
