//! Signature locator: finds the single unambiguous occurrence of a byte pattern.
//!
//! A signature is only useful if it pins down exactly one site. The scan
//! therefore counts every match instead of stopping at the first one, and
//! reports more than one match as [`Location::Ambiguous`]. Overlapping
//! occurrences are counted independently: `AA` occurs twice in `AAA`.

use memchr::memchr_iter;
use std::fmt;

/// Outcome of scanning a buffer for a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "a Location must be checked before patching"]
pub enum Location {
    /// Exactly one match, starting at this offset
    Unique(usize),
    /// No match (also returned for an empty pattern)
    NotFound,
    /// Two or more matches; `first` and `second` are the lowest offsets
    Ambiguous {
        count: usize,
        first: usize,
        second: usize,
    },
}

impl Location {
    /// Offset of the unique match, if there is one.
    pub fn offset(&self) -> Option<usize> {
        match self {
            Location::Unique(offset) => Some(*offset),
            _ => None,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Unique(offset) => write!(f, "unique match at {offset:#x}"),
            Location::NotFound => write!(f, "no match"),
            Location::Ambiguous {
                count,
                first,
                second,
            } => write!(
                f,
                "{count} matches (first at {first:#x}, second at {second:#x})"
            ),
        }
    }
}

/// Iterate over every offset where `pattern` fully matches `buffer`.
///
/// Candidates are the positions of `pattern[0]`; each is then compared
/// against the whole pattern. Candidates too close to the end of the buffer
/// to hold the full pattern never match.
pub fn match_offsets<'a>(buffer: &'a [u8], pattern: &'a [u8]) -> impl Iterator<Item = usize> + 'a {
    let first = pattern.first().copied();
    let candidates = first
        .map(|b| memchr_iter(b, buffer))
        .into_iter()
        .flatten();

    candidates.filter(move |&offset| {
        buffer
            .get(offset..offset + pattern.len())
            .is_some_and(|window| window == pattern)
    })
}

/// Locate the unique occurrence of `pattern` in `buffer`.
pub fn locate(buffer: &[u8], pattern: &[u8]) -> Location {
    if pattern.is_empty() || pattern.len() > buffer.len() {
        return Location::NotFound;
    }

    let mut matches = match_offsets(buffer, pattern);
    let Some(first) = matches.next() else {
        return Location::NotFound;
    };
    let Some(second) = matches.next() else {
        return Location::Unique(first);
    };

    Location::Ambiguous {
        count: 2 + matches.count(),
        first,
        second,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_unique_match() {
        let mut buffer = vec![0u8; 20];
        buffer[10..14].copy_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(
            locate(&buffer, &[0xde, 0xad, 0xbe, 0xef]),
            Location::Unique(10)
        );
    }

    #[test]
    fn test_not_found() {
        let buffer = b"hello world";
        assert_eq!(locate(buffer, b"xyz"), Location::NotFound);
    }

    #[test]
    fn test_partial_prefix_is_not_a_match() {
        // first byte matches repeatedly but the full pattern never does
        let buffer = [0xde, 0xad, 0x00, 0xde, 0xad, 0xbe];
        assert_eq!(locate(&buffer, &[0xde, 0xad, 0xbe, 0xef]), Location::NotFound);
    }

    #[test]
    fn test_candidate_at_buffer_end_does_not_panic() {
        let buffer = [0x00, 0x00, 0xaa];
        assert_eq!(locate(&buffer, &[0xaa, 0xbb]), Location::NotFound);
    }

    #[test]
    fn test_pattern_longer_than_buffer() {
        assert_eq!(locate(&[0xaa], &[0xaa, 0xbb]), Location::NotFound);
    }

    #[test]
    fn test_empty_pattern_is_not_found() {
        assert_eq!(locate(b"abc", b""), Location::NotFound);
    }

    #[test]
    fn test_empty_buffer() {
        assert_eq!(locate(b"", b"a"), Location::NotFound);
    }

    #[test]
    fn test_two_separate_matches_are_ambiguous() {
        let mut buffer = vec![0u8; 12];
        buffer[3] = 0xaa;
        buffer[7] = 0xaa;
        assert_eq!(
            locate(&buffer, &[0xaa]),
            Location::Ambiguous {
                count: 2,
                first: 3,
                second: 7
            }
        );
    }

    #[test]
    fn test_overlapping_matches_count_independently() {
        assert_eq!(
            locate(&[0xaa, 0xaa, 0xaa], &[0xaa, 0xaa]),
            Location::Ambiguous {
                count: 2,
                first: 0,
                second: 1
            }
        );
    }

    #[test]
    fn test_ambiguous_counts_all_matches() {
        let buffer = b"abXabXabXab";
        match locate(buffer, b"ab") {
            Location::Ambiguous { count, .. } => assert_eq!(count, 4),
            other => panic!("expected ambiguous, got {other:?}"),
        }
    }

    #[test]
    fn test_match_at_start_and_end() {
        assert_eq!(locate(b"abcdef", b"ab"), Location::Unique(0));
        assert_eq!(locate(b"abcdef", b"ef"), Location::Unique(4));
        assert_eq!(locate(b"abcdef", b"abcdef"), Location::Unique(0));
    }

    #[test]
    fn test_location_offset_and_display() {
        assert_eq!(Location::Unique(16).offset(), Some(16));
        assert_eq!(Location::NotFound.offset(), None);
        assert_eq!(Location::Unique(16).to_string(), "unique match at 0x10");
        assert!(Location::Ambiguous {
            count: 3,
            first: 1,
            second: 2
        }
        .to_string()
        .starts_with("3 matches"));
    }

    fn naive_offsets(buffer: &[u8], pattern: &[u8]) -> Vec<usize> {
        if pattern.is_empty() || pattern.len() > buffer.len() {
            return Vec::new();
        }
        (0..=buffer.len() - pattern.len())
            .filter(|&o| &buffer[o..o + pattern.len()] == pattern)
            .collect()
    }

    proptest! {
        #[test]
        fn prop_locate_agrees_with_naive_scan(
            buffer in proptest::collection::vec(0u8..4, 0..96),
            pattern in proptest::collection::vec(0u8..4, 1..4),
        ) {
            let expected = naive_offsets(&buffer, &pattern);
            let actual = locate(&buffer, &pattern);
            match expected.as_slice() {
                [] => prop_assert_eq!(actual, Location::NotFound),
                [only] => prop_assert_eq!(actual, Location::Unique(*only)),
                [first, second, ..] => prop_assert_eq!(
                    actual,
                    Location::Ambiguous { count: expected.len(), first: *first, second: *second }
                ),
            }
        }

        #[test]
        fn prop_planted_unique_pattern_is_found(
            prefix in proptest::collection::vec(0u8..0x80, 0..64),
            suffix in proptest::collection::vec(0u8..0x80, 0..64),
            pattern in proptest::collection::vec(0x80u8..=0xff, 1..8),
        ) {
            // pattern bytes never occur in prefix/suffix, so the plant is unique
            let mut buffer = prefix.clone();
            buffer.extend_from_slice(&pattern);
            buffer.extend_from_slice(&suffix);
            prop_assert_eq!(locate(&buffer, &pattern), Location::Unique(prefix.len()));
        }
    }
}
