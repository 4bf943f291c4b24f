//! Splits a subject list into bounded query groups.

use itertools::Itertools;

/// Lazily split `subjects` into contiguous groups of at most `max_group` items.
///
/// Groups preserve input order and together cover the input exactly once.
///
/// # Panics
///
/// Panics if `max_group` is 0; that is a caller bug, not a runtime condition.
pub fn partition<T>(subjects: &[T], max_group: usize) -> impl Iterator<Item = &[T]> {
    assert!(max_group > 0, "query group size must be positive");
    subjects.chunks(max_group)
}

/// Render a group as a boolean-OR query, e.g. `AAPL OR MSFT OR NVDA`.
pub fn or_query<S: AsRef<str>>(group: &[S]) -> String {
    group.iter().map(|s| s.as_ref().trim()).join(" OR ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_partition_keeps_order() {
        let subjects = ["A", "B", "C", "D", "E"];
        let groups: Vec<&[&str]> = partition(&subjects, 2).collect();
        assert_eq!(groups, vec![&["A", "B"][..], &["C", "D"][..], &["E"][..]]);
    }

    #[test]
    fn test_partition_empty_input_yields_nothing() {
        let subjects: [&str; 0] = [];
        assert_eq!(partition(&subjects, 3).count(), 0);
    }

    #[test]
    #[should_panic(expected = "group size must be positive")]
    fn test_partition_rejects_zero() {
        let _ = partition(&["A"], 0);
    }

    #[test]
    fn test_or_query() {
        assert_eq!(or_query(&["AAPL", " MSFT ", "NVDA"]), "AAPL OR MSFT OR NVDA");
        assert_eq!(or_query(&["TSLA"]), "TSLA");
    }

    proptest! {
        #[test]
        fn groups_cover_input_exactly_once(
            subjects in proptest::collection::vec("[A-Z]{1,5}", 0..200),
            size in 1usize..40,
        ) {
            let groups: Vec<&[String]> = partition(&subjects, size).collect();

            prop_assert_eq!(groups.len(), subjects.len().div_ceil(size));
            prop_assert!(groups.iter().all(|g| !g.is_empty() && g.len() <= size));

            let rejoined: Vec<String> = groups.concat();
            prop_assert_eq!(rejoined, subjects);
        }
    }
}
