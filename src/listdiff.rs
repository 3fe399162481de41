// Copyright 2025 Oxide Computer Company

/// Order-insensitive diff of two scalar lists, such as an object's `required`
/// field names or a string type's `enum` values.
///
/// Elements are compared by equality only; enum values in particular may be
/// floating point, so no ordering or hashing is assumed. An absent list is
/// treated as empty.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ListDiff<T> {
    /// Elements present in the right list but not the left.
    pub increased: Vec<T>,
    /// Elements present in the left list but not the right.
    pub missing: Vec<T>,
}

impl<T> ListDiff<T>
where
    T: Clone + PartialEq,
{
    pub fn diff(left: Option<&[T]>, right: Option<&[T]>) -> Self {
        let left = left.unwrap_or_default();
        let right = right.unwrap_or_default();

        Self {
            increased: right
                .iter()
                .filter(|item| !left.contains(item))
                .cloned()
                .collect(),
            missing: left
                .iter()
                .filter(|item| !right.contains(item))
                .cloned()
                .collect(),
        }
    }

    pub fn is_unchanged(&self) -> bool {
        self.increased.is_empty() && self.missing.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use crate::listdiff::ListDiff;

    #[test]
    fn test_diff() {
        let left = ["a".to_string(), "b".to_string()];
        let right = ["b".to_string(), "c".to_string()];

        let diff = ListDiff::diff(Some(&left), Some(&right));
        assert_eq!(diff.increased, ["c"]);
        assert_eq!(diff.missing, ["a"]);
        assert!(!diff.is_unchanged());
    }

    #[test]
    fn test_absent_is_empty() {
        let values = [1, 2];

        let diff = ListDiff::<i32>::diff(None, None);
        assert!(diff.is_unchanged());

        let diff = ListDiff::diff(None, Some(&values));
        assert_eq!(diff.increased, [1, 2]);
        assert!(diff.missing.is_empty());

        let diff = ListDiff::diff(Some(&values), None);
        assert_eq!(diff.missing, [1, 2]);
    }

    #[test]
    fn test_order_insensitive() {
        let left = [1, 2, 3];
        let right = [3, 2, 1];
        assert!(ListDiff::diff(Some(&left), Some(&right)).is_unchanged());
    }
}
