//! Relative reference decoding.

/// Decode a `"Type/id"`-style relative reference into its bare identifier.
///
/// Returns the substring after the first `/`. The prefix is not validated;
/// a reference without a `/` yields `None` and the owning record is expected
/// to fail its inclusion check downstream.
pub fn local_id(reference: &str) -> Option<&str> {
    reference.split_once('/').map(|(_, id)| id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_relative_reference() {
        assert_eq!(local_id("Patient/P1"), Some("P1"));
        assert_eq!(local_id("Organization/F1"), Some("F1"));
    }

    #[test]
    fn keeps_everything_after_first_slash() {
        assert_eq!(local_id("Encounter/E1/extra"), Some("E1/extra"));
    }

    #[test]
    fn malformed_reference_yields_none() {
        assert_eq!(local_id("no-slash"), None);
        assert_eq!(local_id(""), None);
    }

    #[test]
    fn empty_id_is_preserved() {
        assert_eq!(local_id("Patient/"), Some(""));
    }
}
