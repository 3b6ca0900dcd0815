//! Event identifier resolution.
//!
//! An identifier is either a bare event name (`Transfer`) or a signature
//! (`Transfer(address,address,uint256)` or the annotated
//! `Transfer(address indexed from, address indexed to, uint256 value)`).
//!
//! Bare names resolve to the *first* descriptor with that name in declaration
//! order, so with overloaded events the earliest declaration wins. Use a
//! signature to pick a specific overload.

use crate::descriptor::EventDescriptor;
use crate::error::EventError;

/// Find the descriptor `identifier` refers to.
pub fn resolve<'a>(
    descriptors: &'a [EventDescriptor],
    identifier: &str,
) -> Result<&'a EventDescriptor, EventError> {
    let identifier = identifier.trim();
    let not_found = || EventError::NotFound {
        identifier: identifier.to_string(),
    };

    if !identifier.contains('(') {
        return descriptors
            .iter()
            .find(|d| d.name == identifier)
            .ok_or_else(not_found);
    }

    let wanted = EventDescriptor::parse(identifier)?;
    // Only compare indexed flags when the caller spelled them out.
    let check_indexed = wanted.parameters.iter().any(|p| p.indexed);

    descriptors
        .iter()
        .find(|d| structurally_equal(d, &wanted, check_indexed))
        .ok_or_else(not_found)
}

/// An `anonymous` suffix on the identifier only matches anonymous events;
/// without it either kind matches.
fn structurally_equal(d: &EventDescriptor, wanted: &EventDescriptor, check_indexed: bool) -> bool {
    d.name == wanted.name
        && (!wanted.anonymous || d.anonymous)
        && d.parameters.len() == wanted.parameters.len()
        && d
            .parameters
            .iter()
            .zip(&wanted.parameters)
            .all(|(a, b)| a.ty == b.ty && (!check_indexed || a.indexed == b.indexed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Parameter;

    fn descriptors() -> Vec<EventDescriptor> {
        vec![
            EventDescriptor::new(
                "Transfer",
                vec![
                    Parameter::new("from", "address", true),
                    Parameter::new("to", "address", true),
                    Parameter::new("value", "uint256", false),
                ],
            ),
            EventDescriptor::new(
                "Transfer",
                vec![
                    Parameter::new("from", "address", true),
                    Parameter::new("to", "address", true),
                    Parameter::new("value", "uint256", false),
                    Parameter::new("memo", "bytes", false),
                ],
            ),
            EventDescriptor::new(
                "Approval",
                vec![
                    Parameter::new("owner", "address", true),
                    Parameter::new("spender", "address", true),
                    Parameter::new("value", "uint256", false),
                ],
            ),
        ]
    }

    #[test]
    fn bare_name_takes_first_declaration() {
        let ds = descriptors();
        let d = resolve(&ds, "Transfer").unwrap();
        assert!(std::ptr::eq(d, &ds[0]));
        assert!(std::ptr::eq(resolve(&ds, "Approval").unwrap(), &ds[2]));
    }

    #[test]
    fn signature_selects_overload() {
        let ds = descriptors();
        let d = resolve(&ds, "Transfer(address,address,uint256,bytes)").unwrap();
        assert!(std::ptr::eq(d, &ds[1]));
    }

    #[test]
    fn annotated_and_type_only_forms_agree() {
        let ds = descriptors();
        let annotated =
            resolve(&ds, "Transfer(address indexed from, address indexed to, uint256 value)").unwrap();
        let type_only = resolve(&ds, "Transfer(address,address,uint256)").unwrap();
        assert!(std::ptr::eq(annotated, type_only));
    }

    #[test]
    fn names_are_ignored_but_indexed_flags_are_checked_when_given() {
        let ds = descriptors();
        assert!(resolve(&ds, "Transfer(address indexed a, address indexed b, uint256 c)").is_ok());
        assert!(matches!(
            resolve(&ds, "Transfer(address indexed from, address to, uint256 value)"),
            Err(EventError::NotFound { .. })
        ));
    }

    #[test]
    fn type_aliases_are_canonicalized() {
        let ds = descriptors();
        assert!(std::ptr::eq(resolve(&ds, "Transfer(address,address,uint)").unwrap(), &ds[0]));
    }

    #[test]
    fn anonymous_suffix_only_matches_anonymous_events() {
        let mut ds = descriptors();
        assert!(matches!(
            resolve(&ds, "Approval(address,address,uint256) anonymous"),
            Err(EventError::NotFound { .. })
        ));

        ds.push(
            EventDescriptor::new("Approval", ds[2].parameters.clone()).with_anonymous(true),
        );
        let d = resolve(&ds, "Approval(address,address,uint256) anonymous").unwrap();
        assert!(std::ptr::eq(d, &ds[3]));
        // Without the suffix the earlier, non-anonymous declaration still wins.
        assert!(std::ptr::eq(resolve(&ds, "Approval(address,address,uint256)").unwrap(), &ds[2]));
    }

    #[test]
    fn unknown_identifiers() {
        let ds = descriptors();
        assert_eq!(
            resolve(&ds, "Mint").unwrap_err(),
            EventError::NotFound { identifier: "Mint".into() }
        );
        assert!(matches!(
            resolve(&ds, "Transfer(address,uint256)"),
            Err(EventError::NotFound { .. })
        ));
        assert!(matches!(
            resolve(&ds, "Transfer(address,"),
            Err(EventError::InvalidSignature { .. })
        ));
        assert!(resolve(&[], "Transfer").is_err());
    }
}
