//! State differencing

use crate::fields::{ChangeSet, FieldChange, Fields};

/// Compare actual fields against desired fields.
///
/// Returns `None` only when the resource exists and every declared desired
/// field is satisfied. A missing actual yields a change set listing every
/// declared desired field (possibly empty, which still means "create").
pub fn diff(actual: Option<&Fields>, desired: &Fields) -> Option<ChangeSet> {
    let mut changes = ChangeSet::default();

    for field in desired.iter() {
        let Some(want) = &field.value else {
            continue;
        };
        let have = actual.and_then(|a| a.value(field.name));
        let satisfied = have.is_some_and(|have| field.equality.satisfied(have, want));
        if !satisfied {
            changes.push(FieldChange {
                field: field.name,
                actual: have.cloned(),
                desired: want.clone(),
            });
        }
    }

    if actual.is_some() && changes.is_empty() {
        None
    } else {
        Some(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::FieldValue;
    use std::collections::BTreeMap;

    fn name_tag(value: &str) -> BTreeMap<String, String> {
        BTreeMap::from([("Name".to_string(), value.to_string())])
    }

    #[test]
    fn test_missing_actual_lists_declared_fields() {
        let desired = Fields::new()
            .text("cidr", Some("10.0.0.0/16"))
            .bool("enable_dns_hostnames", None)
            .tags("tags", &name_tag("vpc1"));

        let changes = diff(None, &desired).unwrap();
        assert_eq!(changes.fields().collect::<Vec<_>>(), vec!["cidr", "tags"]);
        assert_eq!(changes.get("cidr").unwrap().actual, None);
    }

    #[test]
    fn test_missing_actual_without_fields_still_changes() {
        let changes = diff(None, &Fields::new()).unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn test_matching_actual_has_no_changes() {
        let desired = Fields::new()
            .text("cidr", Some("10.0.0.0/16"))
            .tags("tags", &name_tag("vpc1"));
        let mut actual_tags = name_tag("vpc1");
        actual_tags.insert("extra".to_string(), "1".to_string());
        let actual = Fields::new()
            .text("cidr", Some("10.0.0.0/16"))
            .bool("enable_dns_support", Some(true))
            .tags("tags", &actual_tags);

        assert_eq!(diff(Some(&actual), &desired), None);
    }

    #[test]
    fn test_unset_desired_field_is_ignored() {
        let desired = Fields::new().bool("enable_dns_support", None);
        let actual = Fields::new().bool("enable_dns_support", Some(false));
        assert_eq!(diff(Some(&actual), &desired), None);
    }

    #[test]
    fn test_reference_change_records_both_sides() {
        let desired = Fields::new().reference("vpc", Some("vpc-2".to_string()));
        let actual = Fields::new().reference("vpc", None);

        let changes = diff(Some(&actual), &desired).unwrap();
        let change = changes.get("vpc").unwrap();
        assert_eq!(change.actual, Some(FieldValue::Ref(None)));
        assert_eq!(change.desired, FieldValue::Ref(Some("vpc-2".to_string())));
    }
}
