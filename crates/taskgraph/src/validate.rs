//! Change validation
//!
//! Runs after [`diff`](crate::diff::diff) and before anything is rendered.
//! A rejected change set stops the task: nothing is applied.

use crate::error::TaskError;
use crate::fields::ChangeSet;
use crate::task::Resource;

/// Validate a change set against an existing resource.
///
/// Creation (no actual) is always allowed. Otherwise the first changed field
/// that the resource declares immutable is reported, then the resource's own
/// [`check_changes`](Resource::check_changes) hook runs.
pub fn validate<C, R>(actual: Option<&R>, desired: &R, changes: &ChangeSet) -> Result<(), TaskError>
where
    C: ?Sized + Send + Sync,
    R: Resource<C>,
{
    let Some(actual) = actual else {
        return Ok(());
    };

    let immutable = desired.immutable_fields();
    if let Some(field) = changes.fields().find(|f| immutable.contains(f)) {
        return Err(TaskError::ImmutableField {
            field: field.to_string(),
        });
    }

    desired.check_changes(actual, changes)
}
