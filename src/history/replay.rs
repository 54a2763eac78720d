//! history::replay
//!
//! Rebuilding attributes from operations, merging streams and diffing.
//!
//! # Merge policy
//!
//! Streams are merged into one list ordered by
//! [`Operation::replay_order`] (date first) with duplicates dropped.
//! `Set`/`Unset` are last-write-wins per field; `Add`/`Remove` behave as
//! set union and difference, so the same operation applied twice changes
//! nothing and operations on disjoint elements commute.
//!
//! # Array fields
//!
//! `Add` and `Remove` need an array. An unset field declared as an array
//! counts as empty; any other target fails with
//! "can't apply Add to non-array field".

use chrono::{DateTime, Utc};
use tracing::trace;

use super::operations::{Operation, OperationKind};
use crate::core::value::{AttributeValue, Attributes};
use crate::errors::{Result, SoukaiError};
use crate::schema::{FieldDefinition, ModelSchema};

/// State rebuilt from a list of operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Replayed {
    pub attributes: Attributes,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Merge operation streams into replay order, dropping duplicates.
///
/// Of two duplicates, the one with a persisted url is kept.
pub fn merge_operations<'a, I>(streams: I) -> Vec<Operation>
where
    I: IntoIterator<Item = &'a [Operation]>,
{
    let mut merged: Vec<Operation> = streams
        .into_iter()
        .flat_map(|stream| stream.iter().cloned())
        .collect();
    merged.sort_by(|a, b| a.replay_order(b).then_with(|| b.url.is_some().cmp(&a.url.is_some())));
    merged.dedup_by(|later, earlier| later.same_effect(earlier));
    merged
}

/// Replay operations on an empty state.
pub fn replay(schema: &ModelSchema, operations: &[Operation]) -> Result<Replayed> {
    let mut state = Replayed::default();
    for operation in merge_operations([operations]) {
        apply_operation(schema, &mut state, &operation)?;
    }
    trace!(model = schema.name(), operations = operations.len(), "replayed history");
    Ok(state)
}

/// Apply one operation.
///
/// # Errors
///
/// - `Soukai` when adding to or removing from a non-array field, or when a
///   value does not cast to the field type
pub fn apply_operation(schema: &ModelSchema, state: &mut Replayed, operation: &Operation) -> Result<()> {
    match &operation.kind {
        OperationKind::Set { field, value } => {
            let value = match schema.field(field) {
                Some(definition) => definition.cast(value).map_err(|e| malformed(field, e))?,
                None => value.clone(),
            };
            state.attributes.insert(field.clone(), value);
        }
        OperationKind::Unset { field } => {
            state.attributes.remove(field);
        }
        OperationKind::Add { field, value } => {
            let definition = schema.field(field);
            let mut items = array_items(state, definition, field, "Add")?;
            for value in value.clone().into_items() {
                let value = cast_item(definition, &value).map_err(|e| malformed(field, e))?;
                if !items.iter().any(|item| same_item(definition, item, &value)) {
                    items.push(value);
                }
            }
            state.attributes.insert(field.clone(), AttributeValue::Array(items));
        }
        OperationKind::Remove { field, value } => {
            let definition = schema.field(field);
            let mut items = array_items(state, definition, field, "Remove")?;
            let targets = value.clone().into_items();
            items.retain(|item| !targets.iter().any(|target| same_item(definition, item, target)));
            if state.attributes.contains_key(field) || !items.is_empty() {
                state.attributes.insert(field.clone(), AttributeValue::Array(items));
            }
        }
        OperationKind::Delete => {
            state.deleted_at = Some(operation.date);
        }
    }
    Ok(())
}

fn array_items(
    state: &Replayed,
    definition: Option<&FieldDefinition>,
    field: &str,
    operation: &str,
) -> Result<Vec<AttributeValue>> {
    let declared_array = definition.map_or(false, FieldDefinition::is_array);
    match state.attributes.get(field) {
        Some(AttributeValue::Array(items)) => Ok(items.clone()),
        None if declared_array => Ok(Vec::new()),
        _ => Err(SoukaiError::soukai(format!(
            "can't apply {} to non-array field '{}'",
            operation, field
        ))),
    }
}

fn cast_item(
    definition: Option<&FieldDefinition>,
    value: &AttributeValue,
) -> std::result::Result<AttributeValue, String> {
    match definition {
        Some(definition) => definition.cast_item(value).map_err(|e| e.to_string()),
        None => Ok(value.clone()),
    }
}

/// Element equality after casting both sides.
fn same_item(definition: Option<&FieldDefinition>, a: &AttributeValue, b: &AttributeValue) -> bool {
    match (cast_item(definition, a), cast_item(definition, b)) {
        (Ok(a), Ok(b)) => a == b || a.to_json() == b.to_json(),
        _ => a.to_json() == b.to_json(),
    }
}

fn malformed(field: &str, message: impl ToString) -> SoukaiError {
    SoukaiError::soukai(format!(
        "malformed operation on '{}': {}",
        field,
        message.to_string()
    ))
}

/// Operations turning `original` into `current` (timestamps and the
/// primary key excluded).
pub fn diff_operations(
    schema: &ModelSchema,
    original: &Attributes,
    current: &Attributes,
    date: DateTime<Utc>,
) -> Vec<Operation> {
    let mut names: Vec<&String> = original.keys().chain(current.keys()).collect();
    names.sort();
    names.dedup();

    let mut operations = Vec::new();
    for name in names {
        if name == schema.primary_key() || schema.is_timestamp(name) {
            continue;
        }

        let is_array = schema.field(name).map_or(false, FieldDefinition::is_array);
        match (original.get(name), current.get(name)) {
            (None, Some(value)) => match value {
                AttributeValue::Array(items) if is_array && !items.is_empty() => {
                    operations.push(Operation::add(name.clone(), value.clone(), date));
                }
                _ => operations.push(Operation::set(name.clone(), value.clone(), date)),
            },
            (Some(_), None) => operations.push(Operation::unset(name.clone(), date)),
            (Some(before), Some(after)) if before != after => match (before, after) {
                (AttributeValue::Array(before), AttributeValue::Array(after)) if is_array => {
                    let added: Vec<AttributeValue> =
                        after.iter().filter(|item| !before.contains(*item)).cloned().collect();
                    let removed: Vec<AttributeValue> =
                        before.iter().filter(|item| !after.contains(*item)).cloned().collect();
                    if !added.is_empty() {
                        operations.push(Operation::add(name.clone(), added, date));
                    }
                    if !removed.is_empty() {
                        operations.push(Operation::remove(name.clone(), removed, date));
                    }
                }
                _ => operations.push(Operation::set(name.clone(), after.clone(), date)),
            },
            _ => {}
        }
    }
    operations
}

/// `Set` operations reproducing `attributes` from scratch.
pub fn initial_operations(schema: &ModelSchema, attributes: &Attributes, date: DateTime<Utc>) -> Vec<Operation> {
    attributes
        .iter()
        .filter(|(name, _)| name.as_str() != schema.primary_key() && !schema.is_timestamp(name))
        .map(|(name, value)| Operation::set(name.clone(), value.clone(), date))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes;
    use crate::core::types::now;
    use crate::schema::Timestamps;
    use chrono::Duration;

    fn schema() -> ModelSchema {
        ModelSchema::builder("Person")
            .rdf()
            .timestamps(Timestamps::none())
            .field("name", FieldDefinition::string())
            .field("age", FieldDefinition::number())
            .field("friendUrls", FieldDefinition::array(FieldDefinition::key()))
            .build()
            .unwrap()
    }

    fn dates(count: i64) -> Vec<DateTime<Utc>> {
        let start = now();
        (0..count).map(|i| start + Duration::seconds(i)).collect()
    }

    mod replaying {
        use super::*;

        #[test]
        fn griffith() {
            let d = dates(4);
            let operations = vec![
                Operation::set("name", "Griffith", d[0]),
                Operation::add("friendUrls", "a", d[1]),
                Operation::add("friendUrls", "b", d[2]),
                Operation::remove("friendUrls", "a", d[3]),
            ];

            let state = replay(&schema(), &operations).unwrap();
            assert_eq!(state.attributes.get("name"), Some(&"Griffith".into()));
            assert_eq!(
                state.attributes.get("friendUrls"),
                Some(&AttributeValue::Array(vec![AttributeValue::Key("b".into())]))
            );
        }

        #[test]
        fn add_to_non_array_fails() {
            let d = dates(2);
            let operations = vec![
                Operation::set("name", "Griffith", d[0]),
                Operation::add("name", "Guts", d[1]),
            ];
            let error = replay(&schema(), &operations).unwrap_err();
            assert!(error.to_string().contains("can't apply Add to non-array field"));

            let undeclared = vec![Operation::add("nicknames", "Hawk", d[0])];
            assert!(replay(&schema(), &undeclared).is_err());
        }

        #[test]
        fn remove_compares_cast_values() {
            let d = dates(2);
            let operations = vec![
                Operation::add("friendUrls", AttributeValue::Key("a".into()), d[0]),
                Operation::remove("friendUrls", "a", d[1]),
            ];
            let state = replay(&schema(), &operations).unwrap();
            assert_eq!(state.attributes.get("friendUrls"), Some(&AttributeValue::Array(vec![])));
        }

        #[test]
        fn set_and_unset_are_last_write_wins() {
            let d = dates(3);
            let operations = vec![
                Operation::set("age", 30, d[2]),
                Operation::set("age", "29", d[0]),
                Operation::unset("name", d[1]),
            ];
            let state = replay(&schema(), &operations).unwrap();
            assert_eq!(state.attributes, attributes! { "age" => 30 });
        }

        #[test]
        fn delete_marks_date() {
            let d = dates(2);
            let operations = vec![Operation::set("name", "Casca", d[0]), Operation::delete(d[1])];
            let state = replay(&schema(), &operations).unwrap();
            assert_eq!(state.deleted_at, Some(d[1]));
            assert!(state.attributes.contains_key("name"));
        }
    }

    mod merging {
        use super::*;

        #[test]
        fn interleaves_by_date_and_drops_duplicates() {
            let d = dates(4);
            let local = vec![
                Operation::set("name", "Griffith", d[0]),
                Operation::add("friendUrls", "a", d[2]),
            ];
            let remote = vec![
                Operation::set("name", "Griffith", d[0]),
                Operation::set("name", "Femto", d[3]),
                Operation::add("friendUrls", "b", d[1]),
            ];

            let merged = merge_operations([local.as_slice(), remote.as_slice()]);
            assert_eq!(merged.len(), 4);
            assert!(merged.windows(2).all(|pair| pair[0].date <= pair[1].date));

            let state = replay(&schema(), &merged).unwrap();
            assert_eq!(state.attributes.get("name"), Some(&"Femto".into()));
            assert_eq!(state.attributes.get("friendUrls").map(|v| v.keys()), Some(vec!["b", "a"]));
        }
    }

    mod diffing {
        use super::*;

        #[test]
        fn produces_minimal_operations() {
            let date = now();
            let original = attributes! { "name" => "Alice", "age" => 30, "friendUrls" => vec![AttributeValue::Key("a".into())] };
            let current = attributes! { "name" => "Alicia", "friendUrls" => vec![AttributeValue::Key("b".into())] };

            let operations = diff_operations(&schema(), &original, &current, date);
            assert_eq!(
                operations,
                vec![
                    Operation::unset("age", date),
                    Operation::add("friendUrls", vec![AttributeValue::Key("b".into())], date),
                    Operation::remove("friendUrls", vec![AttributeValue::Key("a".into())], date),
                    Operation::set("name", "Alicia", date),
                ]
            );

            let mut replayed = replay(&schema(), &initial_operations(&schema(), &original, date - Duration::seconds(1))).unwrap();
            for operation in &operations {
                apply_operation(&schema(), &mut replayed, operation).unwrap();
            }
            assert_eq!(replayed.attributes, current);
        }
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn operation() -> impl Strategy<Value = (u8, String, i64)> {
            (0u8..4, "[a-c]", 0i64..5)
        }

        proptest! {
            #[test]
            fn applying_an_operation_twice_changes_nothing(ops in proptest::collection::vec(operation(), 0..12)) {
                let start = now();
                let operations: Vec<Operation> = ops
                    .into_iter()
                    .map(|(kind, value, offset)| {
                        let date = start + Duration::seconds(offset);
                        match kind {
                            0 => Operation::set("name", value, date),
                            1 => Operation::unset("name", date),
                            2 => Operation::add("friendUrls", AttributeValue::Key(value), date),
                            _ => Operation::remove("friendUrls", AttributeValue::Key(value), date),
                        }
                    })
                    .collect();

                let mut state = Replayed::default();
                for operation in merge_operations([operations.as_slice()]) {
                    apply_operation(&schema(), &mut state, &operation).unwrap();
                    let once = state.clone();
                    apply_operation(&schema(), &mut state, &operation).unwrap();
                    prop_assert_eq!(&state, &once);
                }

                let doubled: Vec<Operation> = operations.iter().chain(operations.iter()).cloned().collect();
                prop_assert_eq!(replay(&schema(), &doubled).unwrap(), state);
            }
        }
    }
}
