//! history::rdf
//!
//! Operations and metadata as RDF resources.
//!
//! Each operation is a resource `{document}#operation-{uuid}` typed with
//! its CRDT class, pointing at the tracked resource with `crdt:resource`
//! and dated with `crdt:date`. Field operations name the field's RDF
//! property with `crdt:property` and carry their value(s) in `crdt:value`,
//! encoded like model attributes. Metadata lives at `{resource}-metadata`.

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use super::operations::{Operation, OperationKind};
use crate::core::types::{format_date, parse_date, Url};
use crate::core::value::AttributeValue;
use crate::errors::{Result, SoukaiError};
use crate::rdf::jsonld::metadata_url;
use crate::rdf::mapper::{decode_property, Encoder};
use crate::rdf::term::{objects, subjects_of_type, types_of, Literal, Quad, Term};
use crate::rdf::vocab;
use crate::schema::ModelSchema;

const OPERATION_CLASSES: [&str; 5] = [
    vocab::CRDT_SET_OPERATION,
    vocab::CRDT_UNSET_OPERATION,
    vocab::CRDT_ADD_OPERATION,
    vocab::CRDT_REMOVE_OPERATION,
    vocab::CRDT_DELETE_OPERATION,
];

/// Timestamps kept in a resource's metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Give every unpersisted operation a url in the resource's document.
pub fn assign_operation_urls(operations: &mut [Operation], resource_url: &Url) {
    let document = resource_url.document_url();
    for operation in operations.iter_mut().filter(|op| op.url.is_none()) {
        operation.url = Some(format!("{}#operation-{}", document, Uuid::new_v4()));
    }
}

fn operation_class(kind: &OperationKind) -> &'static str {
    match kind {
        OperationKind::Set { .. } => vocab::CRDT_SET_OPERATION,
        OperationKind::Unset { .. } => vocab::CRDT_UNSET_OPERATION,
        OperationKind::Add { .. } => vocab::CRDT_ADD_OPERATION,
        OperationKind::Remove { .. } => vocab::CRDT_REMOVE_OPERATION,
        OperationKind::Delete => vocab::CRDT_DELETE_OPERATION,
    }
}

fn date_literal(date: &DateTime<Utc>) -> Literal {
    Literal::typed(format_date(date), vocab::XSD_DATE_TIME)
}

/// Encode operations on `resource_url`.
///
/// # Errors
///
/// - `Soukai` if an operation has no url or names a field without RDF property
pub(crate) fn write_operations(
    encoder: &mut Encoder,
    schema: &ModelSchema,
    resource_url: &str,
    operations: &[Operation],
) -> Result<()> {
    for operation in operations {
        let url = operation.url.as_deref().ok_or_else(|| {
            SoukaiError::soukai(format!("operation on {} has no url", resource_url))
        })?;
        let subject = Term::named(url);

        encoder.quads.push(Quad::new(
            subject.clone(),
            vocab::RDF_TYPE,
            Term::named(operation_class(&operation.kind)),
        ));
        encoder
            .quads
            .push(Quad::new(subject.clone(), vocab::CRDT_RESOURCE, Term::named(resource_url)));
        encoder
            .quads
            .push(Quad::new(subject.clone(), vocab::CRDT_DATE, date_literal(&operation.date)));

        let Some(name) = operation.field() else {
            continue;
        };
        let field = schema.field(name).ok_or_else(|| {
            SoukaiError::soukai(format!("{} has no field named '{}'", schema.name(), name))
        })?;
        let property = field.rdf_property.as_deref().ok_or_else(|| {
            SoukaiError::soukai(format!("field '{}' has no rdf property", name))
        })?;

        encoder
            .quads
            .push(Quad::new(subject.clone(), vocab::CRDT_PROPERTY, Term::named(property)));
        if let Some(value) = operation.value() {
            let value = field.serialize(value);
            encoder.value(&subject, vocab::CRDT_VALUE, Some(field), &value);
        }
    }

    Ok(())
}

/// Read the operations on `resource_url`, in replay order.
///
/// Operations on unknown properties are skipped with a warning.
///
/// # Errors
///
/// - `Soukai` if an operation value cannot be decoded
pub fn read_operations(schema: &ModelSchema, resource_url: &str, quads: &[Quad]) -> Result<Vec<Operation>> {
    let mut operations = Vec::new();

    for subject in operation_subjects(quads, resource_url) {
        let Some(date) = objects(quads, &subject, vocab::CRDT_DATE)
            .find_map(Term::as_literal)
            .and_then(|literal| parse_date(&literal.value).ok())
        else {
            warn!(operation = %subject, "skipping operation without date");
            continue;
        };
        let types = types_of(quads, &subject);

        if types.contains(&vocab::CRDT_DELETE_OPERATION) {
            operations.push(with_url(Operation::delete(date), &subject));
            continue;
        }

        let property = objects(quads, &subject, vocab::CRDT_PROPERTY).find_map(Term::as_iri);
        let Some((name, field)) = property.and_then(|property| schema.field_for_property(property)) else {
            warn!(operation = %subject, ?property, "skipping operation on unknown property");
            continue;
        };

        let value = decode_property(quads, &subject, vocab::CRDT_VALUE, field)
            .map_err(|e| SoukaiError::soukai(format!("operation {}: {}", subject, e)))?;
        let value = value
            .map(|value| field.cast(&value))
            .transpose()
            .map_err(|e| SoukaiError::soukai(format!("operation {}: {}", subject, e)))?;
        let values = || value.clone().unwrap_or_else(|| AttributeValue::Array(Vec::new()));

        let operation = if types.contains(&vocab::CRDT_SET_OPERATION) {
            if value.is_none() && !field.is_array() {
                warn!(operation = %subject, "skipping set operation without value");
                continue;
            }
            Operation::set(name, values(), date)
        } else if types.contains(&vocab::CRDT_UNSET_OPERATION) {
            Operation::unset(name, date)
        } else if types.contains(&vocab::CRDT_ADD_OPERATION) {
            Operation::add(name, values(), date)
        } else if types.contains(&vocab::CRDT_REMOVE_OPERATION) {
            Operation::remove(name, values(), date)
        } else {
            continue;
        };
        operations.push(with_url(operation, &subject));
    }

    operations.sort_by(Operation::replay_order);
    Ok(operations)
}

fn with_url(mut operation: Operation, url: &str) -> Operation {
    operation.url = Some(url.to_string());
    operation
}

/// Subjects of the operations on `resource_url`.
pub(crate) fn operation_subjects(quads: &[Quad], resource_url: &str) -> Vec<String> {
    let mut subjects: Vec<String> = Vec::new();
    for class in OPERATION_CLASSES {
        for subject in subjects_of_type(quads, class) {
            let tracks = objects(quads, &subject, vocab::CRDT_RESOURCE)
                .any(|object| object.as_iri() == Some(resource_url));
            if tracks && !subjects.contains(&subject) {
                subjects.push(subject);
            }
        }
    }
    subjects
}

/// Encode the metadata resource of `resource_url`.
pub(crate) fn write_metadata(quads: &mut Vec<Quad>, resource_url: &str, metadata: &Metadata) {
    let subject = Term::named(metadata_url(resource_url));
    quads.push(Quad::new(subject.clone(), vocab::RDF_TYPE, Term::named(vocab::CRDT_METADATA)));
    quads.push(Quad::new(subject.clone(), vocab::CRDT_RESOURCE, Term::named(resource_url)));

    let dates = [
        (vocab::CRDT_CREATED_AT, metadata.created_at),
        (vocab::CRDT_UPDATED_AT, metadata.updated_at),
        (vocab::CRDT_DELETED_AT, metadata.deleted_at),
    ];
    for (property, date) in dates {
        if let Some(date) = date {
            quads.push(Quad::new(subject.clone(), property, date_literal(&date)));
        }
    }
}

/// Metadata recorded for `resource_url`, if any.
pub fn read_metadata(quads: &[Quad], resource_url: &str) -> Option<Metadata> {
    let subject = metadata_url(resource_url);
    if !quads.iter().any(|quad| quad.is_about(&subject)) {
        return None;
    }

    let date = |property: &str| {
        objects(quads, &subject, property)
            .find_map(Term::as_literal)
            .and_then(|literal| parse_date(&literal.value).ok())
    };

    Some(Metadata {
        created_at: date(vocab::CRDT_CREATED_AT),
        updated_at: date(vocab::CRDT_UPDATED_AT),
        deleted_at: date(vocab::CRDT_DELETED_AT),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::now;
    use crate::schema::{FieldDefinition, Timestamps};
    use chrono::Duration;

    const RESOURCE: &str = "https://pod.example/people/alice#it";

    fn schema() -> ModelSchema {
        ModelSchema::builder("Person")
            .rdf_context("foaf", "http://xmlns.com/foaf/0.1/")
            .timestamps(Timestamps::none())
            .field("name", FieldDefinition::string().rdf_property("foaf:name"))
            .field(
                "friendUrls",
                FieldDefinition::array(FieldDefinition::key()).rdf_property("foaf:knows"),
            )
            .build()
            .unwrap()
    }

    fn encode(operations: &mut Vec<Operation>) -> Vec<Quad> {
        assign_operation_urls(operations, &Url::new(RESOURCE).unwrap());
        let mut encoder = Encoder::default();
        write_operations(&mut encoder, &schema(), RESOURCE, operations).unwrap();
        encoder.quads
    }

    #[test]
    fn urls_live_in_the_resource_document() {
        let mut operations = vec![Operation::unset("name", now())];
        assign_operation_urls(&mut operations, &Url::new(RESOURCE).unwrap());

        let url = operations[0].url.as_deref().unwrap();
        assert!(url.starts_with("https://pod.example/people/alice#operation-"));
    }

    #[test]
    fn operations_read_back() {
        let date = now();
        let later = date + Duration::seconds(1);
        let mut operations = vec![
            Operation::set("name", "Alice", date),
            Operation::set("friendUrls", Vec::<AttributeValue>::new(), date),
            Operation::add(
                "friendUrls",
                vec![
                    AttributeValue::Key("https://pod.example/people/bob#it".into()),
                    AttributeValue::Key("https://pod.example/people/carol#it".into()),
                ],
                later,
            ),
            Operation::unset("name", later),
            Operation::delete(later + Duration::seconds(1)),
        ];
        let quads = encode(&mut operations);

        let read = read_operations(&schema(), RESOURCE, &quads).unwrap();
        operations.sort_by(Operation::replay_order);
        assert_eq!(read, operations);
    }

    #[test]
    fn other_resources_are_ignored() {
        let mut operations = vec![Operation::set("name", "Alice", now())];
        let quads = encode(&mut operations);

        assert!(read_operations(&schema(), "https://pod.example/people/bob#it", &quads)
            .unwrap()
            .is_empty());
        assert_eq!(operation_subjects(&quads, RESOURCE).len(), 1);
    }

    #[test]
    fn unknown_properties_are_skipped() {
        let subject = Term::named("https://pod.example/people/alice#operation-1");
        let quads = vec![
            Quad::new(subject.clone(), vocab::RDF_TYPE, Term::named(vocab::CRDT_SET_OPERATION)),
            Quad::new(subject.clone(), vocab::CRDT_RESOURCE, Term::named(RESOURCE)),
            Quad::new(subject.clone(), vocab::CRDT_DATE, date_literal(&now())),
            Quad::new(subject.clone(), vocab::CRDT_PROPERTY, Term::named("https://schema.org/age")),
            Quad::new(subject, vocab::CRDT_VALUE, Literal::typed("3", vocab::XSD_INTEGER)),
        ];

        assert!(read_operations(&schema(), RESOURCE, &quads).unwrap().is_empty());
    }

    #[test]
    fn metadata() {
        let created_at = now();
        let metadata = Metadata {
            created_at: Some(created_at),
            updated_at: Some(created_at + Duration::seconds(5)),
            deleted_at: None,
        };
        let mut quads = Vec::new();
        write_metadata(&mut quads, RESOURCE, &metadata);

        assert_eq!(read_metadata(&quads, RESOURCE), Some(metadata));
        assert_eq!(read_metadata(&quads, "https://pod.example/other#it"), None);
    }
}
