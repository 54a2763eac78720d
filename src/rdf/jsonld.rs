//! rdf::jsonld
//!
//! Expanded JSON-LD documents.
//!
//! RDF-backed models are stored as expanded JSON-LD: a `@graph` array of
//! node objects whose keys are full predicate IRIs and whose values are
//! arrays of `{"@id"}` references or `{"@value", "@type"|"@language"}`
//! literals. This module converts between that shape and quads, and
//! builds/reads tombstone documents.

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};

use super::term::{Literal, Quad, Term};
use super::{vocab, RdfError};
use crate::core::types::{format_date, parse_date};
use crate::engine::Document;

/// A deleted resource marker.
#[derive(Debug, Clone, PartialEq)]
pub struct Tombstone {
    pub resource_url: String,
    pub deleted_at: DateTime<Utc>,
}

/// Encode statements as an expanded JSON-LD document.
pub fn quads_to_document(quads: &[Quad]) -> Document {
    let mut nodes: Vec<(String, Map<String, Value>)> = Vec::new();

    for quad in quads {
        let Some(id) = quad.subject.node_id() else {
            continue;
        };
        let index = match nodes.iter().position(|(existing, _)| *existing == id) {
            Some(index) => index,
            None => {
                let mut node = Map::new();
                node.insert("@id".into(), Value::String(id.clone()));
                nodes.push((id, node));
                nodes.len() - 1
            }
        };
        let node = &mut nodes[index].1;

        let (key, value) = match quad.object.as_iri() {
            Some(class) if quad.predicate == vocab::RDF_TYPE => {
                ("@type".to_string(), Value::String(class.to_string()))
            }
            _ => (quad.predicate.clone(), term_to_value(&quad.object)),
        };

        if let Value::Array(values) = node
            .entry(key)
            .or_insert_with(|| Value::Array(Vec::new()))
        {
            if !values.contains(&value) {
                values.push(value);
            }
        }
    }

    let mut document = Document::new();
    document.insert(
        "@graph".into(),
        Value::Array(nodes.into_iter().map(|(_, node)| Value::Object(node)).collect()),
    );
    document
}

fn term_to_value(term: &Term) -> Value {
    match term {
        Term::NamedNode(_) | Term::BlankNode(_) => json!({ "@id": term.node_id() }),
        Term::Literal(literal) => match &literal.language {
            Some(language) => json!({ "@value": literal.value, "@language": language }),
            None if literal.is_plain() => json!({ "@value": literal.value }),
            None => json!({ "@value": literal.value, "@type": literal.datatype }),
        },
    }
}

/// Decode an expanded JSON-LD document into statements.
///
/// Accepts a `@graph` document or a single node object. Nested node
/// objects without `@id` become blank nodes.
///
/// # Errors
///
/// Returns `RdfError::InvalidDocument` for anything that is not expanded
/// JSON-LD (such as plain model documents).
pub fn document_to_quads(document: &Document) -> Result<Vec<Quad>, RdfError> {
    let mut decoder = Decoder {
        quads: Vec::new(),
        blank_nodes: 0,
    };

    match document.get("@graph") {
        Some(Value::Array(nodes)) => {
            for node in nodes {
                let Value::Object(node) = node else {
                    return Err(RdfError::InvalidDocument("graph entries must be objects".into()));
                };
                decoder.node(node)?;
            }
        }
        Some(_) => return Err(RdfError::InvalidDocument("@graph must be an array".into())),
        None if document.contains_key("@id") => {
            decoder.node(document)?;
        }
        None => return Err(RdfError::InvalidDocument("missing @graph".into())),
    }

    Ok(decoder.quads)
}

struct Decoder {
    quads: Vec<Quad>,
    blank_nodes: usize,
}

impl Decoder {
    fn node(&mut self, node: &Map<String, Value>) -> Result<Term, RdfError> {
        let subject = match node.get("@id") {
            Some(Value::String(id)) => Term::from_node_id(id),
            Some(_) => return Err(RdfError::InvalidDocument("@id must be a string".into())),
            None => {
                self.blank_nodes += 1;
                Term::BlankNode(format!("j{}", self.blank_nodes))
            }
        };

        for (key, value) in node {
            match key.as_str() {
                "@id" => {}
                "@type" => {
                    for class in as_array(value) {
                        let Value::String(class) = class else {
                            return Err(RdfError::InvalidDocument("@type must be a string".into()));
                        };
                        if oxrdf::NamedNodeRef::new(class).is_err() {
                            return Err(RdfError::InvalidIri(class.clone()));
                        }
                        self.quads.push(Quad::new(
                            subject.clone(),
                            vocab::RDF_TYPE,
                            Term::named(class.clone()),
                        ));
                    }
                }
                key if key.starts_with('@') => {}
                predicate => {
                    if oxrdf::NamedNodeRef::new(predicate).is_err() {
                        return Err(RdfError::InvalidDocument(format!(
                            "'{}' is not an absolute IRI",
                            predicate
                        )));
                    }
                    for value in as_array(value) {
                        let object = self.value(value)?;
                        self.quads
                            .push(Quad::new(subject.clone(), predicate.to_string(), object));
                    }
                }
            }
        }

        Ok(subject)
    }

    fn value(&mut self, value: &Value) -> Result<Term, RdfError> {
        match value {
            Value::Object(object) if object.contains_key("@value") => literal(object),
            Value::Object(object) if object.len() == 1 && object.contains_key("@id") => {
                match object.get("@id") {
                    Some(Value::String(id)) => Ok(Term::from_node_id(id)),
                    _ => Err(RdfError::InvalidDocument("@id must be a string".into())),
                }
            }
            Value::Object(object) => self.node(object),
            Value::String(s) => Ok(Term::Literal(Literal::string(s.clone()))),
            Value::Bool(_) | Value::Number(_) => native_literal(value, None),
            Value::Null | Value::Array(_) => Err(RdfError::InvalidDocument(format!(
                "unsupported value {}",
                value
            ))),
        }
    }
}

fn as_array(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    }
}

fn literal(object: &Map<String, Value>) -> Result<Term, RdfError> {
    let datatype = match object.get("@type") {
        Some(Value::String(datatype)) => Some(datatype.as_str()),
        Some(_) => return Err(RdfError::InvalidDocument("@type must be a string".into())),
        None => None,
    };
    let value = object.get("@value").unwrap_or(&Value::Null);

    if let (Value::String(text), Some(Value::String(language))) = (value, object.get("@language")) {
        return Ok(Term::Literal(Literal::lang(text.clone(), language.clone())));
    }

    match value {
        Value::String(text) => Ok(Term::Literal(Literal::typed(
            text.clone(),
            datatype.unwrap_or(vocab::XSD_STRING),
        ))),
        Value::Bool(_) | Value::Number(_) => native_literal(value, datatype),
        _ => Err(RdfError::InvalidDocument(format!("unsupported @value {}", value))),
    }
}

fn native_literal(value: &Value, datatype: Option<&str>) -> Result<Term, RdfError> {
    let (lexical, default_datatype) = match value {
        Value::Bool(b) => (b.to_string(), vocab::XSD_BOOLEAN),
        Value::Number(n) if n.is_i64() || n.is_u64() => (n.to_string(), vocab::XSD_INTEGER),
        Value::Number(n) => (n.to_string(), vocab::XSD_DOUBLE),
        other => {
            return Err(RdfError::InvalidDocument(format!("unsupported value {}", other)));
        }
    };
    Ok(Term::Literal(Literal::typed(
        lexical,
        datatype.unwrap_or(default_datatype),
    )))
}

/// Url of the metadata resource attached to a resource.
pub fn metadata_url(resource_url: &str) -> String {
    format!("{}-metadata", resource_url)
}

/// A document holding only a tombstone for `resource_url`.
pub fn tombstone_document(resource_url: &str, deleted_at: &DateTime<Utc>) -> Document {
    let subject = Term::named(metadata_url(resource_url));
    quads_to_document(&[
        Quad::new(subject.clone(), vocab::RDF_TYPE, Term::named(vocab::CRDT_TOMBSTONE)),
        Quad::new(subject.clone(), vocab::CRDT_RESOURCE, Term::named(resource_url)),
        Quad::new(
            subject,
            vocab::CRDT_DELETED_AT,
            Literal::typed(format_date(deleted_at), vocab::XSD_DATE_TIME),
        ),
    ])
}

/// The tombstone held by a document, if it is one.
pub fn read_tombstone(document: &Document) -> Option<Tombstone> {
    let quads = document_to_quads(document).ok()?;
    let subject = super::term::subjects_of_type(&quads, vocab::CRDT_TOMBSTONE)
        .into_iter()
        .next()?;

    let resource_url = super::term::objects(&quads, &subject, vocab::CRDT_RESOURCE)
        .find_map(Term::as_iri)?
        .to_string();
    let deleted_at = super::term::objects(&quads, &subject, vocab::CRDT_DELETED_AT)
        .find_map(Term::as_literal)
        .and_then(|literal| parse_date(&literal.value).ok())?;

    Some(Tombstone {
        resource_url,
        deleted_at,
    })
}

/// Last modification time recorded in a document.
///
/// Reads `updatedAt` from plain documents and the latest
/// `purl:modified`/`crdt:updatedAt`/`crdt:deletedAt` from JSON-LD ones.
pub fn modified_at(document: &Document) -> Option<DateTime<Utc>> {
    if let Some(Value::String(updated_at)) = document.get("updatedAt") {
        return parse_date(updated_at).ok();
    }

    let quads = document_to_quads(document).ok()?;
    quads
        .iter()
        .filter(|quad| {
            matches!(
                quad.predicate.as_str(),
                vocab::PURL_MODIFIED | vocab::CRDT_UPDATED_AT | vocab::CRDT_DELETED_AT
            )
        })
        .filter_map(|quad| quad.object.as_literal())
        .filter_map(|literal| parse_date(&literal.value).ok())
        .max()
}
