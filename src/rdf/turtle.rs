//! rdf::turtle
//!
//! Turtle reading and writing over [`oxrdfio`].
//!
//! # Writer
//!
//! [`write_turtle`] keeps statements about the same subject together (in
//! order of first appearance), declares the well-known and caller-provided
//! prefixes that some IRI in the graph starts with, and leaves the rest of
//! the layout to the oxrdfio Turtle serializer. Every IRI is checked
//! against RFC 3987 on the way out, so a value that is not an IRI fails
//! instead of producing a document nobody can read back.
//!
//! # Parser
//!
//! [`parse_turtle`] reads any Turtle 1.1 document. Relative IRIs resolve
//! against the given base (or an `@base` directive).

use oxrdf::{BlankNode, GraphName, NamedNode};
use oxrdfio::{RdfFormat, RdfParser, RdfSerializer};

use super::term::{Literal, Quad, Term};
use super::vocab;
use super::RdfError;
use crate::core::types::Url;

/// Serialize statements to Turtle.
///
/// `prefixes` extends (and overrides) the well-known prefixes.
///
/// # Errors
///
/// - `InvalidIri` if a subject, predicate, object or datatype is not an
///   absolute IRI
/// - `InvalidDocument` for literal subjects and malformed blank node ids
///   or language tags
pub fn write_turtle(quads: &[Quad], prefixes: &[(String, String)]) -> Result<String, RdfError> {
    if quads.is_empty() {
        return Ok(String::new());
    }

    let mut subjects: Vec<&Term> = Vec::new();
    for quad in quads {
        if !subjects.contains(&&quad.subject) {
            subjects.push(&quad.subject);
        }
    }
    let mut ordered: Vec<&Quad> = quads.iter().collect();
    ordered.sort_by_key(|quad| subjects.iter().position(|subject| *subject == &quad.subject));
    ordered.dedup();

    let converted = ordered
        .into_iter()
        .map(to_oxrdf)
        .collect::<Result<Vec<_>, _>>()?;

    let mut serializer = RdfSerializer::from_format(RdfFormat::Turtle);
    for (prefix, namespace) in used_prefixes(quads, prefixes) {
        serializer = serializer
            .with_prefix(prefix, namespace)
            .map_err(|_| RdfError::InvalidIri(namespace.to_string()))?;
    }

    let mut writer = serializer.for_writer(Vec::new());
    for quad in &converted {
        writer.serialize_quad(quad).map_err(|e| RdfError::Write(e.to_string()))?;
    }
    let bytes = writer.finish().map_err(|e| RdfError::Write(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| RdfError::Write(e.to_string()))
}

/// Caller prefixes first, then the well-known ones they don't shadow,
/// keeping only those some IRI in the graph lives under.
fn used_prefixes<'a>(quads: &'a [Quad], prefixes: &'a [(String, String)]) -> Vec<(&'a str, &'a str)> {
    let mut namespaces: Vec<(&str, &str)> = prefixes
        .iter()
        .map(|(prefix, namespace)| (prefix.as_str(), namespace.as_str()))
        .collect();
    for (prefix, namespace) in vocab::PREFIXES {
        if !namespaces.iter().any(|(existing, _)| *existing == prefix) {
            namespaces.push((prefix, namespace));
        }
    }

    let iris: Vec<&str> = quads
        .iter()
        .flat_map(|quad| {
            [
                quad.subject.as_iri(),
                Some(quad.predicate.as_str()),
                quad.object.as_iri(),
                quad.object
                    .as_literal()
                    .filter(|literal| !literal.is_plain() && literal.language.is_none())
                    .map(|literal| literal.datatype.as_str()),
            ]
        })
        .flatten()
        .collect();

    namespaces
        .into_iter()
        .filter(|(_, namespace)| {
            iris.iter()
                .any(|iri| iri.len() > namespace.len() && iri.starts_with(namespace))
        })
        .collect()
}

fn named_node(iri: &str) -> Result<NamedNode, RdfError> {
    NamedNode::new(iri).map_err(|_| RdfError::InvalidIri(iri.to_string()))
}

fn blank_node(id: &str) -> Result<BlankNode, RdfError> {
    BlankNode::new(id).map_err(|e| RdfError::InvalidDocument(format!("blank node '{}': {}", id, e)))
}

fn to_oxrdf(quad: &Quad) -> Result<oxrdf::Quad, RdfError> {
    let subject: oxrdf::Subject = match &quad.subject {
        Term::NamedNode(iri) => named_node(iri)?.into(),
        Term::BlankNode(id) => blank_node(id)?.into(),
        Term::Literal(_) => {
            return Err(RdfError::InvalidDocument(format!(
                "literal subject {}",
                quad.subject
            )))
        }
    };

    let object: oxrdf::Term = match &quad.object {
        Term::NamedNode(iri) => named_node(iri)?.into(),
        Term::BlankNode(id) => blank_node(id)?.into(),
        Term::Literal(literal) => match &literal.language {
            Some(language) => oxrdf::Literal::new_language_tagged_literal(&literal.value, language)
                .map_err(|e| RdfError::InvalidDocument(format!("language tag '{}': {}", language, e)))?
                .into(),
            None if literal.datatype == vocab::XSD_STRING => {
                oxrdf::Literal::new_simple_literal(&literal.value).into()
            }
            None => oxrdf::Literal::new_typed_literal(&literal.value, named_node(&literal.datatype)?).into(),
        },
    };

    Ok(oxrdf::Quad::new(
        subject,
        named_node(&quad.predicate)?,
        object,
        GraphName::DefaultGraph,
    ))
}

#[allow(unreachable_patterns)]
fn from_oxrdf(quad: oxrdf::Quad) -> Result<Quad, RdfError> {
    let subject = match quad.subject {
        oxrdf::Subject::NamedNode(node) => Term::NamedNode(node.into_string()),
        oxrdf::Subject::BlankNode(node) => Term::BlankNode(node.into_string()),
        other => return Err(RdfError::InvalidDocument(format!("unsupported subject {}", other))),
    };

    let object = match quad.object {
        oxrdf::Term::NamedNode(node) => Term::NamedNode(node.into_string()),
        oxrdf::Term::BlankNode(node) => Term::BlankNode(node.into_string()),
        oxrdf::Term::Literal(literal) => Term::Literal(match literal.language() {
            Some(language) => Literal::lang(literal.value(), language),
            None => Literal::typed(literal.value(), literal.datatype().as_str()),
        }),
        other => return Err(RdfError::InvalidDocument(format!("unsupported object {}", other))),
    };

    Ok(Quad::new(subject, quad.predicate.into_string(), object))
}

/// Parse a Turtle document.
///
/// Relative IRIs resolve against `base` (or a `@base` directive).
///
/// # Errors
///
/// Returns `RdfError::Parse` with the parser's message (which carries the
/// position of the first syntax error), or `RdfError::InvalidIri` when
/// `base` is rejected.
pub fn parse_turtle(input: &str, base: Option<&Url>) -> Result<Vec<Quad>, RdfError> {
    let mut parser = RdfParser::from_format(RdfFormat::Turtle);
    if let Some(base) = base {
        parser = parser
            .with_base_iri(base.as_str())
            .map_err(|_| RdfError::InvalidIri(base.to_string()))?;
    }

    parser
        .for_reader(input.as_bytes())
        .map(|quad| {
            let quad = quad.map_err(|e| RdfError::Parse(e.to_string()))?;
            from_oxrdf(quad)
        })
        .collect()
}
