//! rdf::term
//!
//! RDF terms and quads.
//!
//! Quads are plain values: built while serializing or parsing, consumed
//! by the caller and dropped. All statements live in the default graph.

use std::fmt;

use super::vocab;

/// A literal value with its datatype (and language, for `rdf:langString`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Literal {
    pub value: String,
    pub datatype: String,
    pub language: Option<String>,
}

impl Literal {
    /// A plain `xsd:string` literal.
    pub fn string(value: impl Into<String>) -> Self {
        Self::typed(value, vocab::XSD_STRING)
    }

    pub fn typed(value: impl Into<String>, datatype: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            datatype: datatype.into(),
            language: None,
        }
    }

    pub fn lang(value: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            datatype: vocab::RDF_LANG_STRING.to_string(),
            language: Some(language.into()),
        }
    }

    pub fn is_plain(&self) -> bool {
        self.datatype == vocab::XSD_STRING && self.language.is_none()
    }
}

/// Subject or object of a statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Term {
    NamedNode(String),
    BlankNode(String),
    Literal(Literal),
}

impl Term {
    pub fn named(iri: impl Into<String>) -> Self {
        Term::NamedNode(iri.into())
    }

    pub fn blank(id: impl Into<String>) -> Self {
        Term::BlankNode(id.into())
    }

    /// The IRI of a named node.
    pub fn as_iri(&self) -> Option<&str> {
        match self {
            Term::NamedNode(iri) => Some(iri),
            _ => None,
        }
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Term::Literal(literal) => Some(literal),
            _ => None,
        }
    }

    /// Node identifier of named and blank nodes (`_:` prefixed for blanks).
    pub fn node_id(&self) -> Option<String> {
        match self {
            Term::NamedNode(iri) => Some(iri.clone()),
            Term::BlankNode(id) => Some(format!("_:{}", id)),
            Term::Literal(_) => None,
        }
    }

    /// Named or blank node from a node identifier.
    pub fn from_node_id(id: &str) -> Self {
        match id.strip_prefix("_:") {
            Some(blank) => Term::BlankNode(blank.to_string()),
            None => Term::NamedNode(id.to_string()),
        }
    }
}

impl From<Literal> for Term {
    fn from(literal: Literal) -> Self {
        Term::Literal(literal)
    }
}

/// Escape a string for a quoted Turtle / N-Triples literal.
pub(crate) fn escape_literal(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            '\u{08}' => escaped.push_str("\\b"),
            '\u{0C}' => escaped.push_str("\\f"),
            c if (c as u32) < 0x20 => escaped.push_str(&format!("\\u{:04X}", c as u32)),
            c => escaped.push(c),
        }
    }
    escaped
}

/// N-Triples form.
impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::NamedNode(iri) => write!(f, "<{}>", iri),
            Term::BlankNode(id) => write!(f, "_:{}", id),
            Term::Literal(literal) => {
                write!(f, "\"{}\"", escape_literal(&literal.value))?;
                match &literal.language {
                    Some(language) => write!(f, "@{}", language),
                    None if literal.datatype == vocab::XSD_STRING => Ok(()),
                    None => write!(f, "^^<{}>", literal.datatype),
                }
            }
        }
    }
}

/// A statement `(subject, predicate, object)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Quad {
    pub subject: Term,
    pub predicate: String,
    pub object: Term,
}

impl Quad {
    pub fn new(subject: Term, predicate: impl Into<String>, object: impl Into<Term>) -> Self {
        Self {
            subject,
            predicate: predicate.into(),
            object: object.into(),
        }
    }

    /// Whether this statement is about the given node id.
    pub fn is_about(&self, node_id: &str) -> bool {
        self.subject.node_id().as_deref() == Some(node_id)
    }
}

impl fmt::Display for Quad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}> {} .", self.subject, self.predicate, self.object)
    }
}

/// Objects of `(subject, predicate, ?)` statements.
pub fn objects<'a>(
    quads: &'a [Quad],
    subject: &'a str,
    predicate: &'a str,
) -> impl Iterator<Item = &'a Term> + 'a {
    quads
        .iter()
        .filter(move |quad| quad.predicate == predicate && quad.is_about(subject))
        .map(|quad| &quad.object)
}

/// `rdf:type` IRIs of a subject.
pub fn types_of<'a>(quads: &'a [Quad], subject: &'a str) -> Vec<&'a str> {
    objects(quads, subject, vocab::RDF_TYPE)
        .filter_map(Term::as_iri)
        .collect()
}

/// Subjects typed with `class`, in order of appearance.
pub fn subjects_of_type(quads: &[Quad], class: &str) -> Vec<String> {
    let mut subjects: Vec<String> = Vec::new();
    for quad in quads {
        if quad.predicate == vocab::RDF_TYPE && quad.object.as_iri() == Some(class) {
            if let Some(id) = quad.subject.node_id() {
                if !subjects.contains(&id) {
                    subjects.push(id);
                }
            }
        }
    }
    subjects
}
