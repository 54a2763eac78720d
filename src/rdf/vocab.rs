//! rdf::vocab
//!
//! IRIs of the vocabularies the mapper reads and writes.

/// Well-known prefixes, written by the Turtle serializer.
pub const PREFIXES: [(&str, &str); 6] = [
    ("rdf", RDF_NS),
    ("xsd", XSD_NS),
    ("ldp", LDP_NS),
    ("purl", PURL_NS),
    ("crdt", CRDT_NS),
    ("schema", SCHEMA_NS),
];

pub const RDF_NS: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
pub const RDF_LANG_STRING: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#langString";

pub const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema#";
pub const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";
pub const XSD_BOOLEAN: &str = "http://www.w3.org/2001/XMLSchema#boolean";
pub const XSD_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";
pub const XSD_DECIMAL: &str = "http://www.w3.org/2001/XMLSchema#decimal";
pub const XSD_DOUBLE: &str = "http://www.w3.org/2001/XMLSchema#double";
pub const XSD_DATE_TIME: &str = "http://www.w3.org/2001/XMLSchema#dateTime";

pub const LDP_NS: &str = "http://www.w3.org/ns/ldp#";
pub const LDP_CONTAINER: &str = "http://www.w3.org/ns/ldp#Container";
pub const LDP_BASIC_CONTAINER: &str = "http://www.w3.org/ns/ldp#BasicContainer";
pub const LDP_RESOURCE: &str = "http://www.w3.org/ns/ldp#Resource";
pub const LDP_CONTAINS: &str = "http://www.w3.org/ns/ldp#contains";

pub const PURL_NS: &str = "http://purl.org/dc/terms/";
pub const PURL_CREATED: &str = "http://purl.org/dc/terms/created";
pub const PURL_MODIFIED: &str = "http://purl.org/dc/terms/modified";

pub const SCHEMA_NS: &str = "https://schema.org/";

pub const CRDT_NS: &str = "https://vocab.noeldemartin.com/crdt/";

// Classes
pub const CRDT_METADATA: &str = "https://vocab.noeldemartin.com/crdt/Metadata";
pub const CRDT_TOMBSTONE: &str = "https://vocab.noeldemartin.com/crdt/Tombstone";
pub const CRDT_SET_OPERATION: &str = "https://vocab.noeldemartin.com/crdt/SetPropertyOperation";
pub const CRDT_UNSET_OPERATION: &str = "https://vocab.noeldemartin.com/crdt/UnsetPropertyOperation";
pub const CRDT_ADD_OPERATION: &str = "https://vocab.noeldemartin.com/crdt/AddPropertyOperation";
pub const CRDT_REMOVE_OPERATION: &str =
    "https://vocab.noeldemartin.com/crdt/RemovePropertyOperation";
pub const CRDT_DELETE_OPERATION: &str = "https://vocab.noeldemartin.com/crdt/DeleteOperation";

// Properties
pub const CRDT_RESOURCE: &str = "https://vocab.noeldemartin.com/crdt/resource";
pub const CRDT_PROPERTY: &str = "https://vocab.noeldemartin.com/crdt/property";
pub const CRDT_VALUE: &str = "https://vocab.noeldemartin.com/crdt/value";
pub const CRDT_DATE: &str = "https://vocab.noeldemartin.com/crdt/date";
pub const CRDT_CREATED_AT: &str = "https://vocab.noeldemartin.com/crdt/createdAt";
pub const CRDT_UPDATED_AT: &str = "https://vocab.noeldemartin.com/crdt/updatedAt";
pub const CRDT_DELETED_AT: &str = "https://vocab.noeldemartin.com/crdt/deletedAt";

/// Expand a `prefix:local` name using `prefixes`, falling back to the
/// well-known prefixes.
///
/// Returns `None` when the prefix is unknown.
pub fn expand<'a, I>(name: &str, prefixes: I) -> Option<String>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let (prefix, local) = name.split_once(':')?;
    prefixes
        .into_iter()
        .chain(PREFIXES)
        .find(|(candidate, _)| *candidate == prefix)
        .map(|(_, namespace)| format!("{}{}", namespace, local))
}
