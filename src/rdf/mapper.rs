//! rdf::mapper
//!
//! Model attributes to RDF statements and back.
//!
//! Serialization emits one `rdf:type` statement per class, then one
//! statement per value of every field with an RDF property (array fields
//! emit one per element, objects hang off a blank node). Field codecs run
//! before encoding. Deserialization collects the objects of each field's
//! property, decodes them with the inverse table (see [`crate::rdf`]) and
//! casts them through the schema; absent fields fall back to defaults and
//! missing required fields fail with `InvalidModelAttributes`.

use std::collections::BTreeSet;

use super::term::{objects, types_of, Literal, Quad, Term};
use super::{vocab, RdfError};
use crate::core::types::{format_date, parse_date, Url};
use crate::core::value::{AttributeValue, Attributes};
use crate::errors::{Result, SoukaiError};
use crate::model::{Model, ModelClass};
use crate::schema::{FieldDefinition, FieldType};

/// Encode models as statements.
///
/// # Errors
///
/// - `Soukai` if a model is not mapped to RDF or has no url
pub fn serialize_to_rdf<'a, I>(models: I) -> Result<Vec<Quad>>
where
    I: IntoIterator<Item = &'a Model>,
{
    let mut encoder = Encoder::default();
    for model in models {
        encoder.model(model)?;
    }
    Ok(encoder.quads)
}

/// Build a persisted model from the statements about `url`.
///
/// # Errors
///
/// - `InvalidModelAttributes` if a value does not cast or a required
///   field has no statement
pub fn create_from_rdf(class: &ModelClass, url: &Url, quads: &[Quad]) -> Result<Model> {
    let schema = class.schema();
    let subject = url.as_str();

    let mut attributes = Attributes::new();
    attributes.insert(schema.primary_key().to_string(), AttributeValue::Key(subject.to_string()));

    for (name, field) in schema.fields() {
        let Some(property) = field.rdf_property.as_deref() else {
            continue;
        };
        let invalid = |message: String| {
            SoukaiError::invalid_attributes(class.name(), format!("'{}': {}", name, message), vec![name.clone()])
        };

        if let Some(value) = decode_property(quads, subject, property, field).map_err(|e| invalid(e.to_string()))? {
            let value = field.cast(&value).map_err(|e| invalid(e.to_string()))?;
            attributes.insert(name.clone(), value);
        }
    }

    let mut model = Model::new(class, attributes)?;
    model.validate()?;
    model.types = types_of(quads, subject).into_iter().map(str::to_string).collect();
    model.store.mark_persisted()?;
    Ok(model)
}

/// Writes statements, numbering blank nodes as it goes.
#[derive(Debug, Default)]
pub(crate) struct Encoder {
    pub(crate) quads: Vec<Quad>,
    blank_nodes: usize,
}

impl Encoder {
    pub(crate) fn model(&mut self, model: &Model) -> Result<()> {
        let schema = model.schema();
        if !schema.is_rdf() {
            return Err(SoukaiError::soukai(format!(
                "model {} is not mapped to RDF",
                model.class().name()
            )));
        }
        let url = model.url().ok_or_else(|| {
            SoukaiError::soukai(format!(
                "cannot serialize a {} without url",
                model.class().name()
            ))
        })?;
        let subject = Term::named(url.as_str());

        let mut classes: Vec<&str> = schema.rdf_classes().iter().map(String::as_str).collect();
        for class in model.rdf_types() {
            if !classes.contains(&class) {
                classes.push(class);
            }
        }
        for class in classes {
            self.quads
                .push(Quad::new(subject.clone(), vocab::RDF_TYPE, Term::named(class)));
        }

        for (name, field) in schema.fields() {
            let (Some(property), Some(value)) = (field.rdf_property.as_deref(), model.get(name)) else {
                continue;
            };
            let value = field.serialize(value);
            self.value(&subject, property, Some(field), &value);
        }

        Ok(())
    }

    /// Encode `value` as the object(s) of `(subject, predicate)`.
    pub(crate) fn value(
        &mut self,
        subject: &Term,
        predicate: &str,
        field: Option<&FieldDefinition>,
        value: &AttributeValue,
    ) {
        match value {
            AttributeValue::Array(items) => {
                let items_field = field.and_then(|field| field.items.as_deref());
                for item in items {
                    self.value(subject, predicate, items_field, item);
                }
            }
            AttributeValue::Object(attributes) => {
                self.blank_nodes += 1;
                let node = Term::blank(format!("b{}", self.blank_nodes));
                self.quads
                    .push(Quad::new(subject.clone(), predicate, node.clone()));

                let nested = field.and_then(|field| field.fields.as_ref());
                for (name, value) in attributes {
                    let Some(nested_field) = nested.and_then(|fields| fields.get(name)) else {
                        continue;
                    };
                    if let Some(property) = nested_field.rdf_property.as_deref() {
                        let value = nested_field.serialize(value);
                        self.value(&node, property, Some(nested_field), &value);
                    }
                }
            }
            scalar => {
                if let Some(object) = encode_scalar(scalar) {
                    self.quads.push(Quad::new(subject.clone(), predicate, object));
                }
            }
        }
    }
}

fn encode_scalar(value: &AttributeValue) -> Option<Term> {
    let term = match value {
        AttributeValue::String(text) => Term::Literal(Literal::string(text.clone())),
        AttributeValue::Key(key) => Term::from_node_id(key),
        AttributeValue::Boolean(flag) => {
            Term::Literal(Literal::typed(flag.to_string(), vocab::XSD_BOOLEAN))
        }
        AttributeValue::Number(number) if number.fract() == 0.0 && number.abs() < 9e15 => {
            Term::Literal(Literal::typed(format!("{}", *number as i64), vocab::XSD_INTEGER))
        }
        AttributeValue::Number(number) if number.is_finite() => {
            Term::Literal(Literal::typed(number.to_string(), vocab::XSD_DECIMAL))
        }
        AttributeValue::Number(_) => return None,
        AttributeValue::Date(date) => {
            Term::Literal(Literal::typed(format_date(date), vocab::XSD_DATE_TIME))
        }
        AttributeValue::Array(_) | AttributeValue::Object(_) => return None,
    };
    Some(term)
}

/// Decoded value of `(subject, property)`, `None` when there is no statement.
///
/// Array fields collect every object; other fields take the first.
pub(crate) fn decode_property(
    quads: &[Quad],
    subject: &str,
    property: &str,
    field: &FieldDefinition,
) -> std::result::Result<Option<AttributeValue>, RdfError> {
    let terms: Vec<&Term> = objects(quads, subject, property).collect();
    if terms.is_empty() {
        return Ok(None);
    }

    if field.is_array() {
        let items_field = field.items.as_deref();
        let items = terms
            .into_iter()
            .map(|term| decode_term(quads, items_field, term))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Some(AttributeValue::Array(items)))
    } else {
        decode_term(quads, Some(field), terms[0]).map(Some)
    }
}

/// Decode one object term (the inverse of the encoding table).
pub(crate) fn decode_term(
    quads: &[Quad],
    field: Option<&FieldDefinition>,
    term: &Term,
) -> std::result::Result<AttributeValue, RdfError> {
    match term {
        Term::NamedNode(iri) => Ok(AttributeValue::Key(iri.clone())),
        Term::BlankNode(id) => {
            let node_id = format!("_:{}", id);
            match field.filter(|field| field.field_type == FieldType::Object) {
                Some(field) => {
                    let mut attributes = Attributes::new();
                    for (name, nested) in field.fields.iter().flatten() {
                        let Some(property) = nested.rdf_property.as_deref() else {
                            continue;
                        };
                        if let Some(value) = decode_property(quads, &node_id, property, nested)? {
                            attributes.insert(name.clone(), value);
                        }
                    }
                    Ok(AttributeValue::Object(attributes))
                }
                None => Ok(AttributeValue::Key(node_id)),
            }
        }
        Term::Literal(literal) => decode_literal(literal),
    }
}

fn decode_literal(literal: &Literal) -> std::result::Result<AttributeValue, RdfError> {
    let cast = |expected: &str| RdfError::Cast {
        value: literal.value.clone(),
        expected: expected.to_string(),
    };

    match literal.datatype.as_str() {
        vocab::XSD_INTEGER | vocab::XSD_DECIMAL | vocab::XSD_DOUBLE => literal
            .value
            .trim()
            .parse::<f64>()
            .map(AttributeValue::Number)
            .map_err(|_| cast("number")),
        vocab::XSD_BOOLEAN => match literal.value.trim() {
            "true" | "1" => Ok(AttributeValue::Boolean(true)),
            "false" | "0" => Ok(AttributeValue::Boolean(false)),
            _ => Err(cast("boolean")),
        },
        vocab::XSD_DATE_TIME => parse_date(literal.value.trim())
            .map(AttributeValue::Date)
            .map_err(|_| cast("date")),
        _ => Ok(AttributeValue::String(literal.value.clone())),
    }
}

/// Node ids of `subjects` and of every blank node reachable from them.
pub(crate) fn reachable_nodes(quads: &[Quad], subjects: &[String]) -> BTreeSet<String> {
    let mut nodes: BTreeSet<String> = subjects.iter().cloned().collect();
    let mut pending: Vec<String> = subjects.to_vec();

    while let Some(node) = pending.pop() {
        for quad in quads.iter().filter(|quad| quad.is_about(&node)) {
            if let Term::BlankNode(_) = quad.object {
                if let Some(id) = quad.object.node_id() {
                    if nodes.insert(id.clone()) {
                        pending.push(id);
                    }
                }
            }
        }
    }

    nodes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes;
    use crate::model::ModelRegistry;
    use crate::schema::{FieldCodec, ModelSchema, Timestamps};
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    const URL: &str = "https://pod.example/people/alice#it";

    fn person() -> ModelClass {
        let mut address = BTreeMap::new();
        address.insert("city".to_string(), FieldDefinition::string());
        address.insert("zip".to_string(), FieldDefinition::number());

        let schema = ModelSchema::builder("Person")
            .rdf_context("schema", "https://schema.org/")
            .rdf_class("schema:Person")
            .timestamps(Timestamps::none())
            .field("name", FieldDefinition::string().required())
            .field("age", FieldDefinition::number())
            .field("height", FieldDefinition::number())
            .field("active", FieldDefinition::boolean().default_value(true))
            .field("birthDate", FieldDefinition::date())
            .field("homepage", FieldDefinition::key().rdf_property("schema:url"))
            .field(
                "friendUrls",
                FieldDefinition::array(FieldDefinition::key()).rdf_property("schema:knows"),
            )
            .field("address", FieldDefinition::object(address))
            .build()
            .unwrap();

        ModelRegistry::new().boot(schema).unwrap()
    }

    fn alice(class: &ModelClass) -> Model {
        Model::new(
            class,
            attributes! {
                "url" => AttributeValue::Key(URL.into()),
                "name" => "Alice",
                "age" => 30,
                "height" => 1.68,
                "active" => false,
                "birthDate" => Utc.with_ymd_and_hms(2024, 1, 5, 3, 4, 5).unwrap()
                    + chrono::Duration::milliseconds(6),
                "homepage" => AttributeValue::Key("https://alice.example/".into()),
                "friendUrls" => vec![
                    AttributeValue::Key("https://pod.example/people/bob#it".into()),
                    AttributeValue::Key("https://pod.example/people/carol#it".into()),
                ],
                "address" => attributes! { "city" => "Barcelona", "zip" => 8001 },
            },
        )
        .unwrap()
    }

    mod serialization {
        use super::*;

        #[test]
        fn encoding_table() {
            let class = person();
            let quads = serialize_to_rdf([&alice(&class)]).unwrap();
            let literal = |property: &str| {
                objects(&quads, URL, property)
                    .find_map(Term::as_literal)
                    .cloned()
                    .unwrap()
            };

            assert_eq!(types_of(&quads, URL), vec!["https://schema.org/Person"]);
            assert_eq!(literal("https://schema.org/name"), Literal::string("Alice"));
            assert_eq!(literal("https://schema.org/age"), Literal::typed("30", vocab::XSD_INTEGER));
            assert_eq!(literal("https://schema.org/height"), Literal::typed("1.68", vocab::XSD_DECIMAL));
            assert_eq!(literal("https://schema.org/active"), Literal::typed("false", vocab::XSD_BOOLEAN));
            assert_eq!(
                literal("https://schema.org/birthDate"),
                Literal::typed("2024-01-05T03:04:05.006Z", vocab::XSD_DATE_TIME)
            );
            assert_eq!(
                objects(&quads, URL, "https://schema.org/url").next(),
                Some(&Term::named("https://alice.example/"))
            );
            assert_eq!(objects(&quads, URL, "https://schema.org/knows").count(), 2);
        }

        #[test]
        fn objects_use_blank_nodes() {
            let class = person();
            let quads = serialize_to_rdf([&alice(&class)]).unwrap();

            let node = objects(&quads, URL, "https://schema.org/address")
                .next()
                .and_then(Term::node_id)
                .unwrap();
            assert!(node.starts_with("_:"));
            assert_eq!(
                objects(&quads, &node, "https://schema.org/city").next(),
                Some(&Term::Literal(Literal::string("Barcelona")))
            );
            assert_eq!(reachable_nodes(&quads, &[URL.to_string()]).len(), 2);
        }

        #[test]
        fn requires_url() {
            let class = person();
            let model = Model::new(&class, attributes! { "name" => "Alice" }).unwrap();
            assert!(serialize_to_rdf([&model]).is_err());
        }

        #[test]
        fn codecs_run_before_encoding() {
            fn upper(value: &AttributeValue) -> AttributeValue {
                value.as_str().map(str::to_uppercase).map(Into::into).unwrap_or_else(|| value.clone())
            }
            fn lower(value: &AttributeValue) -> AttributeValue {
                value.as_str().map(str::to_lowercase).map(Into::into).unwrap_or_else(|| value.clone())
            }

            let schema = ModelSchema::builder("Tag")
                .rdf()
                .timestamps(Timestamps::none())
                .field(
                    "label",
                    FieldDefinition::string().codec(FieldCodec { serialize: upper, deserialize: lower }),
                )
                .build()
                .unwrap();
            let class = ModelRegistry::new().boot(schema).unwrap();
            let url = Url::new("https://pod.example/tags#rust").unwrap();

            let tag = Model::new(&class, attributes! { "url" => &url, "label" => "Rust" }).unwrap();
            assert_eq!(tag.get_str("label"), Some("rust"));

            let quads = serialize_to_rdf([&tag]).unwrap();
            assert_eq!(
                quads.iter().find_map(|quad| quad.object.as_literal()),
                Some(&Literal::string("RUST"))
            );
            let read = create_from_rdf(&class, &url, &quads).unwrap();
            assert_eq!(read.get_str("label"), Some("rust"));
        }
    }

    mod deserialization {
        use super::*;

        #[test]
        fn round_trip() {
            let class = person();
            let original = alice(&class);
            let quads = serialize_to_rdf([&original]).unwrap();

            let read = create_from_rdf(&class, &Url::new(URL).unwrap(), &quads).unwrap();
            assert!(read.exists());
            assert_eq!(read.attributes(), original.attributes());
            assert_eq!(read.rdf_types(), vec!["https://schema.org/Person"]);
        }

        #[test]
        fn missing_fields_use_defaults() {
            let class = person();
            let subject = Term::named(URL);
            let quads = vec![Quad::new(subject, "https://schema.org/name", Literal::string("Alice"))];

            let read = create_from_rdf(&class, &Url::new(URL).unwrap(), &quads).unwrap();
            assert_eq!(read.get_bool("active"), Some(true));
            assert!(read.get("age").is_none());
        }

        #[test]
        fn missing_required_field() {
            let class = person();
            let error = create_from_rdf(&class, &Url::new(URL).unwrap(), &[]).unwrap_err();
            match error {
                SoukaiError::InvalidModelAttributes { attributes, .. } => {
                    assert_eq!(attributes, vec!["name".to_string()]);
                }
                other => panic!("unexpected error: {}", other),
            }
        }

        #[test]
        fn single_valued_fields_take_the_first_object() {
            let class = person();
            let subject = Term::named(URL);
            let quads = vec![
                Quad::new(subject.clone(), "https://schema.org/name", Literal::string("Alice")),
                Quad::new(subject, "https://schema.org/name", Literal::string("Alicia")),
            ];
            let read = create_from_rdf(&class, &Url::new(URL).unwrap(), &quads).unwrap();
            assert_eq!(read.get_str("name"), Some("Alice"));
        }

        #[test]
        fn bad_literals() {
            let class = person();
            let subject = Term::named(URL);
            let quads = vec![
                Quad::new(subject.clone(), "https://schema.org/name", Literal::string("Alice")),
                Quad::new(subject, "https://schema.org/age", Literal::typed("old", vocab::XSD_INTEGER)),
            ];
            let error = create_from_rdf(&class, &Url::new(URL).unwrap(), &quads).unwrap_err();
            assert!(matches!(error, SoukaiError::InvalidModelAttributes { .. }));
        }
    }
}
