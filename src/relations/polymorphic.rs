//! relations::polymorphic
//!
//! Picking among `belongsToOne` relations that share a foreign key.
//!
//! When several relations store their key in the same field, the key alone
//! does not say which class it points to. The referenced resource's RDF
//! types do: among the sibling relations whose related class declares only
//! types the resource has, the most specific one (declaring the most of
//! them) wins, with ties going to the first in name order. If that is not
//! the relation being loaded, or nothing matches, the relation resolves
//! empty.

use tracing::trace;

use super::RelationKind;
use crate::core::types::Url;
use crate::errors::Result;
use crate::model::{Model, ModelClass};
use crate::rdf::term::types_of;

/// Resolve relation `name` of `owner` for the resource at `key`.
pub(crate) async fn resolve_polymorphic(owner: &Model, name: &str, key: &str) -> Result<Option<Model>> {
    let schema = owner.schema();
    let Some(declaration) = schema.relation(name) else {
        return Ok(None);
    };
    let Some(foreign_key) = declaration.foreign_key.as_deref() else {
        return Ok(None);
    };

    let url = Url::new(key)?;
    let related_class = owner.class().resolve(&declaration.related)?;
    let Some(quads) = related_class.read_quads(&url).await? else {
        return Ok(None);
    };
    let types = types_of(&quads, url.as_str());

    let mut best: Option<(&str, ModelClass, usize)> = None;
    for (sibling, sibling_declaration) in schema.relations_with_foreign_key(foreign_key) {
        if sibling_declaration.kind != RelationKind::BelongsToOne {
            continue;
        }
        let class = owner.class().resolve(&sibling_declaration.related)?;
        let classes = class.schema().rdf_classes();
        if classes.is_empty() || !classes.iter().all(|class| types.contains(&class.as_str())) {
            continue;
        }

        let matched = classes.len();
        if best.as_ref().map_or(true, |(_, _, most)| matched > *most) {
            best = Some((sibling, class, matched));
        }
    }

    let Some((sibling, class, _)) = best else {
        trace!(relation = name, %url, "no polymorphic match");
        return Ok(None);
    };

    trace!(relation = name, matched = sibling, %url, "polymorphic match");
    if sibling != name {
        return Ok(None);
    }
    class.from_quads(&url, &quads).map(Some)
}
