//! Radio models: immutable descriptors of a supported radio's codeplug layout and behavior.
//!
//! A model is data, not a type: `{id, display_name, family, size, max_channels, band, tree,
//! default_fn, validator_fn, dependency_fn}`. The only dynamic dispatch in this module is the
//! small id-keyed registry map; everything else is the same [`RadioModel`] struct parameterized
//! by a different [`ModelSchema`].

pub mod rdu2020;

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use crate::codeplug::{Codeplug, ValidationIssue};
use crate::error::Error;
use crate::node::{FieldTable, Node};

/// A supported frequency band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    pub name: &'static str,
    pub lower_mhz: f64,
    pub upper_mhz: f64,
    pub spacing_khz: f64,
}

/// The process-lifetime descriptor for one supported radio model.
///
/// `apply_dependencies` and `validate` are plain function pointers rather than a trait object:
/// model behavior is data, and a model with no dependents or no cross-field rules just supplies a
/// no-op function.
pub struct ModelSchema {
    pub id: &'static str,
    pub display_name: &'static str,
    pub family: &'static str,
    pub size_bytes: usize,
    pub max_channels: usize,
    pub band: Band,
    pub tree: Vec<Node>,
    pub apply_dependencies: fn(field_id: &str, cp: &mut Codeplug) -> Result<(), Error>,
    pub validate: fn(cp: &Codeplug) -> Vec<ValidationIssue>,
}

/// A registered radio model: the schema plus its precomputed flat field table.
///
/// Cheap to clone (an `Arc` to shared, immutable data) so a [`Codeplug`] can hold its own
/// `RadioModel` without borrowing from the registry.
#[derive(Clone)]
pub struct RadioModel {
    schema: Arc<ModelSchema>,
    fields: Arc<FieldTable>,
}

impl RadioModel {
    /// Builds a model from its schema, validating every field definition's own invariants and
    /// precomputing the flat `id -> field` table.
    ///
    /// Panics if any field in `schema.tree` fails [`crate::field::FieldDef::validate_self`] — a
    /// schema-authoring bug, not a runtime condition.
    pub fn new(schema: ModelSchema) -> Self {
        let fields = FieldTable::build(&schema.tree);
        for field in fields.iter() {
            field
                .validate_self()
                .unwrap_or_else(|e| panic!("model {:?}: {}", schema.id, e));
        }
        RadioModel {
            schema: Arc::new(schema),
            fields: Arc::new(fields),
        }
    }

    pub fn id(&self) -> &'static str {
        self.schema.id
    }

    pub fn display_name(&self) -> &'static str {
        self.schema.display_name
    }

    pub fn family(&self) -> &'static str {
        self.schema.family
    }

    pub fn band(&self) -> Band {
        self.schema.band
    }

    pub fn max_channels(&self) -> usize {
        self.schema.max_channels
    }

    pub fn image_size(&self) -> usize {
        self.schema.size_bytes
    }

    pub fn fields(&self) -> &FieldTable {
        &self.fields
    }

    pub fn apply_dependencies(&self, field_id: &str, cp: &mut Codeplug) -> Result<(), Error> {
        (self.schema.apply_dependencies)(field_id, cp)
    }

    pub fn validate(&self, cp: &Codeplug) -> Vec<ValidationIssue> {
        (self.schema.validate)(cp)
    }
}

impl std::fmt::Debug for RadioModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RadioModel")
            .field("id", &self.schema.id)
            .field("display_name", &self.schema.display_name)
            .finish()
    }
}

fn registry() -> &'static RwLock<HashMap<&'static str, RadioModel>> {
    static REGISTRY: OnceLock<RwLock<HashMap<&'static str, RadioModel>>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut map = HashMap::new();
        register_builtin_models(&mut map);
        RwLock::new(map)
    })
}

fn register_builtin_models(map: &mut HashMap<&'static str, RadioModel>) {
    let model = RadioModel::new(rdu2020::Rdu2020::schema());
    map.insert(model.id(), model);
}

/// Looks up a registered model by id.
pub fn model(id: &str) -> Result<RadioModel, Error> {
    registry()
        .read()
        .unwrap()
        .get(id)
        .cloned()
        .ok_or_else(|| Error::UnknownModel(id.to_string()))
}

/// Every registered model id, in no particular order.
pub fn all_ids() -> Vec<&'static str> {
    registry().read().unwrap().keys().copied().collect()
}

/// Registered model ids grouped by family tag.
pub fn by_family() -> HashMap<&'static str, Vec<&'static str>> {
    let mut out: HashMap<&'static str, Vec<&'static str>> = HashMap::new();
    for model in registry().read().unwrap().values() {
        out.entry(model.family()).or_default().push(model.id());
    }
    out
}

/// Registers (or replaces) a model. Exposed so embedders can add models beyond the built-in set;
/// idempotent by id.
pub fn register(schema: ModelSchema) {
    let model = RadioModel::new(schema);
    registry().write().unwrap().insert(model.id(), model);
}

/// Builds a default codeplug for the registered model `id`.
pub fn create_default_codeplug(id: &str) -> Result<Codeplug, Error> {
    Codeplug::from_defaults(model(id)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rdu2020_is_registered_at_init() {
        assert!(all_ids().contains(&"RDU2020"));
        let m = model("RDU2020").unwrap();
        assert_eq!(m.image_size(), 4096);
    }

    #[test]
    fn unknown_model_is_rejected() {
        assert!(matches!(model("NOPE"), Err(Error::UnknownModel(_))));
    }

    #[test]
    fn register_is_idempotent_by_id() {
        let before = all_ids().len();
        register(rdu2020::Rdu2020::schema());
        assert_eq!(all_ids().len(), before);
    }
}
