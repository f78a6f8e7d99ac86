// ── Bindings and the bridge table ──

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use serde::Serialize;
use strum::{Display, EnumString};

use super::resource_id::{ResourceId, ResourceRef};
use crate::error::CoreError;

/// Sanitized (group, product, point) naming triple.
///
/// Components may be empty after sanitization. Such paths still produce
/// topics and may collide with other bindings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct HierarchyPath {
    pub group: String,
    /// `"{name}-{position}"`, sanitized as a whole.
    pub product: String,
    pub point: String,
}

impl HierarchyPath {
    pub fn new(
        group: impl Into<String>,
        product: impl Into<String>,
        point: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            product: product.into(),
            point: point.into(),
        }
    }
}

/// Which way values flow for one binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Direction {
    /// Output point: state is published and commands are accepted.
    Bidirectional,
    /// Input point: state is published only.
    PublishOnly,
}

/// One controller resource and the topics it is bridged to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Binding {
    pub resource: ResourceRef,
    pub path: HierarchyPath,
    pub direction: Direction,
    pub state_topic: String,
    /// Present only for bidirectional bindings while commands are enabled.
    pub command_topic: Option<String>,
}

impl Binding {
    pub fn id(&self) -> ResourceId {
        self.resource.id
    }
}

/// All bindings of one project, in document order, indexed by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BridgeTable {
    bindings: Vec<Binding>,
    by_id: HashMap<ResourceId, usize>,
}

impl BridgeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a binding, refusing a resource id that is already present.
    pub fn push(&mut self, binding: Binding) -> Result<(), CoreError> {
        match self.by_id.entry(binding.id()) {
            Entry::Occupied(_) => Err(CoreError::DuplicateResourceId {
                raw: binding.resource.raw,
                id: binding.resource.id.get(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(self.bindings.len());
                self.bindings.push(binding);
                Ok(())
            }
        }
    }

    pub fn get(&self, id: ResourceId) -> Option<&Binding> {
        self.by_id.get(&id).map(|&idx| &self.bindings[idx])
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Binding> {
        self.bindings.iter()
    }

    pub fn as_slice(&self) -> &[Binding] {
        &self.bindings
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Bindings that accept commands.
    pub fn command_bindings(&self) -> impl Iterator<Item = &Binding> {
        self.bindings.iter().filter(|b| b.command_topic.is_some())
    }
}

impl<'a> IntoIterator for &'a BridgeTable {
    type Item = &'a Binding;
    type IntoIter = std::slice::Iter<'a, Binding>;

    fn into_iter(self) -> Self::IntoIter {
        self.bindings.iter()
    }
}
