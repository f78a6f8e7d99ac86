// Runtime values reported by the ResourceInteractionService.

use roxmltree::{Document, Node};
use tracing::trace;

use crate::soap::child_element;

/// A typed runtime value as the controller reports it.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    /// Any value type the bridge does not interpret (timers, dates, enums...).
    /// Carries the `xsi:type` name.
    Other(String),
}

impl RuntimeValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

/// One `(resource, value)` pair from a notification batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceValue {
    pub resource_id: u32,
    pub value: RuntimeValue,
}

/// Extract every `arrayItem` carrying a `resourceID` and a typed `value`.
///
/// Items the controller sends without an id are skipped.
pub(crate) fn parse_value_items(doc: &Document<'_>) -> Vec<ResourceValue> {
    doc.descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "arrayItem")
        .filter_map(|item| {
            let id = child_element(item, "resourceID")
                .and_then(|n| n.text())
                .and_then(|t| t.trim().parse::<u32>().ok());
            let Some(resource_id) = id else {
                trace!("skipping arrayItem without a resourceID");
                return None;
            };
            let value = child_element(item, "value").map_or_else(
                || RuntimeValue::Other(String::new()),
                parse_typed_value,
            );
            Some(ResourceValue { resource_id, value })
        })
        .collect()
}

fn parse_typed_value(node: Node<'_, '_>) -> RuntimeValue {
    let type_name = node
        .attributes()
        .find(|a| a.name() == "type")
        .map(|a| a.value().rsplit(':').next().unwrap_or_default())
        .unwrap_or_default();

    let inner = |local: &str| {
        child_element(node, local)
            .and_then(|n| n.text())
            .map(str::trim)
    };

    match type_name {
        "WSBooleanValue" => match inner("value") {
            Some("true") => RuntimeValue::Bool(true),
            Some("false") => RuntimeValue::Bool(false),
            _ => RuntimeValue::Other(type_name.to_owned()),
        },
        "WSIntegerValue" => inner("integer")
            .and_then(|t| t.parse().ok())
            .map_or_else(|| RuntimeValue::Other(type_name.to_owned()), RuntimeValue::Integer),
        "WSFloatingPointValue" => inner("floatingPointValue")
            .and_then(|t| t.parse().ok())
            .map_or_else(|| RuntimeValue::Other(type_name.to_owned()), RuntimeValue::Float),
        other => RuntimeValue::Other(other.to_owned()),
    }
}
