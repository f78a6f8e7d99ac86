// ── Domain model ──
//
// Resource identifiers and the bridge table derived from a project
// description. These types carry no I/O.

pub mod binding;
pub mod resource_id;

pub use binding::{Binding, BridgeTable, Direction, HierarchyPath};
pub use resource_id::{ResourceId, ResourceRef};
