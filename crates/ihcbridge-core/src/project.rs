// ── Project description extraction ──
//
// Walks the controller's project XML (group → product_dataline →
// dataline_output / dataline_input) and flattens it into a BridgeTable.
// Extraction is all-or-nothing: any structural error discards the table.

use roxmltree::{Document, Node, ParsingOptions};

use crate::error::CoreError;
use crate::model::{Binding, BridgeTable, Direction, HierarchyPath, ResourceRef};
use crate::sanitize::sanitize;
use crate::topic::TopicNamespace;

const GROUP: &str = "group";
const PRODUCT: &str = "product_dataline";
const OUTPUT: &str = "dataline_output";
const INPUT: &str = "dataline_input";

/// Parse `xml` and build the bridge table for it.
///
/// Command topics are assigned to output points only when
/// `commands_enabled` is set, i.e. when a broker is attached.
pub fn extract_bindings(
    xml: &str,
    namespace: &TopicNamespace,
    commands_enabled: bool,
) -> Result<BridgeTable, CoreError> {
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    let doc = Document::parse_with_options(xml, options).map_err(|e| {
        CoreError::MalformedProject {
            reason: e.to_string(),
        }
    })?;

    let mut table = BridgeTable::new();
    for group in doc.descendants().filter(|n| is_element(*n, GROUP)) {
        let group_name = sanitize(required(group, "name")?);

        for product in owned_descendants(group, PRODUCT, GROUP) {
            let product_name = sanitize(&format!(
                "{}-{}",
                required(product, "name")?,
                required(product, "position")?
            ));

            let outputs = owned_descendants(product, OUTPUT, PRODUCT)
                .map(|n| (n, Direction::Bidirectional));
            let inputs = owned_descendants(product, INPUT, PRODUCT)
                .map(|n| (n, Direction::PublishOnly));
            let points = outputs.chain(inputs);

            for (point, direction) in points {
                let resource = ResourceRef::parse(required(point, "id")?)?;
                let path = HierarchyPath::new(
                    group_name.clone(),
                    product_name.clone(),
                    sanitize(required(point, "name")?),
                );
                let command_topic = (commands_enabled && direction == Direction::Bidirectional)
                    .then(|| namespace.command_topic(&path));
                table.push(Binding {
                    state_topic: namespace.state_topic(&path),
                    command_topic,
                    resource,
                    path,
                    direction,
                })?;
            }
        }
    }

    Ok(table)
}

fn is_element(node: Node<'_, '_>, name: &str) -> bool {
    node.is_element() && node.tag_name().name() == name
}

/// Descendants of `root` named `name` whose nearest `owner`-named ancestor
/// is `root` itself.
fn owned_descendants<'a, 'input: 'a>(
    root: Node<'a, 'input>,
    name: &'static str,
    owner: &'static str,
) -> impl Iterator<Item = Node<'a, 'input>> {
    root.descendants().skip(1).filter(move |n| {
        is_element(*n, name)
            && n.ancestors()
                .skip(1)
                .find(|a| is_element(*a, owner))
                .is_some_and(|a| a == root)
    })
}

fn required<'a>(node: Node<'a, '_>, attribute: &'static str) -> Result<&'a str, CoreError> {
    node.attribute(attribute)
        .ok_or_else(|| CoreError::MalformedProjectNode {
            node: node.tag_name().name().to_owned(),
            attribute,
        })
}
