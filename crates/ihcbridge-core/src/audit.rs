// ── Mapping log ──
//
// Flat text record of which resource went to which topic, rewritten on
// every controller attachment. One line per topic:
// `<raw-id>, <numeric-id>, <topic>`.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::debug;

use crate::error::CoreError;
use crate::model::BridgeTable;

/// Render the mapping log: the state line of every binding, each followed
/// by its command line when it has one.
pub fn render_mapping(table: &BridgeTable) -> String {
    let mut out = String::new();
    for binding in table {
        let topics = std::iter::once(&binding.state_topic).chain(binding.command_topic.as_ref());
        for topic in topics {
            out.push_str(&format!(
                "{}, {}, {topic}\n",
                binding.resource.raw, binding.resource.id
            ));
        }
    }
    out
}

/// Create or truncate `path` and write the mapping for `table` into it.
pub fn write_mapping_log(path: &Path, table: &BridgeTable) -> Result<(), CoreError> {
    let wrap = |source| CoreError::AuditLogWrite {
        path: path.to_path_buf(),
        source,
    };

    let mut file = BufWriter::new(File::create(path).map_err(wrap)?);
    file.write_all(render_mapping(table).as_bytes())
        .map_err(wrap)?;
    file.flush().map_err(wrap)?;

    debug!(path = %path.display(), bindings = table.len(), "mapping log written");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::project::extract_bindings;
    use crate::topic::TopicNamespace;

    const XML: &str = r#"<group name="Hall"><product_dataline name="Relay" position="3">
        <dataline_input name="Door" id="I0F"/>
        <dataline_output name="Light" id="O1A"/>
    </product_dataline></group>"#;

    #[test]
    fn command_line_follows_its_state_line() {
        let table = extract_bindings(XML, &TopicNamespace::default(), true).unwrap();
        insta::assert_snapshot!(render_mapping(&table), @r"
        O1A, 26, house/Hall/Relay-3/Light/state
        O1A, 26, house/Hall/Relay-3/Light/command
        I0F, 15, house/Hall/Relay-3/Door/state
        ");
    }

    #[test]
    fn write_truncates_previous_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.txt");
        std::fs::write(&path, "stale line\nstale line\nstale line\nstale line\n").unwrap();

        let table = extract_bindings(XML, &TopicNamespace::new("h"), false).unwrap();
        write_mapping_log(&path, &table).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            written,
            "O1A, 26, h/Hall/Relay-3/Light/state\nI0F, 15, h/Hall/Relay-3/Door/state\n"
        );
    }

    #[test]
    fn unwritable_path_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("map.txt");
        let err = write_mapping_log(&path, &BridgeTable::new()).unwrap_err();
        assert!(matches!(err, CoreError::AuditLogWrite { path: ref p, .. } if *p == path));
    }
}
