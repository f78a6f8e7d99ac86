// ── Legacy properties files ──
//
// `key=value` per line, `#` starts a comment line. Everything after the
// first `=` is the value. Lines without a key are ignored.

use std::collections::BTreeMap;

/// Parse properties text into a flat key/value map. Later keys win.
pub fn parse(text: &str) -> BTreeMap<String, String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let (key, value) = line.split_once('=')?;
            let key = key.trim();
            (!key.is_empty()).then(|| (key.to_owned(), value.trim().to_owned()))
        })
        .collect()
}
