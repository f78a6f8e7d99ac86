/// Keep only `[A-Za-z0-9_-]`, in order.
///
/// Applied to every hierarchy component before it becomes a topic
/// segment, which keeps `/`, `+`, `#` and whitespace out of the namespace.
/// Names made only of other characters sanitize to the empty string.
pub fn sanitize(raw: &str) -> String {
    raw.chars().filter(|c| is_topic_safe(*c)).collect()
}

fn is_topic_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}
