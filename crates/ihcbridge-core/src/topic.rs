use crate::config::DEFAULT_TOPIC_PREFIX;
use crate::model::HierarchyPath;

const STATE_SUFFIX: &str = "state";
const COMMAND_SUFFIX: &str = "command";

/// Builds state and command topics under one prefix.
///
/// The prefix is used verbatim and may contain `/` to nest the namespace.
/// Path components are expected to be sanitized already.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicNamespace {
    prefix: String,
}

impl TopicNamespace {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// `<prefix>/<group>/<product>/<point>/state`
    pub fn state_topic(&self, path: &HierarchyPath) -> String {
        self.topic(path, STATE_SUFFIX)
    }

    /// `<prefix>/<group>/<product>/<point>/command`
    pub fn command_topic(&self, path: &HierarchyPath) -> String {
        self.topic(path, COMMAND_SUFFIX)
    }

    fn topic(&self, path: &HierarchyPath, suffix: &str) -> String {
        format!(
            "{}/{}/{}/{}/{suffix}",
            self.prefix, path.group, path.product, path.point
        )
    }
}

impl Default for TopicNamespace {
    fn default() -> Self {
        Self::new(DEFAULT_TOPIC_PREFIX)
    }
}
