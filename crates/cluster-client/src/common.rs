//! Common types shared by the real and mock clients

use kube::ResourceExt;
use std::collections::BTreeMap;
use std::fmt;

/// Identity of a namespaced object in the store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    /// Create a key from namespace and name
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of an object read from the store
    ///
    /// Returns `None` for objects without a name or namespace.
    pub fn for_resource<K: ResourceExt>(resource: &K) -> Option<Self> {
        let name = resource.meta().name.clone()?;
        let namespace = resource.namespace()?;
        Some(Self { namespace, name })
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Render equality requirements as a Kubernetes label selector string
///
/// `[("owner", "demo"), ("app", "supervisor")]` becomes `owner=demo,app=supervisor`.
pub fn label_selector(labels: &[(&str, &str)]) -> String {
    labels
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Check whether an object's labels satisfy all equality requirements
pub fn matches_labels(labels: Option<&BTreeMap<String, String>>, selector: &[(&str, &str)]) -> bool {
    selector.iter().all(|(key, value)| {
        labels
            .and_then(|labels| labels.get(*key))
            .is_some_and(|actual| actual == value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_selector() {
        assert_eq!(label_selector(&[("owner", "demo")]), "owner=demo");
        assert_eq!(
            label_selector(&[("owner", "demo"), ("app", "supervisor")]),
            "owner=demo,app=supervisor"
        );
        assert_eq!(label_selector(&[]), "");
    }

    #[test]
    fn test_matches_labels() {
        let labels: BTreeMap<String, String> = [
            ("owner".to_string(), "demo".to_string()),
            ("app".to_string(), "supervisor".to_string()),
        ]
        .into_iter()
        .collect();

        assert!(matches_labels(Some(&labels), &[("owner", "demo")]));
        assert!(matches_labels(Some(&labels), &[]));
        assert!(!matches_labels(Some(&labels), &[("owner", "other")]));
        assert!(!matches_labels(Some(&labels), &[("tier", "web")]));
        assert!(!matches_labels(None, &[("owner", "demo")]));
    }

    #[test]
    fn test_object_key_display() {
        assert_eq!(ObjectKey::new("default", "demo").to_string(), "default/demo");
    }
}
