//! Finalizer list helpers.
//!
//! Pure operations over `metadata.finalizers`; persisting the result is the
//! reconciler's job.

use crds::Subprocess;
use kube::ResourceExt;

/// Check whether the Subprocess carries `finalizer`
pub fn has_finalizer(subprocess: &Subprocess, finalizer: &str) -> bool {
    subprocess.finalizers().iter().any(|f| f == finalizer)
}

/// Finalizer list with `finalizer` appended, or `None` if already present
pub fn with_finalizer(subprocess: &Subprocess, finalizer: &str) -> Option<Vec<String>> {
    if has_finalizer(subprocess, finalizer) {
        return None;
    }
    let mut finalizers = subprocess.finalizers().to_vec();
    finalizers.push(finalizer.to_string());
    Some(finalizers)
}

/// Finalizer list with every occurrence of `finalizer` removed, or `None` if absent
pub fn without_finalizer(subprocess: &Subprocess, finalizer: &str) -> Option<Vec<String>> {
    if !has_finalizer(subprocess, finalizer) {
        return None;
    }
    Some(
        subprocess
            .finalizers()
            .iter()
            .filter(|f| *f != finalizer)
            .cloned()
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_subprocess;

    const MARKER: &str = "webapp.my.domain/finalizer";

    #[test]
    fn test_with_finalizer_is_idempotent() {
        let mut subprocess = create_test_subprocess("demo", "default", &["true"], 1);
        let finalizers = with_finalizer(&subprocess, MARKER).unwrap();
        assert_eq!(finalizers, vec![MARKER.to_string()]);

        subprocess.metadata.finalizers = Some(finalizers);
        assert!(has_finalizer(&subprocess, MARKER));
        assert_eq!(with_finalizer(&subprocess, MARKER), None);
    }

    #[test]
    fn test_without_finalizer_keeps_foreign_markers() {
        let mut subprocess = create_test_subprocess("demo", "default", &["true"], 1);
        subprocess.metadata.finalizers = Some(vec![
            "other.io/protect".to_string(),
            MARKER.to_string(),
        ]);
        assert_eq!(
            without_finalizer(&subprocess, MARKER),
            Some(vec!["other.io/protect".to_string()])
        );

        subprocess.metadata.finalizers = Some(vec!["other.io/protect".to_string()]);
        assert_eq!(without_finalizer(&subprocess, MARKER), None);
    }
}
