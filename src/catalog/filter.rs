//! Layer admission policy.
//!
//! Tables pass through an include/exclude pair keyed on the public layer
//! name. Functions are only ever admitted from explicitly trusted schemas:
//! table-valued functions execute arbitrary SQL, so an unlisted schema is
//! never exposed no matter what it contains.

use tracing::warn;

/// Immutable admission rules, fixed at catalog build time.
#[derive(Debug, Clone, Default)]
pub struct FilterPolicy {
    table_includes: Vec<String>,
    table_excludes: Vec<String>,
    function_schemas: Vec<String>,
}

impl FilterPolicy {
    /// Builds the policy and resolves the one contradictory input up
    /// front: a non-empty include list is a complete enumeration, so a
    /// simultaneous exclude list cannot also apply. Includes win.
    pub fn new(
        table_includes: Vec<String>,
        table_excludes: Vec<String>,
        function_schemas: Vec<String>,
    ) -> Self {
        if !table_includes.is_empty() && !table_excludes.is_empty() {
            warn!(
                includes = table_includes.len(),
                excludes = table_excludes.len(),
                "both table_includes and table_excludes are set; exclude list is ignored"
            );
        }
        Self {
            table_includes,
            table_excludes,
            function_schemas,
        }
    }

    /// Whether a table layer with this public name may be served.
    pub fn admits_table(&self, name: &str) -> bool {
        if !self.table_includes.is_empty() {
            return self.table_includes.iter().any(|inc| inc == name);
        }
        !self.table_excludes.iter().any(|exc| exc == name)
    }

    /// Whether function layers may be discovered from this schema.
    pub fn admits_function_schema(&self, schema: &str) -> bool {
        self.function_schemas.iter().any(|s| s == schema)
    }

    pub fn function_schemas(&self) -> &[String] {
        &self.function_schemas
    }
}

impl From<&crate::config::DatabaseSettings> for FilterPolicy {
    fn from(settings: &crate::config::DatabaseSettings) -> Self {
        Self::new(
            settings.table_includes.clone(),
            settings.table_excludes.clone(),
            settings.function_includes.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_policy_admits_everything() {
        let policy = FilterPolicy::default();
        assert!(policy.admits_table("roads"));
        assert!(policy.admits_table("archive.parcels"));
    }

    #[test]
    fn include_list_is_a_complete_enumeration() {
        let policy = FilterPolicy::new(list(&["roads", "rivers"]), vec![], vec![]);
        assert!(policy.admits_table("roads"));
        assert!(policy.admits_table("rivers"));
        assert!(!policy.admits_table("parcels"));
    }

    #[test]
    fn exclude_list_subtracts_from_the_full_set() {
        let policy = FilterPolicy::new(vec![], list(&["secrets"]), vec![]);
        assert!(policy.admits_table("roads"));
        assert!(!policy.admits_table("secrets"));
    }

    #[test]
    fn includes_win_when_both_are_set() {
        let policy = FilterPolicy::new(list(&["a", "b"]), list(&["b"]), vec![]);
        assert!(policy.admits_table("a"));
        assert!(policy.admits_table("b"), "exclude list must be ignored");
        assert!(!policy.admits_table("c"));
    }

    #[test]
    fn function_schemas_are_a_strict_allowlist() {
        let policy = FilterPolicy::new(vec![], vec![], list(&["postgisftw"]));
        assert!(policy.admits_function_schema("postgisftw"));
        assert!(!policy.admits_function_schema("main"));

        let closed = FilterPolicy::default();
        assert!(!closed.admits_function_schema("postgisftw"));
    }
}
