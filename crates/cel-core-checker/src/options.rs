//! Checker configuration.

/// Options controlling a [`TypeChecker`](crate::TypeChecker).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckerOptions {
    /// Allow `null` to be assigned to and from messages, durations,
    /// timestamps, `any`, opaque and optional types.
    pub enable_legacy_null_assignment: bool,
    /// Upper bound on the nodes visited by one check.
    pub max_expression_node_count: usize,
    /// Checking stops once more than this many errors have been reported.
    pub max_error_issues: usize,
    /// Write fully qualified message names into checked struct literals.
    pub update_struct_type_names: bool,
}

impl Default for CheckerOptions {
    fn default() -> Self {
        Self {
            enable_legacy_null_assignment: true,
            max_expression_node_count: 100_000,
            max_error_issues: 20,
            update_struct_type_names: true,
        }
    }
}

impl CheckerOptions {
    pub fn with_legacy_null_assignment(mut self, enabled: bool) -> Self {
        self.enable_legacy_null_assignment = enabled;
        self
    }

    pub fn with_max_expression_node_count(mut self, count: usize) -> Self {
        self.max_expression_node_count = count;
        self
    }

    pub fn with_max_error_issues(mut self, count: usize) -> Self {
        self.max_error_issues = count;
        self
    }

    pub fn with_update_struct_type_names(mut self, enabled: bool) -> Self {
        self.update_struct_type_names = enabled;
        self
    }
}
