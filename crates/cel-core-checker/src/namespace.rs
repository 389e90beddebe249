//! Candidate name generation for container-relative resolution.
//!
//! Within container `a.b.c`, the name `x` may refer to `a.b.c.x`, `a.b.x`,
//! `a.x` or `x`, tried in that order. A leading `.` makes a name
//! root-relative and disables the expansion.

use thiserror::Error;

/// Errors raised for a malformed container name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NamespaceError {
    #[error("container name must not begin with a '.': '{0}'")]
    LeadingDot(String),
    #[error("invalid segment '{segment}' in container '{container}'")]
    InvalidSegment { container: String, segment: String },
}

/// Generates the fully qualified names a reference may denote.
#[derive(Debug, Clone, Default)]
pub struct NamespaceGenerator {
    container: String,
    /// Container prefixes, most specific first.
    prefixes: Vec<String>,
}

impl NamespaceGenerator {
    /// Validate `container` and precompute its prefixes.
    pub fn new(container: &str) -> Result<Self, NamespaceError> {
        if container.is_empty() {
            return Ok(Self::default());
        }
        if container.starts_with('.') {
            return Err(NamespaceError::LeadingDot(container.to_string()));
        }

        let segments: Vec<&str> = container.split('.').collect();
        if let Some(bad) = segments.iter().find(|s| !is_identifier(s)) {
            return Err(NamespaceError::InvalidSegment {
                container: container.to_string(),
                segment: bad.to_string(),
            });
        }

        let prefixes = (1..=segments.len())
            .rev()
            .map(|n| segments[..n].join("."))
            .collect();
        Ok(Self {
            container: container.to_string(),
            prefixes,
        })
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    /// Call `f` with every candidate for `name`, most specific first.
    ///
    /// Stops as soon as `f` returns false.
    pub fn generate_candidates(&self, name: &str, mut f: impl FnMut(&str) -> bool) {
        if let Some(root_relative) = name.strip_prefix('.') {
            f(root_relative);
            return;
        }
        for prefix in &self.prefixes {
            if !f(&format!("{}.{}", prefix, name)) {
                return;
            }
        }
        f(name);
    }

    /// Call `f` with every candidate for a dotted name given as segments.
    ///
    /// For each container prefix, the longest qualified form is tried first,
    /// then shorter ones. `f` also receives the index of the last segment
    /// included in the candidate. Stops as soon as `f` returns false.
    pub fn generate_candidates_qualified(
        &self,
        qualifiers: &[String],
        mut f: impl FnMut(&str, usize) -> bool,
    ) {
        let Some(first) = qualifiers.first() else {
            return;
        };

        if let Some(root_relative) = first.strip_prefix('.') {
            for last in (0..qualifiers.len()).rev() {
                let candidate = join_segments(root_relative, &qualifiers[1..=last]);
                if !f(&candidate, last) {
                    return;
                }
            }
            return;
        }

        for prefix in &self.prefixes {
            for last in (0..qualifiers.len()).rev() {
                let candidate = format!(
                    "{}.{}",
                    prefix,
                    join_segments(first, &qualifiers[1..=last])
                );
                if !f(&candidate, last) {
                    return;
                }
            }
        }
        for last in (0..qualifiers.len()).rev() {
            if !f(&join_segments(first, &qualifiers[1..=last]), last) {
                return;
            }
        }
    }
}

fn join_segments(first: &str, rest: &[String]) -> String {
    let mut joined = first.to_string();
    for segment in rest {
        joined.push('.');
        joined.push_str(segment);
    }
    joined
}

fn is_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
