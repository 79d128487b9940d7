//! Host-supplied capabilities
//!
//! The host can substitute already computed values for selectors ([`Filter`])
//! and post-process extracted strings through named transforms ([`Template`]).
//! Plain closures implement both traits.

/// Substitutes a value for a selector before it is interpreted
pub trait Filter: Send + Sync {
    /// `Some(value)` when the host recognises `selector`
    fn filter(&self, selector: &str) -> Option<String>;
}

/// Named post-processing transform applied to extracted strings
pub trait Template: Send + Sync {
    fn apply(&self, name: &str, value: &str) -> String;
}

/// Filter that never matches
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFilter;

impl Filter for NoFilter {
    fn filter(&self, _selector: &str) -> Option<String> {
        None
    }
}

/// Template that returns its input unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTemplate;

impl Template for IdentityTemplate {
    fn apply(&self, _name: &str, value: &str) -> String {
        value.to_string()
    }
}

impl<F> Filter for F
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    fn filter(&self, selector: &str) -> Option<String> {
        self(selector)
    }
}

impl<F> Template for F
where
    F: Fn(&str, &str) -> String + Send + Sync,
{
    fn apply(&self, name: &str, value: &str) -> String {
        self(name, value)
    }
}
