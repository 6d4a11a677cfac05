//! Scope-string grammar.
//!
//! A scope is a capability identifier such as `payments:initiate`, optionally
//! carrying a trailing numeric constraint (`payments:initiate:max_500`).
//! Containment and subset checks compare base scopes; the constraint is
//! opaque here and interpreted only by downstream resource adapters.

/// Strip a trailing `:max_<N>` / `:min_<N>` / `:limit_<N>` constraint, if any.
pub fn base(scope: &str) -> &str {
    let Some(idx) = scope.rfind(':') else {
        return scope;
    };
    let suffix = &scope[idx + 1..];
    let constrained = ["max_", "min_", "limit_"].iter().any(|prefix| {
        suffix
            .strip_prefix(prefix)
            .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
    });
    if constrained {
        &scope[..idx]
    } else {
        scope
    }
}

/// Check that every requested scope's base is covered by the allowed set.
///
/// Returns the offending scopes on failure so callers can name the violation.
pub fn contains_all<'a>(allowed: &[String], requested: &'a [String]) -> Result<(), Vec<&'a str>> {
    let allowed_bases: Vec<&str> = allowed.iter().map(|s| base(s)).collect();
    let exceeded: Vec<&str> = requested
        .iter()
        .map(|s| s.as_str())
        .filter(|s| !allowed_bases.contains(&base(s)))
        .collect();
    if exceeded.is_empty() {
        Ok(())
    } else {
        Err(exceeded)
    }
}
