//! # grantd-policy
//!
//! Pure policy evaluation for authorization requests, plus the scope-string
//! grammar shared by policy matching and delegation subset checks.
//!
//! Policies are evaluated in the order supplied; the first policy whose every
//! condition matches decides the outcome. Callers are expected to pre-sort
//! deterministically (priority descending, then creation order) so that
//! evaluation is stable under equal priorities.

pub mod scope;

use chrono::{Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The outcome a policy forces when it matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    Allow,
    Deny,
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Effect::Allow => write!(f, "allow"),
            Effect::Deny => write!(f, "deny"),
        }
    }
}

#[derive(Debug, Error)]
#[error("invalid policy effect: {0:?} (expected \"allow\" or \"deny\")")]
pub struct ParseEffectError(pub String);

impl FromStr for Effect {
    type Err = ParseEffectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allow" => Ok(Effect::Allow),
            "deny" => Ok(Effect::Deny),
            other => Err(ParseEffectError(other.to_string())),
        }
    }
}

/// A single authorization policy rule.
///
/// Unset condition fields are wildcards. The time-of-day window only applies
/// when both bounds are present; bounds are UTC `HH:MM` strings and the
/// window is half-open `[start, end)`, wrapping midnight when `start > end`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub id: String,
    pub effect: Effect,
    pub priority: i64,
    pub agent_id: Option<String>,
    pub principal_id: Option<String>,
    pub scopes: Option<Vec<String>>,
    pub time_of_day_start: Option<String>,
    pub time_of_day_end: Option<String>,
}

/// The request under evaluation.
#[derive(Debug, Clone)]
pub struct RequestContext<'a> {
    pub agent_id: &'a str,
    pub principal_id: &'a str,
    pub scopes: &'a [String],
    /// Current UTC time as `HH:MM`; injectable for tests. `None` uses the
    /// wall clock.
    pub now_hhmm: Option<&'a str>,
}

/// Return the effect of the first matching policy, or `None` when no policy
/// matches and the caller should fall through to the normal consent flow.
pub fn evaluate(policies: &[Policy], ctx: &RequestContext<'_>) -> Option<Effect> {
    let now = match ctx.now_hhmm {
        Some(t) => t.to_string(),
        None => utc_hhmm(),
    };

    policies
        .iter()
        .find(|policy| matches(policy, ctx, &now))
        .map(|policy| policy.effect)
}

fn matches(policy: &Policy, ctx: &RequestContext<'_>, now_hhmm: &str) -> bool {
    if let Some(agent_id) = &policy.agent_id {
        if agent_id != ctx.agent_id {
            return false;
        }
    }

    if let Some(principal_id) = &policy.principal_id {
        if principal_id != ctx.principal_id {
            return false;
        }
    }

    if let Some(allowed) = &policy.scopes {
        if scope::contains_all(allowed, ctx.scopes).is_err() {
            return false;
        }
    }

    if let (Some(start), Some(end)) = (&policy.time_of_day_start, &policy.time_of_day_end) {
        if !in_window(now_hhmm, start, end) {
            return false;
        }
    }

    true
}

/// `[start, end)` window test on zero-padded `HH:MM` strings; `start > end`
/// wraps midnight (e.g. 22:00–06:00).
fn in_window(now: &str, start: &str, end: &str) -> bool {
    if start <= end {
        now >= start && now < end
    } else {
        now >= start || now < end
    }
}

fn utc_hhmm() -> String {
    let now = Utc::now();
    format!("{:02}:{:02}", now.hour(), now.minute())
}
