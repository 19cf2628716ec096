use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use uuid::Uuid;

/// Identifier of an execution job.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(transparent))]
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct JobId(pub String);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Identifier of an authored flow.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(transparent))]
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct FlowId(pub String);

impl FlowId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FlowId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown plan tier '{0}'")]
pub struct UnknownPlanTier(pub String);

/// Subscription tier of the caller; carried per request, never held globally.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(rename_all = "snake_case"))]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum PlanTier {
    #[default]
    Free,
    Premium,
}

impl PlanTier {
    pub fn as_str(self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Premium => "premium",
        }
    }
}

impl FromStr for PlanTier {
    type Err = UnknownPlanTier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" | "" => Ok(PlanTier::Free),
            "premium" => Ok(PlanTier::Premium),
            other => Err(UnknownPlanTier(other.to_string())),
        }
    }
}

/// Caller capability passed explicitly into every submission.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RequestContext {
    pub tenant: String,
    pub plan: PlanTier,
}

impl RequestContext {
    pub fn new(tenant: impl Into<String>, plan: PlanTier) -> Self {
        Self {
            tenant: tenant.into(),
            plan,
        }
    }

    pub fn anonymous() -> Self {
        Self::new("anonymous", PlanTier::Free)
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::anonymous()
    }
}

impl fmt::Display for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tenant={} plan={}", self.tenant, self.plan.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_ids_are_unique() {
        assert_ne!(JobId::new(), JobId::new());
    }

    #[test]
    fn plan_tier_parses_case_insensitively() {
        assert_eq!("Premium".parse::<PlanTier>().unwrap(), PlanTier::Premium);
        assert_eq!("".parse::<PlanTier>().unwrap(), PlanTier::Free);
        assert!("gold".parse::<PlanTier>().is_err());
    }

    #[test]
    fn context_display_includes_tenant_and_plan() {
        let ctx = RequestContext::new("acme", PlanTier::Premium);
        assert_eq!(ctx.to_string(), "tenant=acme plan=premium");
    }
}
