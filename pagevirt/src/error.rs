use crate::BlockId;

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// A single structural rule that could not be evaluated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuleFailure {
    pub rule: String,
    pub reason: String,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A numeric threshold or margin is out of range.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// A structural rule is malformed.
    #[error("invalid rule `{rule}`: {reason}")]
    InvalidRule { rule: String, reason: String },

    /// Every rule of the active rule set failed to evaluate.
    #[error("discovery failed: all {} rule(s) failed", failures.len())]
    Discovery { failures: Vec<RuleFailure> },

    /// A host capability the engine asked for is missing.
    #[error("capability unavailable: {0}")]
    CapabilityUnavailable(&'static str),

    /// An unloaded block has no stored children.
    #[error("block {0} is unloaded but its detached children are missing")]
    ExtractionInconsistency(BlockId),
}

impl Error {
    pub(crate) fn invalid_rule(rule: &str, reason: impl Into<String>) -> Self {
        Self::InvalidRule {
            rule: rule.into(),
            reason: reason.into(),
        }
    }
}
