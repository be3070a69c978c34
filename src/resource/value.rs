//! Planned attribute values
//!
//! A planned attribute is either known, explicitly absent, or left unknown
//! until the apply step computes it.

use serde::{Deserialize, Serialize};

/// Tri-state value of an attribute in a plan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "state", content = "value")]
pub enum PlanValue<T> {
    /// To be computed during apply
    #[default]
    Unknown,
    /// Explicitly absent
    Null,
    /// Concrete value
    Known(T),
}

impl<T> PlanValue<T> {
    /// `Some` becomes `Known`, `None` becomes `Null`
    pub fn from_option(value: Option<T>) -> Self {
        match value {
            Some(v) => PlanValue::Known(v),
            None => PlanValue::Null,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, PlanValue::Unknown)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, PlanValue::Null)
    }

    /// Borrow the concrete value, if known
    pub fn known(&self) -> Option<&T> {
        match self {
            PlanValue::Known(v) => Some(v),
            _ => None,
        }
    }

    /// Take the concrete value; unknown and null both map to `None`
    pub fn into_option(self) -> Option<T> {
        match self {
            PlanValue::Known(v) => Some(v),
            _ => None,
        }
    }

    /// Replace the value with `Unknown` when `mark` is set
    pub fn unknown_if(self, mark: bool) -> Self {
        if mark {
            PlanValue::Unknown
        } else {
            self
        }
    }
}

impl<T: std::fmt::Display> std::fmt::Display for PlanValue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanValue::Unknown => write!(f, "(known after apply)"),
            PlanValue::Null => write!(f, "null"),
            PlanValue::Known(v) => write!(f, "{}", v),
        }
    }
}
