//! Default-value resolution for optional computed attributes
//!
//! A declared value always wins. Without one, the default is only applied
//! while the planned value is still unknown; a value resolved on an earlier
//! pass (and refreshed from the remote since) is kept, so the default never
//! clobbers a non-default remote value.

use crate::resource::PlanValue;
use tracing::debug;

/// Default op-mask of a user
pub const DEFAULT_OP_MASK: &str = "read, write, delete";

/// Default maximum number of buckets of a user
pub const DEFAULT_MAX_BUCKETS: i64 = 1000;

/// Default suspension flag of a user
pub const DEFAULT_SUSPENDED: bool = false;

/// Resolve one optional attribute
pub fn resolve<T>(attribute: &str, declared: Option<T>, planned: PlanValue<T>, default: T) -> PlanValue<T>
where
    T: Clone + std::fmt::Debug,
{
    if let Some(value) = declared {
        return PlanValue::Known(value);
    }

    if planned.is_unknown() || planned.is_null() {
        debug!(
            attribute,
            plan_unknown = planned.is_unknown(),
            default_value = ?default,
            "Set default value"
        );
        return PlanValue::Known(default);
    }

    debug!(attribute, "Not setting default value");
    planned
}

pub fn resolve_op_mask(declared: Option<&str>, planned: PlanValue<String>) -> PlanValue<String> {
    resolve(
        "op_mask",
        declared.map(str::to_string),
        planned,
        DEFAULT_OP_MASK.to_string(),
    )
}

pub fn resolve_max_buckets(declared: Option<i64>, planned: PlanValue<i64>) -> PlanValue<i64> {
    resolve("max_buckets", declared, planned, DEFAULT_MAX_BUCKETS)
}

pub fn resolve_suspended(declared: Option<bool>, planned: PlanValue<bool>) -> PlanValue<bool> {
    resolve("suspended", declared, planned, DEFAULT_SUSPENDED)
}
