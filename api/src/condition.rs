use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const READY: &str = "Ready";
pub const AVAILABLE: &str = "Available";
pub const ESTABLISHED: &str = "Established";

pub const STATUS_TRUE: &str = "True";
pub const STATUS_FALSE: &str = "False";

/*
 * A readiness condition as written by a reconciler into the status
 * subresource of the objects we observe.
 */
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {

    #[serde(rename = "type")]
    pub type_: String,

    // one of True, False, Unknown
    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

impl Condition {

    pub fn new(type_: &str, status: &str) -> Self {
	Self{
	    type_: type_.to_string(),
	    status: status.to_string(),
	    reason: None,
	    message: None,
	    last_transition_time: None,
	}
    }

    pub fn is_true(&self) -> bool {
	self.status == STATUS_TRUE
    }

    pub fn is_false(&self) -> bool {
	self.status == STATUS_FALSE
    }
}

/*
 * Returns the first condition of the given type, the same lookup
 * apimachinery does for status conditions.
 */
pub fn find_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|cond| cond.type_ == type_)
}

/*
 * true only when a condition of the given type exists and reports "True".
 */
pub fn is_condition_true(conditions: &[Condition], type_: &str) -> bool {
    find_condition(conditions, type_).map_or(false, Condition::is_true)
}
