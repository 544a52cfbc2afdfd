use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;

/// Key of one running workspace runtime.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Validate,
)]
pub struct RuntimeIdentity {
    #[validate(length(min = 1, message = "Workspace ID cannot be empty"))]
    pub workspace_id: String,
    #[validate(length(min = 1, message = "Environment name cannot be empty"))]
    pub env_name: String,
    #[validate(length(min = 1, message = "Owner ID cannot be empty"))]
    pub owner_id: String,
}

impl RuntimeIdentity {
    pub fn new(
        workspace_id: impl Into<String>,
        env_name: impl Into<String>,
        owner_id: impl Into<String>,
    ) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            env_name: env_name.into(),
            owner_id: owner_id.into(),
        }
    }
}

impl fmt::Display for RuntimeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.workspace_id, self.env_name, self.owner_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_joins_all_parts() {
        let id = RuntimeIdentity::new("ws1", "default", "alice");
        assert_eq!(id.to_string(), "ws1:default:alice");
    }

    #[test]
    fn empty_parts_fail_validation() {
        let id = RuntimeIdentity::new("ws1", "", "alice");
        let errs = id.validate().unwrap_err();
        assert!(errs.field_errors().contains_key("env_name"));
        assert!(RuntimeIdentity::new("a", "b", "c").validate().is_ok());
    }
}
