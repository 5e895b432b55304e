//! Input validation
//!
//! A single [`InputValidator`] is built from [`ValidationRules`] at startup and
//! shared by reference. It holds no mutable state.

use serde::Deserialize;

use crate::LifecycleError;

/// Default maximum plan identifier length
pub const DEFAULT_PLAN_ID_MAX_LEN: usize = 64;

/// Input accepted by `create_subscription`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubscriptionInput {
    /// Plan being purchased
    #[serde(default)]
    pub plan_id: String,
}

impl CreateSubscriptionInput {
    /// Create an input for a plan
    pub fn new(plan_id: impl Into<String>) -> Self {
        Self {
            plan_id: plan_id.into(),
        }
    }
}

/// Validation limits
#[derive(Debug, Clone)]
pub struct ValidationRules {
    /// Maximum plan identifier length in bytes
    pub plan_id_max_len: usize,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            plan_id_max_len: DEFAULT_PLAN_ID_MAX_LEN,
        }
    }
}

impl ValidationRules {
    /// Set the maximum plan identifier length
    pub fn with_plan_id_max_len(mut self, len: usize) -> Self {
        self.plan_id_max_len = len;
        self
    }
}

/// Immutable validator for lifecycle inputs
#[derive(Debug, Clone)]
pub struct InputValidator {
    rules: ValidationRules,
}

impl InputValidator {
    /// Build a validator from rules
    pub fn new(rules: ValidationRules) -> Self {
        Self { rules }
    }

    /// Validate a creation request.
    ///
    /// The plan identifier is otherwise opaque: it must be present, bounded
    /// and free of control characters.
    pub fn validate_create(&self, input: &CreateSubscriptionInput) -> Result<(), LifecycleError> {
        let plan_id = &input.plan_id;

        if plan_id.trim().is_empty() {
            return Err(LifecycleError::InvalidInput("planId is required".into()));
        }

        if plan_id.chars().count() > self.rules.plan_id_max_len {
            return Err(LifecycleError::InvalidInput(format!(
                "planId too long (max {} chars)",
                self.rules.plan_id_max_len
            )));
        }

        if plan_id.chars().any(char::is_control) {
            return Err(LifecycleError::InvalidInput(
                "planId contains control characters".into(),
            ));
        }

        Ok(())
    }
}

impl Default for InputValidator {
    fn default() -> Self {
        Self::new(ValidationRules::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(plan_id: &str) -> Result<(), LifecycleError> {
        InputValidator::default().validate_create(&CreateSubscriptionInput::new(plan_id))
    }

    #[test]
    fn test_valid_plan_ids() {
        assert!(check("pro").is_ok());
        assert!(check("price_1NzQ.monthly").is_ok());
        assert!(check(&"a".repeat(DEFAULT_PLAN_ID_MAX_LEN)).is_ok());
    }

    #[test]
    fn test_invalid_plan_ids() {
        assert!(matches!(check(""), Err(LifecycleError::InvalidInput(_))));
        assert!(matches!(check("   "), Err(LifecycleError::InvalidInput(_))));
        assert!(check(&"a".repeat(DEFAULT_PLAN_ID_MAX_LEN + 1)).is_err());
        assert!(check("pro\nplan").is_err());
    }

    #[test]
    fn test_limit_counts_chars_not_bytes() {
        assert!(check(&"é".repeat(DEFAULT_PLAN_ID_MAX_LEN)).is_ok());
        assert!(check(&"é".repeat(DEFAULT_PLAN_ID_MAX_LEN + 1)).is_err());
    }

    #[test]
    fn test_custom_limit() {
        let validator = InputValidator::new(ValidationRules::default().with_plan_id_max_len(3));
        assert!(validator.validate_create(&CreateSubscriptionInput::new("pro")).is_ok());
        assert!(validator.validate_create(&CreateSubscriptionInput::new("plus")).is_err());
    }

    #[test]
    fn test_missing_field_decodes_as_empty() {
        let input: CreateSubscriptionInput = serde_json::from_str("{}").unwrap();
        assert!(InputValidator::default().validate_create(&input).is_err());
    }
}
