//! Property validation hook (§4.7).
//!
//! The commander enforces the metadata rule set (source, updatability,
//! mutability) drawn from the `ServiceType`'s property schema itself; this
//! module defines the external `schema.Validate` collaborator consulted
//! in addition to those rules, following the same external-collaborator
//! pattern as [`crate::authorize::Authorizer`].

use std::collections::HashMap;

use fulcrum_store::ServiceType;

use crate::error::Result;

/// External schema-validation collaborator. The core is responsible for
/// routing violations to the correct failure surface (§4.7); this trait
/// validates the *values*, not the metadata rules, which the commander
/// checks itself against `ServiceType::property_schema`.
pub trait Validator: Send + Sync {
    /// Validate `values` against `service_type`'s schema.
    ///
    /// # Errors
    ///
    /// Returns an error if a value fails schema validation.
    fn validate(
        &self,
        service_type: &ServiceType,
        values: &HashMap<String, serde_json::Value>,
    ) -> Result<()>;
}

/// Permissive default: logs and accepts every value, trusting the
/// metadata rule set alone. No concrete schema language is implemented
/// here; production deployments supply their own.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopValidator;

impl Validator for NoopValidator {
    fn validate(
        &self,
        service_type: &ServiceType,
        values: &HashMap<String, serde_json::Value>,
    ) -> Result<()> {
        tracing::debug!(
            service_type_id = %service_type.id,
            keys = values.len(),
            "NoopValidator: accepting property bag without schema validation"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fulcrum_core::ServiceTypeId;

    #[test]
    fn noop_validator_accepts_anything() {
        let service_type = ServiceType {
            id: ServiceTypeId::generate(),
            name: "t1".into(),
            property_schema: HashMap::new(),
        };
        let mut values = HashMap::new();
        values.insert("cpu".to_string(), serde_json::json!(2));
        assert!(NoopValidator.validate(&service_type, &values).is_ok());
    }
}
