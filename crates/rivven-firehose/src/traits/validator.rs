//! Schema validation of records before submission
//!
//! Validation runs per record, so one bad record never blocks the rest of
//! its call. The validation engine is injected through [`SchemaValidator`];
//! [`JsonSchemaValidator`] is the default, backed by the `jsonschema` crate.

use crate::error::DeliveryError;
use crate::types::Record;
use jsonschema::JSONSchema;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

/// One rule a record breaks
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub description: String,
    pub details: Value,
}

impl Violation {
    pub fn new(description: impl Into<String>, details: Value) -> Self {
        Self {
            description: description.into(),
            details,
        }
    }
}

/// Trait for schema validation engines
pub trait SchemaValidator: Send + Sync {
    /// Validate a record; an empty list means the record is valid
    fn validate(&self, record: &Record, schema: &Value) -> Vec<Violation>;

    /// Check that a schema can be used at all
    fn check_schema(&self, _schema: &Value) -> std::result::Result<(), String> {
        Ok(())
    }
}

/// JSON Schema validator with a cache of the last compiled schema
#[derive(Default)]
pub struct JsonSchemaValidator {
    compiled: Mutex<Option<(Value, Arc<JSONSchema>)>>,
}

impl std::fmt::Debug for JsonSchemaValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonSchemaValidator").finish_non_exhaustive()
    }
}

impl JsonSchemaValidator {
    pub fn new() -> Self {
        Self::default()
    }

    fn compile(&self, schema: &Value) -> std::result::Result<Arc<JSONSchema>, String> {
        let mut cached = self.compiled.lock();
        if let Some((source, compiled)) = cached.as_ref() {
            if source == schema {
                return Ok(Arc::clone(compiled));
            }
        }

        let compiled = Arc::new(JSONSchema::compile(schema).map_err(|e| e.to_string())?);
        *cached = Some((schema.clone(), Arc::clone(&compiled)));
        Ok(compiled)
    }
}

impl SchemaValidator for JsonSchemaValidator {
    fn validate(&self, record: &Record, schema: &Value) -> Vec<Violation> {
        let compiled = match self.compile(schema) {
            Ok(compiled) => compiled,
            Err(e) => {
                return vec![Violation::new(
                    format!("invalid schema: {}", e),
                    json!({ "keyword": "schema" }),
                )]
            }
        };

        let violations = match compiled.validate(record) {
            Ok(()) => Vec::new(),
            Err(errors) => errors
                .map(|e| {
                    let schema_path = e.schema_path.to_string();
                    let keyword = schema_path.rsplit('/').next().unwrap_or_default().to_string();
                    Violation::new(
                        e.to_string(),
                        json!({
                            "instance_path": e.instance_path.to_string(),
                            "schema_path": schema_path,
                            "keyword": keyword,
                            "kind": format!("{:?}", e.kind),
                            "instance": e.instance.clone().into_owned(),
                        }),
                    )
                })
                .collect(),
        };
        violations
    }

    fn check_schema(&self, schema: &Value) -> std::result::Result<(), String> {
        self.compile(schema).map(|_| ())
    }
}

/// Partition records into valid records and schema errors, preserving order
///
/// Without a schema every record is valid.
pub fn validate_all(
    records: Vec<Record>,
    schema: Option<&Value>,
    validator: &dyn SchemaValidator,
) -> (Vec<Record>, Vec<DeliveryError>) {
    let Some(schema) = schema else {
        return (records, Vec::new());
    };

    let mut valid = Vec::with_capacity(records.len());
    let mut errors = Vec::new();

    for record in records {
        let mut violations = validator.validate(&record, schema);
        if violations.is_empty() {
            valid.push(record);
            continue;
        }

        let count = violations.len();
        let first = violations.remove(0);
        debug!(
            "Record rejected by schema ({} violation(s)): {}",
            count, first.description
        );
        errors.push(DeliveryError::Schema {
            original_record: record,
            description: first.description,
            details: first.details,
        });
    }

    (valid, errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "firstName": {
                    "type": "string",
                    "maxLength": 3
                },
            },
            "required": ["firstName"]
        })
    }

    #[test]
    fn test_no_schema_all_valid() {
        let records = vec![json!("a"), json!({"x": 1})];
        let (valid, errors) = validate_all(records.clone(), None, &JsonSchemaValidator::new());
        assert_eq!(valid, records);
        assert!(errors.is_empty());
    }

    #[test]
    fn test_partition_is_total_and_ordered() {
        let schema = person_schema();
        let records = vec![
            json!({"firstName": "Don"}),
            json!({"firstName": 3}),
            json!({"firstName": "Al"}),
            json!({}),
            json!({"firstName": "Toolong"}),
        ];

        let (valid, errors) =
            validate_all(records.clone(), Some(&schema), &JsonSchemaValidator::new());

        assert_eq!(valid.len() + errors.len(), records.len());
        assert_eq!(valid, vec![json!({"firstName": "Don"}), json!({"firstName": "Al"})]);

        let rejected: Vec<&Record> = errors.iter().filter_map(|e| e.original_record()).collect();
        assert_eq!(
            rejected,
            vec![
                &json!({"firstName": 3}),
                &json!({}),
                &json!({"firstName": "Toolong"})
            ]
        );
        for record in &valid {
            assert!(!rejected.contains(&record));
        }
    }

    #[test]
    fn test_schema_error_details() {
        let schema = person_schema();
        let (_, errors) = validate_all(
            vec![json!({"firstName": 3})],
            Some(&schema),
            &JsonSchemaValidator::new(),
        );

        assert_eq!(errors.len(), 1);
        let err = &errors[0];
        assert_eq!(err.error_type(), "schema");
        assert!(!err.description().is_empty());
        assert_eq!(err.details()["instance_path"], json!("/firstName"));
        assert_eq!(err.details()["schema_path"], json!("/properties/firstName/type"));
        assert_eq!(err.details()["keyword"], json!("type"));
        assert_eq!(err.original_record(), Some(&json!({"firstName": 3})));
    }

    #[test]
    fn test_keyword_is_schema_keyword_name() {
        let (_, errors) = validate_all(
            vec![json!({"firstName": "Toolong"}), json!({})],
            Some(&person_schema()),
            &JsonSchemaValidator::new(),
        );

        assert_eq!(errors[0].details()["keyword"], json!("maxLength"));
        assert_eq!(errors[1].details()["keyword"], json!("required"));
        assert!(errors[0].details()["kind"].is_string());
    }

    #[test]
    fn test_one_error_per_record_with_many_violations() {
        let schema = json!({
            "type": "object",
            "properties": {
                "a": {"type": "string"},
                "b": {"type": "string"}
            }
        });
        let (_, errors) = validate_all(
            vec![json!({"a": 1, "b": 2})],
            Some(&schema),
            &JsonSchemaValidator::new(),
        );
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_check_schema_rejects_malformed() {
        let validator = JsonSchemaValidator::new();
        assert!(validator.check_schema(&person_schema()).is_ok());
        assert!(validator.check_schema(&json!({"type": 12})).is_err());
    }

    struct RejectEverything;

    impl SchemaValidator for RejectEverything {
        fn validate(&self, _record: &Record, _schema: &Value) -> Vec<Violation> {
            vec![
                Violation::new("first", json!({"n": 1})),
                Violation::new("second", json!({"n": 2})),
            ]
        }
    }

    #[test]
    fn test_custom_validator_first_violation_wins() {
        let (valid, errors) = validate_all(vec![json!(1)], Some(&json!({})), &RejectEverything);
        assert!(valid.is_empty());
        assert_eq!(errors[0].description(), "first");
        assert_eq!(errors[0].details(), &json!({"n": 1}));
    }
}
