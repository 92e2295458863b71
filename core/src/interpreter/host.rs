//! Collaborator seams
//!
//! Everything the engine needs from its embedding is expressed as a trait:
//! the log sink, the schema and model validators, the host substrate for raw
//! source nodes, and context resources for `with` blocks. Default
//! implementations live here as well.

use super::errors::{Error, Result};
use super::report::{Event, Reporter};
use super::types::{NativeFunction, Val};
use indexmap::IndexMap;
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use std::sync::{Arc, Mutex};

/* ===================== Log Sink ===================== */

pub trait LogSink: Send + Sync {
    fn record(&self, event: &Event);
}

/// Forwards events to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn record(&self, event: &Event) {
        let payload = serde_json::to_string(event).unwrap_or_default();
        let step = event.step.as_deref().unwrap_or("");
        let status = event.status.map(|s| s.as_str()).unwrap_or("");

        if event.error.is_some() {
            tracing::warn!(target: "vibelang::events", kind = %event.kind, step, status, "{}", payload);
        } else {
            tracing::info!(target: "vibelang::events", kind = %event.kind, step, status, "{}", payload);
        }
    }
}

/// Keeps events in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<Event>>,
}

impl MemorySink {
    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl LogSink for MemorySink {
    fn record(&self, event: &Event) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event.clone());
    }
}

/* ===================== Validators ===================== */

/// Validates data against a schema value; returns the (possibly coerced) data
pub trait SchemaValidator: Send + Sync {
    fn validate(&self, schema: &JsonValue, data: &JsonValue) -> std::result::Result<JsonValue, String>;
}

/// Validates data against a named model; returns the (possibly coerced) data
pub trait ModelValidator: Send + Sync {
    fn validate(&self, model: &str, data: &JsonValue) -> std::result::Result<JsonValue, String>;
}

/// JSON Schema validation backed by the `jsonschema` crate
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSchemaValidator;

impl SchemaValidator for JsonSchemaValidator {
    fn validate(&self, schema: &JsonValue, data: &JsonValue) -> std::result::Result<JsonValue, String> {
        let validator =
            jsonschema::validator_for(schema).map_err(|e| format!("Invalid schema: {}", e))?;

        if validator.is_valid(data) {
            return Ok(data.clone());
        }

        let errors: Vec<String> = validator
            .iter_errors(data)
            .map(|e| {
                let path = e.instance_path.to_string();
                if path.is_empty() {
                    e.to_string()
                } else {
                    format!("{}: {}", path, e)
                }
            })
            .collect();
        Err(errors.join("; "))
    }
}

/// Models registered by name, each described by a JSON Schema
#[derive(Debug, Default, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, JsonValue>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, name: impl Into<String>, schema: JsonValue) -> Self {
        self.models.insert(name.into(), schema);
        self
    }
}

impl ModelValidator for ModelRegistry {
    fn validate(&self, model: &str, data: &JsonValue) -> std::result::Result<JsonValue, String> {
        let schema = self
            .models
            .get(model)
            .ok_or_else(|| format!("unknown model '{}'", model))?;
        JsonSchemaValidator
            .validate(schema, data)
            .map_err(|e| format!("{}: {}", model, e))
    }
}

/* ===================== Host Substrate ===================== */

/// Result of executing raw statement lines
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawOutcome {
    /// Bindings created or changed by the lines
    pub bindings: Map<String, JsonValue>,
    /// Value of a `return` executed by the lines
    pub returned: Option<JsonValue>,
}

/// Embedded scripting layer for raw source nodes and host modules
///
/// The host only ever sees JSON snapshots of the visible bindings and
/// answers with JSON values.
pub trait HostSubstrate: Send + Sync {
    fn eval(&self, source: &str, bindings: &Map<String, JsonValue>) -> std::result::Result<JsonValue, String>;

    fn exec(&self, lines: &[String], bindings: &Map<String, JsonValue>) -> std::result::Result<RawOutcome, String>;

    /// Member names of a module the host provides, if it provides it
    fn resolve_module(&self, _module: &str) -> Option<Vec<String>> {
        None
    }

    fn call(
        &self,
        module: &str,
        member: &str,
        _args: Vec<JsonValue>,
        _kwargs: Map<String, JsonValue>,
    ) -> std::result::Result<JsonValue, String> {
        Err(format!("host does not provide {}.{}", module, member))
    }
}

/* ===================== Context Resources ===================== */

/// Resource managed by a `with` block
///
/// `exit` runs on every path out of the block and receives the propagating
/// error; returning `true` suppresses it.
pub trait ContextResource: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn enter(&self, reporter: &Reporter) -> Result<Val>;

    fn exit(&self, reporter: &Reporter, error: Option<&Error>) -> Result<bool>;
}

/* ===================== Services ===================== */

/// Collaborators shared by every run of an engine
#[derive(Clone)]
pub struct Services {
    pub sink: Arc<dyn LogSink>,
    pub schemas: Arc<dyn SchemaValidator>,
    pub models: Arc<dyn ModelValidator>,
    pub host: Option<Arc<dyn HostSubstrate>>,
    /// Extra globals visible to every program
    pub globals: IndexMap<String, Val>,
}

impl Default for Services {
    fn default() -> Self {
        Services {
            sink: Arc::new(TracingSink),
            schemas: Arc::new(JsonSchemaValidator),
            models: Arc::new(ModelRegistry::new()),
            host: None,
            globals: IndexMap::new(),
        }
    }
}

impl Services {
    pub fn register_function(&mut self, function: NativeFunction) {
        self.globals
            .insert(function.name.clone(), Val::Func(super::types::Callable::Native(function)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_schema_validator() {
        let schema = json!({
            "type": "object",
            "required": ["name"],
            "properties": { "name": { "type": "string" } }
        });

        assert_eq!(
            JsonSchemaValidator.validate(&schema, &json!({ "name": "a" })),
            Ok(json!({ "name": "a" }))
        );
        let err = JsonSchemaValidator
            .validate(&schema, &json!({ "name": 3 }))
            .expect_err("Should reject");
        assert!(err.contains("/name"), "{}", err);
    }

    #[test]
    fn test_model_registry() {
        let registry = ModelRegistry::new().register("User", json!({ "type": "object", "required": ["id"] }));

        assert!(registry.validate("User", &json!({ "id": 1 })).is_ok());
        assert!(registry.validate("User", &json!({})).is_err());
        assert_eq!(
            registry.validate("Order", &json!({})),
            Err("unknown model 'Order'".to_string())
        );
    }
}
