//! Capability contract for components that emit trace data.
//!
//! Components do not have to implement [`TraceComponent`] to call the
//! recording API; the contract exists so a deployment can declare and
//! validate the decision vocabulary each component emits.

use std::{
	collections::{BTreeMap, BTreeSet},
	sync::Mutex,
};

use crate::{Error, Result};

pub trait TraceComponent {
	/// Unique name for this component in traces (e.g. `"rubric_loader"`).
	fn component_name(&self) -> &str;

	/// The decision categories and output keys this component can emit.
	fn trace_schema(&self) -> ComponentSchema;
}

#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct ComponentSchema {
	pub decisions: Vec<String>,
	pub outputs: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct RegisteredComponent {
	pub component_name: String,
	pub schema: ComponentSchema,
}

#[derive(Clone, Debug)]
pub struct SchemaValidation {
	pub valid: bool,
	pub errors: Vec<String>,
}

pub fn validate_component_schema(name: &str, schema: &ComponentSchema) -> SchemaValidation {
	let mut errors = Vec::new();

	if name.trim().is_empty() {
		errors.push("component_name must be non-empty".to_string());
	}

	for (label, entries) in [("decisions", &schema.decisions), ("outputs", &schema.outputs)] {
		for entry in entries {
			if entry.trim().is_empty() {
				errors.push(format!("'{label}' entries must be non-empty"));

				break;
			}
		}

		let mut seen = BTreeSet::new();

		for entry in entries {
			if !seen.insert(entry.as_str()) {
				errors.push(format!("'{label}' contains duplicate entry {entry:?}"));

				break;
			}
		}
	}

	SchemaValidation { valid: errors.is_empty(), errors }
}

/// Registry of trace-emitting components, keyed by component name.
/// Re-registering the same name overwrites the previous entry.
#[derive(Debug, Default)]
pub struct ComponentRegistry {
	inner: Mutex<BTreeMap<String, RegisteredComponent>>,
}

impl ComponentRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn register(&self, component: &dyn TraceComponent) -> Result<()> {
		let name = component.component_name().to_string();
		let schema = component.trace_schema();
		let validation = validate_component_schema(&name, &schema);

		if !validation.valid {
			return Err(Error::InvalidSchema { component: name, errors: validation.errors });
		}

		let mut inner = self.inner.lock().unwrap_or_else(|err| err.into_inner());

		inner.insert(name.clone(), RegisteredComponent { component_name: name, schema });
		drop(inner);

		tracing::info!(component = component.component_name(), "Registered tracing component.");

		Ok(())
	}

	pub fn get(&self, name: &str) -> Option<RegisteredComponent> {
		let inner = self.inner.lock().unwrap_or_else(|err| err.into_inner());

		inner.get(name).cloned()
	}

	/// A copy of every registration.
	pub fn snapshot(&self) -> BTreeMap<String, RegisteredComponent> {
		let inner = self.inner.lock().unwrap_or_else(|err| err.into_inner());

		inner.clone()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	struct FakeComponent {
		name: &'static str,
		decisions: Vec<String>,
	}

	impl TraceComponent for FakeComponent {
		fn component_name(&self) -> &str {
			self.name
		}

		fn trace_schema(&self) -> ComponentSchema {
			ComponentSchema {
				decisions: self.decisions.clone(),
				outputs: vec!["total".to_string()],
			}
		}
	}

	#[test]
	fn registration_is_idempotent_and_overwrites() {
		let registry = ComponentRegistry::new();
		let first =
			FakeComponent { name: "intake_classifier", decisions: vec!["intent".to_string()] };
		let second = FakeComponent {
			name: "intake_classifier",
			decisions: vec!["intent".to_string(), "domain".to_string()],
		};

		registry.register(&first).unwrap();
		registry.register(&second).unwrap();

		let snapshot = registry.snapshot();

		assert_eq!(snapshot.len(), 1);
		assert_eq!(snapshot["intake_classifier"].schema.decisions.len(), 2);
	}

	#[test]
	fn blank_name_is_rejected() {
		let registry = ComponentRegistry::new();
		let component = FakeComponent { name: " ", decisions: vec!["x".to_string()] };

		assert!(registry.register(&component).is_err());
	}

	#[test]
	fn duplicate_decision_entries_are_rejected() {
		let validation = validate_component_schema(
			"dup",
			&ComponentSchema {
				decisions: vec!["a".to_string(), "a".to_string()],
				outputs: Vec::new(),
			},
		);

		assert!(!validation.valid);
		assert_eq!(validation.errors.len(), 1);
	}
}
