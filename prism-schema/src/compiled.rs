use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::ConfigurationError;

/// One modality schema with its required/optional field sets derived at load.
pub struct CompiledSchema {
    name: String,
    raw: Value,
    required: Vec<String>,
    optional: BTreeSet<String>,
    validator: jsonschema::Validator,
}

/// A schema violation other than a missing top-level required key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// JSON pointer into the sidecar (`""` for the document itself).
    pub instance_path: String,
    pub schema_path: String,
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.instance_path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.instance_path, self.message)
        }
    }
}

impl fmt::Debug for CompiledSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledSchema")
            .field("name", &self.name)
            .field("required", &self.required)
            .field("optional", &self.optional)
            .finish_non_exhaustive()
    }
}

impl CompiledSchema {
    pub fn compile(version: &str, name: &str, raw: Value) -> Result<Self, ConfigurationError> {
        let invalid = |message: String| ConfigurationError::InvalidSchema {
            version: version.to_string(),
            name: name.to_string(),
            message,
        };

        if !raw.is_object() {
            return Err(invalid("schema root must be an object".to_string()));
        }

        let required = match raw.get("required") {
            None => vec![],
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| {
                    v.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| invalid(format!("required entry {v} is not a string")))
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(other) => return Err(invalid(format!("required must be an array, got {other}"))),
        };

        let optional = raw
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| {
                props
                    .keys()
                    .filter(|k| !required.contains(k))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let validator =
            jsonschema::validator_for(&raw).map_err(|e| ConfigurationError::SchemaCompile {
                version: version.to_string(),
                name: name.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            name: name.to_string(),
            raw,
            required,
            optional,
            validator,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Required top-level keys in declaration order.
    pub fn required(&self) -> &[String] {
        &self.required
    }

    pub fn optional(&self) -> &BTreeSet<String> {
        &self.optional
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.raw.get("properties").and_then(|p| p.get(key))
    }

    /// Required keys absent from `doc`, in declaration order.
    pub fn missing_required(&self, doc: &Map<String, Value>) -> Vec<String> {
        self.required
            .iter()
            .filter(|k| !doc.contains_key(k.as_str()))
            .cloned()
            .collect()
    }

    /// Everything the validator rejects except misses of the top-level
    /// `required` list, which [`CompiledSchema::missing_required`] reports
    /// separately. Conditional requirements (`allOf`, `if`/`then`) stay.
    pub fn violations(&self, doc: &Value) -> Vec<Violation> {
        let mut out: Vec<Violation> = self
            .validator
            .iter_errors(doc)
            .filter_map(|err| {
                let instance_path = err.instance_path().to_string();
                let schema_path = err.schema_path().to_string();
                if instance_path.is_empty() && schema_path == "/required" {
                    return None;
                }
                Some(Violation {
                    instance_path,
                    schema_path,
                    message: err.to_string(),
                })
            })
            .collect();
        out.sort_by(|a, b| {
            (&a.instance_path, &a.message).cmp(&(&b.instance_path, &b.message))
        });
        out.dedup();
        out
    }

    /// Placeholders for `keys`, derived from the property declarations.
    pub fn placeholders<'a>(
        &self,
        keys: impl IntoIterator<Item = &'a str>,
    ) -> Map<String, Value> {
        keys.into_iter()
            .map(|k| (k.to_string(), placeholder_for(self.property(k))))
            .collect()
    }

    /// Placeholders for every required key.
    pub fn required_placeholders(&self) -> Map<String, Value> {
        self.placeholders(self.required.iter().map(String::as_str))
    }
}

/// Value used when a fix has to invent a field. Comes from the schema only:
/// `default`, then the first `enum` member, then a neutral value for the type.
pub fn placeholder_for(property: Option<&Value>) -> Value {
    let Some(prop) = property else {
        return Value::Null;
    };
    if let Some(default) = prop.get("default") {
        return default.clone();
    }
    if let Some(first) = prop.get("enum").and_then(Value::as_array).and_then(|e| e.first()) {
        return first.clone();
    }
    let ty = match prop.get("type") {
        Some(Value::String(s)) => Some(s.as_str()),
        Some(Value::Array(types)) => types.iter().find_map(Value::as_str),
        _ => None,
    };
    match ty {
        Some("string") => Value::String("TODO".to_string()),
        Some("array") => Value::Array(vec![]),
        Some("object") => Value::Object(Map::new()),
        _ => Value::Null,
    }
}
