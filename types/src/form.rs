//! Form schema as delivered by the form configuration endpoint.
//!
//! Raw wire structs stay private; the public types are produced through
//! `#[serde(try_from)]` so an instance is proof that the schema was valid.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FormConfigError {
    #[error("form field key must not be empty")]
    EmptyFieldKey,
    #[error("form has no configured fields")]
    EmptyForm,
}

/// Stable key of a form field (`full_name`, `phone`, `cpf`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldKey(String);

impl FieldKey {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FieldKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Visual kind of a field. Only the rendering layer dispatches on this; the
/// step engine reads `key` and `required` alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Select { options: Vec<String> },
    Radio { options: Vec<String> },
}

impl FieldKind {
    #[must_use]
    pub fn options(&self) -> &[String] {
        match self {
            FieldKind::Text => &[],
            FieldKind::Select { options } | FieldKind::Radio { options } => options,
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Select { .. } => "select",
            FieldKind::Radio { .. } => "radio",
        }
    }
}

#[derive(Deserialize)]
struct RawFormField {
    field_key: String,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    options: Option<Value>,
    #[serde(default)]
    order: Option<i64>,
}

/// A single configured form field. Read-only to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawFormField")]
pub struct FormField {
    key: FieldKey,
    label: String,
    kind: FieldKind,
    required: bool,
    order: i64,
}

impl TryFrom<RawFormField> for FormField {
    type Error = FormConfigError;

    fn try_from(raw: RawFormField) -> Result<Self, Self::Error> {
        let key = raw.field_key.trim();
        if key.is_empty() {
            return Err(FormConfigError::EmptyFieldKey);
        }
        let options = parse_options(raw.options);
        let kind = match raw.kind.as_deref().map(str::trim) {
            Some("select") => FieldKind::Select { options },
            Some("radio") => FieldKind::Radio { options },
            _ => FieldKind::Text,
        };
        Ok(Self {
            key: FieldKey::new(key),
            label: raw.label.unwrap_or_else(|| key.to_string()),
            kind,
            required: raw.required,
            order: raw.order.unwrap_or(0),
        })
    }
}

/// Options arrive either as a JSON array or as a string holding one.
fn parse_options(raw: Option<Value>) -> Vec<String> {
    match raw {
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .collect(),
        Some(Value::String(encoded)) => serde_json::from_str(&encoded).unwrap_or_default(),
        _ => Vec::new(),
    }
}

impl FormField {
    #[must_use]
    pub fn new(key: impl Into<FieldKey>, label: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            kind,
            required: false,
            order: 0,
        }
    }

    #[must_use]
    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    #[must_use]
    pub fn with_order(mut self, order: i64) -> Self {
        self.order = order;
        self
    }

    #[must_use]
    pub fn key(&self) -> &FieldKey {
        &self.key
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    #[must_use]
    pub const fn is_required(&self) -> bool {
        self.required
    }

    #[must_use]
    pub const fn order(&self) -> i64 {
        self.order
    }
}

impl From<String> for FieldKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Deserialize)]
struct RawFormConfig {
    #[serde(default)]
    client_name: String,
    #[serde(default)]
    plan: Option<String>,
    #[serde(default)]
    fields: Vec<FormField>,
}

/// Client form configuration. Invariant: at least one field.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RawFormConfig")]
pub struct FormConfig {
    client_name: String,
    plan: Option<String>,
    fields: Vec<FormField>,
}

impl TryFrom<RawFormConfig> for FormConfig {
    type Error = FormConfigError;

    fn try_from(raw: RawFormConfig) -> Result<Self, Self::Error> {
        if raw.fields.is_empty() {
            return Err(FormConfigError::EmptyForm);
        }
        Ok(Self {
            client_name: raw.client_name,
            plan: raw.plan,
            fields: raw.fields,
        })
    }
}

impl FormConfig {
    pub fn new(client_name: impl Into<String>, fields: Vec<FormField>) -> Result<Self, FormConfigError> {
        Self::try_from(RawFormConfig {
            client_name: client_name.into(),
            plan: None,
            fields,
        })
    }

    #[must_use]
    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    #[must_use]
    pub fn plan(&self) -> Option<&str> {
        self.plan.as_deref()
    }

    #[must_use]
    pub fn fields(&self) -> &[FormField] {
        &self.fields
    }
}

/// Ordered steps of the form, each an `order`-sorted list of fields.
///
/// Steps are numbered from 1. Invariant: at least one non-empty step.
#[derive(Debug, Clone)]
pub struct StepPlan {
    steps: Vec<Vec<FormField>>,
}

impl StepPlan {
    /// Keys that identify the person and open the form.
    pub const IDENTITY_KEYS: &'static [&'static str] = &["full_name", "phone", "email"];
    /// Keys that close the form (financial qualification and national id).
    pub const QUALIFICATION_KEYS: &'static [&'static str] = &["income_range", "tried_financing", "cpf"];

    /// Build a plan from explicit step groups. Empty groups are dropped.
    pub fn from_steps(steps: Vec<Vec<FormField>>) -> Result<Self, FormConfigError> {
        let steps: Vec<Vec<FormField>> = steps
            .into_iter()
            .filter(|group| !group.is_empty())
            .map(|mut group| {
                group.sort_by_key(FormField::order);
                group
            })
            .collect();
        if steps.is_empty() {
            return Err(FormConfigError::EmptyForm);
        }
        Ok(Self { steps })
    }

    /// Default three-group layout: identity, everything else, qualification.
    pub fn partition(config: &FormConfig) -> Result<Self, FormConfigError> {
        let mut identity = Vec::new();
        let mut middle = Vec::new();
        let mut qualification = Vec::new();
        for field in config.fields() {
            let key = field.key().as_str();
            if Self::IDENTITY_KEYS.contains(&key) {
                identity.push(field.clone());
            } else if Self::QUALIFICATION_KEYS.contains(&key) {
                qualification.push(field.clone());
            } else {
                middle.push(field.clone());
            }
        }
        Self::from_steps(vec![identity, middle, qualification])
    }

    /// Number of steps (`N`).
    #[must_use]
    pub fn len(&self) -> u32 {
        self.steps.len() as u32
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    #[must_use]
    pub fn fields(&self, step: u32) -> Option<&[FormField]> {
        let index = step.checked_sub(1)? as usize;
        self.steps.get(index).map(Vec::as_slice)
    }

    /// Find a field anywhere in the plan, returning its step number.
    #[must_use]
    pub fn locate(&self, key: &FieldKey) -> Option<(u32, &FormField)> {
        self.steps.iter().enumerate().find_map(|(index, group)| {
            group
                .iter()
                .find(|field| field.key() == key)
                .map(|field| (index as u32 + 1, field))
        })
    }
}
