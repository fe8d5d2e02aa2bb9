//! Submitted-form validation.

use std::collections::{BTreeMap, HashMap};

use serde::ser::{Serialize, SerializeStruct, Serializer};

/// Submitted form fields plus the validation errors found so far.
///
/// Validators record at most one message per call and never short-circuit,
/// so a re-rendered form can show every problem at once. In templates a
/// form serialises as:
///
/// ```text
/// form.values.<field>   first submitted value
/// form.all.<field>      every submitted value (checkbox groups)
/// form.errors.<field>   first error, absent when the field is fine
/// ```
#[derive(Clone, Debug, Default)]
pub struct Form {
    values: HashMap<String, Vec<String>>,
    errors: HashMap<String, Vec<String>>,
}

impl Form {
    pub fn new(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut values: HashMap<String, Vec<String>> = HashMap::new();
        for (key, value) in pairs {
            values.entry(key).or_default().push(value);
        }
        Self { values, errors: HashMap::new() }
    }

    /// First value of `field`, or the empty string.
    pub fn get(&self, field: &str) -> &str {
        self.values
            .get(field)
            .and_then(|v| v.first())
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Every value of `field`, in submission order.
    pub fn get_all(&self, field: &str) -> &[String] {
        self.values.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// First error recorded for `field`.
    pub fn error(&self, field: &str) -> Option<&str> {
        self.errors.get(field).and_then(|e| e.first()).map(String::as_str)
    }

    pub fn add_error(&mut self, field: &str, message: impl Into<String>) {
        self.errors.entry(field.to_owned()).or_default().push(message.into());
    }

    /// Every listed field must hold something besides whitespace.
    pub fn required(&mut self, fields: &[&str]) {
        for &field in fields {
            if self.get(field).trim().is_empty() {
                self.add_error(field, "This field cannot be blank");
            }
        }
    }

    /// `field` must not exceed `max` characters.
    pub fn max_length(&mut self, field: &str, max: usize) {
        let value = self.get(field);
        if !value.is_empty() && value.chars().count() > max {
            self.add_error(field, format!("This field is too long (maximum is {max} characters)"));
        }
    }

    /// Every submitted value of `field` must be one of `allowed`. An absent
    /// field passes; pair with [`required`](Form::required) when it must exist.
    pub fn permitted_values(&mut self, field: &str, allowed: &[&str]) {
        let invalid = self
            .get_all(field)
            .iter()
            .any(|v| !v.is_empty() && !allowed.contains(&v.as_str()));
        if invalid {
            self.add_error(field, "This field is invalid");
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

impl Serialize for Form {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let values: BTreeMap<&str, &str> =
            self.values.keys().map(|k| (k.as_str(), self.get(k))).collect();
        let all: BTreeMap<&str, &[String]> =
            self.values.iter().map(|(k, v)| (k.as_str(), v.as_slice())).collect();
        let errors: BTreeMap<&str, &str> = self
            .errors
            .keys()
            .filter_map(|k| self.error(k).map(|e| (k.as_str(), e)))
            .collect();

        let mut state = serializer.serialize_struct("Form", 3)?;
        state.serialize_field("values", &values)?;
        state.serialize_field("all", &all)?;
        state.serialize_field("errors", &errors)?;
        state.end()
    }
}
