use crate::types::{Collection, Result, StoreError};

/// Separator between fields of one persisted line. Never escaped.
pub const FIELD_DELIMITER: char = '|';

/// Positional layout of one collection's records.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Schema {
    /// Fields every record carries.
    pub required: usize,
    /// Trailing fields present only in some states (`claimedBy`, `fulfilledBy`).
    pub optional: usize,
    /// Whether field 0 is a store-assigned id.
    pub generated_id: bool,
}

impl Schema {
    /// Schema for `collection`.
    pub const fn of(collection: Collection) -> Self {
        match collection {
            Collection::Users => Schema {
                required: 3,
                optional: 0,
                generated_id: false,
            },
            Collection::FoodOffers => Schema {
                required: 6,
                optional: 1,
                generated_id: true,
            },
            Collection::Requests => Schema {
                required: 5,
                optional: 1,
                generated_id: true,
            },
        }
    }

    /// Whether a record with `len` fields fits this layout.
    pub fn accepts(&self, len: usize) -> bool {
        len >= self.required && len <= self.required + self.optional
    }
}

/// An ordered tuple of string fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    fields: Vec<String>,
}

impl Record {
    /// Builds a record from owned or borrowed fields.
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Splits one persisted line. Never fails; arity is checked by the caller.
    pub fn decode(line: &str) -> Self {
        Self::new(line.split(FIELD_DELIMITER))
    }

    /// Joins the fields into one persisted line.
    pub fn encode(&self) -> String {
        self.fields.join(&FIELD_DELIMITER.to_string())
    }

    /// Field at `idx`, if present.
    pub fn field(&self, idx: usize) -> Option<&str> {
        self.fields.get(idx).map(String::as_str)
    }

    /// All fields in order.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True for a record with no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Overwrites the field at `idx`, extending with empty fields if needed.
    pub fn set(&mut self, idx: usize, value: impl Into<String>) {
        if self.fields.len() <= idx {
            self.fields.resize(idx + 1, String::new());
        }
        self.fields[idx] = value.into();
    }

    /// Drops fields past `len`.
    pub fn truncate(&mut self, len: usize) {
        self.fields.truncate(len);
    }

    pub(crate) fn with_id(self, id: &str) -> Self {
        let mut fields = Vec::with_capacity(self.fields.len() + 1);
        fields.push(id.to_string());
        fields.extend(self.fields);
        Self { fields }
    }

    /// Rejects any field that would corrupt the line format.
    pub fn validate(&self) -> Result<()> {
        for (idx, field) in self.fields.iter().enumerate() {
            check_value(&format!("field {idx}"), field)?;
        }
        Ok(())
    }
}

/// Checks a single caller-supplied value against the line format.
pub fn check_value(name: &str, value: &str) -> Result<()> {
    if value.contains(FIELD_DELIMITER) {
        return Err(StoreError::invalid(format!(
            "{name} must not contain '{FIELD_DELIMITER}'"
        )));
    }
    if value.contains(['\n', '\r']) {
        return Err(StoreError::invalid(format!(
            "{name} must not contain a line break"
        )));
    }
    Ok(())
}
