//! Static field schemas and the record traits the store works against.

use std::cmp::Ordering;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::store::RecordId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Number,
    String,
    File,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub field: &'static str,
    pub header: &'static str,
    pub field_type: FieldType,
    pub hidden: bool,
    pub required: bool,
}

impl FieldDescriptor {
    pub const fn new(field: &'static str, header: &'static str, field_type: FieldType) -> Self {
        Self {
            field,
            header,
            field_type,
            hidden: false,
            required: false,
        }
    }

    pub const fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

pub fn visible_fields(fields: &[FieldDescriptor]) -> impl Iterator<Item = &FieldDescriptor> {
    fields.iter().filter(|descriptor| !descriptor.hidden)
}

pub fn find_field<'a>(fields: &'a [FieldDescriptor], name: &str) -> Option<&'a FieldDescriptor> {
    fields.iter().find(|descriptor| descriptor.field == name)
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Number(f64),
    Text(String),
    File { name: String, mime_type: String },
}

impl FieldValue {
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Number(_) => false,
            Self::Text(text) => text.trim().is_empty(),
            Self::File { .. } => false,
        }
    }

    /// Numbers sort before text, text before files.
    pub fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.total_cmp(b),
            (Self::Text(a), Self::Text(b)) => a.to_lowercase().cmp(&b.to_lowercase()),
            (Self::File { name: a, .. }, Self::File { name: b, .. }) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Number(_) => 0,
            Self::Text(_) => 1,
            Self::File { .. } => 2,
        }
    }
}

impl From<RecordId> for FieldValue {
    fn from(id: RecordId) -> Self {
        Self::Number(id.0 as f64)
    }
}

impl From<&str> for FieldValue {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: &'static str;

    fn id(&self) -> Option<RecordId>;
    fn set_id(&mut self, id: RecordId);
    fn field_value(&self, field: &str) -> Option<FieldValue>;
}

pub trait ChildRecord: Record {
    fn game_id(&self) -> Option<RecordId>;
    fn set_game_id(&mut self, game_id: RecordId);
}

pub const GAME_ID_FIELD: &str = "gameId";

/// Returns the header of the first required field that is missing or blank.
pub fn missing_required_field<R: Record>(
    fields: &[FieldDescriptor],
    record: &R,
) -> Option<&'static str> {
    fields
        .iter()
        .filter(|descriptor| descriptor.required)
        .find(|descriptor| {
            record
                .field_value(descriptor.field)
                .map_or(true, |value| value.is_blank())
        })
        .map(|descriptor| descriptor.header)
}
