use std::cmp::Ordering;

use crate::schema::{FieldDescriptor, FieldType, FieldValue, Record};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortOrder {
    pub field: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchParameters {
    pub query: Option<String>,
    pub sort: Option<SortOrder>,
    pub offset: usize,
    /// `None` runs to the end of the result.
    pub limit: Option<usize>,
}

impl SearchParameters {
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn sorted_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sort = Some(SortOrder {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = Some(limit);
        self
    }
}

#[derive(Debug, Clone)]
pub struct SearchResult<R> {
    pub records: Vec<R>,
    /// Matches before paging.
    pub total: usize,
}

impl<R> SearchResult<R> {
    pub fn empty() -> Self {
        Self {
            records: Vec::new(),
            total: 0,
        }
    }

    pub fn map<U>(self, f: impl FnMut(R) -> U) -> SearchResult<U> {
        SearchResult {
            records: self.records.into_iter().map(f).collect(),
            total: self.total,
        }
    }
}

pub(crate) fn run_search<R: Record>(
    records: Vec<R>,
    params: &SearchParameters,
    fields: &[FieldDescriptor],
) -> SearchResult<R> {
    let needle = params
        .query
        .as_deref()
        .map(str::trim)
        .filter(|query| !query.is_empty())
        .map(str::to_lowercase);

    let mut matched = records
        .into_iter()
        .filter(|record| {
            needle
                .as_deref()
                .map_or(true, |needle| matches_query(record, needle, fields))
        })
        .collect::<Vec<_>>();

    if let Some(order) = &params.sort {
        let mut keyed = matched
            .into_iter()
            .map(|record| (record.field_value(&order.field), record))
            .collect::<Vec<_>>();
        keyed.sort_by(|(a, _), (b, _)| compare_sort_keys(a.as_ref(), b.as_ref(), order.direction));
        matched = keyed.into_iter().map(|(_, record)| record).collect();
    }

    let total = matched.len();
    let records = matched
        .into_iter()
        .skip(params.offset)
        .take(params.limit.unwrap_or(usize::MAX))
        .collect();
    SearchResult { records, total }
}

fn matches_query<R: Record>(record: &R, needle: &str, fields: &[FieldDescriptor]) -> bool {
    fields
        .iter()
        .filter(|descriptor| descriptor.field_type == FieldType::String)
        .filter_map(|descriptor| record.field_value(descriptor.field))
        .any(|value| match value {
            FieldValue::Text(text) => text.to_lowercase().contains(needle),
            _ => false,
        })
}

// Rows without the sort field go last in either direction.
fn compare_sort_keys(
    a: Option<&FieldValue>,
    b: Option<&FieldValue>,
    direction: SortDirection,
) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => match direction {
            SortDirection::Ascending => a.compare(b),
            SortDirection::Descending => b.compare(a),
        },
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
