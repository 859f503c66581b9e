//! Typed metadata predicates and the latest-version reduction.
//!
//! Filters are built from `key=value` pairs or a JSON object. Keys are checked
//! against the closed [`Field`] set when the filter is constructed, so an
//! unknown field is reported to the caller instead of silently matching
//! nothing.

use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::types::{ChunkMetadata, ScoredChunk};

/// Value of the `version` key that requests latest-version deduplication.
pub const LATEST_KEYWORD: &str = "latest";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    DocId,
    Title,
    Url,
    Section,
    Department,
    DocType,
    Version,
}

impl Field {
    pub const ALL: [Field; 7] = [
        Field::DocId,
        Field::Title,
        Field::Url,
        Field::Section,
        Field::Department,
        Field::DocType,
        Field::Version,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Field::DocId => "doc_id",
            Field::Title => "title",
            Field::Url => "url",
            Field::Section => "section",
            Field::Department => "department",
            Field::DocType => "doc_type",
            Field::Version => "version",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Field {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Field::ALL.into_iter().find(|f| f.as_str() == s).ok_or_else(|| {
            let known: Vec<&str> = Field::ALL.iter().map(|f| f.as_str()).collect();
            Error::FilterSyntax(format!("unknown field '{}' (expected one of: {})", s, known.join(", ")))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Text(String),
    Version(u32),
}

impl Value {
    /// Parses a raw string for `field`, rejecting values of the wrong type.
    pub fn parse(field: Field, raw: &str) -> Result<Self> {
        match field {
            Field::Version => raw.trim().parse::<u32>().map(Value::Version).map_err(|_| {
                Error::FilterSyntax(format!("version expects an integer or '{}', got '{}'", LATEST_KEYWORD, raw))
            }),
            _ => Ok(Value::Text(raw.to_string())),
        }
    }

    fn from_json(field: Field, value: &JsonValue) -> Result<Self> {
        match (field, value) {
            (_, JsonValue::String(s)) => Self::parse(field, s),
            (Field::Version, JsonValue::Number(n)) => n
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .map(Value::Version)
                .ok_or_else(|| Error::FilterSyntax(format!("version out of range: {}", n))),
            (field, other) => Err(Error::FilterSyntax(format!("unsupported value for '{}': {}", field, other))),
        }
    }

    fn type_checks(&self, field: Field) -> bool {
        matches!((field, self), (Field::Version, Value::Version(_)))
            || (field != Field::Version && matches!(self, Value::Text(_)))
    }
}

/// Expression tree evaluated against [`ChunkMetadata`].
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Predicate {
    #[default]
    Any,
    Eq(Field, Value),
    In(Field, Vec<Value>),
    And(Vec<Predicate>),
}

impl Predicate {
    pub fn matches(&self, meta: &ChunkMetadata) -> bool {
        match self {
            Predicate::Any => true,
            Predicate::Eq(field, value) => field_matches(meta, *field, value),
            Predicate::In(field, values) => values.iter().any(|v| field_matches(meta, *field, v)),
            Predicate::And(parts) => parts.iter().all(|p| p.matches(meta)),
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            Predicate::Any => Ok(()),
            Predicate::Eq(field, value) => check_value(*field, value),
            Predicate::In(field, values) => {
                if values.is_empty() {
                    return Err(Error::FilterSyntax(format!("empty value set for '{}'", field)));
                }
                values.iter().try_for_each(|v| check_value(*field, v))
            }
            Predicate::And(parts) => parts.iter().try_for_each(Predicate::validate),
        }
    }
}

fn check_value(field: Field, value: &Value) -> Result<()> {
    if value.type_checks(field) {
        Ok(())
    } else {
        Err(Error::FilterSyntax(format!("value {:?} has the wrong type for '{}'", value, field)))
    }
}

fn text_field(meta: &ChunkMetadata, field: Field) -> Option<&str> {
    match field {
        Field::DocId => Some(meta.doc_id.as_str()),
        Field::Title => meta.title.as_deref(),
        Field::Url => meta.url.as_deref(),
        Field::Section => meta.section.as_deref(),
        Field::Department => meta.department.as_deref(),
        Field::DocType => meta.doc_type.as_deref(),
        Field::Version => None,
    }
}

fn field_matches(meta: &ChunkMetadata, field: Field, value: &Value) -> bool {
    match (field, value) {
        (Field::Version, Value::Version(v)) => meta.version == *v,
        (_, Value::Text(expected)) => text_field(meta, field) == Some(expected.as_str()),
        _ => false,
    }
}

/// `matches(chunk.metadata, predicate)`.
pub fn matches(meta: &ChunkMetadata, predicate: &Predicate) -> bool {
    predicate.matches(meta)
}

/// A validated predicate plus the `latest` flag.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Filter {
    predicate: Predicate,
    latest: bool,
}

impl Filter {
    pub fn new(predicate: Predicate, latest: bool) -> Result<Self> {
        predicate.validate()?;
        Ok(Self { predicate, latest })
    }

    /// Matches every chunk and keeps all versions.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn with_latest(mut self) -> Self {
        self.latest = true;
        self
    }

    /// Builds a filter from `(key, value)` pairs. Repeated keys become set
    /// membership; `version = latest` sets the latest flag.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut clauses: Vec<(Field, Vec<Value>)> = Vec::new();
        let mut latest = false;
        for (key, raw) in pairs {
            let field: Field = key.as_ref().trim().parse()?;
            let raw = raw.as_ref().trim();
            if field == Field::Version && raw == LATEST_KEYWORD {
                latest = true;
                continue;
            }
            push_clause(&mut clauses, field, Value::parse(field, raw)?);
        }
        Self::new(build_predicate(clauses), latest)
    }

    /// Parses `key=value` assignments as given on a command line.
    pub fn from_assignments<S: AsRef<str>>(items: &[S]) -> Result<Self> {
        let pairs = items
            .iter()
            .map(|item| {
                item.as_ref()
                    .split_once('=')
                    .ok_or_else(|| Error::FilterSyntax(format!("expected key=value, got '{}'", item.as_ref())))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::from_pairs(pairs)
    }

    /// Builds a filter from a JSON object: strings and numbers are equality,
    /// arrays are set membership, `"version": "latest"` sets the latest flag.
    pub fn from_json(value: &JsonValue) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| Error::FilterSyntax(format!("filter must be a JSON object, got {}", value)))?;
        let mut clauses: Vec<(Field, Vec<Value>)> = Vec::new();
        let mut latest = false;
        for (key, raw) in object {
            let field: Field = key.parse()?;
            match raw {
                JsonValue::String(s) if field == Field::Version && s == LATEST_KEYWORD => latest = true,
                JsonValue::Array(items) => {
                    if items.is_empty() {
                        return Err(Error::FilterSyntax(format!("empty value set for '{}'", field)));
                    }
                    for item in items {
                        push_clause(&mut clauses, field, Value::from_json(field, item)?);
                    }
                }
                scalar => push_clause(&mut clauses, field, Value::from_json(field, scalar)?),
            }
        }
        Self::new(build_predicate(clauses), latest)
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    pub fn latest(&self) -> bool {
        self.latest
    }

    pub fn matches(&self, meta: &ChunkMetadata) -> bool {
        self.predicate.matches(meta)
    }
}

fn push_clause(clauses: &mut Vec<(Field, Vec<Value>)>, field: Field, value: Value) {
    match clauses.iter_mut().find(|(f, _)| *f == field) {
        Some((_, values)) => {
            if !values.contains(&value) {
                values.push(value);
            }
        }
        None => clauses.push((field, vec![value])),
    }
}

fn build_predicate(clauses: Vec<(Field, Vec<Value>)>) -> Predicate {
    let mut parts: Vec<Predicate> = clauses
        .into_iter()
        .map(|(field, mut values)| {
            if values.len() == 1 {
                Predicate::Eq(field, values.remove(0))
            } else {
                Predicate::In(field, values)
            }
        })
        .collect();
    match parts.len() {
        0 => Predicate::Any,
        1 => parts.remove(0),
        _ => Predicate::And(parts),
    }
}

/// Groups candidates by source document and keeps, per document, the
/// highest-ranked chunk among those carrying the document's maximum version.
/// Input order is preserved.
pub fn latest_only(candidates: Vec<ScoredChunk>) -> Vec<ScoredChunk> {
    let mut newest: HashMap<String, u32> = HashMap::new();
    for hit in &candidates {
        let meta = &hit.chunk.metadata;
        newest
            .entry(meta.doc_id.clone())
            .and_modify(|v| *v = (*v).max(meta.version))
            .or_insert(meta.version);
    }
    let mut kept: HashSet<String> = HashSet::new();
    candidates
        .into_iter()
        .filter(|hit| {
            let meta = &hit.chunk.metadata;
            newest.get(&meta.doc_id) == Some(&meta.version) && kept.insert(meta.doc_id.clone())
        })
        .collect()
}
