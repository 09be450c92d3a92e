//! Field providers
//!
//! A [`Field`] knows how to normalize caller input for one column and how to
//! format the normalized value as a ClickHouse literal. Models expose their
//! fields through an ordered [`FieldSet`].

use std::fmt;

use chrono::{DateTime, Days, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use indexmap::IndexMap;

use crate::data::QueryError;
use crate::utils::sql::{NULL_LITERAL, comma_join, escape_string};

use super::value::{Value, ValueError};

/// Capability interface of a model field
pub trait Field: Send + Sync + fmt::Debug {
    /// ClickHouse column type, e.g. `Nullable(String)`
    fn db_type(&self) -> String;

    /// Normalize a raw value; naive date-times are interpreted in `tz`
    fn to_value(&self, raw: &Value, tz: &Tz) -> Result<Value, ValueError>;

    /// Format a normalized value as a SQL literal
    ///
    /// With `quote = false` string-like values are escaped but not wrapped in
    /// quotes, for embedding inside a larger literal (LIKE patterns).
    fn to_db_string(&self, value: &Value, quote: bool) -> String {
        value.to_db_string(quote)
    }
}

// =============================================================================
// String fields
// =============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct StringField;

impl Field for StringField {
    fn db_type(&self) -> String {
        "String".to_string()
    }

    fn to_value(&self, raw: &Value, _tz: &Tz) -> Result<Value, ValueError> {
        match raw {
            Value::String(_) => Ok(raw.clone()),
            other => Err(ValueError::unexpected("string", other)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedStringField {
    length: usize,
}

impl FixedStringField {
    pub fn new(length: usize) -> Self {
        Self { length }
    }
}

impl Field for FixedStringField {
    fn db_type(&self) -> String {
        format!("FixedString({})", self.length)
    }

    fn to_value(&self, raw: &Value, _tz: &Tz) -> Result<Value, ValueError> {
        let s = raw
            .as_str()
            .ok_or_else(|| ValueError::unexpected("string", raw))?
            .trim_end_matches('\0');
        if s.len() > self.length {
            return Err(ValueError::new(format!(
                "value of {} bytes exceeds FixedString({})",
                s.len(),
                self.length
            )));
        }
        Ok(Value::String(s.to_string()))
    }
}

// =============================================================================
// Numeric fields
// =============================================================================

#[derive(Debug, Clone, Copy)]
pub struct IntField {
    db_type: &'static str,
    min: i128,
    max: i128,
}

impl IntField {
    pub fn int8() -> Self {
        Self::ranged("Int8", i8::MIN as i128, i8::MAX as i128)
    }

    pub fn int16() -> Self {
        Self::ranged("Int16", i16::MIN as i128, i16::MAX as i128)
    }

    pub fn int32() -> Self {
        Self::ranged("Int32", i32::MIN as i128, i32::MAX as i128)
    }

    pub fn int64() -> Self {
        Self::ranged("Int64", i64::MIN as i128, i64::MAX as i128)
    }

    pub fn uint8() -> Self {
        Self::ranged("UInt8", 0, u8::MAX as i128)
    }

    pub fn uint16() -> Self {
        Self::ranged("UInt16", 0, u16::MAX as i128)
    }

    pub fn uint32() -> Self {
        Self::ranged("UInt32", 0, u32::MAX as i128)
    }

    pub fn uint64() -> Self {
        Self::ranged("UInt64", 0, u64::MAX as i128)
    }

    fn ranged(db_type: &'static str, min: i128, max: i128) -> Self {
        Self { db_type, min, max }
    }

    fn checked(&self, n: i128) -> Result<Value, ValueError> {
        if n < self.min || n > self.max {
            return Err(ValueError::new(format!(
                "{} is out of range for {}",
                n, self.db_type
            )));
        }
        Ok(match i64::try_from(n) {
            Ok(i) => Value::Int(i),
            Err(_) => Value::UInt(n as u64),
        })
    }
}

impl Field for IntField {
    fn db_type(&self) -> String {
        self.db_type.to_string()
    }

    fn to_value(&self, raw: &Value, _tz: &Tz) -> Result<Value, ValueError> {
        match raw {
            Value::Int(i) => self.checked(*i as i128),
            Value::UInt(u) => self.checked(*u as i128),
            Value::Bool(b) => self.checked(*b as i128),
            Value::Float(f) if f.fract() == 0.0 && f.is_finite() => self.checked(*f as i128),
            Value::String(s) => s
                .trim()
                .parse::<i128>()
                .map_err(|_| ValueError::unexpected("integer", raw))
                .and_then(|n| self.checked(n)),
            other => Err(ValueError::unexpected("integer", other)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FloatField {
    db_type: &'static str,
}

impl FloatField {
    pub fn float32() -> Self {
        Self { db_type: "Float32" }
    }

    pub fn float64() -> Self {
        Self { db_type: "Float64" }
    }
}

impl Field for FloatField {
    fn db_type(&self) -> String {
        self.db_type.to_string()
    }

    fn to_value(&self, raw: &Value, _tz: &Tz) -> Result<Value, ValueError> {
        match raw {
            Value::Float(_) => Ok(raw.clone()),
            Value::Int(i) => Ok(Value::Float(*i as f64)),
            Value::UInt(u) => Ok(Value::Float(*u as f64)),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| ValueError::unexpected("float", raw)),
            other => Err(ValueError::unexpected("float", other)),
        }
    }
}

/// Boolean stored as `UInt8` (0 or 1)
#[derive(Debug, Clone, Copy, Default)]
pub struct BooleanField;

impl Field for BooleanField {
    fn db_type(&self) -> String {
        "UInt8".to_string()
    }

    fn to_value(&self, raw: &Value, _tz: &Tz) -> Result<Value, ValueError> {
        match raw {
            Value::Bool(_) => Ok(raw.clone()),
            Value::Int(0) | Value::UInt(0) => Ok(Value::Bool(false)),
            Value::Int(1) | Value::UInt(1) => Ok(Value::Bool(true)),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "1" | "true" => Ok(Value::Bool(true)),
                "0" | "false" => Ok(Value::Bool(false)),
                _ => Err(ValueError::unexpected("boolean", raw)),
            },
            other => Err(ValueError::unexpected("boolean", other)),
        }
    }
}

// =============================================================================
// Date and time fields
// =============================================================================

fn epoch_date() -> NaiveDate {
    DateTime::UNIX_EPOCH.date_naive()
}

fn localize(naive: &NaiveDateTime, tz: &Tz) -> Result<DateTime<Utc>, ValueError> {
    tz.from_local_datetime(naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| ValueError::new(format!("{} does not exist in {}", naive, tz.name())))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DateField;

impl Field for DateField {
    fn db_type(&self) -> String {
        "Date".to_string()
    }

    fn to_value(&self, raw: &Value, tz: &Tz) -> Result<Value, ValueError> {
        match raw {
            Value::Date(_) => Ok(raw.clone()),
            Value::DateTime(dt) => Ok(Value::Date(dt.with_timezone(tz).date_naive())),
            Value::Int(days) if *days >= 0 => epoch_date()
                .checked_add_days(Days::new(*days as u64))
                .map(Value::Date)
                .ok_or_else(|| ValueError::unexpected("date", raw)),
            Value::UInt(days) => epoch_date()
                .checked_add_days(Days::new(*days))
                .map(Value::Date)
                .ok_or_else(|| ValueError::unexpected("date", raw)),
            Value::String(s) if s == "0000-00-00" => Ok(Value::Date(epoch_date())),
            Value::String(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .map(Value::Date)
                .map_err(|_| ValueError::unexpected("date (YYYY-MM-DD)", raw)),
            other => Err(ValueError::unexpected("date", other)),
        }
    }
}

/// Date-time rendered as a quoted Unix timestamp
#[derive(Debug, Clone, Copy, Default)]
pub struct DateTimeField;

impl DateTimeField {
    fn parse(s: &str, tz: &Tz) -> Option<DateTime<Utc>> {
        let s = s.trim();
        if s == "0000-00-00 00:00:00" {
            return Some(DateTime::UNIX_EPOCH);
        }
        if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
            return s
                .parse::<i64>()
                .ok()
                .and_then(|ts| DateTime::from_timestamp(ts, 0));
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
            return localize(&naive, tz).ok();
        }
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .and_then(|naive| localize(&naive, tz).ok())
    }
}

impl Field for DateTimeField {
    fn db_type(&self) -> String {
        "DateTime".to_string()
    }

    fn to_value(&self, raw: &Value, tz: &Tz) -> Result<Value, ValueError> {
        match raw {
            Value::DateTime(_) => Ok(raw.clone()),
            Value::Date(d) => {
                let naive = d
                    .and_hms_opt(0, 0, 0)
                    .ok_or_else(|| ValueError::unexpected("datetime", raw))?;
                localize(&naive, tz).map(Value::DateTime)
            }
            Value::Int(ts) => DateTime::from_timestamp(*ts, 0)
                .map(Value::DateTime)
                .ok_or_else(|| ValueError::unexpected("datetime", raw)),
            Value::UInt(ts) => i64::try_from(*ts)
                .ok()
                .and_then(|ts| DateTime::from_timestamp(ts, 0))
                .map(Value::DateTime)
                .ok_or_else(|| ValueError::unexpected("datetime", raw)),
            Value::String(s) => Self::parse(s, tz)
                .map(Value::DateTime)
                .ok_or_else(|| ValueError::unexpected("datetime", raw)),
            other => Err(ValueError::unexpected("datetime", other)),
        }
    }

    fn to_db_string(&self, value: &Value, quote: bool) -> String {
        match value {
            Value::DateTime(dt) => escape_string(&format!("{:010}", dt.timestamp()), quote),
            other => other.to_db_string(quote),
        }
    }
}

// =============================================================================
// Enum field
// =============================================================================

/// `Enum8`/`Enum16` column holding named values
#[derive(Debug, Clone)]
pub struct EnumField {
    db_type: &'static str,
    variants: Vec<(String, i16)>,
}

impl EnumField {
    pub fn enum8<I, S>(variants: I) -> Self
    where
        I: IntoIterator<Item = (S, i16)>,
        S: Into<String>,
    {
        Self::with_type("Enum8", variants)
    }

    pub fn enum16<I, S>(variants: I) -> Self
    where
        I: IntoIterator<Item = (S, i16)>,
        S: Into<String>,
    {
        Self::with_type("Enum16", variants)
    }

    fn with_type<I, S>(db_type: &'static str, variants: I) -> Self
    where
        I: IntoIterator<Item = (S, i16)>,
        S: Into<String>,
    {
        Self {
            db_type,
            variants: variants.into_iter().map(|(n, v)| (n.into(), v)).collect(),
        }
    }
}

impl Field for EnumField {
    fn db_type(&self) -> String {
        let variants = self
            .variants
            .iter()
            .map(|(name, value)| format!("{} = {}", escape_string(name, true), value));
        format!("{}({})", self.db_type, comma_join(variants))
    }

    fn to_value(&self, raw: &Value, _tz: &Tz) -> Result<Value, ValueError> {
        let found = match raw {
            Value::String(s) => self.variants.iter().find(|(name, _)| name == s),
            Value::Int(i) => self.variants.iter().find(|(_, v)| *v as i64 == *i),
            Value::UInt(u) => self.variants.iter().find(|(_, v)| *v as i64 == *u as i64),
            other => return Err(ValueError::unexpected("enum name or value", other)),
        };
        found
            .map(|(name, _)| Value::String(name.clone()))
            .ok_or_else(|| {
                ValueError::new(format!("{} is not a member of {}", raw, self.db_type()))
            })
    }
}

// =============================================================================
// Wrapping fields
// =============================================================================

#[derive(Debug)]
pub struct NullableField {
    inner: Box<dyn Field>,
}

impl NullableField {
    pub fn new(inner: impl Field + 'static) -> Self {
        Self {
            inner: Box::new(inner),
        }
    }
}

impl Field for NullableField {
    fn db_type(&self) -> String {
        format!("Nullable({})", self.inner.db_type())
    }

    fn to_value(&self, raw: &Value, tz: &Tz) -> Result<Value, ValueError> {
        match raw {
            Value::Null => Ok(Value::Null),
            Value::String(s) if s == NULL_LITERAL => Ok(Value::Null),
            other => self.inner.to_value(other, tz),
        }
    }

    fn to_db_string(&self, value: &Value, quote: bool) -> String {
        match value {
            Value::Null => NULL_LITERAL.to_string(),
            other => self.inner.to_db_string(other, quote),
        }
    }
}

#[derive(Debug)]
pub struct ArrayField {
    inner: Box<dyn Field>,
}

impl ArrayField {
    pub fn new(inner: impl Field + 'static) -> Self {
        Self {
            inner: Box::new(inner),
        }
    }
}

impl Field for ArrayField {
    fn db_type(&self) -> String {
        format!("Array({})", self.inner.db_type())
    }

    fn to_value(&self, raw: &Value, tz: &Tz) -> Result<Value, ValueError> {
        match raw {
            Value::Array(items) => items
                .iter()
                .map(|item| self.inner.to_value(item, tz))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            other => Err(ValueError::unexpected("array", other)),
        }
    }

    fn to_db_string(&self, value: &Value, quote: bool) -> String {
        match value {
            Value::Array(items) => format!(
                "[{}]",
                comma_join(items.iter().map(|v| self.inner.to_db_string(v, true)))
            ),
            other => other.to_db_string(quote),
        }
    }
}

// =============================================================================
// Field set
// =============================================================================

/// Ordered mapping of field name to field provider for one model
#[derive(Debug)]
pub struct FieldSet {
    model: &'static str,
    fields: IndexMap<String, Box<dyn Field>>,
}

impl FieldSet {
    pub fn new(model: &'static str) -> Self {
        Self {
            model,
            fields: IndexMap::new(),
        }
    }

    /// Add a field, builder style
    pub fn with(mut self, name: impl Into<String>, field: impl Field + 'static) -> Self {
        self.fields.insert(name.into(), Box::new(field));
        self
    }

    pub fn model(&self) -> &'static str {
        self.model
    }

    /// Look up a field provider by name
    pub fn get(&self, name: &str) -> Result<&dyn Field, QueryError> {
        self.fields
            .get(name)
            .map(|f| f.as_ref())
            .ok_or_else(|| QueryError::FieldNotFound {
                model: self.model,
                field: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Field names in declaration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
