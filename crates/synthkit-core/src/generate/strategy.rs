//! # Value Generation Strategies
//!
//! Each column gets exactly one `ValueGenerator`, chosen once per table from
//! its type and constraints. Unique columns always use a strategy that is
//! collision-free by construction (sequential offsets, random UUIDs) except
//! strings, which are drawn and then checked by the unique-value ledger.
//!
//! Range feasibility for sequential strategies is checked here, at plan time,
//! so that an impossible table fails before any batch is generated.

use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use rand::rngs::StdRng;
use rand::Rng;

use crate::error::{Result, SynthKitError};
use crate::generate::distribution::Sampler;
use crate::generate::providers::{lorem_text, random_alphanumeric, truncate_chars, RealisticValueProvider};
use crate::generate::value::Value;
use crate::schema::types::{ColumnSchema, ColumnType, TableSchema};

pub const DEFAULT_INT_RANGE: (f64, f64) = (0.0, 10_000.0);
pub const DEFAULT_FLOAT_RANGE: (f64, f64) = (0.0, 1_000.0);
pub const DEFAULT_DECIMAL_SCALE: u32 = 2;
/// Random alphanumeric strings are capped at this many characters.
pub const MAX_RANDOM_STRING_LEN: usize = 32;

pub fn default_date_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or_default()
}

pub fn default_date_end() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 12, 31).unwrap_or_default()
}

/// How string values are drawn.
#[derive(Debug, Clone, PartialEq)]
pub struct StringSpec {
    pub rule: Option<String>,
    pub length: Option<u32>,
    /// `Char` columns are padded out to exactly `length` characters.
    pub fixed: bool,
    /// Unconstrained `Text` columns get lorem text instead of random tokens.
    pub prose: bool,
}

impl StringSpec {
    fn from_column(column: &ColumnSchema) -> Self {
        Self {
            rule: column.realistic_rule.clone(),
            length: column.length,
            fixed: column.data_type == ColumnType::Char,
            prose: column.data_type == ColumnType::Text,
        }
    }

    /// Draw one candidate string.
    pub fn draw(&self, rng: &mut StdRng, provider: &dyn RealisticValueProvider) -> String {
        let realistic = self
            .rule
            .as_deref()
            .and_then(|rule| provider.realistic_value(rule, rng));

        let raw = match realistic {
            Some(s) => s,
            None if self.prose && self.length.is_none() => lorem_text(rng),
            None => {
                let len = match self.length {
                    Some(n) if self.fixed => n as usize,
                    Some(n) => (n as usize).min(MAX_RANDOM_STRING_LEN),
                    None => rng.random_range(12..=16),
                };
                random_alphanumeric(rng, len)
            }
        };

        match self.length {
            Some(n) => {
                let truncated = truncate_chars(raw, n as usize);
                if self.fixed {
                    format!("{:<width$}", truncated, width = n as usize)
                } else {
                    truncated
                }
            }
            None => raw,
        }
    }

    /// Widen a candidate after repeated collisions: a random numeric tag is
    /// spliced in (before the '@' of an email-like value) to leave the
    /// provider's limited vocabulary.
    pub fn widen(&self, candidate: String, rng: &mut StdRng) -> String {
        let tag: u32 = rng.random_range(0..1_000_000);
        let widened = match candidate.split_once('@') {
            Some((local, domain)) => format!("{}.{}@{}", local, tag, domain),
            None => format!("{}-{}", candidate, tag),
        };
        match self.length {
            Some(n) => truncate_chars(widened, n as usize),
            None => widened,
        }
    }
}

/// Numeric distribution settings resolved for one column.
#[derive(Debug, Clone)]
pub struct DistributedSpec {
    pub sampler: Sampler,
    pub min: Option<f64>,
    pub max: Option<f64>,
    /// Inclusive integer bounds when the column is an integer type.
    pub integer_bounds: Option<(i64, i64)>,
    /// Decimal places for `Decimal` columns.
    pub scale: Option<u32>,
}

/// Closed set of per-column strategies.
#[derive(Debug, Clone)]
pub enum ValueGenerator {
    /// `start + global_offset`.
    SequentialInt { start: i64 },
    /// `start + global_offset` for float and decimal columns.
    SequentialFloat { start: f64 },
    /// `start + global_offset` days.
    SequentialDate { start: NaiveDate },
    /// `start + global_offset` seconds.
    SequentialTimestamp { start: NaiveDateTime },
    /// Midnight plus `global_offset` seconds.
    SequentialTime,
    /// Drawn and checked against the batch-local set and the ledger.
    UniqueString(StringSpec),
    Uuid,
    UniformInt { min: i64, max: i64 },
    UniformFloat { min: f64, max: f64, scale: Option<u32> },
    Distributed(DistributedSpec),
    Boolean,
    UniformDate { start: NaiveDate, end: NaiveDate },
    UniformTimestamp { start: NaiveDateTime, end: NaiveDateTime },
    UniformTime,
    Text(StringSpec),
    Json,
    /// Pick from a parent's unique-column pool. `pool` is `None` when the
    /// parent has not been generated yet (only possible for nullable keys).
    ForeignKey {
        pool: Option<Arc<Vec<Value>>>,
        nullable: bool,
    },
}

impl ValueGenerator {
    /// Select the strategy for a column.
    ///
    /// `pool` is the parent pool for a foreign-key column, if one exists.
    pub fn for_column(
        table: &TableSchema,
        column: &ColumnSchema,
        target_rows: u64,
        pool: Option<Arc<Vec<Value>>>,
    ) -> Result<Self> {
        if let Some(fk) = &column.foreign_key {
            let empty = pool.as_ref().map_or(true, |p| p.is_empty());
            if empty && !fk.nullable && target_rows > 0 {
                return Err(SynthKitError::ForeignKeyResolution {
                    source_table: table.name.clone(),
                    source_column: column.name.clone(),
                    target_table: fk.table.clone(),
                    target_column: fk.column.clone(),
                });
            }
            return Ok(ValueGenerator::ForeignKey {
                pool,
                nullable: fk.nullable,
            });
        }

        if column.unique {
            return unique_strategy(table, column, target_rows);
        }

        let ty = column.data_type;
        if ty.is_numeric() {
            if let Some(distribution) = &column.distribution {
                let sampler = Sampler::new(distribution).map_err(|message| {
                    SynthKitError::Other(format!("{}.{}: {}", table.name, column.name, message))
                })?;
                let integer_bounds = match (ty.integer_min(), ty.integer_max()) {
                    (Some(type_min), Some(type_max)) => Some((
                        column.min_value.map_or(type_min, |m| m.ceil() as i64).max(type_min),
                        column.max_value.map_or(type_max, |m| m.floor() as i64).min(type_max),
                    )),
                    _ => None,
                };
                return Ok(ValueGenerator::Distributed(DistributedSpec {
                    sampler,
                    min: column.min_value,
                    max: column.max_value,
                    integer_bounds,
                    scale: decimal_scale(column),
                }));
            }

            if ty.is_integer() {
                let (lo, hi) = bounds(column, DEFAULT_INT_RANGE);
                let type_min = ty.integer_min().unwrap_or(i64::MIN);
                let type_max = ty.integer_max().unwrap_or(i64::MAX);
                let min = (lo.ceil() as i64).clamp(type_min, type_max);
                let max = (hi.floor() as i64).clamp(type_min, type_max).max(min);
                return Ok(ValueGenerator::UniformInt { min, max });
            }

            let (min, max) = bounds(column, DEFAULT_FLOAT_RANGE);
            return Ok(ValueGenerator::UniformFloat {
                min,
                max,
                scale: decimal_scale(column),
            });
        }

        Ok(match ty {
            ColumnType::Boolean => ValueGenerator::Boolean,
            ColumnType::Date => {
                let (start, end) = date_bounds(column);
                ValueGenerator::UniformDate { start, end }
            }
            ColumnType::Timestamp | ColumnType::TimestampTz => {
                let (start, end) = timestamp_bounds(column);
                ValueGenerator::UniformTimestamp { start, end }
            }
            ColumnType::Time => ValueGenerator::UniformTime,
            ColumnType::Json => ValueGenerator::Json,
            ColumnType::Uuid => ValueGenerator::Uuid,
            _ => ValueGenerator::Text(StringSpec::from_column(column)),
        })
    }

    /// Produce the value for the row at `global_offset`.
    ///
    /// `UniqueString` only draws a candidate here; uniqueness is enforced by
    /// the batch generator.
    pub fn generate(
        &self,
        rng: &mut StdRng,
        provider: &dyn RealisticValueProvider,
        global_offset: u64,
        fk_null_probability: f64,
    ) -> Value {
        match self {
            ValueGenerator::SequentialInt { start } => {
                Value::Int(start.saturating_add(global_offset as i64))
            }
            ValueGenerator::SequentialFloat { start } => Value::Float(start + global_offset as f64),
            ValueGenerator::SequentialDate { start } => {
                Value::Date(*start + Duration::days(global_offset as i64))
            }
            ValueGenerator::SequentialTimestamp { start } => {
                Value::Timestamp(*start + Duration::seconds(global_offset as i64))
            }
            ValueGenerator::SequentialTime => Value::Time(time_from_seconds(global_offset as u32)),
            ValueGenerator::UniqueString(spec) | ValueGenerator::Text(spec) => {
                Value::String(spec.draw(rng, provider).into())
            }
            ValueGenerator::Uuid => {
                let bytes: [u8; 16] = rng.random();
                Value::Uuid(uuid::Builder::from_random_bytes(bytes).into_uuid())
            }
            ValueGenerator::UniformInt { min, max } => Value::Int(rng.random_range(*min..=*max)),
            ValueGenerator::UniformFloat { min, max, scale } => {
                let v = if min < max {
                    rng.random_range(*min..=*max)
                } else {
                    *min
                };
                Value::Float(round_to_scale(v, *scale))
            }
            ValueGenerator::Distributed(spec) => {
                let sample = spec.sampler.sample(rng, spec.min, spec.max);
                match spec.integer_bounds {
                    Some((lo, hi)) => Value::Int((sample.round() as i64).clamp(lo, hi.max(lo))),
                    None => Value::Float(round_to_scale(sample, spec.scale)),
                }
            }
            ValueGenerator::Boolean => Value::Bool(rng.random_bool(0.5)),
            ValueGenerator::UniformDate { start, end } => {
                let span = (*end - *start).num_days().max(0);
                Value::Date(*start + Duration::days(rng.random_range(0..=span)))
            }
            ValueGenerator::UniformTimestamp { start, end } => {
                let span = (*end - *start).num_seconds().max(0);
                Value::Timestamp(*start + Duration::seconds(rng.random_range(0..=span)))
            }
            ValueGenerator::UniformTime => Value::Time(time_from_seconds(rng.random_range(0..86_400))),
            ValueGenerator::Json => {
                let keys = ["metadata", "preferences", "flags", "attributes"];
                let key = keys[rng.random_range(0..keys.len())];
                Value::Json(serde_json::json!({
                    key: random_alphanumeric(rng, 8),
                    "enabled": rng.random_bool(0.5),
                    "count": rng.random_range(0u32..100u32)
                }))
            }
            ValueGenerator::ForeignKey { pool, nullable } => {
                if *nullable && rng.random_bool(fk_null_probability) {
                    return Value::Null;
                }
                match pool.as_deref() {
                    Some(values) if !values.is_empty() => {
                        values[rng.random_range(0..values.len())].clone()
                    }
                    _ => Value::Null,
                }
            }
        }
    }

    pub fn is_unique_string(&self) -> bool {
        matches!(self, ValueGenerator::UniqueString(_))
    }
}

fn unique_strategy(table: &TableSchema, column: &ColumnSchema, rows: u64) -> Result<ValueGenerator> {
    let exhausted = |available: u64| SynthKitError::RangeExhaustion {
        table: table.name.clone(),
        column: column.name.clone(),
        available,
        required: rows,
    };

    let ty = column.data_type;
    match ty {
        _ if ty.is_integer() => {
            let start = column.min_value.map_or(1, |m| m.ceil() as i64);
            let type_max = ty.integer_max().unwrap_or(i64::MAX);
            let max = column
                .max_value
                .map_or(type_max, |m| (m.floor() as i64).min(type_max));
            let available = if max < start {
                0
            } else {
                (max as i128 - start as i128 + 1).min(u64::MAX as i128) as u64
            };
            if available < rows || start < ty.integer_min().unwrap_or(i64::MIN) {
                return Err(exhausted(available));
            }
            Ok(ValueGenerator::SequentialInt { start })
        }
        ColumnType::Float | ColumnType::Double | ColumnType::Decimal => {
            let start = column.min_value.unwrap_or(1.0);
            let max = match (column.max_value, decimal_max(column)) {
                (Some(m), Some(d)) => Some(m.min(d)),
                (m, d) => m.or(d),
            };
            if let Some(max) = max {
                let available = if max < start {
                    0
                } else {
                    (max - start).floor() as u64 + 1
                };
                if available < rows {
                    return Err(exhausted(available));
                }
            }
            Ok(ValueGenerator::SequentialFloat { start })
        }
        ColumnType::Date => {
            let (start, end) = date_bounds(column);
            let available = (end - start).num_days().max(0) as u64;
            if available < rows {
                return Err(exhausted(available));
            }
            Ok(ValueGenerator::SequentialDate { start })
        }
        ColumnType::Timestamp | ColumnType::TimestampTz => {
            let (start, end) = timestamp_bounds(column);
            let available = (end - start).num_seconds().max(0) as u64 + 1;
            if available < rows {
                return Err(exhausted(available));
            }
            Ok(ValueGenerator::SequentialTimestamp { start })
        }
        ColumnType::Time => {
            if rows > 86_400 {
                return Err(exhausted(86_400));
            }
            Ok(ValueGenerator::SequentialTime)
        }
        ColumnType::Uuid => Ok(ValueGenerator::Uuid),
        _ => Ok(ValueGenerator::UniqueString(StringSpec::from_column(column))),
    }
}

/// Resolve `[min, max]`, filling a missing side from the default span.
fn bounds(column: &ColumnSchema, default: (f64, f64)) -> (f64, f64) {
    let span = default.1 - default.0;
    match (column.min_value, column.max_value) {
        (Some(lo), Some(hi)) => (lo, hi),
        (Some(lo), None) => (lo, lo.max(default.0) + span),
        (None, Some(hi)) if hi < default.0 => (hi - span, hi),
        (None, Some(hi)) => (default.0, hi),
        (None, None) => default,
    }
}

fn decimal_scale(column: &ColumnSchema) -> Option<u32> {
    (column.data_type == ColumnType::Decimal)
        .then(|| column.scale.unwrap_or(DEFAULT_DECIMAL_SCALE))
}

/// Largest value a `Decimal(precision, scale)` column can hold.
fn decimal_max(column: &ColumnSchema) -> Option<f64> {
    if column.data_type != ColumnType::Decimal {
        return None;
    }
    let precision = column.precision?;
    let scale = column.scale.unwrap_or(0).min(precision);
    Some(10f64.powi((precision - scale) as i32) - 10f64.powi(-(scale as i32)))
}

fn round_to_scale(v: f64, scale: Option<u32>) -> f64 {
    match scale {
        Some(s) => {
            let factor = 10f64.powi(s as i32);
            (v * factor).round() / factor
        }
        None => v,
    }
}

/// A missing side of the window takes its default, moved so the window never
/// inverts around the side that was given.
fn date_bounds(column: &ColumnSchema) -> (NaiveDate, NaiveDate) {
    match (column.date_start, column.date_end) {
        (Some(start), Some(end)) => (start, end),
        (Some(start), None) => (start, default_date_end().max(start)),
        (None, Some(end)) => (default_date_start().min(end), end),
        (None, None) => (default_date_start(), default_date_end()),
    }
}

fn timestamp_bounds(column: &ColumnSchema) -> (NaiveDateTime, NaiveDateTime) {
    let (start, end) = date_bounds(column);
    (
        start.and_time(NaiveTime::MIN),
        end.and_time(time_from_seconds(86_399)),
    )
}

fn time_from_seconds(secs: u32) -> NaiveTime {
    NaiveTime::from_num_seconds_from_midnight_opt(secs % 86_400, 0).unwrap_or(NaiveTime::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::providers::FakerProvider;
    use crate::schema::types::DistributionConfig;
    use rand::SeedableRng;

    fn table() -> TableSchema {
        TableSchema::new("t", 10)
    }

    fn gen(g: &ValueGenerator, rng: &mut StdRng, offset: u64) -> Value {
        g.generate(rng, &FakerProvider, offset, 0.1)
    }

    #[test]
    fn test_unique_integer_is_sequential_from_min() {
        let col = ColumnSchema::new("id", ColumnType::Integer).unique().range(100.0, 1_000.0);
        let g = ValueGenerator::for_column(&table(), &col, 10, None).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(gen(&g, &mut rng, 0), Value::Int(100));
        assert_eq!(gen(&g, &mut rng, 9), Value::Int(109));
    }

    #[test]
    fn test_unique_integer_defaults_to_one() {
        let col = ColumnSchema::new("id", ColumnType::BigInt).unique();
        let g = ValueGenerator::for_column(&table(), &col, 10, None).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(gen(&g, &mut rng, 0), Value::Int(1));
    }

    #[test]
    fn test_unique_integer_range_exhaustion() {
        let col = ColumnSchema::new("id", ColumnType::Integer).unique().range(1.0, 5.0);
        match ValueGenerator::for_column(&table(), &col, 6, None) {
            Err(SynthKitError::RangeExhaustion {
                available,
                required,
                ..
            }) => {
                assert_eq!(available, 5);
                assert_eq!(required, 6);
            }
            other => panic!("expected RangeExhaustion, got {:?}", other),
        }
    }

    #[test]
    fn test_unique_smallint_respects_type_maximum() {
        let col = ColumnSchema::new("id", ColumnType::SmallInt).unique();
        assert!(ValueGenerator::for_column(&table(), &col, 32_767, None).is_ok());
        assert!(ValueGenerator::for_column(&table(), &col, 32_768, None).is_err());
    }

    #[test]
    fn test_unique_date_range_exhaustion() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        let col = ColumnSchema::new("day", ColumnType::Date).unique().dates(start, end);
        assert!(matches!(
            ValueGenerator::for_column(&table(), &col, 10, None),
            Err(SynthKitError::RangeExhaustion { .. })
        ));
    }

    #[test]
    fn test_unique_date_is_sequential() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
        let col = ColumnSchema::new("day", ColumnType::Date).unique().dates(start, end);
        let g = ValueGenerator::for_column(&table(), &col, 100, None).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(
            gen(&g, &mut rng, 31),
            Value::Date(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap())
        );
    }

    #[test]
    fn test_unique_with_distribution_stays_sequential() {
        let col = ColumnSchema::new("score", ColumnType::Integer)
            .unique()
            .distributed(DistributionConfig::Normal {
                mean: 0.0,
                stddev: 1.0,
            });
        let g = ValueGenerator::for_column(&table(), &col, 10, None).unwrap();
        assert!(matches!(g, ValueGenerator::SequentialInt { start: 1 }));
    }

    #[test]
    fn test_uniform_int_stays_in_range() {
        let col = ColumnSchema::new("qty", ColumnType::Integer).range(1.0, 5.0);
        let g = ValueGenerator::for_column(&table(), &col, 10, None).unwrap();
        let mut rng = StdRng::seed_from_u64(9);
        for i in 0..1_000 {
            let v = gen(&g, &mut rng, i).as_int().unwrap();
            assert!((1..=5).contains(&v));
        }
    }

    #[test]
    fn test_decimal_rounded_to_scale() {
        let mut col = ColumnSchema::new("price", ColumnType::Decimal).range(0.0, 100.0);
        col.scale = Some(2);
        let g = ValueGenerator::for_column(&table(), &col, 10, None).unwrap();
        let mut rng = StdRng::seed_from_u64(4);
        for i in 0..200 {
            let v = gen(&g, &mut rng, i).as_float().unwrap();
            assert!((v * 100.0 - (v * 100.0).round()).abs() < 1e-6, "{} has too many places", v);
        }
    }

    #[test]
    fn test_distributed_integer_is_rounded_and_clamped() {
        let col = ColumnSchema::new("age", ColumnType::Integer)
            .range(18.0, 65.0)
            .distributed(DistributionConfig::Normal {
                mean: 40.0,
                stddev: 30.0,
            });
        let g = ValueGenerator::for_column(&table(), &col, 10, None).unwrap();
        let mut rng = StdRng::seed_from_u64(2);
        for i in 0..2_000 {
            let v = gen(&g, &mut rng, i).as_int().unwrap();
            assert!((18..=65).contains(&v));
        }
    }

    #[test]
    fn test_default_dates_window() {
        let col = ColumnSchema::new("signup", ColumnType::Date);
        let g = ValueGenerator::for_column(&table(), &col, 10, None).unwrap();
        let mut rng = StdRng::seed_from_u64(8);
        for i in 0..500 {
            let d = gen(&g, &mut rng, i).as_date().unwrap();
            assert!(d >= default_date_start() && d <= default_date_end());
        }
    }

    #[test]
    fn test_lone_early_end_date_moves_start_back() {
        let mut col = ColumnSchema::new("founded", ColumnType::Date);
        col.date_end = Some(NaiveDate::from_ymd_opt(1999, 6, 30).unwrap());
        let g = ValueGenerator::for_column(&table(), &col, 10, None).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        for i in 0..200 {
            let d = gen(&g, &mut rng, i).as_date().unwrap();
            assert_eq!(d, NaiveDate::from_ymd_opt(1999, 6, 30).unwrap());
        }
    }

    #[test]
    fn test_lone_late_start_date_moves_end_forward() {
        let mut col = ColumnSchema::new("due", ColumnType::Date);
        col.date_start = Some(NaiveDate::from_ymd_opt(2030, 1, 1).unwrap());
        let g = ValueGenerator::for_column(&table(), &col, 10, None).unwrap();
        let mut rng = StdRng::seed_from_u64(4);
        for i in 0..200 {
            let d = gen(&g, &mut rng, i).as_date().unwrap();
            assert_eq!(d, NaiveDate::from_ymd_opt(2030, 1, 1).unwrap());
        }
    }

    #[test]
    fn test_lone_bounds_keep_timestamps_in_window() {
        let end = NaiveDate::from_ymd_opt(2001, 2, 3).unwrap();
        let mut early = ColumnSchema::new("logged_at", ColumnType::Timestamp);
        early.date_end = Some(end);
        let start = NaiveDate::from_ymd_opt(2031, 4, 5).unwrap();
        let mut late = ColumnSchema::new("expires_at", ColumnType::TimestampTz);
        late.date_start = Some(start);

        let early = ValueGenerator::for_column(&table(), &early, 10, None).unwrap();
        let late = ValueGenerator::for_column(&table(), &late, 10, None).unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        for i in 0..200 {
            match gen(&early, &mut rng, i) {
                Value::Timestamp(ts) => assert_eq!(ts.date(), end),
                other => panic!("expected timestamp, got {:?}", other),
            }
            match gen(&late, &mut rng, i) {
                Value::Timestamp(ts) => assert_eq!(ts.date(), start),
                other => panic!("expected timestamp, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_lone_early_end_date_unique_plan_is_checked() {
        let mut col = ColumnSchema::new("day", ColumnType::Date).unique();
        col.date_end = Some(NaiveDate::from_ymd_opt(1990, 1, 1).unwrap());
        let err = ValueGenerator::for_column(&table(), &col, 5, None).unwrap_err();
        assert!(matches!(err, SynthKitError::RangeExhaustion { .. }), "{:?}", err);
    }

    #[test]
    fn test_uuid_has_v4_bits() {
        let col = ColumnSchema::new("token", ColumnType::Uuid).unique();
        let g = ValueGenerator::for_column(&table(), &col, 10, None).unwrap();
        let mut rng = StdRng::seed_from_u64(8);
        match gen(&g, &mut rng, 0) {
            Value::Uuid(u) => assert_eq!(u.get_version_num(), 4),
            other => panic!("expected uuid, got {:?}", other),
        }
    }

    #[test]
    fn test_required_fk_without_pool_fails() {
        let col = ColumnSchema::new("customer_id", ColumnType::Integer)
            .references("customers", "id", false);
        assert!(matches!(
            ValueGenerator::for_column(&table(), &col, 10, None),
            Err(SynthKitError::ForeignKeyResolution { .. })
        ));
    }

    #[test]
    fn test_nullable_fk_without_pool_is_null() {
        let col = ColumnSchema::new("referrer_id", ColumnType::Integer)
            .optional()
            .references("customers", "id", true);
        let g = ValueGenerator::for_column(&table(), &col, 10, None).unwrap();
        let mut rng = StdRng::seed_from_u64(8);
        assert!((0..50).all(|i| gen(&g, &mut rng, i).is_null()));
    }

    #[test]
    fn test_fk_picks_from_pool() {
        let col = ColumnSchema::new("customer_id", ColumnType::Integer)
            .references("customers", "id", false);
        let pool = Arc::new(vec![Value::Int(7), Value::Int(8)]);
        let g = ValueGenerator::for_column(&table(), &col, 10, Some(pool)).unwrap();
        let mut rng = StdRng::seed_from_u64(8);
        for i in 0..100 {
            let v = gen(&g, &mut rng, i).as_int().unwrap();
            assert!(v == 7 || v == 8);
        }
    }

    #[test]
    fn test_char_is_fixed_width() {
        let col = ColumnSchema::new("code", ColumnType::Char).length(4);
        let g = ValueGenerator::for_column(&table(), &col, 10, None).unwrap();
        let mut rng = StdRng::seed_from_u64(8);
        let v = gen(&g, &mut rng, 0);
        assert_eq!(v.as_string().unwrap().chars().count(), 4);
    }

    #[test]
    fn test_widen_keeps_email_shape() {
        let spec = StringSpec {
            rule: Some("email".to_string()),
            length: None,
            fixed: false,
            prose: false,
        };
        let mut rng = StdRng::seed_from_u64(8);
        let widened = spec.widen("jane@example.com".to_string(), &mut rng);
        assert!(widened.starts_with("jane."));
        assert!(widened.ends_with("@example.com"));
    }
}
