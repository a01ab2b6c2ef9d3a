//! # Columnar Batch Artifacts
//!
//! Each generated batch is written once to
//! `<root>/<experiment>/<table>/batch-<index>.parquet` (zstd-compressed) and
//! never modified. Files are written to a temporary name, synced and renamed,
//! so a reader never observes a half-written batch.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BooleanArray, BooleanBuilder, Date32Array, Date32Builder, Float64Array,
    Float64Builder, Int64Array, Int64Builder, StringArray, StringBuilder, Time64MicrosecondArray,
    Time64MicrosecondBuilder, TimestampMicrosecondArray, TimestampMicrosecondBuilder,
};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Timelike};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;

use crate::error::{Result, SynthKitError};
use crate::generate::batch::GeneratedBatch;
use crate::generate::value::Value;
use crate::schema::types::ColumnType;

const EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Name and type of one artifact column.
pub type ArtifactColumn = (String, ColumnType);

/// Filesystem layout of batch artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn table_dir(&self, experiment: &str, table: &str) -> PathBuf {
        self.root.join(experiment).join(table)
    }

    pub fn batch_path(&self, experiment: &str, table: &str, index: u64) -> PathBuf {
        self.table_dir(experiment, table)
            .join(format!("batch-{}.parquet", index))
    }

    /// Remove any artifacts from a previous run and recreate the directory.
    pub fn reset_table_dir(&self, experiment: &str, table: &str) -> Result<PathBuf> {
        let dir = self.table_dir(experiment, table);
        self.remove_table_dir(experiment, table)?;
        std::fs::create_dir_all(&dir).map_err(|e| SynthKitError::Output {
            message: format!("Failed to create artifact directory {}", dir.display()),
            source: e,
        })?;
        Ok(dir)
    }

    pub fn remove_table_dir(&self, experiment: &str, table: &str) -> Result<()> {
        let dir = self.table_dir(experiment, table);
        if dir.exists() {
            std::fs::remove_dir_all(&dir).map_err(|e| SynthKitError::Output {
                message: format!("Failed to clear artifact directory {}", dir.display()),
                source: e,
            })?;
        }
        Ok(())
    }

    /// Batch artifacts of a table, ordered by batch index.
    pub fn list_batches(&self, experiment: &str, table: &str) -> Result<Vec<PathBuf>> {
        let dir = self.table_dir(experiment, table);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let entries = std::fs::read_dir(&dir).map_err(|e| SynthKitError::Output {
            message: format!("Failed to list artifacts in {}", dir.display()),
            source: e,
        })?;

        let mut batches: Vec<(u64, PathBuf)> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let path = entry.path();
                let index = path
                    .file_name()?
                    .to_str()?
                    .strip_prefix("batch-")?
                    .strip_suffix(".parquet")?
                    .parse()
                    .ok()?;
                Some((index, path))
            })
            .collect();
        batches.sort_by_key(|(index, _)| *index);
        Ok(batches.into_iter().map(|(_, path)| path).collect())
    }

    /// Write one batch atomically.
    pub fn write_batch(
        &self,
        experiment: &str,
        columns: &[ArtifactColumn],
        batch: &GeneratedBatch,
    ) -> Result<PathBuf> {
        let path = self.batch_path(experiment, &batch.table, batch.index);
        let record_batch = to_record_batch(columns, batch).map_err(|message| artifact_error(&path, message))?;

        let tmp_path = path.with_extension("parquet.tmp");
        let file = File::create(&tmp_path).map_err(|e| SynthKitError::Output {
            message: format!("Failed to create {}", tmp_path.display()),
            source: e,
        })?;

        let props = WriterProperties::builder()
            .set_compression(Compression::ZSTD(ZstdLevel::default()))
            .build();
        let mut writer = ArrowWriter::try_new(file, record_batch.schema(), Some(props))
            .map_err(|e| artifact_error(&tmp_path, e.to_string()))?;
        writer
            .write(&record_batch)
            .map_err(|e| artifact_error(&tmp_path, e.to_string()))?;
        let mut file = writer
            .into_inner()
            .map_err(|e| artifact_error(&tmp_path, e.to_string()))?;
        file.flush()
            .and_then(|_| file.sync_all())
            .map_err(|e| SynthKitError::Output {
                message: format!("Failed to sync {}", tmp_path.display()),
                source: e,
            })?;

        std::fs::rename(&tmp_path, &path).map_err(|e| SynthKitError::Output {
            message: format!("Failed to move artifact into place at {}", path.display()),
            source: e,
        })?;
        Ok(path)
    }
}

/// Read a batch artifact back into column-major values.
pub fn read_batch(path: &Path, columns: &[ArtifactColumn]) -> Result<Vec<Vec<Value>>> {
    let file = File::open(path).map_err(|e| SynthKitError::Output {
        message: format!("Failed to open artifact {}", path.display()),
        source: e,
    })?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .and_then(|b| b.build())
        .map_err(|e| artifact_error(path, e.to_string()))?;

    let mut out: Vec<Vec<Value>> = columns.iter().map(|_| Vec::new()).collect();
    for record_batch in reader {
        let record_batch = record_batch.map_err(|e| artifact_error(path, e.to_string()))?;
        if record_batch.num_columns() != columns.len() {
            return Err(artifact_error(
                path,
                format!(
                    "expected {} columns, found {}",
                    columns.len(),
                    record_batch.num_columns()
                ),
            ));
        }
        for (idx, (name, ty)) in columns.iter().enumerate() {
            let array = record_batch.column(idx);
            decode_column(array.as_ref(), *ty, &mut out[idx])
                .map_err(|m| artifact_error(path, format!("column {}: {}", name, m)))?;
        }
    }
    Ok(out)
}

fn artifact_error(path: &Path, message: impl Into<String>) -> SynthKitError {
    SynthKitError::Artifact {
        path: path.display().to_string(),
        message: message.into(),
    }
}

pub fn arrow_type(ty: ColumnType) -> DataType {
    match ty {
        ColumnType::SmallInt | ColumnType::Integer | ColumnType::BigInt => DataType::Int64,
        ColumnType::Float | ColumnType::Double | ColumnType::Decimal => DataType::Float64,
        ColumnType::Date => DataType::Date32,
        ColumnType::Time => DataType::Time64(TimeUnit::Microsecond),
        ColumnType::Timestamp | ColumnType::TimestampTz => {
            DataType::Timestamp(TimeUnit::Microsecond, None)
        }
        ColumnType::Boolean => DataType::Boolean,
        ColumnType::Char
        | ColumnType::VarChar
        | ColumnType::Text
        | ColumnType::Json
        | ColumnType::Uuid => DataType::Utf8,
    }
}

pub fn arrow_schema(columns: &[ArtifactColumn]) -> SchemaRef {
    let fields: Vec<Field> = columns
        .iter()
        .map(|(name, ty)| Field::new(name, arrow_type(*ty), true))
        .collect();
    Arc::new(Schema::new(fields))
}

fn to_record_batch(
    columns: &[ArtifactColumn],
    batch: &GeneratedBatch,
) -> std::result::Result<RecordBatch, String> {
    if columns.len() != batch.columns.len() {
        return Err(format!(
            "batch has {} columns but the table declares {}",
            batch.columns.len(),
            columns.len()
        ));
    }
    let arrays = columns
        .iter()
        .zip(&batch.columns)
        .map(|((name, ty), values)| {
            encode_column(*ty, values).map_err(|m| format!("column {}: {}", name, m))
        })
        .collect::<std::result::Result<Vec<ArrayRef>, String>>()?;
    RecordBatch::try_new(arrow_schema(columns), arrays).map_err(|e| e.to_string())
}

fn mismatch(expected: &str, value: &Value) -> String {
    format!("expected {} value, got {:?}", expected, value)
}

fn encode_column(ty: ColumnType, values: &[Value]) -> std::result::Result<ArrayRef, String> {
    let array: ArrayRef = match arrow_type(ty) {
        DataType::Int64 => {
            let mut builder = Int64Builder::with_capacity(values.len());
            for v in values {
                match v {
                    Value::Null => builder.append_null(),
                    Value::Int(i) => builder.append_value(*i),
                    other => return Err(mismatch("integer", other)),
                }
            }
            Arc::new(builder.finish())
        }
        DataType::Float64 => {
            let mut builder = Float64Builder::with_capacity(values.len());
            for v in values {
                match v {
                    Value::Null => builder.append_null(),
                    Value::Float(f) => builder.append_value(*f),
                    Value::Int(i) => builder.append_value(*i as f64),
                    other => return Err(mismatch("float", other)),
                }
            }
            Arc::new(builder.finish())
        }
        DataType::Date32 => {
            let mut builder = Date32Builder::with_capacity(values.len());
            for v in values {
                match v {
                    Value::Null => builder.append_null(),
                    Value::Date(d) => builder.append_value(d.num_days_from_ce() - EPOCH_DAYS_FROM_CE),
                    other => return Err(mismatch("date", other)),
                }
            }
            Arc::new(builder.finish())
        }
        DataType::Time64(_) => {
            let mut builder = Time64MicrosecondBuilder::with_capacity(values.len());
            for v in values {
                match v {
                    Value::Null => builder.append_null(),
                    Value::Time(t) => builder.append_value(
                        t.num_seconds_from_midnight() as i64 * 1_000_000
                            + (t.nanosecond() / 1_000) as i64,
                    ),
                    other => return Err(mismatch("time", other)),
                }
            }
            Arc::new(builder.finish())
        }
        DataType::Timestamp(_, _) => {
            let mut builder = TimestampMicrosecondBuilder::with_capacity(values.len());
            for v in values {
                match v {
                    Value::Null => builder.append_null(),
                    Value::Timestamp(ts) => builder.append_value(ts.and_utc().timestamp_micros()),
                    other => return Err(mismatch("timestamp", other)),
                }
            }
            Arc::new(builder.finish())
        }
        DataType::Boolean => {
            let mut builder = BooleanBuilder::with_capacity(values.len());
            for v in values {
                match v {
                    Value::Null => builder.append_null(),
                    Value::Bool(b) => builder.append_value(*b),
                    other => return Err(mismatch("boolean", other)),
                }
            }
            Arc::new(builder.finish())
        }
        _ => {
            let mut builder = StringBuilder::with_capacity(values.len(), values.len() * 16);
            for v in values {
                match v {
                    Value::Null => builder.append_null(),
                    other => builder.append_value(other.to_csv_string()),
                }
            }
            Arc::new(builder.finish())
        }
    };
    Ok(array)
}

fn downcast<'a, T: 'static>(array: &'a dyn Array) -> std::result::Result<&'a T, String> {
    array
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| format!("unexpected arrow type {}", array.data_type()))
}

fn decode_column(
    array: &dyn Array,
    ty: ColumnType,
    out: &mut Vec<Value>,
) -> std::result::Result<(), String> {
    out.reserve(array.len());
    match arrow_type(ty) {
        DataType::Int64 => {
            let a = downcast::<Int64Array>(array)?;
            out.extend(a.iter().map(|v| v.map_or(Value::Null, Value::Int)));
        }
        DataType::Float64 => {
            let a = downcast::<Float64Array>(array)?;
            out.extend(a.iter().map(|v| v.map_or(Value::Null, Value::Float)));
        }
        DataType::Date32 => {
            let a = downcast::<Date32Array>(array)?;
            for v in a.iter() {
                out.push(match v {
                    None => Value::Null,
                    Some(days) => NaiveDate::from_num_days_from_ce_opt(days + EPOCH_DAYS_FROM_CE)
                        .map(Value::Date)
                        .ok_or_else(|| format!("date out of range: {}", days))?,
                });
            }
        }
        DataType::Time64(_) => {
            let a = downcast::<Time64MicrosecondArray>(array)?;
            for v in a.iter() {
                out.push(match v {
                    None => Value::Null,
                    Some(us) => NaiveTime::from_num_seconds_from_midnight_opt(
                        (us / 1_000_000) as u32,
                        ((us % 1_000_000) * 1_000) as u32,
                    )
                    .map(Value::Time)
                    .ok_or_else(|| format!("time out of range: {}", us))?,
                });
            }
        }
        DataType::Timestamp(_, _) => {
            let a = downcast::<TimestampMicrosecondArray>(array)?;
            for v in a.iter() {
                out.push(match v {
                    None => Value::Null,
                    Some(us) => DateTime::from_timestamp_micros(us)
                        .map(|dt| Value::Timestamp(dt.naive_utc()))
                        .ok_or_else(|| format!("timestamp out of range: {}", us))?,
                });
            }
        }
        DataType::Boolean => {
            let a = downcast::<BooleanArray>(array)?;
            out.extend(a.iter().map(|v| v.map_or(Value::Null, Value::Bool)));
        }
        _ => {
            let a = downcast::<StringArray>(array)?;
            for v in a.iter() {
                out.push(match v {
                    None => Value::Null,
                    Some(s) => decode_string(ty, s)?,
                });
            }
        }
    }
    Ok(())
}

fn decode_string(ty: ColumnType, s: &str) -> std::result::Result<Value, String> {
    Ok(match ty {
        ColumnType::Json => Value::Json(serde_json::from_str(s).map_err(|e| e.to_string())?),
        ColumnType::Uuid => Value::Uuid(uuid::Uuid::parse_str(s).map_err(|e| e.to_string())?),
        _ => Value::String(s.to_string().into()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns() -> Vec<ArtifactColumn> {
        vec![
            ("id".to_string(), ColumnType::Integer),
            ("price".to_string(), ColumnType::Decimal),
            ("name".to_string(), ColumnType::VarChar),
            ("born".to_string(), ColumnType::Date),
            ("seen_at".to_string(), ColumnType::Timestamp),
            ("opens".to_string(), ColumnType::Time),
            ("active".to_string(), ColumnType::Boolean),
            ("meta".to_string(), ColumnType::Json),
            ("token".to_string(), ColumnType::Uuid),
        ]
    }

    fn sample_batch() -> GeneratedBatch {
        let day = NaiveDate::from_ymd_opt(1969, 12, 31).unwrap();
        GeneratedBatch {
            table: "people".to_string(),
            index: 3,
            start: 30,
            end: 32,
            columns: vec![
                vec![Value::Int(31), Value::Int(32)],
                vec![Value::Float(9.99), Value::Null],
                vec![Value::String("Ann, \"A\"".into()), Value::Null],
                vec![Value::Date(day), Value::Null],
                vec![Value::Timestamp(day.and_hms_opt(23, 59, 59).unwrap()), Value::Null],
                vec![Value::Time(NaiveTime::from_hms_opt(8, 30, 0).unwrap()), Value::Null],
                vec![Value::Bool(true), Value::Null],
                vec![Value::Json(serde_json::json!({"k": 1})), Value::Null],
                vec![Value::Uuid(uuid::Uuid::nil()), Value::Null],
            ],
        }
    }

    #[test]
    fn test_write_and_read_batch() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        store.reset_table_dir("shop", "people").unwrap();

        let batch = sample_batch();
        let path = store.write_batch("shop", &columns(), &batch).unwrap();
        assert!(path.ends_with("shop/people/batch-3.parquet"));
        assert!(!path.with_extension("parquet.tmp").exists());

        let values = read_batch(&path, &columns()).unwrap();
        assert_eq!(values, batch.columns);
    }

    #[test]
    fn test_list_batches_in_index_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let table_dir = store.reset_table_dir("shop", "people").unwrap();
        for name in ["batch-10.parquet", "batch-2.parquet", "notes.txt", "batch-0.parquet"] {
            std::fs::write(table_dir.join(name), b"").unwrap();
        }

        let names: Vec<String> = store
            .list_batches("shop", "people")
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["batch-0.parquet", "batch-2.parquet", "batch-10.parquet"]);
    }

    #[test]
    fn test_type_mismatch_is_an_artifact_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        store.reset_table_dir("shop", "t").unwrap();
        let batch = GeneratedBatch {
            table: "t".to_string(),
            index: 0,
            start: 0,
            end: 1,
            columns: vec![vec![Value::Bool(true)]],
        };
        let cols = vec![("id".to_string(), ColumnType::Integer)];
        assert!(matches!(
            store.write_batch("shop", &cols, &batch),
            Err(SynthKitError::Artifact { .. })
        ));
    }

    #[test]
    fn test_list_batches_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        assert!(store.list_batches("shop", "ghost").unwrap().is_empty());
    }
}
