use arrow::array::{Array, ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::{Compression, ZstdLevel};
use parquet::errors::ParquetError;
use parquet::file::properties::WriterProperties;
use serde_json::{Map, Number, Value};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::SnapshotError;

const LAYOUT_KEY: &str = "layout";
const ROW_COUNT_KEY: &str = "row_count";
const ENCODING_KEY: &str = "encoding";
const DOCUMENT_COLUMN: &str = "document";
const ZSTD_LEVEL: i32 = 22;

/// Logical shape of a golden payload.
///
/// A non-empty list of objects that all share the same field names is stored
/// column by column. Anything else is stored as a single JSON document.
#[derive(Debug, Clone, PartialEq)]
pub enum GoldenFile {
    Columnar {
        row_count: usize,
        columns: BTreeMap<String, Vec<Value>>,
    },
    Document {
        value: Value,
    },
}

impl GoldenFile {
    pub fn from_payload(payload: &Value) -> Self {
        match columns_of(payload) {
            Some((row_count, columns)) if !columns.is_empty() => {
                GoldenFile::Columnar { row_count, columns }
            }
            _ => GoldenFile::Document {
                value: payload.clone(),
            },
        }
    }

    /// Rebuilds the payload. Fails when a column does not hold exactly `row_count` values.
    pub fn into_payload(self) -> Result<Value, String> {
        match self {
            GoldenFile::Document { value } => Ok(value),
            GoldenFile::Columnar { row_count, columns } => {
                if let Some((name, values)) =
                    columns.iter().find(|(_, values)| values.len() != row_count)
                {
                    return Err(format!(
                        "column `{name}` has {} values but row_count is {row_count}",
                        values.len()
                    ));
                }
                let rows = (0..row_count)
                    .map(|row| {
                        let fields: Map<String, Value> = columns
                            .iter()
                            .map(|(name, values)| (name.clone(), values[row].clone()))
                            .collect();
                        Value::Object(fields)
                    })
                    .collect();
                Ok(Value::Array(rows))
            }
        }
    }

    /// One Arrow column per payload field, with the layout kept in the schema metadata.
    pub fn to_record_batch(&self) -> Result<RecordBatch, ArrowError> {
        let mut fields = Vec::new();
        let mut arrays = Vec::new();
        let metadata = match self {
            GoldenFile::Columnar { row_count, columns } => {
                for (name, values) in columns {
                    let kind = ColumnKind::infer(values);
                    fields.push(kind.field(name));
                    arrays.push(kind.array(values));
                }
                HashMap::from([
                    (LAYOUT_KEY.to_string(), "columnar".to_string()),
                    (ROW_COUNT_KEY.to_string(), row_count.to_string()),
                ])
            }
            GoldenFile::Document { value } => {
                fields.push(ColumnKind::Json.field(DOCUMENT_COLUMN));
                arrays.push(ColumnKind::Json.array(std::slice::from_ref(value)));
                HashMap::from([(LAYOUT_KEY.to_string(), "document".to_string())])
            }
        };
        RecordBatch::try_new(
            Arc::new(Schema::new_with_metadata(fields, metadata)),
            arrays,
        )
    }

    /// Reads back a golden written by [`GoldenFile::to_record_batch`].
    pub fn from_parquet(file: File) -> Result<Self, String> {
        let builder =
            ParquetRecordBatchReaderBuilder::try_new(file).map_err(|error| error.to_string())?;
        let schema = builder.schema().clone();
        let mut columns: BTreeMap<String, Vec<Value>> = schema
            .fields()
            .iter()
            .map(|field| (field.name().clone(), Vec::new()))
            .collect();

        let reader = builder.build().map_err(|error| error.to_string())?;
        for batch in reader {
            let batch = batch.map_err(|error| error.to_string())?;
            for (field, array) in schema.fields().iter().zip(batch.columns()) {
                let values = column_values(field, array.as_ref())?;
                columns.entry(field.name().clone()).or_default().extend(values);
            }
        }

        let metadata = schema.metadata();
        match metadata.get(LAYOUT_KEY).map(String::as_str) {
            Some("columnar") => {
                let row_count: usize = metadata
                    .get(ROW_COUNT_KEY)
                    .and_then(|raw| raw.parse().ok())
                    .ok_or("columnar golden has no valid row_count")?;
                Ok(GoldenFile::Columnar { row_count, columns })
            }
            Some("document") => match columns.remove(DOCUMENT_COLUMN).as_deref() {
                Some([value]) => Ok(GoldenFile::Document {
                    value: value.clone(),
                }),
                _ => Err(format!(
                    "document golden needs exactly one `{DOCUMENT_COLUMN}` value"
                )),
            },
            Some(other) => Err(format!("unknown layout `{other}`")),
            None => Err("golden has no layout".to_string()),
        }
    }
}

fn columns_of(payload: &Value) -> Option<(usize, BTreeMap<String, Vec<Value>>)> {
    let rows = payload.as_array()?;
    let mut columns: BTreeMap<String, Vec<Value>> = BTreeMap::new();
    for (index, row) in rows.iter().enumerate() {
        let fields = row.as_object()?;
        if index == 0 {
            columns = fields.keys().map(|key| (key.clone(), Vec::new())).collect();
        }
        if fields.len() != columns.len() {
            return None;
        }
        for (key, value) in fields {
            columns.get_mut(key)?.push(value.clone());
        }
    }
    Some((rows.len(), columns))
}

/// Arrow type chosen for one column. `Json` keeps mixed and nested values as JSON text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Boolean,
    Int64,
    Float64,
    Utf8,
    Json,
}

impl ColumnKind {
    fn infer(values: &[Value]) -> Self {
        let present: Vec<&Value> = values.iter().filter(|value| !value.is_null()).collect();
        if present.is_empty() || present.iter().all(|value| value.is_string()) {
            ColumnKind::Utf8
        } else if present.iter().all(|value| value.is_boolean()) {
            ColumnKind::Boolean
        } else if present.iter().all(|value| value.is_i64()) {
            ColumnKind::Int64
        } else if present.iter().all(|value| value.is_f64()) {
            ColumnKind::Float64
        } else {
            ColumnKind::Json
        }
    }

    fn field(self, name: &str) -> Field {
        let data_type = match self {
            ColumnKind::Boolean => DataType::Boolean,
            ColumnKind::Int64 => DataType::Int64,
            ColumnKind::Float64 => DataType::Float64,
            ColumnKind::Utf8 | ColumnKind::Json => DataType::Utf8,
        };
        let field = Field::new(name, data_type, true);
        if self == ColumnKind::Json {
            field.with_metadata(HashMap::from([(
                ENCODING_KEY.to_string(),
                "json".to_string(),
            )]))
        } else {
            field
        }
    }

    fn array(self, values: &[Value]) -> ArrayRef {
        match self {
            ColumnKind::Boolean => {
                Arc::new(values.iter().map(Value::as_bool).collect::<BooleanArray>())
            }
            ColumnKind::Int64 => {
                Arc::new(values.iter().map(Value::as_i64).collect::<Int64Array>())
            }
            ColumnKind::Float64 => {
                Arc::new(values.iter().map(Value::as_f64).collect::<Float64Array>())
            }
            ColumnKind::Utf8 => {
                Arc::new(values.iter().map(Value::as_str).collect::<StringArray>())
            }
            ColumnKind::Json => Arc::new(
                values
                    .iter()
                    .map(|value| (!value.is_null()).then(|| value.to_string()))
                    .collect::<StringArray>(),
            ),
        }
    }
}

fn downcast<'a, T: 'static>(field: &Field, array: &'a dyn Array) -> Result<&'a T, String> {
    array
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| format!("column `{}` does not match its declared type", field.name()))
}

fn column_values(field: &Field, array: &dyn Array) -> Result<Vec<Value>, String> {
    let cell = |row: usize, value: Result<Value, String>| {
        if array.is_null(row) {
            Ok(Value::Null)
        } else {
            value
        }
    };
    match field.data_type() {
        DataType::Boolean => {
            let array = downcast::<BooleanArray>(field, array)?;
            (0..array.len())
                .map(|row| cell(row, Ok(Value::Bool(array.value(row)))))
                .collect()
        }
        DataType::Int64 => {
            let array = downcast::<Int64Array>(field, array)?;
            (0..array.len())
                .map(|row| cell(row, Ok(Value::from(array.value(row)))))
                .collect()
        }
        DataType::Float64 => {
            let array = downcast::<Float64Array>(field, array)?;
            (0..array.len())
                .map(|row| {
                    let number = Number::from_f64(array.value(row))
                        .map(Value::Number)
                        .ok_or_else(|| {
                            format!("column `{}` holds a non-finite number", field.name())
                        });
                    cell(row, number)
                })
                .collect()
        }
        DataType::Utf8 => {
            let array = downcast::<StringArray>(field, array)?;
            let is_json =
                field.metadata().get(ENCODING_KEY).map(String::as_str) == Some("json");
            (0..array.len())
                .map(|row| {
                    let text = array.value(row);
                    let value = if is_json {
                        serde_json::from_str(text).map_err(|error| {
                            format!("column `{}` row {row}: {error}", field.name())
                        })
                    } else {
                        Ok(Value::String(text.to_string()))
                    };
                    cell(row, value)
                })
                .collect()
        }
        other => Err(format!("column `{}` has unsupported type {other}", field.name())),
    }
}

fn write_parquet(file: File, golden: &GoldenFile) -> Result<(), ParquetError> {
    let batch = golden.to_record_batch()?;
    let properties = WriterProperties::builder()
        .set_compression(Compression::ZSTD(ZstdLevel::try_new(ZSTD_LEVEL)?))
        .build();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(properties))?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

/// Directory of golden payloads, one zstd-compressed `<name>.parquet` file each.
#[derive(Debug, Clone)]
pub struct GoldenStore {
    dir: PathBuf,
}

impl GoldenStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.parquet"))
    }

    pub fn load(&self, name: &str) -> Result<Value, SnapshotError> {
        let path = self.path_for(name);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                return Err(SnapshotError::NotFound {
                    name: name.to_string(),
                    path,
                });
            }
            Err(source) => return Err(SnapshotError::Io { path, source }),
        };

        let malformed = |reason: String| SnapshotError::Malformed {
            name: name.to_string(),
            reason,
        };
        GoldenFile::from_parquet(file)
            .map_err(malformed)?
            .into_payload()
            .map_err(malformed)
    }

    /// Writes `payload` as the golden for `name`, replacing any existing one.
    pub fn save(&self, name: &str, payload: &Value) -> Result<PathBuf, SnapshotError> {
        let path = self.path_for(name);
        fs::create_dir_all(&self.dir).map_err(|source| SnapshotError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let file = File::create(&path).map_err(|source| SnapshotError::Io {
            path: path.clone(),
            source,
        })?;
        write_parquet(file, &GoldenFile::from_payload(payload)).map_err(|source| {
            SnapshotError::Encode {
                name: name.to_string(),
                source,
            }
        })?;
        tracing::info!("Saved golden {} to {}", name, path.display());
        Ok(path)
    }
}
