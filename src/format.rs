//! Serialise extraction results into CSV, JSON or Parquet.
//!
//! All three formats share one logical schema:
//!
//! | column | type | present |
//! |--------|------|---------|
//! | `filename` | string | always |
//! | `page` | integer (1-based) | always |
//! | `text` | string | always |
//! | `title`, `author`, `creation_date`, `producer` | string, nullable | when metadata is requested |
//!
//! CSV and Parquet emit one row per page; JSON nests pages under one record
//! per file. Pages are emitted in ascending order and files in submission
//! order. Failed batch entries produce no rows in the tabular formats; JSON
//! keeps them as a record with an `error` field and no pages.

use crate::config::OutputFormat;
use crate::error::ExtractError;
use crate::output::{BatchResult, DocumentMetadata, FileOutcome, OutputArtifact};
use arrow_array::{ArrayRef, Int64Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema};
use bytes::Bytes;
use parquet::arrow::ArrowWriter;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

const BASE_COLUMNS: [&str; 3] = ["filename", "page", "text"];
const METADATA_COLUMNS: [&str; 4] = ["title", "author", "creation_date", "producer"];

/// Encodes a [`BatchResult`] in one output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputFormatter {
    pub format: OutputFormat,
    pub include_metadata: bool,
}

/// One flattened page row.
struct Row<'a> {
    filename: &'a str,
    page: usize,
    text: &'a str,
    metadata: Option<&'a DocumentMetadata>,
}

impl Row<'_> {
    fn metadata_cells(&self) -> [Option<&str>; 4] {
        match self.metadata {
            Some(m) => [
                m.title.as_deref(),
                m.author.as_deref(),
                m.creation_date.as_deref(),
                m.producer.as_deref(),
            ],
            None => [None; 4],
        }
    }
}

#[derive(Serialize)]
struct JsonFile<'a> {
    filename: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<JsonMetadata<'a>>,
    pages: Vec<JsonPage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

#[derive(Serialize)]
struct JsonMetadata<'a> {
    title: Option<&'a str>,
    author: Option<&'a str>,
    creation_date: Option<&'a str>,
    producer: Option<&'a str>,
}

#[derive(Serialize)]
struct JsonPage<'a> {
    page: usize,
    text: &'a str,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat, include_metadata: bool) -> Self {
        Self {
            format,
            include_metadata,
        }
    }

    /// Column names in output order.
    pub fn columns(&self) -> Vec<&'static str> {
        let mut cols = BASE_COLUMNS.to_vec();
        if self.include_metadata {
            cols.extend(METADATA_COLUMNS);
        }
        cols
    }

    /// Encode and wrap as an artifact named `artifact_name`.
    pub fn artifact(
        &self,
        batch: &BatchResult,
        artifact_name: impl Into<String>,
    ) -> Result<OutputArtifact, ExtractError> {
        Ok(OutputArtifact {
            format: self.format,
            filename: artifact_name.into(),
            bytes: self.encode(batch)?,
        })
    }

    /// Encode the whole batch.
    pub fn encode(&self, batch: &BatchResult) -> Result<Bytes, ExtractError> {
        let bytes = match self.format {
            OutputFormat::Csv => self.to_csv(batch)?,
            OutputFormat::Json => self.to_json(batch)?,
            OutputFormat::Parquet => self.to_parquet(batch)?,
        };
        debug!(
            "Encoded {} files as {} ({} bytes)",
            batch.len(),
            self.format,
            bytes.len()
        );
        Ok(Bytes::from(bytes))
    }

    fn rows<'a>(&self, batch: &'a BatchResult) -> Vec<Row<'a>> {
        let include_metadata = self.include_metadata;
        batch
            .entries
            .iter()
            .filter_map(|entry| match &entry.outcome {
                FileOutcome::Extracted(result) => Some(result),
                FileOutcome::Failed { .. } => None,
            })
            .flat_map(|result| {
                let metadata = if include_metadata {
                    result.metadata.as_ref()
                } else {
                    None
                };
                result.pages.iter().map(move |p| Row {
                    filename: &result.filename,
                    page: p.page,
                    text: &p.text,
                    metadata,
                })
            })
            .collect()
    }

    fn serialization_error(&self, detail: impl std::fmt::Display) -> ExtractError {
        ExtractError::Serialization {
            format: self.format.to_string(),
            detail: detail.to_string(),
        }
    }

    fn to_csv(&self, batch: &BatchResult) -> Result<Vec<u8>, ExtractError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(self.columns())
            .map_err(|e| self.serialization_error(e))?;

        for row in self.rows(batch) {
            let page = row.page.to_string();
            let mut record: Vec<&str> = vec![row.filename, &page, row.text];
            if self.include_metadata {
                record.extend(row.metadata_cells().iter().map(|c| c.unwrap_or("")));
            }
            writer
                .write_record(&record)
                .map_err(|e| self.serialization_error(e))?;
        }

        writer
            .into_inner()
            .map_err(|e| self.serialization_error(e.error()))
    }

    fn to_json(&self, batch: &BatchResult) -> Result<Vec<u8>, ExtractError> {
        let files: Vec<JsonFile<'_>> = batch
            .entries
            .iter()
            .map(|entry| match &entry.outcome {
                FileOutcome::Extracted(result) => JsonFile {
                    filename: &entry.filename,
                    metadata: self.include_metadata.then(|| {
                        let m = result.metadata.as_ref();
                        JsonMetadata {
                            title: m.and_then(|m| m.title.as_deref()),
                            author: m.and_then(|m| m.author.as_deref()),
                            creation_date: m.and_then(|m| m.creation_date.as_deref()),
                            producer: m.and_then(|m| m.producer.as_deref()),
                        }
                    }),
                    pages: result
                        .pages
                        .iter()
                        .map(|p| JsonPage {
                            page: p.page,
                            text: &p.text,
                        })
                        .collect(),
                    error: None,
                },
                FileOutcome::Failed { reason, .. } => JsonFile {
                    filename: &entry.filename,
                    metadata: None,
                    pages: Vec::new(),
                    error: Some(reason.as_str()),
                },
            })
            .collect();

        serde_json::to_vec_pretty(&files).map_err(|e| self.serialization_error(e))
    }

    fn to_parquet(&self, batch: &BatchResult) -> Result<Vec<u8>, ExtractError> {
        let rows = self.rows(batch);

        let mut fields = vec![
            Field::new("filename", DataType::Utf8, false),
            Field::new("page", DataType::Int64, false),
            Field::new("text", DataType::Utf8, false),
        ];
        let mut columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(
                rows.iter().map(|r| r.filename).collect::<Vec<_>>(),
            )),
            Arc::new(Int64Array::from(
                rows.iter().map(|r| r.page as i64).collect::<Vec<_>>(),
            )),
            Arc::new(StringArray::from(
                rows.iter().map(|r| r.text).collect::<Vec<_>>(),
            )),
        ];
        if self.include_metadata {
            let cells: Vec<[Option<&str>; 4]> = rows.iter().map(|r| r.metadata_cells()).collect();
            for (i, name) in METADATA_COLUMNS.iter().enumerate() {
                fields.push(Field::new(*name, DataType::Utf8, true));
                columns.push(Arc::new(StringArray::from(
                    cells.iter().map(|c| c[i]).collect::<Vec<Option<&str>>>(),
                )));
            }
        }

        let schema = Arc::new(Schema::new(fields));
        let record_batch = RecordBatch::try_new(Arc::clone(&schema), columns)
            .map_err(|e| self.serialization_error(e))?;

        let mut buf = Vec::new();
        let mut writer = ArrowWriter::try_new(&mut buf, schema, None)
            .map_err(|e| self.serialization_error(e))?;
        if record_batch.num_rows() > 0 {
            writer
                .write(&record_batch)
                .map_err(|e| self.serialization_error(e))?;
        }
        writer.close().map_err(|e| self.serialization_error(e))?;
        Ok(buf)
    }
}
