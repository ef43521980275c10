use serde_json::{Map, Value, json};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use super::{ExportError, ExportReceipt, ExportSink, FileFormat, OutputDescriptor};
use crate::assembler::{Cell, Record};

/// Writes record sets below a local destination directory.
#[derive(Debug, Clone, Default)]
pub struct FileSink {
    workload_tag: Option<String>,
}

impl FileSink {
    pub fn new(workload_tag: Option<String>) -> Self {
        Self { workload_tag }
    }

    fn write_csv(
        &self,
        path: &Path,
        records: &[Record],
        selectors: &[String],
    ) -> Result<(), ExportError> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(selectors)?;

        for record in records {
            let row = selectors.iter().map(|column| match record.cell(column) {
                Some(Cell::Text(s)) => s.to_string(),
                Some(Cell::Number(v)) => v.to_string(),
                Some(Cell::Flag(b)) => b.to_string(),
                None => String::new(),
            });
            writer.write_record(row)?;
        }

        writer.flush().map_err(|source| ExportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(())
    }

    fn write_geojson(
        &self,
        path: &Path,
        records: &[Record],
        selectors: &[String],
    ) -> Result<(), ExportError> {
        let features: Vec<Value> = records
            .iter()
            .map(|record| {
                let properties: Map<String, Value> = selectors
                    .iter()
                    .map(|column| {
                        let value = match record.cell(column) {
                            Some(Cell::Text(s)) => json!(s),
                            Some(Cell::Number(v)) => json!(v),
                            Some(Cell::Flag(b)) => json!(b),
                            None => Value::Null,
                        };
                        (column.clone(), value)
                    })
                    .collect();
                json!({ "type": "Feature", "geometry": null, "properties": properties })
            })
            .collect();

        let io_error = |source| ExportError::Io {
            path: path.to_path_buf(),
            source,
        };
        let file = File::create(path).map_err(io_error)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(
            &mut writer,
            &json!({ "type": "FeatureCollection", "features": features }),
        )?;
        writer.flush().map_err(io_error)?;
        Ok(())
    }
}

impl ExportSink for FileSink {
    fn write(
        &self,
        records: &[Record],
        descriptor: &OutputDescriptor,
    ) -> Result<ExportReceipt, ExportError> {
        let path = descriptor.path();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|source| ExportError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        match descriptor.file_format {
            FileFormat::Csv => self.write_csv(&path, records, &descriptor.selectors)?,
            FileFormat::GeoJson => self.write_geojson(&path, records, &descriptor.selectors)?,
        }

        Ok(ExportReceipt {
            path,
            records: records.len(),
            workload_tag: self.workload_tag.clone(),
        })
    }
}
