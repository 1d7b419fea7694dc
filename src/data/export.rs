use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use super::aggregate::{AggregationResult, CrossTab, Correlation};
use super::error::PipelineError;
use super::filter::FilteredView;
use super::model::Value;

// ---------------------------------------------------------------------------
// ExportTable – flat rows ready for a delimited file
// ---------------------------------------------------------------------------

/// Header plus string rows, in column order.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ExportTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ExportTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Write as comma-separated UTF-8 with a header row.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(&self.headers)
            .context("writing CSV header")?;
        for (i, row) in self.rows.iter().enumerate() {
            wtr.write_record(row)
                .with_context(|| format!("writing CSV row {i}"))?;
        }
        wtr.flush().context("flushing CSV output")?;
        Ok(())
    }

    /// CSV bytes, as offered by a download button.
    pub fn to_csv_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.write_csv(&mut buf)?;
        Ok(buf)
    }

    pub fn write_csv_file(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)
            .with_context(|| format!("creating {}", path.display()))?;
        self.write_csv(std::io::BufWriter::new(file))
            .with_context(|| format!("writing {}", path.display()))
    }
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

/// Flatten a pipeline output into an [`ExportTable`].
pub trait ToExportRows {
    fn to_export_rows(&self) -> ExportTable;
}

impl ToExportRows for FilteredView<'_> {
    fn to_export_rows(&self) -> ExportTable {
        let columns = &self.dataset().columns;
        ExportTable {
            headers: columns.clone(),
            rows: self
                .rows()
                .map(|row| columns.iter().map(|c| row.get(c).to_cell()).collect())
                .collect(),
        }
    }
}

impl FilteredView<'_> {
    /// Export only `columns`, in the given order.
    pub fn export_columns(&self, columns: &[String]) -> Result<ExportTable, PipelineError> {
        for col in columns {
            self.schema().require(col)?;
        }
        Ok(ExportTable {
            headers: columns.to_vec(),
            rows: self
                .rows()
                .map(|row| columns.iter().map(|c| row.get(c).to_cell()).collect())
                .collect(),
        })
    }
}

impl ToExportRows for AggregationResult {
    fn to_export_rows(&self) -> ExportTable {
        let mut headers = self.group_by.clone();
        headers.push(self.reducer.output_column(&self.target));
        ExportTable {
            headers,
            rows: self
                .groups
                .iter()
                .map(|g| {
                    g.key
                        .iter()
                        .chain(std::iter::once(&g.value))
                        .map(Value::to_cell)
                        .collect()
                })
                .collect(),
        }
    }
}

impl ToExportRows for CrossTab {
    fn to_export_rows(&self) -> ExportTable {
        let mut headers = vec![self.row_field.clone()];
        headers.extend(self.columns.iter().map(Value::to_cell));
        ExportTable {
            headers,
            rows: self
                .rows
                .iter()
                .map(|(value, counts)| {
                    std::iter::once(value.to_cell())
                        .chain(counts.iter().map(i64::to_string))
                        .collect()
                })
                .collect(),
        }
    }
}

impl ToExportRows for Correlation {
    fn to_export_rows(&self) -> ExportTable {
        ExportTable {
            headers: vec![self.x_field.clone(), self.y_field.clone()],
            rows: self
                .points
                .iter()
                .map(|(x, y)| vec![x.to_string(), y.to_string()])
                .collect(),
        }
    }
}
