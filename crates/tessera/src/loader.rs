// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use crate::error::{DatasetError, Result};
use crate::profiler::{DataProfiler, DatasetSummary, DimensionProfile};
use calamine::{open_workbook_auto, Data, Reader};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use tracing::info;

/// A loaded table together with its column profiles. Owned by the session
/// and replaced wholesale on re-upload; never mutated in place.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub name: String,
    pub frame: DataFrame,
    pub profiles: Vec<DimensionProfile>,
    pub summary: DatasetSummary,
}

impl Dataset {
    pub fn from_dataframe(name: impl Into<String>, frame: DataFrame) -> Result<Self> {
        let profiler = DataProfiler::new();
        let profiles = profiler.profile_dataframe(&frame)?;
        let summary = profiler.get_dataset_summary(&profiles);
        Ok(Self {
            name: name.into(),
            frame,
            profiles,
            summary,
        })
    }

    pub fn column_names(&self) -> Vec<String> {
        self.profiles.iter().map(|p| p.name.clone()).collect()
    }

    pub fn profile(&self, column: &str) -> Option<&DimensionProfile> {
        self.profiles.iter().find(|p| p.name == column)
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.profile(column).is_some()
    }

    /// First `rows` rows rendered as strings, for the preview grid and the
    /// prompt's sample block.
    pub fn preview(&self, rows: usize) -> Vec<Vec<String>> {
        let head = self.frame.head(Some(rows));
        let mut out = Vec::with_capacity(head.height());
        for i in 0..head.height() {
            let mut row = Vec::with_capacity(head.width());
            for column in head.get_columns() {
                let value = column
                    .get(i)
                    .map(|v| match v {
                        AnyValue::Null => String::new(),
                        AnyValue::String(s) => s.to_string(),
                        other => other.to_string(),
                    })
                    .unwrap_or_default();
                row.push(value);
            }
            out.push(row);
        }
        out
    }
}

/// Loads a dataset, dispatching on file extension. Unsupported or
/// malformed files produce a typed error; there are no partial loads.
pub fn load_dataset<P: AsRef<Path>>(path: P) -> Result<Dataset> {
    let path = path.as_ref();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dataset".to_string());
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    let frame = match extension.as_str() {
        "csv" => read_csv(path)?,
        "xlsx" | "xls" => read_excel(path)?,
        "json" => read_json(path)?,
        "parquet" => read_parquet(path)?,
        other => {
            return Err(DatasetError::UnsupportedFormat {
                format: if other.is_empty() {
                    "unknown".to_string()
                } else {
                    other.to_string()
                },
            })
        }
    };

    info!(
        dataset = %name,
        rows = frame.height(),
        columns = frame.width(),
        "dataset loaded"
    );
    Dataset::from_dataframe(name, frame)
}

fn read_csv(path: &Path) -> Result<DataFrame> {
    let file = File::open(path)?;
    CsvReader::new(file).finish().map_err(|e| {
        DatasetError::DataFileError {
            path: path.display().to_string(),
            reason: e.to_string(),
        }
    })
}

fn read_parquet(path: &Path) -> Result<DataFrame> {
    let file = File::open(path)?;
    ParquetReader::new(file).finish().map_err(|e| {
        DatasetError::DataFileError {
            path: path.display().to_string(),
            reason: e.to_string(),
        }
    })
}

fn read_json(path: &Path) -> Result<DataFrame> {
    let file = File::open(path)?;
    JsonReader::new(file).finish().map_err(|e| {
        DatasetError::DataFileError {
            path: path.display().to_string(),
            reason: e.to_string(),
        }
    })
}

/// First sheet only, header row required. Numeric columns become Float64,
/// everything else is read as strings and left to type inference.
fn read_excel(path: &Path) -> Result<DataFrame> {
    let mut workbook = open_workbook_auto(path).map_err(|e| DatasetError::DataFileError {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| DatasetError::DataFileError {
            path: path.display().to_string(),
            reason: "workbook contains no sheets".to_string(),
        })?;
    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| DatasetError::DataFileError {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

    frame_from_rows(path, range.rows())
}

fn frame_from_rows<'a, I>(path: &Path, mut rows: I) -> Result<DataFrame>
where
    I: Iterator<Item = &'a [Data]>,
{
    let header: Vec<String> = rows
        .next()
        .ok_or(DatasetError::EmptyDataset)?
        .iter()
        .map(cell_to_string)
        .collect();
    if header.iter().all(|h| h.is_empty()) {
        return Err(DatasetError::DataFileError {
            path: path.display().to_string(),
            reason: "header row is empty".to_string(),
        });
    }

    // Short rows are padded with Empty so every column stays aligned.
    let mut cells: Vec<Vec<Data>> = vec![Vec::new(); header.len()];
    for row in rows {
        for (idx, column) in cells.iter_mut().enumerate() {
            column.push(row.get(idx).cloned().unwrap_or(Data::Empty));
        }
    }

    let columns: Vec<Column> = header
        .iter()
        .zip(cells.iter())
        .map(|(name, values)| column_from_cells(name, values))
        .collect();
    DataFrame::new(columns).map_err(DatasetError::Polars)
}

fn column_from_cells(name: &str, cells: &[Data]) -> Column {
    let all_numeric = cells.iter().all(|c| {
        matches!(
            c,
            Data::Int(_) | Data::Float(_) | Data::Empty | Data::Bool(_)
        )
    }) && cells
        .iter()
        .any(|c| matches!(c, Data::Int(_) | Data::Float(_)));

    if all_numeric {
        let values: Vec<Option<f64>> = cells
            .iter()
            .map(|c| match c {
                Data::Int(v) => Some(*v as f64),
                Data::Float(v) => Some(*v),
                Data::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
                _ => None,
            })
            .collect();
        Column::new(name.into(), values)
    } else {
        let values: Vec<Option<String>> = cells
            .iter()
            .map(|c| match c {
                Data::Empty => None,
                other => Some(cell_to_string(other)),
            })
            .collect();
        Column::new(name.into(), values)
    }
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Int(v) => v.to_string(),
        Data::Float(v) => v.to_string(),
        Data::String(s) => s.trim().to_string(),
        Data::Bool(v) => v.to_string(),
        Data::DateTime(dt) => dt.to_string(),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("#ERR:{e:?}"),
        Data::Empty => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn csv_schema_matches_header_column_count() {
        let file = write_csv("a,b,c\n1,2,x\n3,4,y\n");
        let dataset = load_dataset(file.path()).unwrap();
        assert_eq!(dataset.profiles.len(), 3);
        assert_eq!(dataset.column_names(), vec!["a", "b", "c"]);
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let result = load_dataset("data.pdf");
        assert!(matches!(
            result,
            Err(DatasetError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn malformed_csv_is_a_typed_error() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(&[0xff, 0xfe, 0x00, 0x01]).unwrap();
        let result = load_dataset(file.path());
        assert!(result.is_err());
    }

    #[test]
    fn preview_is_bounded_by_row_count() {
        let file = write_csv("a,b\n1,2\n3,4\n5,6\n");
        let dataset = load_dataset(file.path()).unwrap();
        let preview = dataset.preview(2);
        assert_eq!(preview.len(), 2);
        assert_eq!(preview[0].len(), 2);
    }

    fn sheet<'a>(rows: &'a [Vec<Data>]) -> impl Iterator<Item = &'a [Data]> {
        rows.iter().map(Vec::as_slice)
    }

    #[test]
    fn excel_schema_matches_header_column_count() {
        let rows = vec![
            vec![
                Data::String("region".into()),
                Data::String("sales".into()),
                Data::String("active".into()),
            ],
            vec![Data::String("north".into()), Data::Int(12), Data::Bool(true)],
            vec![Data::String("south".into()), Data::Float(7.5), Data::Bool(false)],
        ];
        let frame = frame_from_rows(Path::new("t.xlsx"), sheet(&rows)).unwrap();
        assert_eq!(frame.width(), 3);
        assert_eq!(frame.height(), 2);
        assert_eq!(
            frame.get_column_names_str(),
            vec!["region", "sales", "active"]
        );
    }

    #[test]
    fn excel_ragged_rows_are_padded_with_nulls() {
        let rows = vec![
            vec![Data::String("a".into()), Data::String("b".into())],
            vec![Data::Int(1)],
            vec![Data::Int(2), Data::Int(3)],
        ];
        let frame = frame_from_rows(Path::new("t.xlsx"), sheet(&rows)).unwrap();
        let b = frame.column("b").unwrap();
        assert_eq!(b.null_count(), 1);
        assert_eq!(frame.height(), 2);
    }

    #[test]
    fn excel_empty_header_is_rejected() {
        let rows = vec![
            vec![Data::Empty, Data::String("  ".into())],
            vec![Data::Int(1), Data::Int(2)],
        ];
        let result = frame_from_rows(Path::new("t.xlsx"), sheet(&rows));
        assert!(matches!(result, Err(DatasetError::DataFileError { .. })));
    }

    #[test]
    fn excel_sheet_without_rows_is_an_empty_dataset() {
        let rows: Vec<Vec<Data>> = Vec::new();
        let result = frame_from_rows(Path::new("t.xlsx"), sheet(&rows));
        assert!(matches!(result, Err(DatasetError::EmptyDataset)));
    }

    #[test]
    fn mixed_numeric_cells_become_a_float_column() {
        let cells = [Data::Int(3), Data::Float(1.5), Data::Empty, Data::Bool(true)];
        let column = column_from_cells("n", &cells);
        assert_eq!(column.dtype(), &DataType::Float64);
        let series = column.as_materialized_series();
        let values: Vec<Option<f64>> = series.f64().unwrap().into_iter().collect();
        assert_eq!(values, vec![Some(3.0), Some(1.5), None, Some(1.0)]);
    }

    #[test]
    fn string_cells_force_a_string_column() {
        let cells = [Data::Int(3), Data::String("n/a".into()), Data::Empty];
        let column = column_from_cells("c", &cells);
        assert_eq!(column.dtype(), &DataType::String);
        let series = column.as_materialized_series();
        let values: Vec<Option<&str>> = series.str().unwrap().into_iter().collect();
        assert_eq!(values, vec![Some("3"), Some("n/a"), None]);
    }

    #[test]
    fn cell_to_string_trims_and_covers_variants() {
        assert_eq!(cell_to_string(&Data::String("  north  ".into())), "north");
        assert_eq!(cell_to_string(&Data::Int(7)), "7");
        assert_eq!(cell_to_string(&Data::Bool(false)), "false");
        assert_eq!(cell_to_string(&Data::Empty), "");
    }
}
