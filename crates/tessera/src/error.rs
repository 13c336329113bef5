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

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("Failed to read data file '{path}': {reason}")]
    DataFileError { path: String, reason: String },

    #[error("Unsupported data format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Empty dataset provided")]
    EmptyDataset,

    #[error("Column '{column}' not found in dataset")]
    ColumnNotFound { column: String },

    #[error("Failed to profile column '{column}': {reason}")]
    ColumnProfilingError { column: String, reason: String },

    #[error("Invalid chart descriptor '{chart}': {reason}")]
    InvalidDescriptor { chart: String, reason: String },

    #[error("Aggregation failed for chart '{chart}': {reason}")]
    AggregationError { chart: String, reason: String },

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DatasetError>;

impl DatasetError {
    /// True for failures scoped to a single user action; the session
    /// survives and the user can retry.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, DatasetError::Io(_))
    }

    pub fn user_message(&self) -> String {
        match self {
            DatasetError::UnsupportedFormat { format } => {
                format!("Files of type '{format}' are not supported. Please upload a CSV or Excel file.")
            }
            DatasetError::EmptyDataset => {
                "The dataset appears to be empty. Please provide data with at least one row."
                    .to_string()
            }
            DatasetError::DataFileError { path, .. } => {
                format!("Unable to read '{path}'. The file may be malformed.")
            }
            _ => self.to_string(),
        }
    }
}
