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
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use polars::prelude::*;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Numeric,
    Categorical,
    Temporal,
}

impl DataType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Numeric)
    }
    pub fn is_categorical(&self) -> bool {
        matches!(self, DataType::Categorical)
    }
    pub fn is_temporal(&self) -> bool {
        matches!(self, DataType::Temporal)
    }
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Numeric => "numeric",
            DataType::Categorical => "categorical",
            DataType::Temporal => "temporal",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProfilingConfig {
    pub max_sample_values: usize,
    pub type_confidence_threshold: f64,
    pub max_categorical_cardinality: usize,
    pub temporal_formats: Vec<String>,
}

impl Default for ProfilingConfig {
    fn default() -> Self {
        Self {
            max_sample_values: 10,
            type_confidence_threshold: 0.8,
            max_categorical_cardinality: 50,
            temporal_formats: vec![
                "%Y-%m-%d".to_string(),
                "%Y-%m-%d %H:%M:%S".to_string(),
                "%Y-%m-%dT%H:%M:%S".to_string(),
                "%Y-%m-%dT%H:%M:%SZ".to_string(),
                "%m/%d/%Y".to_string(),
                "%d/%m/%Y".to_string(),
                "%Y%m%d".to_string(),
            ],
        }
    }
}

/// Per-column profile used for prompt schema blocks and render validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionProfile {
    pub name: String,
    pub data_type: DataType,
    pub cardinality: Option<usize>,
    pub total_count: usize,
    pub null_count: usize,
    pub null_percentage: f64,
    pub sample_values: Vec<String>,
    pub numeric_stats: Option<NumericStats>,
    pub temporal_stats: Option<TemporalStats>,
    pub type_confidence: f64,
    pub issues: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NumericStats {
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalStats {
    pub min_date: Option<String>,
    pub max_date: Option<String>,
    pub date_range_days: Option<i64>,
    pub has_time_component: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub total_dimensions: usize,
    pub numeric_count: usize,
    pub categorical_count: usize,
    pub temporal_count: usize,
    pub total_issues: usize,
}

pub struct DataProfiler {
    config: ProfilingConfig,
}

impl DataProfiler {
    pub fn new() -> Self {
        Self {
            config: ProfilingConfig::default(),
        }
    }

    pub fn with_config(config: ProfilingConfig) -> Self {
        Self { config }
    }

    pub fn profile_dataframe(&self, df: &DataFrame) -> Result<Vec<DimensionProfile>> {
        if df.height() == 0 {
            return Err(DatasetError::EmptyDataset);
        }
        let total_rows = df.height();
        df.get_columns()
            .par_iter()
            .map(|column| {
                let series = column.as_series().ok_or_else(|| {
                    DatasetError::ColumnProfilingError {
                        column: column.name().to_string(),
                        reason: "column does not contain a series".to_string(),
                    }
                })?;
                self.profile_column(series, total_rows)
            })
            .collect()
    }

    fn profile_column(&self, column: &Series, total_rows: usize) -> Result<DimensionProfile> {
        let name = column.name().to_string();
        let null_count = column.null_count();
        let null_percentage = if total_rows > 0 {
            null_count as f64 / total_rows as f64
        } else {
            0.0
        };

        let (data_type, type_confidence) = self.detect_data_type(column)?;

        let mut numeric_stats = None;
        let mut temporal_stats = None;
        let mut cardinality = None;
        match data_type {
            DataType::Numeric => {
                let s_float = column.cast(&polars::prelude::DataType::Float64)?;
                numeric_stats = Some(self.calculate_numeric_stats(&s_float)?);
            }
            DataType::Temporal => {
                let s_str = column.cast(&polars::prelude::DataType::String)?;
                let str_chunked = s_str.str()?;
                let values: Vec<Option<&str>> = str_chunked.into_iter().collect();
                temporal_stats = Some(self.calculate_temporal_stats(&values));
            }
            DataType::Categorical => {
                cardinality = Some(column.n_unique()?);
            }
        }

        let sample_values = self.get_sample_values(column)?;
        let issues = self.detect_quality_issues(&data_type, null_percentage, cardinality, total_rows);

        Ok(DimensionProfile {
            name,
            data_type,
            cardinality,
            total_count: total_rows,
            null_count,
            null_percentage,
            sample_values,
            numeric_stats,
            temporal_stats,
            type_confidence,
            issues,
        })
    }

    /// Inference order: native numeric dtype, cast-based numeric confidence,
    /// temporal format probing, categorical fallback.
    fn detect_data_type(&self, column: &Series) -> Result<(DataType, f64)> {
        let non_null_count = column.len() - column.null_count();
        if non_null_count == 0 {
            return Ok((DataType::Categorical, 0.0));
        }
        if matches!(
            column.dtype(),
            polars::prelude::DataType::Float64
                | polars::prelude::DataType::Int64
                | polars::prelude::DataType::Float32
                | polars::prelude::DataType::Int32
        ) {
            return Ok((DataType::Numeric, 1.0));
        }
        if let Ok(s_float) = column.cast(&polars::prelude::DataType::Float64) {
            let successful_casts = s_float.len() - s_float.null_count();
            let confidence = successful_casts as f64 / non_null_count as f64;
            if confidence >= self.config.type_confidence_threshold {
                return Ok((DataType::Numeric, confidence));
            }
        }
        if let Ok(s_str) = column.cast(&polars::prelude::DataType::String) {
            let str_ca = s_str.str()?;
            let values: Vec<Option<&str>> = str_ca.into_iter().collect();
            let temporal_confidence = self.test_temporal_parsing(&values);
            if temporal_confidence >= self.config.type_confidence_threshold {
                return Ok((DataType::Temporal, temporal_confidence));
            }
        }
        Ok((DataType::Categorical, 0.8))
    }

    fn calculate_numeric_stats(&self, s: &Series) -> Result<NumericStats> {
        let s_f64 = s.f64()?;
        Ok(NumericStats {
            mean: s_f64.mean(),
            median: s_f64.median(),
            std: s_f64.std(1),
            min: s_f64.min(),
            max: s_f64.max(),
        })
    }

    fn get_sample_values(&self, series: &Series) -> Result<Vec<String>> {
        let unique = series.unique()?;
        let sample = unique.head(Some(self.config.max_sample_values));
        let str_series = sample.cast(&polars::prelude::DataType::String)?;
        let str_chunked = str_series.str()?;
        Ok(str_chunked
            .into_iter()
            .filter_map(|opt_s| opt_s.map(String::from))
            .collect())
    }

    fn test_temporal_parsing(&self, values: &[Option<&str>]) -> f64 {
        let non_null_values: Vec<_> = values.iter().filter_map(|&v| v).collect();
        if non_null_values.is_empty() {
            return 0.0;
        }
        let total_count = non_null_values.len();
        let mut best_confidence = 0.0;
        for format in &self.config.temporal_formats {
            let successful_parses = non_null_values
                .par_iter()
                .filter(|&&v| parse_datetime(v, format).is_some())
                .count();
            let confidence = successful_parses as f64 / total_count as f64;
            best_confidence = f64::max(best_confidence, confidence);
        }
        best_confidence
    }

    fn calculate_temporal_stats(&self, values: &[Option<&str>]) -> TemporalStats {
        let mut datetime_values = Vec::new();
        let mut has_time = false;
        for value in values.iter().filter_map(|&v| v) {
            for format in &self.config.temporal_formats {
                if let Some(dt) = parse_datetime(value, format) {
                    datetime_values.push(dt);
                    if format.contains("%H") || format.contains("%M") || format.contains("%S") {
                        has_time = true;
                    }
                    break;
                }
            }
        }
        if datetime_values.is_empty() {
            return TemporalStats {
                min_date: None,
                max_date: None,
                date_range_days: None,
                has_time_component: false,
            };
        }
        datetime_values.sort();
        let min_date = datetime_values.first().map(|dt| dt.to_rfc3339());
        let max_date = datetime_values.last().map(|dt| dt.to_rfc3339());
        let date_range_days =
            if let (Some(first), Some(last)) = (datetime_values.first(), datetime_values.last()) {
                Some(last.signed_duration_since(*first).num_days())
            } else {
                None
            };
        TemporalStats {
            min_date,
            max_date,
            date_range_days,
            has_time_component: has_time,
        }
    }

    fn detect_quality_issues(
        &self,
        data_type: &DataType,
        null_percentage: f64,
        cardinality: Option<usize>,
        total_count: usize,
    ) -> Vec<String> {
        let mut issues = Vec::new();
        if null_percentage > 0.3 {
            issues.push(format!(
                "High null percentage: {:.1}%",
                null_percentage * 100.0
            ));
        }
        if let DataType::Categorical = data_type {
            if let Some(card) = cardinality {
                if card > self.config.max_categorical_cardinality {
                    issues.push(format!("High cardinality: {card} unique values"));
                }
                if card == 1 && total_count > 1 {
                    issues.push("Single unique value (constant column)".to_string());
                }
            }
        }
        issues
    }

    pub fn get_dataset_summary(&self, profiles: &[DimensionProfile]) -> DatasetSummary {
        let total_dimensions = profiles.len();
        let (numeric_count, categorical_count, temporal_count) =
            profiles
                .iter()
                .fold((0, 0, 0), |(num, cat, temp), p| match p.data_type {
                    DataType::Numeric => (num + 1, cat, temp),
                    DataType::Categorical => (num, cat + 1, temp),
                    DataType::Temporal => (num, cat, temp + 1),
                });
        let total_issues = profiles.iter().map(|p| p.issues.len()).sum();
        DatasetSummary {
            total_dimensions,
            numeric_count,
            categorical_count,
            temporal_count,
            total_issues,
        }
    }
}

impl Default for DataProfiler {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_datetime(value: &str, format: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
        return Some(dt.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, format) {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
    }
    None
}

impl DatasetSummary {
    pub fn data_type_distribution(&self) -> HashMap<String, usize> {
        let mut dist = HashMap::new();
        dist.insert("numeric".to_string(), self.numeric_count);
        dist.insert("categorical".to_string(), self.categorical_count);
        dist.insert("temporal".to_string(), self.temporal_count);
        dist
    }
}

impl std::fmt::Display for DimensionProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.data_type.as_str())
    }
}
