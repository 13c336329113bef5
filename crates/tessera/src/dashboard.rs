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
use crate::loader::Dataset;
use serde::{Deserialize, Serialize};

/// The agent's dashboard plan: an ordered list of chart and KPI
/// descriptors. Replaced wholesale on revision; the latest spec wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardSpec {
    #[serde(default)]
    pub charts: Vec<ChartDescriptor>,
    #[serde(default)]
    pub kpis: Vec<KpiDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_summary: Option<AnalysisSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartDescriptor {
    pub kind: ChartKind,
    pub x: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default)]
    pub aggregation: Aggregation,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiDescriptor {
    pub column: String,
    pub aggregation: Aggregation,
    #[serde(default)]
    pub label: String,
}

/// The agent's explanation for the Insights view: overall approach plus
/// one reasoning bullet per design decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub approach: String,
    #[serde(default)]
    pub reasoning: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Bar,
    Line,
    Scatter,
    Pie,
    Histogram,
    Box,
}

impl ChartKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChartKind::Bar => "bar",
            ChartKind::Line => "line",
            ChartKind::Scatter => "scatter",
            ChartKind::Pie => "pie",
            ChartKind::Histogram => "histogram",
            ChartKind::Box => "box",
        }
    }

    /// Histograms and box plots work on a single column; everything else
    /// needs a y mapping.
    pub fn requires_y(&self) -> bool {
        !matches!(self, ChartKind::Histogram | ChartKind::Box)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    Sum,
    Mean,
    Count,
    Min,
    Max,
    #[default]
    None,
}

impl Aggregation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregation::Sum => "sum",
            Aggregation::Mean => "mean",
            Aggregation::Count => "count",
            Aggregation::Min => "min",
            Aggregation::Max => "max",
            Aggregation::None => "none",
        }
    }
}

impl DashboardSpec {
    pub fn is_empty(&self) -> bool {
        self.charts.is_empty() && self.kpis.is_empty()
    }

    /// Rejects descriptors referencing columns absent from the dataset.
    /// Validation failures are turn-scoped; the previous spec stays active.
    pub fn validate(&self, dataset: &Dataset) -> Result<()> {
        for chart in &self.charts {
            let name = chart.display_title();
            if !dataset.has_column(&chart.x) {
                return Err(DatasetError::InvalidDescriptor {
                    chart: name,
                    reason: format!("unknown x column '{}'", chart.x),
                });
            }
            if let Some(y) = &chart.y {
                if !dataset.has_column(y) {
                    return Err(DatasetError::InvalidDescriptor {
                        chart: name,
                        reason: format!("unknown y column '{y}'"),
                    });
                }
            } else if chart.kind.requires_y() {
                return Err(DatasetError::InvalidDescriptor {
                    chart: name,
                    reason: format!("{} charts need a y column", chart.kind.as_str()),
                });
            }
            if let Some(color) = &chart.color {
                if !dataset.has_column(color) {
                    return Err(DatasetError::InvalidDescriptor {
                        chart: name,
                        reason: format!("unknown color column '{color}'"),
                    });
                }
            }
        }
        for kpi in &self.kpis {
            if !dataset.has_column(&kpi.column) {
                return Err(DatasetError::InvalidDescriptor {
                    chart: kpi.display_label(),
                    reason: format!("unknown KPI column '{}'", kpi.column),
                });
            }
        }
        Ok(())
    }
}

impl ChartDescriptor {
    pub fn display_title(&self) -> String {
        if self.title.is_empty() {
            match &self.y {
                Some(y) => format!("{} of {} by {}", self.kind.as_str(), y, self.x),
                None => format!("{} of {}", self.kind.as_str(), self.x),
            }
        } else {
            self.title.clone()
        }
    }
}

impl KpiDescriptor {
    pub fn display_label(&self) -> String {
        if self.label.is_empty() {
            format!("{}({})", self.aggregation.as_str(), self.column)
        } else {
            self.label.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    fn dataset() -> Dataset {
        let frame = df![
            "region" => ["north", "south", "north", "east"],
            "sales" => [10.0f64, 20.0, 30.0, 40.0],
        ]
        .unwrap();
        Dataset::from_dataframe("sales.csv", frame).unwrap()
    }

    fn bar(x: &str, y: &str) -> ChartDescriptor {
        ChartDescriptor {
            kind: ChartKind::Bar,
            x: x.to_string(),
            y: Some(y.to_string()),
            color: None,
            aggregation: Aggregation::Sum,
            title: String::new(),
        }
    }

    #[test]
    fn valid_spec_passes_validation() {
        let spec = DashboardSpec {
            charts: vec![bar("region", "sales")],
            kpis: vec![KpiDescriptor {
                column: "sales".to_string(),
                aggregation: Aggregation::Mean,
                label: String::new(),
            }],
            analysis_summary: None,
        };
        assert!(spec.validate(&dataset()).is_ok());
    }

    #[test]
    fn unknown_column_is_rejected() {
        let spec = DashboardSpec {
            charts: vec![bar("region", "profit")],
            ..Default::default()
        };
        assert!(matches!(
            spec.validate(&dataset()),
            Err(DatasetError::InvalidDescriptor { .. })
        ));
    }

    #[test]
    fn missing_y_is_rejected_for_bar_charts() {
        let mut chart = bar("region", "sales");
        chart.y = None;
        let spec = DashboardSpec {
            charts: vec![chart],
            ..Default::default()
        };
        assert!(spec.validate(&dataset()).is_err());
    }

    #[test]
    fn histogram_does_not_need_y() {
        let spec = DashboardSpec {
            charts: vec![ChartDescriptor {
                kind: ChartKind::Histogram,
                x: "sales".to_string(),
                y: None,
                color: None,
                aggregation: Aggregation::None,
                title: String::new(),
            }],
            ..Default::default()
        };
        assert!(spec.validate(&dataset()).is_ok());
    }

    #[test]
    fn spec_round_trips_through_serde() {
        let spec = DashboardSpec {
            charts: vec![bar("region", "sales")],
            ..Default::default()
        };
        let json = serde_json::to_string(&spec).unwrap();
        let parsed: DashboardSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.charts.len(), 1);
        assert_eq!(parsed.charts[0].kind, ChartKind::Bar);
    }
}
