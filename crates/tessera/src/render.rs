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

//! Deterministic dashboard rendering: turns a validated spec plus a
//! dataset into aggregated chart payloads and KPI values. No model calls
//! happen here, and nothing is retained between renders.

use crate::dashboard::{Aggregation, ChartDescriptor, ChartKind, DashboardSpec, KpiDescriptor};
use crate::error::{DatasetError, Result};
use crate::loader::Dataset;
use polars::prelude::*;
use serde_json::{json, Value};
use tracing::debug;

const HISTOGRAM_BINS: usize = 10;

#[derive(Debug, Clone)]
pub struct RenderedDashboard {
    pub charts: Vec<RenderedChart>,
    pub kpis: Vec<RenderedKpi>,
}

#[derive(Debug, Clone)]
pub struct RenderedChart {
    pub title: String,
    pub kind: ChartKind,
    pub x_labels: Vec<String>,
    pub series: Vec<RenderedSeries>,
}

#[derive(Debug, Clone)]
pub struct RenderedSeries {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Clone)]
pub struct RenderedKpi {
    pub label: String,
    pub value: Option<f64>,
}

/// Renders every descriptor in the plan against the dataset. The plan is
/// validated first; an unknown column fails the whole render rather than
/// producing a partial dashboard.
pub fn render_dashboard(dataset: &Dataset, spec: &DashboardSpec) -> Result<RenderedDashboard> {
    spec.validate(dataset)?;
    let charts = spec
        .charts
        .iter()
        .map(|chart| render_chart(dataset, chart))
        .collect::<Result<Vec<_>>>()?;
    let kpis = spec
        .kpis
        .iter()
        .map(|kpi| render_kpi(dataset, kpi))
        .collect::<Result<Vec<_>>>()?;
    debug!(charts = charts.len(), kpis = kpis.len(), "dashboard rendered");
    Ok(RenderedDashboard { charts, kpis })
}

fn render_chart(dataset: &Dataset, chart: &ChartDescriptor) -> Result<RenderedChart> {
    match chart.kind {
        ChartKind::Histogram => render_histogram(dataset, chart),
        ChartKind::Box => render_box(dataset, chart),
        _ => {
            if chart.aggregation == Aggregation::None || chart.kind == ChartKind::Scatter {
                render_raw(dataset, chart)
            } else {
                render_aggregated(dataset, chart)
            }
        }
    }
}

fn agg_expr(y: &str, aggregation: Aggregation) -> Expr {
    match aggregation {
        Aggregation::Sum => col(y).sum(),
        Aggregation::Mean => col(y).mean(),
        Aggregation::Count => col(y).count(),
        Aggregation::Min => col(y).min(),
        Aggregation::Max => col(y).max(),
        Aggregation::None => col(y).first(),
    }
}

fn render_aggregated(dataset: &Dataset, chart: &ChartDescriptor) -> Result<RenderedChart> {
    let y = chart.y.as_deref().ok_or_else(|| DatasetError::InvalidDescriptor {
        chart: chart.display_title(),
        reason: "aggregated charts need a y column".to_string(),
    })?;

    if let Some(color) = &chart.color {
        return render_grouped(dataset, chart, y, color);
    }

    let grouped = dataset
        .frame
        .clone()
        .lazy()
        .group_by([col(chart.x.as_str())])
        .agg([agg_expr(y, chart.aggregation).alias("value")])
        .sort([chart.x.clone()], SortMultipleOptions::default())
        .collect()
        .map_err(|e| DatasetError::AggregationError {
            chart: chart.display_title(),
            reason: e.to_string(),
        })?;

    let x_labels = column_as_strings(&grouped, &chart.x)?;
    let values = column_as_f64(&grouped, "value")?;
    Ok(RenderedChart {
        title: chart.display_title(),
        kind: chart.kind,
        x_labels,
        series: vec![RenderedSeries {
            name: y.to_string(),
            values,
        }],
    })
}

/// One series per color-category, aligned on the shared x labels.
fn render_grouped(
    dataset: &Dataset,
    chart: &ChartDescriptor,
    y: &str,
    color: &str,
) -> Result<RenderedChart> {
    let grouped = dataset
        .frame
        .clone()
        .lazy()
        .group_by([col(chart.x.as_str()), col(color)])
        .agg([agg_expr(y, chart.aggregation).alias("value")])
        .sort(
            [chart.x.clone(), color.to_string()],
            SortMultipleOptions::default(),
        )
        .collect()
        .map_err(|e| DatasetError::AggregationError {
            chart: chart.display_title(),
            reason: e.to_string(),
        })?;

    let xs = column_as_strings(&grouped, &chart.x)?;
    let groups = column_as_strings(&grouped, color)?;
    let values = column_as_f64(&grouped, "value")?;

    let mut x_labels: Vec<String> = Vec::new();
    for x in &xs {
        if !x_labels.contains(x) {
            x_labels.push(x.clone());
        }
    }
    let mut group_names: Vec<String> = Vec::new();
    for g in &groups {
        if !group_names.contains(g) {
            group_names.push(g.clone());
        }
    }

    let mut series: Vec<RenderedSeries> = group_names
        .iter()
        .map(|name| RenderedSeries {
            name: name.clone(),
            values: vec![None; x_labels.len()],
        })
        .collect();
    for ((x, g), v) in xs.iter().zip(groups.iter()).zip(values.iter()) {
        let xi = x_labels.iter().position(|l| l == x).unwrap_or(0);
        let gi = group_names.iter().position(|n| n == g).unwrap_or(0);
        series[gi].values[xi] = *v;
    }

    Ok(RenderedChart {
        title: chart.display_title(),
        kind: chart.kind,
        x_labels,
        series,
    })
}

fn render_raw(dataset: &Dataset, chart: &ChartDescriptor) -> Result<RenderedChart> {
    let y = chart.y.as_deref().ok_or_else(|| DatasetError::InvalidDescriptor {
        chart: chart.display_title(),
        reason: "charts without aggregation need a y column".to_string(),
    })?;
    let x_labels = column_as_strings(&dataset.frame, &chart.x)?;
    let values = column_as_f64(&dataset.frame, y)?;
    Ok(RenderedChart {
        title: chart.display_title(),
        kind: chart.kind,
        x_labels,
        series: vec![RenderedSeries {
            name: y.to_string(),
            values,
        }],
    })
}

fn render_histogram(dataset: &Dataset, chart: &ChartDescriptor) -> Result<RenderedChart> {
    let values: Vec<f64> = column_as_f64(&dataset.frame, &chart.x)?
        .into_iter()
        .flatten()
        .collect();
    if values.is_empty() {
        return Err(DatasetError::AggregationError {
            chart: chart.display_title(),
            reason: format!("column '{}' has no numeric values", chart.x),
        });
    }
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let width = if max > min {
        (max - min) / HISTOGRAM_BINS as f64
    } else {
        1.0
    };
    let mut counts = vec![0usize; HISTOGRAM_BINS];
    for v in &values {
        let idx = (((v - min) / width) as usize).min(HISTOGRAM_BINS - 1);
        counts[idx] += 1;
    }
    let x_labels = (0..HISTOGRAM_BINS)
        .map(|i| {
            let lo = min + width * i as f64;
            let hi = lo + width;
            format!("{lo:.1}-{hi:.1}")
        })
        .collect();
    Ok(RenderedChart {
        title: chart.display_title(),
        kind: chart.kind,
        x_labels,
        series: vec![RenderedSeries {
            name: "count".to_string(),
            values: counts.into_iter().map(|c| Some(c as f64)).collect(),
        }],
    })
}

fn render_box(dataset: &Dataset, chart: &ChartDescriptor) -> Result<RenderedChart> {
    let column = dataset
        .frame
        .column(&chart.x)
        .map_err(|_| DatasetError::ColumnNotFound {
            column: chart.x.clone(),
        })?;
    let s_f64 = column
        .cast(&polars::prelude::DataType::Float64)
        .map_err(DatasetError::Polars)?;
    let series = s_f64.as_materialized_series();
    let ca = series.f64().map_err(DatasetError::Polars)?;

    let quantile = |q: f64| ca.quantile(q, QuantileMethod::Linear).ok().flatten();
    let stats = [
        ("min", ca.min()),
        ("q25", quantile(0.25)),
        ("median", ca.median()),
        ("q75", quantile(0.75)),
        ("max", ca.max()),
    ];
    Ok(RenderedChart {
        title: chart.display_title(),
        kind: chart.kind,
        x_labels: stats.iter().map(|(name, _)| name.to_string()).collect(),
        series: vec![RenderedSeries {
            name: chart.x.clone(),
            values: stats.iter().map(|(_, v)| *v).collect(),
        }],
    })
}

fn render_kpi(dataset: &Dataset, kpi: &KpiDescriptor) -> Result<RenderedKpi> {
    let column = dataset
        .frame
        .column(&kpi.column)
        .map_err(|_| DatasetError::ColumnNotFound {
            column: kpi.column.clone(),
        })?;

    let value = if kpi.aggregation == Aggregation::Count {
        Some((column.len() - column.null_count()) as f64)
    } else {
        let s_f64 = column
            .cast(&polars::prelude::DataType::Float64)
            .map_err(DatasetError::Polars)?;
        let series = s_f64.as_materialized_series();
        let ca = series.f64().map_err(DatasetError::Polars)?;
        match kpi.aggregation {
            Aggregation::Sum => ca.sum(),
            Aggregation::Mean | Aggregation::None => ca.mean(),
            Aggregation::Min => ca.min(),
            Aggregation::Max => ca.max(),
            Aggregation::Count => unreachable!(),
        }
    };

    Ok(RenderedKpi {
        label: kpi.display_label(),
        value,
    })
}

fn column_as_strings(frame: &DataFrame, name: &str) -> Result<Vec<String>> {
    let column = frame
        .column(name)
        .map_err(|_| DatasetError::ColumnNotFound {
            column: name.to_string(),
        })?;
    let s_str = column
        .cast(&polars::prelude::DataType::String)
        .map_err(DatasetError::Polars)?;
    let series = s_str.as_materialized_series();
    let ca = series.str().map_err(DatasetError::Polars)?;
    Ok(ca
        .into_iter()
        .map(|opt| opt.map(String::from).unwrap_or_default())
        .collect())
}

fn column_as_f64(frame: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = frame
        .column(name)
        .map_err(|_| DatasetError::ColumnNotFound {
            column: name.to_string(),
        })?;
    let s_f64 = column
        .cast(&polars::prelude::DataType::Float64)
        .map_err(DatasetError::Polars)?;
    let series = s_f64.as_materialized_series();
    let ca = series.f64().map_err(DatasetError::Polars)?;
    Ok(ca.into_iter().collect())
}

/// Plotly figure JSON for one rendered chart, embeddable in the HTML
/// export or copied out of the UI.
pub fn chart_to_plotly_json(chart: &RenderedChart) -> Value {
    let plotly_type = match chart.kind {
        ChartKind::Bar | ChartKind::Histogram => "bar",
        ChartKind::Line => "scatter",
        ChartKind::Scatter => "scatter",
        ChartKind::Pie => "pie",
        ChartKind::Box => "box",
    };
    let traces: Vec<Value> = chart
        .series
        .iter()
        .map(|series| {
            if chart.kind == ChartKind::Pie {
                json!({
                    "type": plotly_type,
                    "labels": chart.x_labels,
                    "values": series.values,
                    "name": series.name,
                })
            } else if chart.kind == ChartKind::Box {
                json!({
                    "type": plotly_type,
                    "y": series.values,
                    "name": series.name,
                })
            } else {
                json!({
                    "type": plotly_type,
                    "x": chart.x_labels,
                    "y": series.values,
                    "name": series.name,
                    "mode": if chart.kind == ChartKind::Scatter { "markers" } else { "lines" },
                })
            }
        })
        .collect();
    json!({
        "data": traces,
        "layout": { "title": { "text": chart.title } },
    })
}

/// Self-contained HTML document for the whole dashboard, one plot div per
/// chart, suitable for opening in a browser.
pub fn dashboard_to_html(rendered: &RenderedDashboard) -> String {
    let mut body = String::new();
    for (i, kpi) in rendered.kpis.iter().enumerate() {
        let value = kpi
            .value
            .map(|v| format!("{v:.2}"))
            .unwrap_or_else(|| "n/a".to_string());
        body.push_str(&format!(
            "<div class=\"kpi\" id=\"kpi-{i}\"><b>{}</b>: {}</div>\n",
            kpi.label, value
        ));
    }
    let mut script = String::new();
    for (i, chart) in rendered.charts.iter().enumerate() {
        body.push_str(&format!("<div id=\"chart-{i}\" class=\"chart\"></div>\n"));
        let figure = chart_to_plotly_json(chart);
        script.push_str(&format!(
            "Plotly.newPlot('chart-{i}', {}['data'], {}['layout']);\n",
            figure, figure
        ));
    }
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\"/>\n\
         <script src=\"https://cdn.plot.ly/plotly-2.35.2.min.js\"></script>\n\
         <style>.chart{{height:420px}}.kpi{{font-family:sans-serif;margin:4px}}</style>\n\
         </head>\n<body>\n{body}<script>\n{script}</script>\n</body>\n</html>\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::{Aggregation, ChartDescriptor, ChartKind, KpiDescriptor};

    fn dataset() -> Dataset {
        let frame = df![
            "region" => ["north", "south", "north", "south"],
            "channel" => ["web", "web", "store", "store"],
            "sales" => [10.0f64, 20.0, 30.0, 40.0],
        ]
        .unwrap();
        Dataset::from_dataframe("sales.csv", frame).unwrap()
    }

    fn spec_with(chart: ChartDescriptor) -> DashboardSpec {
        DashboardSpec {
            charts: vec![chart],
            ..Default::default()
        }
    }

    #[test]
    fn bar_chart_sums_by_category() {
        let chart = ChartDescriptor {
            kind: ChartKind::Bar,
            x: "region".to_string(),
            y: Some("sales".to_string()),
            color: None,
            aggregation: Aggregation::Sum,
            title: String::new(),
        };
        let rendered = render_dashboard(&dataset(), &spec_with(chart)).unwrap();
        assert_eq!(rendered.charts.len(), 1);
        let chart = &rendered.charts[0];
        assert_eq!(chart.x_labels, vec!["north", "south"]);
        assert_eq!(chart.series[0].values, vec![Some(40.0), Some(60.0)]);
    }

    #[test]
    fn color_column_splits_series() {
        let chart = ChartDescriptor {
            kind: ChartKind::Bar,
            x: "region".to_string(),
            y: Some("sales".to_string()),
            color: Some("channel".to_string()),
            aggregation: Aggregation::Sum,
            title: String::new(),
        };
        let rendered = render_dashboard(&dataset(), &spec_with(chart)).unwrap();
        let chart = &rendered.charts[0];
        assert_eq!(chart.series.len(), 2);
        assert_eq!(chart.x_labels.len(), 2);
    }

    #[test]
    fn unknown_column_fails_the_render() {
        let chart = ChartDescriptor {
            kind: ChartKind::Bar,
            x: "region".to_string(),
            y: Some("profit".to_string()),
            color: None,
            aggregation: Aggregation::Sum,
            title: String::new(),
        };
        assert!(render_dashboard(&dataset(), &spec_with(chart)).is_err());
    }

    #[test]
    fn kpis_compute_aggregates() {
        let spec = DashboardSpec {
            kpis: vec![
                KpiDescriptor {
                    column: "sales".to_string(),
                    aggregation: Aggregation::Mean,
                    label: String::new(),
                },
                KpiDescriptor {
                    column: "sales".to_string(),
                    aggregation: Aggregation::Count,
                    label: "rows".to_string(),
                },
            ],
            ..Default::default()
        };
        let rendered = render_dashboard(&dataset(), &spec).unwrap();
        assert_eq!(rendered.kpis[0].value, Some(25.0));
        assert_eq!(rendered.kpis[1].value, Some(4.0));
        assert_eq!(rendered.kpis[1].label, "rows");
    }

    #[test]
    fn histogram_bins_cover_all_values() {
        let chart = ChartDescriptor {
            kind: ChartKind::Histogram,
            x: "sales".to_string(),
            y: None,
            color: None,
            aggregation: Aggregation::None,
            title: String::new(),
        };
        let rendered = render_dashboard(&dataset(), &spec_with(chart)).unwrap();
        let total: f64 = rendered.charts[0].series[0]
            .values
            .iter()
            .flatten()
            .sum();
        assert_eq!(total, 4.0);
    }

    #[test]
    fn plotly_json_has_one_trace_per_series() {
        let chart = RenderedChart {
            title: "t".to_string(),
            kind: ChartKind::Line,
            x_labels: vec!["a".to_string(), "b".to_string()],
            series: vec![
                RenderedSeries {
                    name: "s1".to_string(),
                    values: vec![Some(1.0), Some(2.0)],
                },
                RenderedSeries {
                    name: "s2".to_string(),
                    values: vec![Some(3.0), None],
                },
            ],
        };
        let figure = chart_to_plotly_json(&chart);
        assert_eq!(figure["data"].as_array().unwrap().len(), 2);
    }
}
