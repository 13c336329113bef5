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

//! Dataset domain for the dashboard analyst: tabular ingestion, column
//! profiling, the dashboard specification model, and the deterministic
//! renderer that turns a spec plus a dataset into chart payloads.

pub mod dashboard;
pub mod error;
pub mod loader;
pub mod profiler;
pub mod render;

pub use dashboard::{
    Aggregation, AnalysisSummary, ChartDescriptor, ChartKind, DashboardSpec, KpiDescriptor,
};
pub use error::{DatasetError, Result};
pub use loader::{load_dataset, Dataset};
pub use profiler::{
    DataProfiler, DataType, DatasetSummary, DimensionProfile, NumericStats, ProfilingConfig,
    TemporalStats,
};
pub use render::{
    chart_to_plotly_json, dashboard_to_html, render_dashboard, RenderedChart, RenderedDashboard,
    RenderedKpi, RenderedSeries,
};
