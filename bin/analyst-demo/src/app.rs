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

use eframe::egui;
use sibyl::{Agent, AnalystSession, ModelCatalogue, ModelGateway, Role, TurnOutcome};
use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;
use tessera::{dashboard_to_html, load_dataset, render_dashboard, RenderedDashboard};
use tokio::runtime::Runtime;
use tracing::{error, info};

#[derive(Debug, Clone, PartialEq)]
enum ActiveTab {
    Data,
    Dashboard,
    Insights,
}

pub struct AnalystApp {
    runtime: Arc<Runtime>,
    session: AnalystSession,
    agent: Option<Agent>,
    active_tab: ActiveTab,
    selected_file: Option<PathBuf>,
    chat_input: String,
    is_processing: bool,
    progress_message: String,
    error_message: Option<String>,
    rendered: Option<RenderedDashboard>,
    dashboard_html_path: Option<PathBuf>,
}

impl AnalystApp {
    pub fn new() -> Self {
        let runtime = Arc::new(Runtime::new().expect("Failed to create Tokio runtime"));

        let config_paths = [
            "config/llm_models.yml",
            "bin/analyst-demo/config/llm_models.yml",
        ];
        let catalogue = config_paths
            .iter()
            .find_map(|path| ModelCatalogue::from_path(path).ok())
            .unwrap_or_else(ModelCatalogue::local_default);

        let mut error_message = None;
        let agent = match ModelGateway::from_config(catalogue.default_model()) {
            Ok(gateway) => Some(Agent::new(gateway)),
            Err(e) => {
                error!(error = %e, "failed to configure model gateway");
                error_message = Some(e.user_message());
                None
            }
        };

        Self {
            runtime,
            session: AnalystSession::new(),
            agent,
            active_tab: ActiveTab::Data,
            selected_file: None,
            chat_input: String::new(),
            is_processing: false,
            progress_message: String::new(),
            error_message,
            rendered: None,
            dashboard_html_path: None,
        }
    }

    fn process_file(&mut self, path: PathBuf) {
        self.is_processing = true;
        self.progress_message = "Loading file...".to_string();
        self.error_message = None;
        self.rendered = None;
        self.dashboard_html_path = None;

        match load_dataset(&path) {
            Ok(dataset) => {
                info!(file = %path.display(), columns = dataset.profiles.len(), "dataset loaded");
                self.session.attach_dataset(dataset);
                self.selected_file = Some(path);
                self.active_tab = ActiveTab::Data;
                self.progress_message = "Dataset ready".to_string();
            }
            Err(e) => {
                error!(error = %e, "failed to load dataset");
                self.error_message = Some(e.user_message());
                self.progress_message = "Load failed".to_string();
            }
        }
        self.is_processing = false;
    }

    fn send_message(&mut self) {
        let message = self.chat_input.trim().to_string();
        if message.is_empty() {
            return;
        }
        self.chat_input.clear();

        let Some(agent) = &self.agent else {
            self.error_message = Some("No model configured. Check your settings.".to_string());
            return;
        };

        self.is_processing = true;
        self.progress_message = "Thinking...".to_string();
        let outcome = self
            .runtime
            .block_on(agent.handle_turn(&mut self.session, &message));
        self.is_processing = false;
        self.progress_message.clear();

        match outcome {
            Ok(TurnOutcome::DashboardUpdated { .. }) => {
                self.refresh_dashboard();
                self.active_tab = ActiveTab::Dashboard;
            }
            Ok(TurnOutcome::Clarification(_)) | Ok(TurnOutcome::Insight(_)) => {}
            Err(e) => {
                // Surface the failure in the chat so the user sees it in context.
                let user_message = e.user_message();
                self.session.push_assistant(user_message.clone());
                self.error_message = Some(user_message);
            }
        }
    }

    fn refresh_dashboard(&mut self) {
        let (Some(dataset), Some(spec)) = (self.session.dataset(), self.session.dashboard())
        else {
            return;
        };
        match render_dashboard(dataset, spec) {
            Ok(rendered) => {
                self.error_message = None;
                self.dashboard_html_path = None;
                self.rendered = Some(rendered);
            }
            Err(e) => {
                error!(error = %e, "failed to render dashboard");
                self.error_message = Some(e.user_message());
            }
        }
    }

    fn export_html(&mut self) {
        let Some(rendered) = &self.rendered else {
            return;
        };
        let html = dashboard_to_html(rendered);
        let path = std::env::temp_dir().join(format!("dashboard_{}.html", self.session.id));
        match std::fs::write(&path, html) {
            Ok(()) => {
                open_in_browser(&path);
                self.dashboard_html_path = Some(path);
            }
            Err(e) => {
                self.error_message = Some(format!("Could not write dashboard HTML: {e}"));
            }
        }
    }
}

impl eframe::App for AnalystApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading("Dashboard Analyst");
                ui.separator();

                if ui.button("Upload Data").clicked() {
                    if let Some(path) = rfd::FileDialog::new()
                        .add_filter("Tabular data", &["csv", "xlsx", "xls", "json", "parquet"])
                        .pick_file()
                    {
                        self.process_file(path);
                    }
                }

                if let Some(path) = &self.selected_file {
                    ui.label(format!("File: {}", path.display()));
                }

                if let Some(agent) = &self.agent {
                    ui.separator();
                    ui.label(format!("Model: {}", agent.model_name()));
                }

                if self.is_processing {
                    ui.spinner();
                    ui.label(&self.progress_message);
                }
            });
        });

        egui::TopBottomPanel::bottom("bottom_panel").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if let Some(dataset) = self.session.dataset() {
                    ui.label(format!("Columns: {}", dataset.profiles.len()));
                    ui.label(format!("Rows: {}", dataset.frame.height()));
                }
                if let Some(spec) = self.session.dashboard() {
                    ui.label(format!("Charts: {}", spec.charts.len()));
                    ui.label(format!("KPIs: {}", spec.kpis.len()));
                }
                if let Some(path) = &self.dashboard_html_path {
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        ui.monospace(path.display().to_string());
                        ui.label("Exported:");
                    });
                }
            });
        });

        egui::SidePanel::left("chat_panel")
            .default_width(360.0)
            .show(ctx, |ui| {
                ui.heading("Chat");
                ui.separator();

                let input_height = 80.0;
                egui::ScrollArea::vertical()
                    .stick_to_bottom(true)
                    .max_height(ui.available_height() - input_height)
                    .show(ui, |ui| {
                        for (i, message) in self.session.history().iter().enumerate() {
                            ui.push_id(i, |ui| {
                                match message.role {
                                    Role::User => ui.strong("You"),
                                    Role::Assistant => ui.strong("Analyst"),
                                };
                                ui.label(&message.content);
                                ui.add_space(6.0);
                            });
                        }
                    });

                ui.separator();
                if self.session.awaiting_clarification() {
                    ui.colored_label(
                        egui::Color32::LIGHT_BLUE,
                        "The analyst is waiting for your answer.",
                    );
                }

                let can_chat = self.session.dataset().is_some() && !self.is_processing;
                ui.horizontal(|ui| {
                    let response = ui.add_enabled(
                        can_chat,
                        egui::TextEdit::singleline(&mut self.chat_input)
                            .hint_text("Describe the dashboard you want..."),
                    );
                    let submitted =
                        response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
                    if (ui.add_enabled(can_chat, egui::Button::new("Send")).clicked()
                        || submitted)
                        && can_chat
                    {
                        self.send_message();
                    }
                });
                if self.session.dataset().is_none() {
                    ui.small("Upload a dataset to start the conversation.");
                }
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            if let Some(err) = &self.error_message {
                ui.colored_label(egui::Color32::RED, "Error:");
                ui.monospace(err);
                ui.separator();
            }

            if self.session.dataset().is_none() {
                ui.centered_and_justified(|ui| {
                    ui.heading("Upload a CSV or Excel file to get started");
                });
                return;
            }

            ui.horizontal(|ui| {
                ui.selectable_value(&mut self.active_tab, ActiveTab::Data, "Data");
                ui.selectable_value(&mut self.active_tab, ActiveTab::Dashboard, "Dashboard");
                ui.selectable_value(&mut self.active_tab, ActiveTab::Insights, "Insights");
            });
            ui.separator();

            match self.active_tab {
                ActiveTab::Data => self.render_data_tab(ui),
                ActiveTab::Dashboard => self.render_dashboard_tab(ui),
                ActiveTab::Insights => self.render_insights_tab(ui),
            }
        });
    }
}

impl AnalystApp {
    fn render_data_tab(&self, ui: &mut egui::Ui) {
        let Some(dataset) = self.session.dataset() else {
            return;
        };

        ui.heading("Dataset");
        ui.horizontal(|ui| {
            ui.label(format!("Total columns: {}", dataset.summary.total_dimensions));
            ui.label(format!("Numeric: {}", dataset.summary.numeric_count));
            ui.label(format!("Categorical: {}", dataset.summary.categorical_count));
            ui.label(format!("Temporal: {}", dataset.summary.temporal_count));
            if dataset.summary.total_issues > 0 {
                ui.colored_label(
                    egui::Color32::YELLOW,
                    format!("Issues: {}", dataset.summary.total_issues),
                );
            }
        });
        ui.separator();

        egui::ScrollArea::vertical().show(ui, |ui| {
            ui.strong("Preview");
            egui::Grid::new("preview_grid").striped(true).show(ui, |ui| {
                for name in dataset.column_names() {
                    ui.strong(name);
                }
                ui.end_row();
                for row in dataset.preview(10) {
                    for cell in row {
                        ui.label(cell);
                    }
                    ui.end_row();
                }
            });

            ui.separator();
            ui.strong("Column profiles");
            for (i, profile) in dataset.profiles.iter().enumerate() {
                ui.push_id(i, |ui| {
                    ui.group(|ui| {
                        ui.horizontal(|ui| {
                            ui.strong(&profile.name);
                            ui.label(profile.data_type.as_str());
                            if let Some(cardinality) = profile.cardinality {
                                ui.label(format!("{cardinality} unique"));
                            }
                            if profile.null_count > 0 {
                                ui.label(format!("{:.1}% null", profile.null_percentage));
                            }
                        });
                        if let Some(stats) = &profile.numeric_stats {
                            ui.horizontal(|ui| {
                                if let Some(min) = stats.min {
                                    ui.label(format!("Min: {min:.2}"));
                                }
                                if let Some(max) = stats.max {
                                    ui.label(format!("Max: {max:.2}"));
                                }
                                if let Some(mean) = stats.mean {
                                    ui.label(format!("Mean: {mean:.2}"));
                                }
                            });
                        }
                        if !profile.sample_values.is_empty() {
                            ui.small(format!("e.g. {}", profile.sample_values.join(", ")));
                        }
                    });
                });
            }
        });
    }

    fn render_dashboard_tab(&mut self, ui: &mut egui::Ui) {
        if self.rendered.is_none() {
            ui.label("No dashboard yet. Ask for one in the chat.");
            return;
        }

        let mut export_requested = false;
        ui.horizontal(|ui| {
            ui.heading("Dashboard");
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                // Interactive plotly charts render in the browser.
                if ui.button("Open in Browser").clicked() {
                    export_requested = true;
                }
            });
        });
        if export_requested {
            self.export_html();
        }
        ui.separator();

        let Some(rendered) = &self.rendered else {
            return;
        };

        egui::ScrollArea::vertical().show(ui, |ui| {
            if !rendered.kpis.is_empty() {
                ui.horizontal(|ui| {
                    for kpi in &rendered.kpis {
                        ui.group(|ui| {
                            ui.vertical(|ui| {
                                ui.strong(&kpi.label);
                                match kpi.value {
                                    Some(value) => ui.heading(format!("{value:.2}")),
                                    None => ui.heading("n/a"),
                                };
                            });
                        });
                    }
                });
                ui.separator();
            }

            for (i, chart) in rendered.charts.iter().enumerate() {
                ui.push_id(i, |ui| {
                    ui.group(|ui| {
                        ui.horizontal(|ui| {
                            ui.strong(&chart.title);
                            ui.label(chart.kind.as_str());
                        });
                        egui::Grid::new(format!("chart_grid_{i}"))
                            .striped(true)
                            .show(ui, |ui| {
                                ui.strong("x");
                                for series in &chart.series {
                                    ui.strong(&series.name);
                                }
                                ui.end_row();
                                for (row, label) in chart.x_labels.iter().enumerate().take(20) {
                                    ui.label(label);
                                    for series in &chart.series {
                                        match series.values.get(row).copied().flatten() {
                                            Some(value) => ui.label(format!("{value:.2}")),
                                            None => ui.label("-"),
                                        };
                                    }
                                    ui.end_row();
                                }
                            });
                        if chart.x_labels.len() > 20 {
                            ui.small(format!(
                                "{} more rows in the browser view",
                                chart.x_labels.len() - 20
                            ));
                        }
                    });
                });
            }
        });
    }

    fn render_insights_tab(&self, ui: &mut egui::Ui) {
        let Some(spec) = self.session.dashboard() else {
            ui.label("Insights appear once a dashboard has been proposed.");
            return;
        };

        egui::ScrollArea::vertical().show(ui, |ui| {
            if let Some(summary) = &spec.analysis_summary {
                ui.heading("Analytical approach");
                ui.label(&summary.approach);
                if !summary.reasoning.is_empty() {
                    ui.separator();
                    ui.strong("Reasoning");
                    for line in &summary.reasoning {
                        ui.label(format!("• {line}"));
                    }
                }
            } else {
                ui.label("The analyst did not explain this dashboard.");
            }

            if !self.session.assumptions().is_empty() {
                ui.separator();
                ui.strong("Assumptions made so far");
                for assumption in self.session.assumptions() {
                    ui.label(format!("• {assumption}"));
                }
            }
        });
    }
}

fn open_in_browser(path: &std::path::Path) {
    let url = format!("file://{}", path.display());
    let command = if cfg!(target_os = "macos") {
        "open"
    } else if cfg!(target_os = "windows") {
        "explorer"
    } else {
        "xdg-open"
    };
    let _ = Command::new(command).arg(&url).spawn();
}
