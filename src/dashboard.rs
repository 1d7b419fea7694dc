use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::data::{
    aggregate_with, apply_filters, correlation, crosstab, filter_options, value_counts,
    AggregateRequest, Dataset, ExportTable, FilterSpec, FilteredView, PipelineError, Reducer,
    ToExportRows, Value,
};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Which fields get a sidebar filter and which panels are computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardConfig {
    pub title: String,
    #[serde(default)]
    pub filter_fields: Vec<String>,
    #[serde(default)]
    pub panels: Vec<PanelSpec>,
    /// Fail the whole run when the filters leave no rows.
    #[serde(default)]
    pub require_rows: bool,
    /// File name of the filtered-data export.
    #[serde(default = "default_data_export")]
    pub data_export: String,
}

fn default_data_export() -> String {
    "Data.csv".to_string()
}

/// One chart / table of the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelSpec {
    pub name: String,
    /// File name used when the panel's data is downloaded.
    pub export_name: String,
    #[serde(flatten)]
    pub kind: PanelKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PanelKind {
    /// Grouped bar / treemap data.
    Aggregate(AggregateRequest),
    /// Pie-chart proportions of one field.
    ValueCounts { field: String },
    /// Pivot table of row counts.
    Crosstab { rows: String, columns: String },
    /// Scatter plot of two numeric fields.
    Correlation { x: String, y: String },
    /// First rows of selected columns.
    Sample { columns: Vec<String>, limit: usize },
}

impl PanelSpec {
    fn new(name: &str, export_name: &str, kind: PanelKind) -> Self {
        PanelSpec {
            name: name.to_string(),
            export_name: export_name.to_string(),
            kind,
        }
    }
}

impl Default for DashboardConfig {
    /// The data analyst survey dashboard.
    fn default() -> Self {
        let fields = |names: &[&str]| names.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        DashboardConfig {
            title: "Data Analyst Dashboard".to_string(),
            filter_fields: fields(&["tools", "education", "satisfaction", "industry"]),
            panels: vec![
                PanelSpec::new(
                    "Tools and Industry",
                    "Tools_and_Industry.csv",
                    PanelKind::Aggregate(AggregateRequest::new(
                        &["tools", "industry"],
                        "industry",
                        Reducer::Count,
                    )),
                ),
                PanelSpec::new(
                    "Tools and Experience",
                    "Tools_and_Experience.csv",
                    PanelKind::Aggregate(AggregateRequest::new(
                        &["tools", "experience"],
                        "experience",
                        Reducer::Count,
                    )),
                ),
                PanelSpec::new(
                    "Proportion of Experience Levels",
                    "Category by Experience.csv",
                    PanelKind::ValueCounts {
                        field: "experience".to_string(),
                    },
                ),
                PanelSpec::new(
                    "Experience Distribution Across Industries",
                    "Experience_Distribution.csv",
                    PanelKind::Aggregate(AggregateRequest::new(
                        &["motivation", "satisfaction", "industry", "experience"],
                        "experience",
                        Reducer::Count,
                    )),
                ),
                PanelSpec::new(
                    "Motivation by Industry",
                    "Motivation.csv",
                    PanelKind::ValueCounts {
                        field: "motivation".to_string(),
                    },
                ),
                PanelSpec::new(
                    "Satisfaction by Industry",
                    "Satisfaction.csv",
                    PanelKind::ValueCounts {
                        field: "satisfaction".to_string(),
                    },
                ),
                PanelSpec::new(
                    "Satisfaction level by Industry Table",
                    "Satisfaction_by_Industry.csv",
                    PanelKind::Crosstab {
                        rows: "industry".to_string(),
                        columns: "satisfaction".to_string(),
                    },
                ),
                PanelSpec::new(
                    "Motivation level by Industry Summary",
                    "Summary.csv",
                    PanelKind::Sample {
                        columns: fields(&["motivation", "satisfaction", "industry", "experience"]),
                        limit: 5,
                    },
                ),
                PanelSpec::new(
                    "Relationship between Motivation and Satisfaction",
                    "Motivation_vs_Satisfaction.csv",
                    PanelKind::Correlation {
                        x: "satisfaction_numeric".to_string(),
                        y: "motivation_numeric".to_string(),
                    },
                ),
            ],
            require_rows: false,
            data_export: default_data_export(),
        }
    }
}

impl DashboardConfig {
    /// Read a JSON dashboard definition.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading dashboard config {}", path.display()))?;
        let config: DashboardConfig = serde_json::from_str(&text)
            .with_context(|| format!("parsing dashboard config {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("checking dashboard config {}", path.display()))?;
        Ok(config)
    }

    /// Check that every export name is a plain file name and that no two
    /// exports (panels or the filtered data) would write the same file.
    pub fn validate(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        let names = std::iter::once(self.data_export.as_str())
            .chain(self.panels.iter().map(|p| p.export_name.as_str()));
        for name in names {
            if name.is_empty() || name == "." || name == ".." || name.contains(&['/', '\\'][..]) {
                bail!("Invalid export name '{name}': expected a plain file name");
            }
            if !seen.insert(name) {
                bail!("Export name '{name}' is used more than once");
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Outcome of one panel: its flat data, or the error to show in its place.
#[derive(Debug, Clone)]
pub struct PanelReport {
    pub name: String,
    pub export_name: String,
    pub outcome: Result<ExportTable, PipelineError>,
    /// Pearson coefficient, for correlation panels.
    pub pearson: Option<f64>,
}

impl PanelReport {
    /// Data to render: the panel's table, or an empty one if it failed.
    pub fn table(&self) -> ExportTable {
        self.outcome.clone().unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct DashboardReport<'a> {
    pub title: String,
    pub total_rows: usize,
    pub filtered: FilteredView<'a>,
    pub panels: Vec<PanelReport>,
    pub data_export: String,
}

impl DashboardReport<'_> {
    pub fn failed_panels(&self) -> impl Iterator<Item = &PanelReport> {
        self.panels.iter().filter(|p| p.outcome.is_err())
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

pub struct Dashboard {
    pub config: DashboardConfig,
}

impl Dashboard {
    pub fn new(config: DashboardConfig) -> Self {
        Dashboard { config }
    }

    /// Sidebar choices for every configured filter field.
    pub fn filter_options(
        &self,
        dataset: &Dataset,
    ) -> Result<BTreeMap<String, Vec<Value>>, PipelineError> {
        filter_options(dataset, &self.config.filter_fields)
    }

    /// Filter `dataset` and compute every panel.
    ///
    /// A bad filter fails the run. A failing panel only empties that panel.
    pub fn run<'a>(
        &self,
        dataset: &'a Dataset,
        filters: &FilterSpec,
    ) -> Result<DashboardReport<'a>, PipelineError> {
        let filtered = apply_filters(dataset, filters)?;
        if self.config.require_rows {
            filtered.require_non_empty()?;
        }

        let panels = self
            .config
            .panels
            .iter()
            .map(|panel| {
                let (outcome, pearson) = match run_panel(&filtered, &panel.kind) {
                    Ok((table, pearson)) => (Ok(table), pearson),
                    Err(e) => {
                        log::warn!("Panel '{}' rendered empty: {e}", panel.name);
                        (Err(e), None)
                    }
                };
                PanelReport {
                    name: panel.name.clone(),
                    export_name: panel.export_name.clone(),
                    outcome,
                    pearson,
                }
            })
            .collect();

        Ok(DashboardReport {
            title: self.config.title.clone(),
            total_rows: dataset.len(),
            filtered,
            panels,
            data_export: self.config.data_export.clone(),
        })
    }
}

fn run_panel(
    view: &FilteredView<'_>,
    kind: &PanelKind,
) -> Result<(ExportTable, Option<f64>), PipelineError> {
    match kind {
        PanelKind::Aggregate(request) => Ok((aggregate_with(view, request)?.to_export_rows(), None)),
        PanelKind::ValueCounts { field } => Ok((value_counts(view, field)?.to_export_rows(), None)),
        PanelKind::Crosstab { rows, columns } => {
            Ok((crosstab(view, rows, columns)?.to_export_rows(), None))
        }
        PanelKind::Correlation { x, y } => {
            let corr = correlation(view, x, y)?;
            Ok((corr.to_export_rows(), corr.pearson))
        }
        PanelKind::Sample { columns, limit } => Ok((view.head(*limit).export_columns(columns)?, None)),
    }
}
