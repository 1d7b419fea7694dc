use std::io::Write;

use pretty_assertions::assert_eq;

use survey_dashboard::dashboard::{Dashboard, DashboardConfig, PanelKind};
use survey_dashboard::data::loader::load_file;
use survey_dashboard::data::{FilterSpec, ToExportRows, Value};

const NEWBIES_CSV: &str = "\
tools,industry,experience,education,satisfaction,motivation,satisfaction_numeric,motivation_numeric
Excel,Finance,0-1 years,BSc,Satisfied,High,4,4
SQL,Finance,1-3 years,MSc,Neutral,Moderate,3,3
Excel,Tech,1-3 years,BSc,Very Satisfied,Very High,5,5
Python,Tech,3-5 years,PhD,Dissatisfied,Low,2,1
Excel,Health,1-3 years,MSc,Satisfied,High,4,5
";

fn write_survey(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("newbies_numeric.csv");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(NEWBIES_CSV.as_bytes()).unwrap();
    path
}

#[test]
fn filtered_dashboard_from_csv_file() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = load_file(&write_survey(dir.path())).unwrap();

    let mut filters = FilterSpec::new();
    filters.parse_assignment("tools=Excel").unwrap();
    filters.parse_assignment("education=").unwrap();

    let report = Dashboard::new(DashboardConfig::default())
        .run(&dataset, &filters)
        .unwrap();
    assert_eq!(report.total_rows, 5);
    assert_eq!(report.filtered.len(), 3);
    assert_eq!(report.failed_panels().count(), 0);

    let experience = report
        .panels
        .iter()
        .find(|p| p.export_name == "Category by Experience.csv")
        .unwrap()
        .table();
    assert_eq!(experience.headers, vec!["experience", "count"]);
    assert_eq!(
        experience.rows,
        vec![vec!["1-3 years", "2"], vec!["0-1 years", "1"]]
    );

    let data_path = dir.path().join(&report.data_export);
    report.filtered.to_export_rows().write_csv_file(&data_path).unwrap();
    let written = std::fs::read_to_string(&data_path).unwrap();
    assert_eq!(written.lines().next(), NEWBIES_CSV.lines().next());
    assert_eq!(written.lines().count(), 4);
}

#[test]
fn config_file_drives_panels() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = load_file(&write_survey(dir.path())).unwrap();

    let config_path = dir.path().join("dashboard.json");
    std::fs::write(
        &config_path,
        r#"{
            "title": "Satisfaction",
            "filter_fields": ["industry"],
            "panels": [
                {"name": "Satisfaction by tool", "export_name": "sat.csv", "kind": "aggregate",
                 "group_by": ["tools"], "target": "satisfaction_numeric", "reducer": "sum"},
                {"name": "Summed industries", "export_name": "bad.csv", "kind": "aggregate",
                 "group_by": ["tools"], "target": "industry", "reducer": "sum"},
                {"name": "Industry × tools", "export_name": "pivot.csv", "kind": "crosstab",
                 "rows": "industry", "columns": "tools"}
            ]
        }"#,
    )
    .unwrap();

    let config = DashboardConfig::load(&config_path).unwrap();
    assert!(matches!(config.panels[2].kind, PanelKind::Crosstab { .. }));
    let dashboard = Dashboard::new(config);

    let options = dashboard.filter_options(&dataset).unwrap();
    assert_eq!(
        options["industry"],
        vec![Value::from("Finance"), Value::from("Health"), Value::from("Tech")]
    );

    let report = dashboard.run(&dataset, &FilterSpec::new()).unwrap();
    assert_eq!(
        report.panels[0].table().rows,
        vec![vec!["Excel", "13"], vec!["Python", "2"], vec!["SQL", "3"]]
    );
    assert!(report.panels[1].outcome.is_err());
    assert!(report.panels[1].table().is_empty());
    assert_eq!(
        report.panels[2].table().headers,
        vec!["industry", "Excel", "Python", "SQL"]
    );
}

#[test]
fn broken_config_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dashboard.json");
    std::fs::write(&path, r#"{"title": "x", "panels": [{"name": "p"}]}"#).unwrap();
    let err = DashboardConfig::load(&path).unwrap_err();
    assert!(format!("{err:#}").contains("parsing dashboard config"));
}

#[test]
fn config_with_clashing_exports_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dashboard.json");
    std::fs::write(
        &path,
        r#"{
            "title": "x",
            "data_export": "tools.csv",
            "panels": [
                {"name": "By tool", "export_name": "tools.csv", "kind": "value_counts",
                 "field": "tools"}
            ]
        }"#,
    )
    .unwrap();
    let err = DashboardConfig::load(&path).unwrap_err();
    assert!(format!("{err:#}").contains("Export name 'tools.csv' is used more than once"));

    std::fs::write(
        &path,
        r#"{"title": "x", "panels": [{"name": "p", "export_name": "../up.csv",
            "kind": "value_counts", "field": "tools"}]}"#,
    )
    .unwrap();
    let err = DashboardConfig::load(&path).unwrap_err();
    assert!(format!("{err:#}").contains("Invalid export name '../up.csv'"));
}
