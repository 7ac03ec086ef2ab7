//! End-to-end dataset generation against a temporary clinical store

mod helpers;

use helpers::{test_catalog, ClinicalFixture};
use mdgl_dg::output::{read_patient_dir, REPORT_FILE_NAME, SUMMARY_FILE_NAME};
use mdgl_dg::{generate_dataset, rebuild_report, PipelineError, RunOptions};
use std::path::Path;
use tempfile::TempDir;

const INTIME: &str = "2150-01-01 10:00:00";

fn options(fx: &ClinicalFixture, out: &Path, catalog_path: Option<&Path>) -> RunOptions {
    RunOptions {
        database_path: fx.db_path.clone(),
        output_root: out.to_path_buf(),
        catalog_path: catalog_path.map(Path::to_path_buf),
        concurrency: Some(2),
    }
}

fn csv_lines(dir: &Path, subject_id: i64) -> Vec<String> {
    std::fs::read_to_string(dir.join(format!("{}.csv", subject_id)))
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn test_two_patients_one_reading_each() {
    let mut fx = ClinicalFixture::new().await;
    fx.patient(1, "F", "2080-01-01").await;
    fx.stay(100, 1, 10, "MICU", INTIME, 3.0).await;
    fx.lab(1, 10, 50810, "2150-01-01 10:30:00", "34.5").await;
    fx.patient(2, "M", "2090-06-01").await;
    fx.stay(200, 2, 20, "SICU", INTIME, 3.0).await;
    fx.chart_value(2, 20, 762, "2150-01-01 09:00:00", 80.0).await;
    fx.lab(2, 20, 50810, "2150-01-01 10:30:00", "34.5").await;

    let out = TempDir::new().unwrap();
    let summary = generate_dataset(&test_catalog(None), &options(&fx, out.path(), None))
        .await
        .unwrap();

    assert_eq!(summary.cohort_size, 2);
    assert_eq!(summary.patients_written, 2);
    assert_eq!(summary.diagnostics, 0);
    assert_eq!(summary.concurrency, 2);
    assert_eq!(summary.normalization.failed_partitions, 0);

    let dir = &summary.output_dir;
    assert!(dir
        .file_name()
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("patientfiles "));

    assert_eq!(
        csv_lines(dir, 1),
        vec![
            "Time,Parameter,Id,Value",
            "00:00,RecordID,-1,1.000",
            "00:00,Age,-1,70.000",
            "00:00,Gender,-1,0.000",
            "00:00,ICUType,-1,2.000",
            "00:00,Height,-1,-1.000",
            "00:00,Weight,-1,-1.000",
            "00:30,HCT,50810,34.500",
        ]
    );
    assert_eq!(
        csv_lines(dir, 2),
        vec![
            "Time,Parameter,Id,Value",
            "00:00,RecordID,-1,2.000",
            "00:00,Age,-1,59.000",
            "00:00,Gender,-1,1.000",
            "00:00,ICUType,-1,1.000",
            "00:00,Height,-1,-1.000",
            "00:00,Weight,-1,80.000",
            "00:30,HCT,50810,34.500",
        ]
    );

    let report = std::fs::read_to_string(dir.join(REPORT_FILE_NAME)).unwrap();
    assert!(report.contains("Total number of patients: 2\n"));
    assert!(report.contains("Number of patients with HCT recorded: 2\n"));
    assert!(report.contains("Median :        34.500\n"));

    let json = std::fs::read_to_string(dir.join(SUMMARY_FILE_NAME)).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["patients_written"], 2);
    assert_eq!(value["extraction"]["failed_partitions"], 0);
}

#[tokio::test]
async fn test_horizon_and_decoding_in_output() {
    let mut fx = ClinicalFixture::new().await;
    fx.patient(1, "M", "2080-01-01").await;
    fx.stay(100, 1, 10, "MICU", INTIME, 3.0).await;
    fx.chart(1, 10, 720, "2150-01-01 10:00:00", Some("Drager"), None, None).await;
    fx.chart(1, 10, 720, "2150-01-01 12:00:00", Some("Drager"), None, None).await;
    fx.chart(1, 10, 722, "2150-01-01 12:30:00", Some("Drager"), None, Some("D/C'd")).await;
    fx.lab(1, 10, 51003, "2150-01-01 13:15:00", ">5").await;
    fx.lab(1, 10, 50810, "2150-01-01 14:00:00", "clotted").await;
    // Past the 24h horizon
    fx.lab(1, 10, 50810, "2150-01-02 10:00:00", "31.0").await;

    let out = TempDir::new().unwrap();
    let summary = generate_dataset(&test_catalog(Some(24)), &options(&fx, out.path(), None))
        .await
        .unwrap();
    assert_eq!(summary.diagnostics, 1);

    let lines = csv_lines(&summary.output_dir, 1);
    assert_eq!(
        lines[7..],
        [
            "00:00,MechVent,720,1.000",
            "02:00,MechVent,720,1.000",
            "02:30,MechVent,722,2.000",
            "03:15,TroponinT,51003,25.001",
        ]
    );
}

#[tokio::test]
async fn test_empty_cohort_still_writes_dataset() {
    let mut fx = ClinicalFixture::new().await;
    fx.patient(1, "M", "2080-01-01").await;
    fx.stay(100, 1, 10, "CCU", INTIME, 3.0).await;

    let out = TempDir::new().unwrap();
    let summary = generate_dataset(&test_catalog(None), &options(&fx, out.path(), None))
        .await
        .unwrap();

    assert_eq!(summary.cohort_size, 0);
    assert_eq!(summary.patients_written, 0);
    assert!(summary.output_dir.join(REPORT_FILE_NAME).exists());
}

#[tokio::test]
async fn test_missing_store_is_fatal_before_output() {
    let out = TempDir::new().unwrap();
    let options = RunOptions {
        database_path: out.path().join("absent.db"),
        output_root: out.path().to_path_buf(),
        catalog_path: None,
        concurrency: Some(2),
    };

    let result = generate_dataset(&test_catalog(None), &options).await;
    assert!(matches!(result, Err(PipelineError::Store(_))));
    assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_catalog_copied_and_report_rebuilt() {
    let mut fx = ClinicalFixture::new().await;
    fx.patient(1, "F", "2080-01-01").await;
    fx.stay(100, 1, 10, "MICU", INTIME, 3.0).await;
    fx.lab(1, 10, 50810, "2150-01-01 10:30:00", "30.0").await;
    fx.lab(1, 10, 50810, "2150-01-01 11:30:00", "40.0").await;

    let catalog_path = fx.dir.path().join("icu-cohort.toml");
    std::fs::write(&catalog_path, "icu_types = [\"MICU\"]\n").unwrap();

    let out = TempDir::new().unwrap();
    let summary = generate_dataset(
        &test_catalog(None),
        &options(&fx, out.path(), Some(&catalog_path)),
    )
    .await
    .unwrap();
    let dir = summary.output_dir;
    assert!(dir.join("icu-cohort.toml").exists());

    let report_path = dir.join(REPORT_FILE_NAME);
    std::fs::remove_file(&report_path).unwrap();
    let patients = rebuild_report(&test_catalog(None), &dir).unwrap();
    assert_eq!(patients, 1);

    let report = std::fs::read_to_string(report_path).unwrap();
    assert!(report.contains("Number of values recorded: 2\n"));
    assert!(report.contains("Mean   :        35.000\n"));
    assert_eq!(read_patient_dir(&dir).unwrap()[0].len(), 8);
}

#[test]
fn test_demo_catalog_is_valid() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("demos/catalog.toml");
    let catalog = mdgl_common::SpecificationCatalog::from_file(&path).unwrap();

    assert_eq!(catalog.parameters().len(), 7);
    assert_eq!(
        catalog.descriptor_for(722).map(|p| p.abbreviation.as_str()),
        Some("MechVent")
    );
}
