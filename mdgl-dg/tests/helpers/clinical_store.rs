//! Temporary clinical store populated row by row

use mdgl_common::db::init_database;
use mdgl_dg::ClinicalStore;
use sqlx::sqlite::SqliteConnection;
use std::path::PathBuf;
use tempfile::TempDir;

/// Writable SQLite store in a temp dir. Keep it alive for the whole test.
pub struct ClinicalFixture {
    pub dir: TempDir,
    pub db_path: PathBuf,
    conn: SqliteConnection,
}

impl ClinicalFixture {
    pub async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("mimic.db");
        let conn = init_database(&db_path).await.unwrap();
        Self { dir, db_path, conn }
    }

    pub async fn patient(&mut self, subject_id: i64, gender: &str, dob: &str) -> &mut Self {
        sqlx::query("INSERT INTO patients (subject_id, gender, dob) VALUES (?, ?, ?)")
            .bind(subject_id)
            .bind(gender)
            .bind(dob)
            .execute(&mut self.conn)
            .await
            .unwrap();
        self
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn stay(
        &mut self,
        icustay_id: i64,
        subject_id: i64,
        hadm_id: i64,
        care_unit: &str,
        intime: &str,
        los_days: f64,
    ) -> &mut Self {
        sqlx::query(
            "INSERT INTO icustays (icustay_id, subject_id, hadm_id, first_careunit, intime, los)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(icustay_id)
        .bind(subject_id)
        .bind(hadm_id)
        .bind(care_unit)
        .bind(intime)
        .bind(los_days)
        .execute(&mut self.conn)
        .await
        .unwrap();
        self
    }

    /// Chart row with text value, numeric value and stop marker
    #[allow(clippy::too_many_arguments)]
    pub async fn chart(
        &mut self,
        subject_id: i64,
        hadm_id: i64,
        itemid: i64,
        charttime: &str,
        value: Option<&str>,
        valuenum: Option<f64>,
        stopped: Option<&str>,
    ) -> &mut Self {
        sqlx::query(
            "INSERT INTO chartevents (subject_id, hadm_id, itemid, charttime, value, valuenum, stopped)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(subject_id)
        .bind(hadm_id)
        .bind(itemid)
        .bind(charttime)
        .bind(value)
        .bind(valuenum)
        .bind(stopped)
        .execute(&mut self.conn)
        .await
        .unwrap();
        self
    }

    /// Numeric chart reading (value and valuenum agree)
    pub async fn chart_value(
        &mut self,
        subject_id: i64,
        hadm_id: i64,
        itemid: i64,
        charttime: &str,
        valuenum: f64,
    ) -> &mut Self {
        let text = valuenum.to_string();
        self.chart(subject_id, hadm_id, itemid, charttime, Some(&text), Some(valuenum), None)
            .await
    }

    pub async fn lab(
        &mut self,
        subject_id: i64,
        hadm_id: i64,
        itemid: i64,
        charttime: &str,
        value: &str,
    ) -> &mut Self {
        sqlx::query(
            "INSERT INTO labevents (subject_id, hadm_id, itemid, charttime, value, valuenum)
             VALUES (?, ?, ?, ?, ?, NULL)",
        )
        .bind(subject_id)
        .bind(hadm_id)
        .bind(itemid)
        .bind(charttime)
        .bind(value)
        .execute(&mut self.conn)
        .await
        .unwrap();
        self
    }

    pub async fn output(
        &mut self,
        subject_id: i64,
        hadm_id: i64,
        itemid: i64,
        charttime: &str,
        value: Option<f64>,
    ) -> &mut Self {
        sqlx::query(
            "INSERT INTO outputevents (subject_id, hadm_id, itemid, charttime, value)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(subject_id)
        .bind(hadm_id)
        .bind(itemid)
        .bind(charttime)
        .bind(value)
        .execute(&mut self.conn)
        .await
        .unwrap();
        self
    }

    /// Read-only store on the fixture's database
    pub async fn store(&self) -> ClinicalStore {
        ClinicalStore::open(&self.db_path).await.unwrap()
    }
}
