//! Clinical store initialization and connection
//!
//! The store is a SQLite rendition of the MIMIC-III tables the dataset
//! generator reads: `patients`, `icustays`, `chartevents`, `labevents` and
//! `outputevents`. Timestamps are TEXT (`YYYY-MM-DD HH:MM:SS`).

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::ConnectOptions;
use std::path::Path;
use tracing::info;

/// Open an existing store read-only.
///
/// Fails if the file does not exist; the generator never creates or
/// modifies the store.
pub async fn connect_readonly(db_path: &Path) -> Result<SqliteConnection> {
    if !db_path.exists() {
        return Err(crate::Error::Config(format!(
            "Database not found: {}",
            db_path.display()
        )));
    }

    let conn = SqliteConnectOptions::new()
        .filename(db_path)
        .read_only(true)
        .connect()
        .await?;

    Ok(conn)
}

/// Create the store file if needed and make sure every table exists
pub async fn init_database(db_path: &Path) -> Result<SqliteConnection> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut conn = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .connect()
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_clinical_schema(&mut conn).await?;
    Ok(conn)
}

/// Create all clinical tables and their lookup indexes (idempotent)
pub async fn create_clinical_schema(conn: &mut SqliteConnection) -> Result<()> {
    create_patients_table(conn).await?;
    create_icustays_table(conn).await?;
    create_chartevents_table(conn).await?;
    create_labevents_table(conn).await?;
    create_outputevents_table(conn).await?;
    Ok(())
}

async fn create_patients_table(conn: &mut SqliteConnection) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS patients (
            subject_id INTEGER PRIMARY KEY,
            gender TEXT NOT NULL,
            dob TEXT NOT NULL
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn create_icustays_table(conn: &mut SqliteConnection) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS icustays (
            icustay_id INTEGER PRIMARY KEY,
            subject_id INTEGER NOT NULL REFERENCES patients(subject_id),
            hadm_id INTEGER NOT NULL,
            first_careunit TEXT NOT NULL,
            intime TEXT NOT NULL,
            outtime TEXT,
            los REAL
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_icustays_subject ON icustays(subject_id)")
        .execute(&mut *conn)
        .await?;

    Ok(())
}

async fn create_chartevents_table(conn: &mut SqliteConnection) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chartevents (
            row_id INTEGER PRIMARY KEY AUTOINCREMENT,
            subject_id INTEGER NOT NULL,
            hadm_id INTEGER NOT NULL,
            itemid INTEGER NOT NULL,
            charttime TEXT NOT NULL,
            value TEXT,
            valuenum REAL,
            stopped TEXT
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_chartevents_stay ON chartevents(subject_id, hadm_id, itemid)",
    )
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn create_labevents_table(conn: &mut SqliteConnection) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS labevents (
            row_id INTEGER PRIMARY KEY AUTOINCREMENT,
            subject_id INTEGER NOT NULL,
            hadm_id INTEGER NOT NULL,
            itemid INTEGER NOT NULL,
            charttime TEXT NOT NULL,
            value TEXT,
            valuenum REAL
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_labevents_stay ON labevents(subject_id, hadm_id, itemid)",
    )
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn create_outputevents_table(conn: &mut SqliteConnection) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS outputevents (
            row_id INTEGER PRIMARY KEY AUTOINCREMENT,
            subject_id INTEGER NOT NULL,
            hadm_id INTEGER NOT NULL,
            itemid INTEGER NOT NULL,
            charttime TEXT NOT NULL,
            value REAL
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_outputevents_stay ON outputevents(subject_id, hadm_id, itemid)",
    )
    .execute(&mut *conn)
    .await?;

    Ok(())
}
