//! SQL text for the three clinical store queries
//!
//! Variable-length ID lists are bound through generated `?` placeholder
//! lists; the ventilation item IDs are fixed and written as literals.

use crate::normalize::decoders::{VENTILATION_IDS, VENTILATION_SUPPLY_IDS, VENTILATION_SETTING_IDS};

/// `?, ?, ?` with `count` placeholders
pub fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn literal_list(ids: &[i64]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Cohort selection.
///
/// Binds: min length of stay (days), age min, age max, `genders` codes,
/// `care_units` codes. Qualifying stays are filtered first, then only the
/// most recent one per subject is kept.
pub fn cohort_query(genders: usize, care_units: usize) -> String {
    format!(
        r#"
        WITH qualifying AS (
            SELECT i.subject_id, i.hadm_id, i.icustay_id, i.first_careunit,
                   i.intime, p.dob, p.gender,
                   ROW_NUMBER() OVER (
                       PARTITION BY i.subject_id
                       ORDER BY datetime(i.intime) DESC, i.icustay_id DESC
                   ) AS recency
            FROM icustays i
            JOIN patients p ON p.subject_id = i.subject_id
            WHERE i.los >= ?
              AND datetime(i.intime) > datetime(p.dob, '+' || ? || ' years')
              AND datetime(i.intime) < datetime(p.dob, '+' || ? || ' years')
              AND p.gender IN ({genders})
              AND i.first_careunit IN ({units})
        )
        SELECT subject_id, hadm_id, icustay_id, first_careunit, intime, dob, gender
        FROM qualifying
        WHERE recency = 1
        ORDER BY subject_id
        "#,
        genders = placeholders(genders),
        units = placeholders(care_units),
    )
}

/// Most recent numeric chart value at or before admission.
///
/// Binds: subject id, admission id, admission time, then `ids` item IDs.
pub fn latest_charted_value_query(ids: usize) -> String {
    format!(
        r#"
        SELECT itemid, valuenum
        FROM chartevents
        WHERE subject_id = ?
          AND hadm_id = ?
          AND datetime(charttime) <= datetime(?)
          AND valuenum IS NOT NULL
          AND itemid IN ({ids})
        ORDER BY datetime(charttime) DESC
        LIMIT 1
        "#,
        ids = placeholders(ids),
    )
}

/// Measurement feed for one stay, merged from lab, chart and output events.
///
/// Binds, for each of the three sources in order: subject id, admission
/// id, admission time, then `ids` item IDs. Ventilation chart rows are
/// rewritten to `'2.0'` (stop marker) or `'1.0'` (active) before decoding.
pub fn measurements_query(ids: usize) -> String {
    let list = placeholders(ids);
    format!(
        r#"
        SELECT subject_id, charttime, itemid, value FROM (
            SELECT subject_id, charttime, itemid, value
            FROM labevents
            WHERE subject_id = ? AND hadm_id = ?
              AND datetime(charttime) >= datetime(?)
              AND itemid IN ({list})
              AND value IS NOT NULL AND value != ''

            UNION ALL

            SELECT subject_id, charttime, itemid,
                   CASE
                       WHEN (itemid IN ({supply}) AND value = 'None')
                         OR (itemid IN ({setting}) AND stopped = 'D/C''d') THEN '2.0'
                       WHEN itemid IN ({vent}) THEN '1.0'
                       ELSE value
                   END AS value
            FROM chartevents
            WHERE subject_id = ? AND hadm_id = ?
              AND datetime(charttime) >= datetime(?)
              AND itemid IN ({list})
              AND value IS NOT NULL AND value != ''

            UNION ALL

            SELECT subject_id, charttime, itemid, CAST(value AS TEXT) AS value
            FROM outputevents
            WHERE subject_id = ? AND hadm_id = ?
              AND datetime(charttime) >= datetime(?)
              AND itemid IN ({list})
              AND value IS NOT NULL
        )
        ORDER BY subject_id, datetime(charttime)
        "#,
        list = list,
        supply = literal_list(&VENTILATION_SUPPLY_IDS),
        setting = literal_list(&VENTILATION_SETTING_IDS),
        vent = literal_list(&VENTILATION_IDS),
    )
}

/// Number of sources merged by [`measurements_query`]
pub const MEASUREMENT_SOURCES: usize = 3;
