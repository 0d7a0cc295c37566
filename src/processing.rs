use crate::config::DatePolicy;
use crate::error::IngestError;
use crate::types::{CleanRecord, OccurrenceRecord, RecordTable, YearCount};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

pub const TABLE_COLUMNS: [&str; 5] = ["Familia", "Especie", "Fecha", "Localidad", "Origen del dato"];

const DATETIME_FORMATS: [&str; 6] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];

#[derive(Debug, Default)]
pub struct Cleaned {
    pub records: Vec<CleanRecord>,
    pub dropped_species: usize,
    pub skipped_dates: usize,
}

/// Drops rows without a species, then parses event dates.
///
/// Under [`DatePolicy::Strict`] the first unparseable date aborts; under
/// [`DatePolicy::Skip`] the row is dropped and counted instead.
pub fn clean(records: Vec<OccurrenceRecord>, policy: DatePolicy) -> Result<Cleaned, IngestError> {
    let mut cleaned = Cleaned::default();

    for record in records {
        let Some(species) = record.species else {
            cleaned.dropped_species += 1;
            continue;
        };

        let event_date = match parse_event_date(&record.event_date_raw) {
            Some(date) => date,
            None => match policy {
                DatePolicy::Strict => {
                    return Err(IngestError::BadDate {
                        row: record.row,
                        gbif_id: record.gbif_id,
                        raw: record.event_date_raw,
                    })
                }
                DatePolicy::Skip => {
                    cleaned.skipped_dates += 1;
                    continue;
                }
            },
        };

        cleaned.records.push(CleanRecord {
            occurrence_id: record.occurrence_id,
            species,
            family: record.family,
            locality: record.locality,
            event_date,
            location: record.location,
        });
    }

    if cleaned.skipped_dates > 0 {
        warn!("Skipped {} records with unparseable event dates", cleaned.skipped_dates);
    }
    info!(
        "Cleaned {} records ({} without species removed)",
        cleaned.records.len(),
        cleaned.dropped_species
    );

    Ok(cleaned)
}

/// Reads the date forms found in Darwin Core `eventDate` values. Partial
/// dates (`YYYY-MM`, `YYYY`) resolve to the first day of the period.
pub fn parse_event_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt.date());
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, fmt) {
            return Some(date);
        }
    }

    let mut parts = raw.splitn(2, '-');
    let year = parse_year(parts.next()?)?;
    let month = match parts.next() {
        Some(m) if m.len() == 2 => m.parse::<u32>().ok()?,
        Some(_) => return None,
        None => 1,
    };
    NaiveDate::from_ymd_opt(year, month, 1)
}

fn parse_year(s: &str) -> Option<i32> {
    if s.len() == 4 && s.bytes().all(|b| b.is_ascii_digit()) {
        s.parse().ok()
    } else {
        None
    }
}

/// Sorted distinct species names.
pub fn species_options(records: &[CleanRecord]) -> Vec<String> {
    records
        .iter()
        .map(|r| r.species.as_str())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Records whose species matches exactly (case-sensitive), original order kept.
pub fn filter_species(records: Vec<CleanRecord>, species: &str) -> Vec<CleanRecord> {
    records.into_iter().filter(|r| r.species == species).collect()
}

/// Record counts per calendar year, ascending. Years without records are
/// absent unless `fill_gaps` is set, in which case every year between the
/// first and last observed year gets an entry.
pub fn year_counts(records: &[CleanRecord], fill_gaps: bool) -> Vec<YearCount> {
    let mut counts: BTreeMap<i32, usize> = BTreeMap::new();
    for record in records {
        *counts.entry(record.event_date.year()).or_insert(0) += 1;
    }

    if fill_gaps {
        if let (Some(&first), Some(&last)) = (counts.keys().next(), counts.keys().next_back()) {
            for year in first..=last {
                counts.entry(year).or_insert(0);
            }
        }
    }

    counts
        .into_iter()
        .map(|(year, count)| YearCount { year, count })
        .collect()
}

pub fn record_table(records: &[CleanRecord]) -> RecordTable {
    RecordTable {
        columns: TABLE_COLUMNS.to_vec(),
        rows: records
            .iter()
            .map(|r| {
                [
                    r.family.clone(),
                    r.species.clone(),
                    r.event_date.format("%Y-%m-%d").to_string(),
                    r.locality.clone(),
                    r.occurrence_id.clone(),
                ]
            })
            .collect(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn raw(row: usize, species: Option<&str>, date: &str) -> OccurrenceRecord {
        OccurrenceRecord {
            row,
            gbif_id: row.to_string(),
            occurrence_id: format!("occ-{row}"),
            species: species.map(str::to_string),
            family: "Atelidae".to_string(),
            locality: "Osa".to_string(),
            event_date_raw: date.to_string(),
            location: Some(geo::Point::new(0.5, 0.5)),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parses_darwin_core_date_forms() {
        assert_eq!(parse_event_date("2019-06-01"), Some(date(2019, 6, 1)));
        assert_eq!(parse_event_date("2019/06/01"), Some(date(2019, 6, 1)));
        assert_eq!(parse_event_date("2019-06-01T10:15:00"), Some(date(2019, 6, 1)));
        assert_eq!(parse_event_date("2019-06-01T10:15:00.250"), Some(date(2019, 6, 1)));
        assert_eq!(parse_event_date("2019-06-01 10:15:00"), Some(date(2019, 6, 1)));
        assert_eq!(parse_event_date("2019-06-01T10:15"), Some(date(2019, 6, 1)));
        assert_eq!(parse_event_date("2019-06-01T23:00:00-06:00"), Some(date(2019, 6, 1)));
        assert_eq!(parse_event_date("2019-06"), Some(date(2019, 6, 1)));
        assert_eq!(parse_event_date("2019"), Some(date(2019, 1, 1)));
    }

    #[test]
    fn rejects_garbage_dates() {
        assert_eq!(parse_event_date(""), None);
        assert_eq!(parse_event_date("yesterday"), None);
        assert_eq!(parse_event_date("2019-13"), None);
        assert_eq!(parse_event_date("2019-02-30"), None);
        assert_eq!(parse_event_date("19"), None);
    }

    #[test]
    fn cleaning_drops_missing_species() {
        let records = vec![raw(1, Some("A"), "2019-01-01"), raw(2, None, "2019-01-01")];
        let cleaned = clean(records, DatePolicy::Strict).unwrap();

        assert_eq!(cleaned.records.len(), 1);
        assert_eq!(cleaned.dropped_species, 1);
    }

    #[test]
    fn cleaning_without_null_species_keeps_every_row() {
        let records: Vec<_> = (1..=5).map(|i| raw(i, Some("A"), "2020-02-02")).collect();
        let cleaned = clean(records, DatePolicy::Strict).unwrap();
        assert_eq!(cleaned.records.len(), 5);
    }

    #[test]
    fn strict_policy_aborts_on_bad_date() {
        let records = vec![raw(1, Some("A"), "2019-01-01"), raw(2, Some("A"), "not a date")];
        let err = clean(records, DatePolicy::Strict).unwrap_err();

        assert!(matches!(err, IngestError::BadDate { row: 2, ref gbif_id, .. } if gbif_id == "2"));
    }

    #[test]
    fn strict_policy_rejects_blank_date() {
        let records = vec![raw(1, Some("A"), "2019-01-01"), raw(2, Some("A"), "")];
        let err = clean(records, DatePolicy::Strict).unwrap_err();

        assert!(matches!(err, IngestError::BadDate { row: 2, ref raw, .. } if raw.is_empty()));
    }

    #[test]
    fn skip_policy_counts_bad_dates() {
        let records = vec![
            raw(1, Some("A"), "2019-01-01"),
            raw(2, Some("A"), "not a date"),
            raw(3, Some("A"), ""),
        ];
        let cleaned = clean(records, DatePolicy::Skip).unwrap();

        assert_eq!(cleaned.records.len(), 1);
        assert_eq!(cleaned.skipped_dates, 2);
    }

    #[test]
    fn bad_date_on_null_species_row_is_never_parsed() {
        let records = vec![raw(1, Some("A"), "2019-01-01"), raw(2, None, "garbage")];
        assert!(clean(records, DatePolicy::Strict).is_ok());
    }

    #[test]
    fn species_options_are_sorted_and_distinct() {
        let records = vec![
            raw(1, Some("b"), "2019"),
            raw(2, Some("B"), "2019"),
            raw(3, Some("A"), "2019"),
            raw(4, Some("B"), "2019"),
        ];
        let cleaned = clean(records, DatePolicy::Strict).unwrap();

        assert_eq!(species_options(&cleaned.records), vec!["A", "B", "b"]);
    }

    #[test]
    fn filter_is_exact_and_ordered() {
        let records = vec![
            raw(1, Some("A"), "2019"),
            raw(2, Some("a"), "2019"),
            raw(3, Some("A"), "2018"),
        ];
        let cleaned = clean(records, DatePolicy::Strict).unwrap();
        let filtered = filter_species(cleaned.records, "A");

        let ids: Vec<&str> = filtered.iter().map(|r| r.occurrence_id.as_str()).collect();
        assert_eq!(ids, vec!["occ-1", "occ-3"]);
    }

    #[test]
    fn unknown_species_yields_nothing() {
        let cleaned = clean(vec![raw(1, Some("A"), "2019")], DatePolicy::Strict).unwrap();
        assert!(filter_species(cleaned.records, "Z").is_empty());
    }

    #[test]
    fn shared_year_gives_one_bar() {
        let records = vec![raw(1, Some("A"), "2019-03-01"), raw(2, Some("A"), "2019-11-30")];
        let cleaned = clean(records, DatePolicy::Strict).unwrap();

        assert_eq!(
            year_counts(&cleaned.records, false),
            vec![YearCount { year: 2019, count: 2 }]
        );
    }

    #[test]
    fn year_gaps_are_absent_unless_filled() {
        let records = vec![
            raw(1, Some("A"), "2015-01-01"),
            raw(2, Some("A"), "2018-01-01"),
            raw(3, Some("A"), "2018-05-01"),
        ];
        let cleaned = clean(records, DatePolicy::Strict).unwrap();

        let sparse = year_counts(&cleaned.records, false);
        assert_eq!(sparse.len(), 2);

        let filled = year_counts(&cleaned.records, true);
        let years: Vec<i32> = filled.iter().map(|y| y.year).collect();
        assert_eq!(years, vec![2015, 2016, 2017, 2018]);
        assert_eq!(filled[1].count, 0);
        assert_eq!(filled.iter().map(|y| y.count).sum::<usize>(), 3);
    }

    #[test]
    fn year_counts_of_nothing_is_empty() {
        assert!(year_counts(&[], true).is_empty());
    }

    #[test]
    fn table_projects_labelled_columns() {
        let cleaned = clean(vec![raw(4, Some("A"), "2019-06-01T10:00:00")], DatePolicy::Strict).unwrap();
        let table = record_table(&cleaned.records);

        assert_eq!(table.columns, TABLE_COLUMNS.to_vec());
        assert_eq!(
            table.rows[0],
            [
                "Atelidae".to_string(),
                "A".to_string(),
                "2019-06-01".to_string(),
                "Osa".to_string(),
                "occ-4".to_string(),
            ]
        );
    }
}
