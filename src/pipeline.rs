//! The whole dashboard as one pure function of its inputs.

use crate::config::{DatePolicy, ProcessingConfig};
use crate::data;
use crate::error::IngestError;
use crate::processing;
use crate::spatial::AreaIndex;
use crate::types::Dashboard;
use tracing::info;

#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    pub delimiter: u8,
    pub date_policy: DatePolicy,
    pub fill_year_gaps: bool,
}

impl PipelineOptions {
    pub fn new(delimiter: u8, processing: &ProcessingConfig) -> Self {
        Self {
            delimiter,
            date_policy: processing.date_policy,
            fill_year_gaps: processing.fill_year_gaps,
        }
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            delimiter: b'\t',
            date_policy: DatePolicy::Strict,
            fill_year_gaps: false,
        }
    }
}

/// Upload -> clean -> species filter -> area join + year series + table.
///
/// Returns `None` when no file was supplied. With no species named, the first
/// one in sorted order is selected.
pub fn run(
    file: Option<&[u8]>,
    species: Option<&str>,
    areas: &AreaIndex,
    options: PipelineOptions,
) -> Result<Option<Dashboard>, IngestError> {
    let Some(file) = file.filter(|bytes| !bytes.is_empty()) else {
        return Ok(None);
    };

    let records = data::load_occurrences(file, options.delimiter)?;
    let cleaned = processing::clean(records, options.date_policy)?;

    let species_options = processing::species_options(&cleaned.records);
    let selected_species = species
        .map(str::to_string)
        .or_else(|| species_options.first().cloned());

    let filtered = match &selected_species {
        Some(name) => processing::filter_species(cleaned.records, name),
        None => Vec::new(),
    };

    info!(
        "Selected {:?}: {} records",
        selected_species.as_deref().unwrap_or(""),
        filtered.len()
    );

    Ok(Some(Dashboard {
        species_options,
        selected_species,
        total_records: filtered.len(),
        skipped_dates: cleaned.skipped_dates,
        table: processing::record_table(&filtered),
        years: processing::year_counts(&filtered, options.fill_year_gaps),
        areas: areas.count_records(&filtered),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::tests::fixture_path;
    use crate::types::{AreaCount, YearCount};

    fn fixture_areas() -> AreaIndex {
        AreaIndex::new(data::load_areas(&fixture_path("areas.geojson"), "codigo").unwrap())
    }

    fn fixture_bytes() -> Vec<u8> {
        std::fs::read(fixture_path("occurrences.tsv")).unwrap()
    }

    fn area(code: &str, count: usize) -> AreaCount {
        AreaCount {
            code: code.to_string(),
            count,
        }
    }

    #[test]
    fn no_file_is_a_no_op() {
        let areas = fixture_areas();
        assert_eq!(run(None, None, &areas, PipelineOptions::default()).unwrap(), None);
        assert_eq!(run(Some(&b""[..]), Some("A"), &areas, PipelineOptions::default()).unwrap(), None);
    }

    #[test]
    fn selecting_first_species() {
        let areas = fixture_areas();
        let bytes = fixture_bytes();
        let dashboard = run(Some(bytes.as_slice()), Some("Alouatta palliata"), &areas, PipelineOptions::default())
            .unwrap()
            .unwrap();

        assert_eq!(dashboard.species_options, vec!["Alouatta palliata", "Ateles geoffroyi"]);
        assert_eq!(dashboard.total_records, 6);
        assert_eq!(dashboard.table.rows.len(), 6);
        assert!(dashboard.table.rows.iter().all(|row| row[1] == "Alouatta palliata"));
        assert_eq!(
            dashboard.years,
            vec![
                YearCount { year: 2018, count: 2 },
                YearCount { year: 2019, count: 1 },
                YearCount { year: 2020, count: 3 },
            ]
        );
        assert_eq!(dashboard.years.iter().map(|y| y.count).sum::<usize>(), 6);
        assert_eq!(dashboard.areas, vec![area("303", 0), area("A1", 2), area("A2", 2)]);
    }

    #[test]
    fn selecting_second_species() {
        let areas = fixture_areas();
        let bytes = fixture_bytes();
        let dashboard = run(Some(bytes.as_slice()), Some("Ateles geoffroyi"), &areas, PipelineOptions::default())
            .unwrap()
            .unwrap();

        assert_eq!(dashboard.total_records, 4);
        assert_eq!(dashboard.years.iter().map(|y| y.count).sum::<usize>(), 4);
        assert_eq!(dashboard.areas, vec![area("303", 1), area("A1", 1), area("A2", 0)]);
    }

    #[test]
    fn default_selection_is_first_sorted_species() {
        let areas = fixture_areas();
        let bytes = fixture_bytes();
        let dashboard = run(Some(bytes.as_slice()), None, &areas, PipelineOptions::default())
            .unwrap()
            .unwrap();

        assert_eq!(dashboard.selected_species.as_deref(), Some("Alouatta palliata"));
    }

    #[test]
    fn null_species_row_is_never_an_option() {
        let areas = fixture_areas();
        let bytes = fixture_bytes();
        let dashboard = run(Some(bytes.as_slice()), None, &areas, PipelineOptions::default())
            .unwrap()
            .unwrap();

        assert_eq!(dashboard.species_options.len(), 2);
        assert!(dashboard.species_options.iter().all(|s| !s.is_empty()));
        // the null-species row sits inside A1 and must not inflate its count
        assert_eq!(dashboard.areas[1], area("A1", 2));
    }

    #[test]
    fn unknown_species_renders_empty_outputs() {
        let areas = fixture_areas();
        let bytes = fixture_bytes();
        let dashboard = run(Some(bytes.as_slice()), Some("Panthera onca"), &areas, PipelineOptions::default())
            .unwrap()
            .unwrap();

        assert_eq!(dashboard.total_records, 0);
        assert!(dashboard.table.rows.is_empty());
        assert!(dashboard.years.is_empty());
        assert_eq!(dashboard.areas.len(), 3);
        assert!(dashboard.areas.iter().all(|a| a.count == 0));
    }

    #[test]
    fn ten_rows_two_species() {
        let mut tsv = String::from(
            "gbifID\toccurrenceID\tfamily\tspecies\tlocality\teventDate\tdecimalLatitude\tdecimalLongitude\n",
        );
        for i in 0..10 {
            let species = if i < 6 { "A" } else { "B" };
            tsv.push_str(&format!("{i}\tocc-{i}\tF\t{species}\tL\t201{}-01-01\t0.5\t0.5\n", i % 3));
        }

        let areas = fixture_areas();
        let dashboard = run(Some(tsv.as_bytes()), Some("A"), &areas, PipelineOptions::default())
            .unwrap()
            .unwrap();

        assert_eq!(dashboard.table.rows.len(), 6);
        assert_eq!(dashboard.years.iter().map(|y| y.count).sum::<usize>(), 6);
    }

    #[test]
    fn strict_dates_abort_and_skip_dates_report() {
        let tsv = "gbifID\toccurrenceID\tfamily\tspecies\tlocality\teventDate\tdecimalLatitude\tdecimalLongitude\n\
                   1\tocc-1\tF\tA\tL\t2019-01-01\t0.5\t0.5\n\
                   2\tocc-2\tF\tA\tL\tsometime\t0.5\t0.5\n";
        let areas = fixture_areas();

        let err = run(Some(tsv.as_bytes()), None, &areas, PipelineOptions::default()).unwrap_err();
        assert!(matches!(err, IngestError::BadDate { row: 2, .. }));

        let options = PipelineOptions {
            date_policy: DatePolicy::Skip,
            ..PipelineOptions::default()
        };
        let dashboard = run(Some(tsv.as_bytes()), None, &areas, options).unwrap().unwrap();
        assert_eq!(dashboard.skipped_dates, 1);
        assert_eq!(dashboard.total_records, 1);
    }
}
