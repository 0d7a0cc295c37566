use crate::error::IngestError;
use crate::types::{OccurrenceRecord, ProtectedArea};
use csv::{ReaderBuilder, StringRecord};
use geo::{MultiPolygon, Point};
use shapefile::dbase::FieldValue;
use shapefile::Reader;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{debug, info, warn};

pub const COL_LONGITUDE: &str = "decimalLongitude";
pub const COL_LATITUDE: &str = "decimalLatitude";
pub const COL_SPECIES: &str = "species";
pub const COL_EVENT_DATE: &str = "eventDate";
pub const COL_FAMILY: &str = "family";
pub const COL_LOCALITY: &str = "locality";
pub const COL_OCCURRENCE_ID: &str = "occurrenceID";
pub const COL_GBIF_ID: &str = "gbifID";

/// Column positions resolved once from the header row.
struct Columns {
    longitude: usize,
    latitude: usize,
    species: usize,
    event_date: usize,
    family: usize,
    locality: usize,
    occurrence_id: usize,
    gbif_id: usize,
}

impl Columns {
    fn resolve(headers: &StringRecord) -> Result<Self, IngestError> {
        let find = |column: &'static str| {
            headers
                .iter()
                .position(|h| h.trim_start_matches('\u{feff}').trim() == column)
                .ok_or(IngestError::MissingColumn { column })
        };

        Ok(Columns {
            longitude: find(COL_LONGITUDE)?,
            latitude: find(COL_LATITUDE)?,
            species: find(COL_SPECIES)?,
            event_date: find(COL_EVENT_DATE)?,
            family: find(COL_FAMILY)?,
            locality: find(COL_LOCALITY)?,
            occurrence_id: find(COL_OCCURRENCE_ID)?,
            gbif_id: find(COL_GBIF_ID)?,
        })
    }
}

/// Parses a delimited Darwin Core occurrence file.
///
/// All required columns must be present in the header. Short rows read as
/// empty cells. A non-empty coordinate that is not a number fails the whole
/// load; an empty pair leaves the record without a location.
pub fn load_occurrences<R: Read>(input: R, delimiter: u8) -> Result<Vec<OccurrenceRecord>, IngestError> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(input);

    let headers = rdr.headers().map_err(IngestError::tsv)?.clone();
    let cols = Columns::resolve(&headers)?;
    debug!(columns = headers.len(), "resolved occurrence header");

    let mut records = Vec::new();

    for (index, result) in rdr.records().enumerate() {
        let record = result.map_err(IngestError::tsv)?;
        let row = index + 1;
        // text cells are kept verbatim; species matching is exact
        let cell = |idx: usize| record.get(idx).unwrap_or("");

        let longitude = parse_coordinate(cell(cols.longitude).trim(), row, COL_LONGITUDE)?;
        let latitude = parse_coordinate(cell(cols.latitude).trim(), row, COL_LATITUDE)?;
        let location = match (longitude, latitude) {
            (Some(x), Some(y)) if x.is_finite() && y.is_finite() => Some(Point::new(x, y)),
            _ => None,
        };

        let species = cell(cols.species);

        records.push(OccurrenceRecord {
            row,
            gbif_id: cell(cols.gbif_id).to_string(),
            occurrence_id: cell(cols.occurrence_id).to_string(),
            species: (!species.is_empty()).then(|| species.to_string()),
            family: cell(cols.family).to_string(),
            locality: cell(cols.locality).to_string(),
            event_date_raw: cell(cols.event_date).trim().to_string(),
            location,
        });
    }

    info!("Loaded {} occurrence records", records.len());
    Ok(records)
}

fn parse_coordinate(raw: &str, row: usize, column: &'static str) -> Result<Option<f64>, IngestError> {
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<f64>()
        .map(Some)
        .map_err(|_| IngestError::BadCoordinate {
            row,
            column,
            raw: raw.to_string(),
        })
}

/// Loads the protected-area polygon layer. Features without an area code or
/// with non-polygon geometry are skipped.
pub fn load_areas(path: &Path, code_field: &str) -> Result<Vec<ProtectedArea>, IngestError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s: &str| s.to_lowercase())
        .unwrap_or_default();

    let areas = match extension.as_str() {
        "shp" => load_shapefile_areas(path, code_field)?,
        "json" | "geojson" => load_geojson_areas(path, code_field)?,
        _ => return Err(IngestError::UnsupportedAreaFormat { extension }),
    };

    info!("Loaded {} protected areas from {:?}", areas.len(), path);
    Ok(areas)
}

fn load_shapefile_areas(path: &Path, code_field: &str) -> Result<Vec<ProtectedArea>, IngestError> {
    let mut reader = Reader::from_path(path)
        .map_err(|e| IngestError::area_format(path, e.to_string()))?;

    let mut areas = Vec::new();

    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result.map_err(|e| IngestError::area_format(path, e.to_string()))?;

        let code = match record.get(code_field) {
            Some(FieldValue::Character(Some(s))) if !s.trim().is_empty() => s.trim().to_string(),
            Some(FieldValue::Numeric(Some(n))) => format_numeric_code(*n),
            Some(FieldValue::Float(Some(f))) => format_numeric_code(f64::from(*f)),
            Some(FieldValue::Double(d)) | Some(FieldValue::Currency(d)) => format_numeric_code(*d),
            Some(FieldValue::Integer(i)) => i.to_string(),
            Some(FieldValue::Character(_)) | Some(FieldValue::Numeric(None)) | Some(FieldValue::Float(None)) => {
                warn!("Skipping shape with empty '{}'", code_field);
                continue;
            }
            Some(other) => {
                return Err(IngestError::area_format(
                    path,
                    format!("area code field '{}' has unsupported type: {:?}", code_field, other),
                ))
            }
            None => {
                return Err(IngestError::area_format(
                    path,
                    format!("area code field '{}' not found", code_field),
                ))
            }
        };

        let geometry: MultiPolygon<f64> = match shape {
            shapefile::Shape::Polygon(polygon) => polygon
                .try_into()
                .map_err(|e| IngestError::area_format(path, format!("{:?}", e)))?,
            shapefile::Shape::PolygonM(polygon) => polygon
                .try_into()
                .map_err(|e| IngestError::area_format(path, format!("{:?}", e)))?,
            shapefile::Shape::PolygonZ(polygon) => polygon
                .try_into()
                .map_err(|e| IngestError::area_format(path, format!("{:?}", e)))?,
            _ => {
                debug!("Skipping non-polygon shape for area {}", code);
                continue;
            }
        };

        areas.push(ProtectedArea { code, geometry });
    }

    Ok(areas)
}

fn load_geojson_areas(path: &Path, code_field: &str) -> Result<Vec<ProtectedArea>, IngestError> {
    use geojson::GeoJson;

    let file = File::open(path).map_err(|source| IngestError::AreaFile {
        path: path.to_path_buf(),
        source,
    })?;
    let geojson = GeoJson::from_reader(BufReader::new(file))
        .map_err(|e| IngestError::area_format(path, e.to_string()))?;

    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => return Err(IngestError::area_format(path, "GeoJSON must be a FeatureCollection")),
    };

    let mut areas = Vec::new();

    for feature in collection.features {
        let code = match feature.property(code_field) {
            Some(serde_json::Value::String(s)) => s.trim().to_string(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => {
                warn!("Skipping feature without '{}'", code_field);
                continue;
            }
        };

        let geometry = match feature.geometry {
            Some(geom) => {
                let geo_geom: geo::Geometry<f64> = geom
                    .value
                    .try_into()
                    .map_err(|e| IngestError::area_format(path, format!("{:?}", e)))?;

                match geo_geom {
                    geo::Geometry::MultiPolygon(mp) => mp,
                    geo::Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
                    _ => {
                        debug!("Skipping non-polygon geometry for area {}", code);
                        continue;
                    }
                }
            }
            None => continue,
        };

        areas.push(ProtectedArea { code, geometry });
    }

    Ok(areas)
}

// dBase numerics come back as f64 even for integer codes
fn format_numeric_code(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}
