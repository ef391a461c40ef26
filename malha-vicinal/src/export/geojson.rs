//! Export GeoJSON avec geozero (écriture en flux)
//!
//! Les géométries sont reprojetées du système de travail vers EPSG:4326.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use geo::Geometry;
use geozero::geojson::GeoJsonWriter;
use geozero::GeozeroGeometry;
use serde_json::{json, Map, Value};
use vicinal::connectivity::ConnectionPoint;
use vicinal::projection::{SmartReprojector, OUTPUT_EPSG};
use vicinal::stats::SurfaceClass;
use vicinal::RoadSegment;

use super::round_to;

/// Exporte des segments en GeoJSON
///
/// `connected` est aligné sur `segments` quand l'analyse de connectivité a tourné.
pub fn export_segments(
    segments: &[RoadSegment],
    connected: Option<&[bool]>,
    working_epsg: u32,
    output_path: &Path,
) -> Result<()> {
    let reprojector = SmartReprojector::new(working_epsg, OUTPUT_EPSG)?;
    let mut writer = open(output_path)?;

    for (i, segment) in segments.iter().enumerate() {
        if i > 0 {
            write!(writer, ",")?;
        }
        let geometry = reprojector.transform_geometry(&Geometry::MultiLineString(segment.geometry.clone()))?;
        let mut properties = segment_properties(segment);
        if let Some(flag) = connected.and_then(|c| c.get(i)) {
            properties.insert("connected".to_string(), Value::Bool(*flag));
        }
        write_feature(&mut writer, &segment.id, &geometry, &properties)?;
    }

    close(writer)
}

/// Exporte les points de connexion
pub fn export_connection_points(
    points: &[ConnectionPoint],
    working_epsg: u32,
    output_path: &Path,
) -> Result<()> {
    let reprojector = SmartReprojector::new(working_epsg, OUTPUT_EPSG)?;
    let mut writer = open(output_path)?;

    for (i, point) in points.iter().enumerate() {
        if i > 0 {
            write!(writer, ",")?;
        }
        let geometry = reprojector.transform_geometry(&Geometry::Point(point.point))?;
        let properties = match json!({
            "segment_id": point.segment_id,
            "highway": point.highway,
            "name": point.name,
            "merged": point.merged,
        }) {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        write_feature(&mut writer, &i.to_string(), &geometry, &properties)?;
    }

    close(writer)
}

fn open(output_path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(output_path)
        .with_context(|| format!("Failed to create file: {}", output_path.display()))?;
    let mut writer = BufWriter::new(file);

    // Membre crs hérité, lu par les SIG qui ignorent la RFC 7946
    write!(
        writer,
        r#"{{"type":"FeatureCollection","crs":{{"type":"name","properties":{{"name":"urn:ogc:def:crs:EPSG::{}"}}}},"features":["#,
        OUTPUT_EPSG
    )?;
    Ok(writer)
}

fn close(mut writer: BufWriter<File>) -> Result<()> {
    write!(writer, "]}}")?;
    writer.flush()?;
    Ok(())
}

/// Attributs exportés d'un segment
fn segment_properties(segment: &RoadSegment) -> Map<String, Value> {
    let tags = &segment.tags;
    let mut properties = Map::new();
    properties.insert("id".to_string(), Value::String(segment.id.clone()));
    properties.insert("name".to_string(), json!(tags.name));
    properties.insert(
        "highway".to_string(),
        json!(tags.highway.as_ref().map(|h| h.as_str())),
    );
    properties.insert("ref".to_string(), json!(tags.reference));
    properties.insert("surface".to_string(), json!(tags.surface));
    properties.insert(
        "surface_class".to_string(),
        json!(SurfaceClass::of(segment).as_str()),
    );
    properties.insert("origin".to_string(), json!(segment.origin.as_str()));
    properties.insert("length_m".to_string(), json!(round_to(segment.length_m, 2)));
    // Attributs non interprétés, sans écraser les clés ci-dessus
    for (key, value) in &tags.extra {
        properties
            .entry(key.clone())
            .or_insert_with(|| Value::String(value.clone()));
    }
    properties
}

/// Écrit une feature : géométrie via geozero, attributs via serde_json
fn write_feature<W: Write>(
    writer: &mut W,
    id: &str,
    geometry: &Geometry,
    properties: &Map<String, Value>,
) -> Result<()> {
    write!(writer, r#"{{"type":"Feature","id":{},"#, Value::String(id.to_string()))?;

    write!(writer, r#""geometry":"#)?;
    let mut geom_buf = Vec::new();
    let mut geom_writer = GeoJsonWriter::new(&mut geom_buf);
    geometry.process_geom(&mut geom_writer)?;
    writer.write_all(&geom_buf)?;

    write!(writer, r#","properties":"#)?;
    serde_json::to_writer(&mut *writer, properties)?;
    write!(writer, "}}")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{LineString, MultiLineString, Point};
    use std::io::Cursor;
    use vicinal::{HighwayClass, Origin, RoadTags};

    fn segment() -> RoadSegment {
        RoadSegment {
            id: "w42".to_string(),
            geometry: MultiLineString::new(vec![LineString::from(vec![
                (500_000.0, 7_567_000.0),
                (500_100.0, 7_567_000.0),
            ])]),
            tags: RoadTags {
                name: Some("Estrada \"Velha\"".to_string()),
                highway: Some(HighwayClass::Track),
                surface: Some("dirt".to_string()),
                ..Default::default()
            },
            origin: Origin::CrowdSourced,
            length_m: 100.004,
        }
    }

    #[test]
    fn test_write_feature() {
        let mut buffer = Cursor::new(Vec::new());
        write_feature(
            &mut buffer,
            "w42",
            &Geometry::Point(Point::new(-45.0, -22.0)),
            &segment_properties(&segment()),
        )
        .unwrap();

        let json = String::from_utf8(buffer.into_inner()).unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["id"], "w42");
        assert_eq!(value["properties"]["length_m"], 100.0);
        assert_eq!(value["properties"]["name"], "Estrada \"Velha\"");
        assert_eq!(value["properties"]["surface_class"], "unpaved");
        assert!(json.contains("Point"));
    }

    #[test]
    fn test_extra_tags_pass_through() {
        let mut segment = segment();
        segment.tags.extra.insert("tracktype".to_string(), "grade3".to_string());
        segment.tags.extra.insert("highway".to_string(), "overwritten".to_string());

        let properties = segment_properties(&segment);
        assert_eq!(properties["tracktype"], "grade3");
        assert_eq!(properties["highway"], "track");

        let temp_dir = std::env::temp_dir().join("malha_vicinal_export_extra_tags");
        std::fs::create_dir_all(&temp_dir).unwrap();
        let output_path = temp_dir.join("malha.geojson");
        export_segments(&[segment], None, 31983, &output_path).unwrap();

        let value: Value = serde_json::from_str(&std::fs::read_to_string(&output_path).unwrap()).unwrap();
        assert_eq!(value["features"][0]["properties"]["tracktype"], "grade3");

        std::fs::remove_dir_all(temp_dir).ok();
    }

    #[test]
    fn test_export_segments_in_degrees() {
        let temp_dir = std::env::temp_dir().join("malha_vicinal_export_segments");
        std::fs::create_dir_all(&temp_dir).unwrap();
        let output_path = temp_dir.join("malha.geojson");

        export_segments(&[segment()], Some(&[true]), 31983, &output_path).unwrap();

        let content = std::fs::read_to_string(&output_path).unwrap();
        let value: Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value["type"], "FeatureCollection");
        assert!(content.contains("EPSG::4326"));

        let feature = &value["features"][0];
        assert_eq!(feature["properties"]["connected"], true);
        let lon = feature["geometry"]["coordinates"][0][0][0].as_f64().unwrap();
        assert!((lon + 45.0).abs() < 1e-6, "lon={}", lon);

        std::fs::remove_dir_all(temp_dir).ok();
    }
}
