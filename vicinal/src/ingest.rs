//! Construction des segments et polygones dans le système de travail
//!
//! Les erreurs par entité (géométrie invalide) sont comptées et l'entité est
//! écartée ; les erreurs de couche (unités incohérentes, CRS non supporté)
//! interrompent le run.

use geo::{BoundingRect, Coord, Geometry, MultiPolygon, Rect};
use tracing::{debug, info, warn};

use crate::length::LengthEngine;
use crate::pipeline::StageSummary;
use crate::projection::Crs;
use crate::types::{Origin, RoadSegment, RoadTags, Tally};
use crate::VicinalError;

/// Entité linéaire telle que lue dans le fichier source
#[derive(Debug, Clone)]
pub struct RawFeature {
    pub id: String,
    /// `None` pour une géométrie nulle
    pub geometry: Option<Geometry>,
    pub tags: RoadTags,
}

/// Résultat de l'ingestion d'une couche linéaire
#[derive(Debug, Clone, Default)]
pub struct Ingested {
    pub input: usize,
    pub segments: Vec<RoadSegment>,
    /// Entités écartées (toujours `InvalidGeometry`)
    pub invalid: Vec<VicinalError>,
    /// Parties de moins de deux coordonnées retirées d'entités conservées
    pub dropped_parts: usize,
}

impl Ingested {
    /// Bilan de l'étape d'ingestion
    ///
    /// Une entité écartée n'a pas de longueur mesurable : l'entrée porte la
    /// longueur des segments produits.
    pub fn stage(&self, layer: &str) -> StageSummary {
        let output = Tally::of(&self.segments);
        StageSummary {
            name: format!("ingestion {}", layer),
            input: Tally {
                count: self.input,
                length_m: output.length_m,
            },
            output,
            removed: Tally {
                count: self.invalid.len(),
                length_m: 0.0,
            },
            warnings: self.dropped_parts,
        }
    }
}

/// Emprise de toutes les géométries
pub fn extent<'a>(geometries: impl IntoIterator<Item = &'a Geometry>) -> Option<Rect<f64>> {
    geometries
        .into_iter()
        .filter_map(|g| g.bounding_rect())
        .filter(|r| {
            r.min().x.is_finite() && r.min().y.is_finite() && r.max().x.is_finite() && r.max().y.is_finite()
        })
        .reduce(|a, b| {
            Rect::new(
                Coord {
                    x: a.min().x.min(b.min().x),
                    y: a.min().y.min(b.min().y),
                },
                Coord {
                    x: a.max().x.max(b.max().x),
                    y: a.max().y.max(b.max().y),
                },
            )
        })
}

/// Vérifie que l'emprise d'une couche correspond aux unités de son EPSG
///
/// Sans effet pour les EPSG traités par PROJ.
pub fn check_units<'a>(
    layer: &str,
    epsg: u32,
    geometries: impl IntoIterator<Item = &'a Geometry>,
) -> Result<(), VicinalError> {
    let (Some(crs), Some(rect)) = (Crs::from_epsg(epsg), extent(geometries)) else {
        return Ok(());
    };
    debug!(layer, epsg, ?rect, "Layer extent");
    crs.check_extent(layer, rect)
}

/// Mesure toutes les entités d'une couche linéaire
pub fn ingest_roads(
    layer: &str,
    features: Vec<RawFeature>,
    origin: Origin,
    engine: &LengthEngine,
) -> Result<Ingested, VicinalError> {
    check_units(
        layer,
        engine.source_epsg(),
        features.iter().filter_map(|f| f.geometry.as_ref()),
    )?;

    let mut out = Ingested {
        input: features.len(),
        segments: Vec::with_capacity(features.len()),
        ..Default::default()
    };

    for feature in features {
        let measured = match &feature.geometry {
            Some(geometry) => engine.measure(&feature.id, geometry),
            None => Err(VicinalError::invalid_geometry(&feature.id, "null geometry")),
        };

        match measured {
            Ok(m) => {
                out.dropped_parts += m.dropped_parts;
                out.segments.push(RoadSegment {
                    id: feature.id,
                    geometry: m.geometry,
                    tags: feature.tags,
                    origin,
                    length_m: m.length_m,
                });
            }
            Err(e) if !e.is_fatal() => {
                warn!(layer, feature_id = %feature.id, "{}", e);
                out.invalid.push(e);
            }
            Err(e) => return Err(e),
        }
    }

    info!(
        layer,
        input = out.input,
        segments = out.segments.len(),
        invalid = out.invalid.len(),
        backend = engine.backend(),
        "Layer ingested"
    );

    Ok(out)
}

/// Reprojette une géométrie surfacique en `MultiPolygon`
pub fn project_polygonal(
    feature_id: &str,
    geometry: &Geometry,
    engine: &LengthEngine,
) -> Result<MultiPolygon<f64>, VicinalError> {
    let multi = match geometry {
        Geometry::Polygon(p) => MultiPolygon::new(vec![p.clone()]),
        Geometry::MultiPolygon(mp) => mp.clone(),
        Geometry::Rect(r) => MultiPolygon::new(vec![r.to_polygon()]),
        _ => {
            return Err(VicinalError::invalid_geometry(
                feature_id,
                "expected a polygon geometry",
            ))
        }
    };

    match engine.project(&Geometry::MultiPolygon(multi))? {
        Geometry::MultiPolygon(mp) => Ok(mp),
        _ => Err(VicinalError::invalid_geometry(
            feature_id,
            "reprojection changed the geometry type",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{line_string, point, polygon};

    fn feature(id: &str, geometry: Option<Geometry>) -> RawFeature {
        RawFeature {
            id: id.to_string(),
            geometry,
            tags: RoadTags::default(),
        }
    }

    #[test]
    fn test_invalid_features_counted() {
        let engine = LengthEngine::new(31983, 31983).unwrap();
        let features = vec![
            feature(
                "ok",
                Some(Geometry::LineString(line_string![(x: 300000.0, y: 7400000.0), (x: 300100.0, y: 7400000.0)])),
            ),
            feature("null", None),
            feature("point", Some(Geometry::Point(point!(x: 300000.0, y: 7400000.0)))),
            feature("short", Some(Geometry::LineString(line_string![(x: 300000.0, y: 7400000.0)]))),
        ];

        let out = ingest_roads("network", features, Origin::CrowdSourced, &engine).unwrap();
        assert_eq!(out.input, 4);
        assert_eq!(out.segments.len(), 1);
        assert_eq!(out.invalid.len(), 3);
        assert!((out.segments[0].length_m - 100.0).abs() < 1e-9);
        assert_eq!(out.segments[0].origin, Origin::CrowdSourced);

        let stage = out.stage("network");
        assert_eq!(stage.name, "ingestion network");
        assert_eq!(stage.input.count, 4);
        assert_eq!(stage.output.count, 1);
        assert_eq!(stage.removed.count, 3);
        assert!(stage.is_conserved(1e-9));
    }

    #[test]
    fn test_degrees_declared_as_utm_is_fatal() {
        let engine = LengthEngine::new(31983, 31983).unwrap();
        let features = vec![feature(
            "deg",
            Some(Geometry::LineString(line_string![(x: -46.6, y: -23.5), (x: -46.5, y: -23.4)])),
        )];

        assert!(matches!(
            ingest_roads("network", features, Origin::CrowdSourced, &engine),
            Err(VicinalError::InconsistentUnits { .. })
        ));
    }

    #[test]
    fn test_project_polygonal() {
        let engine = LengthEngine::new(4326, 31983).unwrap();
        let square = Geometry::Polygon(polygon![
            (x: -45.01, y: -22.0),
            (x: -45.0, y: -22.0),
            (x: -45.0, y: -22.01),
            (x: -45.01, y: -22.01),
            (x: -45.01, y: -22.0),
        ]);
        let mp = project_polygonal("m", &square, &engine).unwrap();
        let first = mp.0[0].exterior().0[1];
        assert!((first.x - 500000.0).abs() < 1e-6, "x={}", first.x);

        let line = Geometry::LineString(line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 1.0)]);
        assert!(project_polygonal("l", &line, &engine).is_err());
    }
}
