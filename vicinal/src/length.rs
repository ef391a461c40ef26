//! Mesure des longueurs dans le système projeté de travail
//!
//! Toute longueur passe par ici : la géométrie est d'abord reprojetée vers le
//! système de travail (UTM, en mètres), puis mesurée dans le plan. Aucune
//! longueur n'est jamais calculée en degrés.

use geo::{Coord, EuclideanLength, Geometry, Line, LineString, MultiLineString, Point};

use crate::projection::{Crs, SmartReprojector};
use crate::VicinalError;

/// Géométrie linéaire reprojetée et sa longueur
#[derive(Debug, Clone)]
pub struct Measured {
    pub geometry: MultiLineString<f64>,
    pub length_m: f64,
    /// Parties de moins de deux coordonnées écartées
    pub dropped_parts: usize,
}

/// Moteur de mesure : reprojection source → travail puis longueur planaire
pub struct LengthEngine {
    reprojector: SmartReprojector,
    source_epsg: u32,
    working_epsg: u32,
}

impl LengthEngine {
    /// Crée un moteur pour une couche dans `source_epsg`
    ///
    /// Le système de travail doit être projeté : mesurer dans un système
    /// géographique est refusé.
    pub fn new(source_epsg: u32, working_epsg: u32) -> Result<Self, VicinalError> {
        match Crs::from_epsg(working_epsg) {
            Some(crs) if crs.is_geographic() => {
                return Err(VicinalError::inconsistent_units(
                    "working",
                    format!("EPSG:{} is geographic, lengths would be in degrees", working_epsg),
                ));
            }
            _ => {}
        }

        Ok(Self {
            reprojector: SmartReprojector::new(source_epsg, working_epsg)?,
            source_epsg,
            working_epsg,
        })
    }

    pub fn source_epsg(&self) -> u32 {
        self.source_epsg
    }

    pub fn working_epsg(&self) -> u32 {
        self.working_epsg
    }

    /// Description du moteur de reprojection utilisé
    pub fn backend(&self) -> &'static str {
        self.reprojector.description()
    }

    /// Reprojette et mesure une géométrie linéaire
    ///
    /// # Errors
    ///
    /// `InvalidGeometry` si la géométrie n'est pas linéaire, contient une
    /// coordonnée non finie, ou n'a aucune partie d'au moins deux coordonnées.
    /// `Projection`/`UnsupportedCrs` si la reprojection échoue.
    pub fn measure(&self, feature_id: &str, geometry: &Geometry) -> Result<Measured, VicinalError> {
        let parts: Vec<LineString<f64>> = match geometry {
            Geometry::LineString(ls) => vec![ls.clone()],
            Geometry::MultiLineString(mls) => mls.0.clone(),
            Geometry::Line(l) => vec![LineString::from(*l)],
            other => {
                return Err(VicinalError::invalid_geometry(
                    feature_id,
                    format!("expected a line geometry, got {}", geometry_type(other)),
                ))
            }
        };

        if parts
            .iter()
            .flat_map(|ls| ls.coords())
            .any(|c| !c.x.is_finite() || !c.y.is_finite())
        {
            return Err(VicinalError::invalid_geometry(
                feature_id,
                "non-finite coordinate",
            ));
        }

        let total_parts = parts.len();
        let kept: Vec<LineString<f64>> = parts.into_iter().filter(|ls| ls.0.len() >= 2).collect();
        let dropped_parts = total_parts - kept.len();

        if kept.is_empty() {
            return Err(VicinalError::invalid_geometry(
                feature_id,
                "empty geometry or fewer than two coordinates",
            ));
        }

        let projected = self
            .reprojector
            .transform_geometry(&Geometry::MultiLineString(MultiLineString::new(kept)))
            .map_err(|e| VicinalError::invalid_geometry(feature_id, e.to_string()))?;

        let geometry = match projected {
            Geometry::MultiLineString(mls) => mls,
            other => {
                return Err(VicinalError::invalid_geometry(
                    feature_id,
                    format!("reprojection returned {}", geometry_type(&other)),
                ))
            }
        };

        let length_m = planar_length(&geometry);
        Ok(Measured {
            geometry,
            length_m,
            dropped_parts,
        })
    }

    /// Reprojette une géométrie quelconque (polygones des municípios, zones urbaines)
    pub fn project(&self, geometry: &Geometry) -> Result<Geometry, VicinalError> {
        self.reprojector.transform_geometry(geometry)
    }
}

/// Longueur planaire (unités du système de la géométrie)
pub fn planar_length(mls: &MultiLineString<f64>) -> f64 {
    mls.0.iter().map(|ls| ls.euclidean_length()).sum()
}

/// Point situé à mi-longueur de la géométrie, en parcourant les parties dans l'ordre
///
/// Pour une géométrie de longueur nulle, renvoie la première coordonnée.
pub fn midpoint(mls: &MultiLineString<f64>) -> Option<Point<f64>> {
    let first = mls.0.iter().flat_map(|ls| ls.coords()).next().copied()?;
    let total = planar_length(mls);
    if total <= 0.0 {
        return Some(Point::from(first));
    }

    let mut remaining = total / 2.0;
    for line in mls.0.iter().flat_map(|ls| ls.lines()) {
        let len = line.euclidean_length();
        if len > 0.0 && remaining <= len {
            return Some(Point::from(along(&line, remaining / len)));
        }
        remaining -= len;
    }

    // Arrondi flottant : le milieu est la dernière coordonnée
    mls.0
        .iter()
        .flat_map(|ls| ls.coords())
        .last()
        .map(|c| Point::from(*c))
}

/// Coordonnée au paramètre `t` ∈ [0,1] d'un segment
pub(crate) fn along(line: &Line<f64>, t: f64) -> Coord<f64> {
    Coord {
        x: line.start.x + (line.end.x - line.start.x) * t,
        y: line.start.y + (line.end.y - line.start.y) * t,
    }
}

fn geometry_type(geometry: &Geometry) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}
