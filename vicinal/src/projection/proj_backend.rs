//! Reprojection via PROJ pour les systèmes hors reprojection légère
//!
//! Disponible uniquement avec la feature `reproject`.

use geo::{Coord, Geometry, LineString, MapCoords};
use proj::Proj;

use crate::VicinalError;

/// Reprojection entre deux EPSG quelconques connus de PROJ
pub struct ProjReprojector {
    proj: Proj,
    source_epsg: u32,
    target_epsg: u32,
}

impl ProjReprojector {
    pub fn new(source_epsg: u32, target_epsg: u32) -> Result<Self, VicinalError> {
        let source = format!("EPSG:{}", source_epsg);
        let target = format!("EPSG:{}", target_epsg);

        let proj = Proj::new_known_crs(&source, &target, None).map_err(|e| {
            VicinalError::Projection {
                reason: format!("cannot build {} → {}: {}", source, target, e),
            }
        })?;

        Ok(Self {
            proj,
            source_epsg,
            target_epsg,
        })
    }

    pub fn source_epsg(&self) -> u32 {
        self.source_epsg
    }

    pub fn target_epsg(&self) -> u32 {
        self.target_epsg
    }

    /// Transforme une LineString en une seule conversion batch
    fn transform_linestring(&self, ls: &LineString) -> Result<LineString, VicinalError> {
        let mut coords: Vec<(f64, f64)> = ls.0.iter().map(|c| (c.x, c.y)).collect();

        self.proj
            .convert_array(&mut coords)
            .map_err(|e| VicinalError::Projection {
                reason: format!("batch transformation failed: {}", e),
            })?;

        Ok(LineString::new(
            coords.into_iter().map(|(x, y)| Coord { x, y }).collect(),
        ))
    }

    /// Transforme une géométrie
    pub fn transform_geometry(&self, geom: &Geometry) -> Result<Geometry, VicinalError> {
        match geom {
            Geometry::LineString(ls) => Ok(Geometry::LineString(self.transform_linestring(ls)?)),
            Geometry::MultiLineString(mls) => {
                let lines: Result<Vec<LineString>, VicinalError> =
                    mls.0.iter().map(|ls| self.transform_linestring(ls)).collect();
                Ok(Geometry::MultiLineString(lines?.into()))
            }
            _ => geom.try_map_coords(|c| {
                let (x, y) = self
                    .proj
                    .convert((c.x, c.y))
                    .map_err(|e| VicinalError::Projection {
                        reason: format!("coordinate transformation failed: {}", e),
                    })?;
                Ok(Coord { x, y })
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Point;

    #[test]
    fn test_polyconic_roundtrip() {
        // EPSG:5880 (Polyconique SIRGAS) utilisé par certaines couches du DER
        let to_poly = ProjReprojector::new(4674, 5880).unwrap();
        let back = ProjReprojector::new(5880, 4674).unwrap();

        let p = Geometry::Point(Point::new(-47.0616, -22.9056));
        let there = to_poly.transform_geometry(&p).unwrap();
        match back.transform_geometry(&there).unwrap() {
            Geometry::Point(q) => {
                assert!((q.x() - (-47.0616)).abs() < 1e-6, "lon={}", q.x());
                assert!((q.y() - (-22.9056)).abs() < 1e-6, "lat={}", q.y());
            }
            other => panic!("Expected Point geometry, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_epsg() {
        assert!(ProjReprojector::new(99999, 4326).is_err());
    }
}
