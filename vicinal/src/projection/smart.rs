//! Choix automatique du moteur de reprojection : reprojection légère en
//! priorité, PROJ en secours si la feature `reproject` est activée.

use geo::Geometry;

use super::ReprojectorLite;
use crate::VicinalError;

/// Reprojection intelligente
pub enum SmartReprojector {
    /// Reprojection légère (pure Rust)
    Lite(ReprojectorLite),
    /// Reprojection via PROJ
    #[cfg(feature = "reproject")]
    Proj(super::proj_backend::ProjReprojector),
    /// Source == cible
    Identity,
}

impl SmartReprojector {
    /// Crée un nouveau reprojector
    pub fn new(source_epsg: u32, target_epsg: u32) -> Result<Self, VicinalError> {
        if source_epsg == target_epsg {
            return Ok(Self::Identity);
        }

        if ReprojectorLite::is_supported(source_epsg, target_epsg) {
            return Ok(Self::Lite(ReprojectorLite::new(source_epsg, target_epsg)?));
        }

        #[cfg(feature = "reproject")]
        {
            let proj = super::proj_backend::ProjReprojector::new(source_epsg, target_epsg)?;
            return Ok(Self::Proj(proj));
        }

        #[cfg(not(feature = "reproject"))]
        {
            let unsupported = if ReprojectorLite::is_supported(source_epsg, source_epsg) {
                target_epsg
            } else {
                source_epsg
            };
            return Err(VicinalError::UnsupportedCrs { epsg: unsupported });
        }
    }

    /// Transforme une géométrie
    pub fn transform_geometry(&self, geom: &Geometry) -> Result<Geometry, VicinalError> {
        match self {
            Self::Identity => Ok(geom.clone()),
            Self::Lite(lite) => lite.transform_geometry(geom),
            #[cfg(feature = "reproject")]
            Self::Proj(proj) => proj.transform_geometry(geom),
        }
    }

    /// Retourne une description du reprojector utilisé
    pub fn description(&self) -> &'static str {
        match self {
            Self::Identity => "identity (no reprojection)",
            Self::Lite(_) => "lite (pure Rust UTM)",
            #[cfg(feature = "reproject")]
            Self::Proj(_) => "proj (PROJ library)",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{LineString, Point};

    #[test]
    fn test_identity() {
        let r = SmartReprojector::new(31983, 31983).unwrap();
        assert!(matches!(r, SmartReprojector::Identity));

        let line = Geometry::LineString(LineString::from(vec![(0.0, 0.0), (10.0, 0.0)]));
        assert_eq!(r.transform_geometry(&line).unwrap(), line);
    }

    #[test]
    fn test_lite() {
        let r = SmartReprojector::new(4674, 31983).unwrap();
        assert!(matches!(r, SmartReprojector::Lite(_)));

        let p = Geometry::Point(Point::new(-45.0, -22.0));
        match r.transform_geometry(&p).unwrap() {
            Geometry::Point(p) => assert!((p.x() - 500000.0).abs() < 1e-6, "x={}", p.x()),
            other => panic!("Expected Point geometry, got {:?}", other),
        }
    }

    #[cfg(not(feature = "reproject"))]
    #[test]
    fn test_unsupported_without_proj() {
        assert!(matches!(
            SmartReprojector::new(5880, 31983),
            Err(VicinalError::UnsupportedCrs { epsg: 5880 })
        ));
    }
}
