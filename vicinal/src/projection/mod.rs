//! Reprojection légère en Rust pur (sans dépendances externes)
//!
//! Supporte les systèmes rencontrés dans les données de l'État de São Paulo :
//! - WGS84 (EPSG:4326) et SIRGAS 2000 géographique (EPSG:4674)
//! - SIRGAS 2000 / UTM 18S à 25S (EPSG:31978 à 31985)
//! - WGS84 / UTM Sud (EPSG:32701 à 32760)
//!
//! Les autres systèmes (ex. EPSG:5880, Polyconique SIRGAS du DER) passent par
//! PROJ lorsque la feature `reproject` est activée.

mod ellipsoid;
#[cfg(feature = "reproject")]
mod proj_backend;
mod smart;
mod utm;

pub use ellipsoid::{Ellipsoid, GRS80, WGS84};
pub use smart::SmartReprojector;

use geo::{Coord, Geometry, MapCoords, Rect};

use crate::VicinalError;

/// SIRGAS 2000 / UTM zone 23S, système de travail pour toutes les longueurs
pub const WORKING_EPSG: u32 = 31983;

/// WGS84, système des géométries exportées
pub const OUTPUT_EPSG: u32 = 4326;

/// Point en coordonnées géographiques (radians)
#[derive(Debug, Clone, Copy)]
pub struct Geographic {
    /// Longitude en radians
    pub lon: f64,
    /// Latitude en radians
    pub lat: f64,
}

impl Geographic {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    /// Convertit en degrés
    pub fn to_degrees(self) -> (f64, f64) {
        (self.lon.to_degrees(), self.lat.to_degrees())
    }

    /// Crée depuis des degrés
    pub fn from_degrees(lon_deg: f64, lat_deg: f64) -> Self {
        Self {
            lon: lon_deg.to_radians(),
            lat: lat_deg.to_radians(),
        }
    }
}

/// Système de coordonnées reconnu par la reprojection légère
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Crs {
    /// Longitude/latitude en degrés
    Geographic { epsg: u32 },
    /// Transverse Mercator universelle
    Utm {
        epsg: u32,
        zone: u32,
        south: bool,
        ellipsoid: Ellipsoid,
    },
}

impl Crs {
    /// Résout un code EPSG, `None` si la reprojection légère ne le couvre pas
    pub fn from_epsg(epsg: u32) -> Option<Self> {
        match epsg {
            4326 | 4674 => Some(Self::Geographic { epsg }),
            31978..=31985 => Some(Self::Utm {
                epsg,
                zone: epsg - 31960,
                south: true,
                ellipsoid: GRS80::ELLIPSOID,
            }),
            32701..=32760 => Some(Self::Utm {
                epsg,
                zone: epsg - 32700,
                south: true,
                ellipsoid: WGS84::ELLIPSOID,
            }),
            _ => None,
        }
    }

    pub fn epsg(&self) -> u32 {
        match self {
            Self::Geographic { epsg } | Self::Utm { epsg, .. } => *epsg,
        }
    }

    pub fn is_geographic(&self) -> bool {
        matches!(self, Self::Geographic { .. })
    }

    /// Vérifie que l'emprise d'une couche est cohérente avec ses unités déclarées
    ///
    /// Une couche déclarée en degrés qui sort de [-180,180]×[-90,90], ou une couche
    /// projetée dont toute l'emprise tient dans des degrés, produirait des longueurs
    /// fausses sans erreur visible : c'est fatal.
    pub fn check_extent(&self, layer: &str, extent: Rect) -> Result<(), VicinalError> {
        let fits_degrees = extent.min().x >= -180.0
            && extent.max().x <= 180.0
            && extent.min().y >= -90.0
            && extent.max().y <= 90.0;

        match self {
            Self::Geographic { epsg } if !fits_degrees => Err(VicinalError::inconsistent_units(
                layer,
                format!(
                    "declared EPSG:{} (degrees) but extent {:?} is not in degrees",
                    epsg, extent
                ),
            )),
            Self::Utm { epsg, .. } if fits_degrees => Err(VicinalError::inconsistent_units(
                layer,
                format!(
                    "declared EPSG:{} (metres) but extent {:?} looks like degrees",
                    epsg, extent
                ),
            )),
            Self::Utm { epsg, .. }
                if extent.min().y < 0.0 || extent.max().y > 10_000_000.0 =>
            {
                Err(VicinalError::inconsistent_units(
                    layer,
                    format!(
                        "declared EPSG:{} but northing range {}..{} is outside a southern UTM zone",
                        epsg,
                        extent.min().y,
                        extent.max().y
                    ),
                ))
            }
            _ => Ok(()),
        }
    }
}

/// Reprojection légère entre deux systèmes supportés
#[derive(Debug, Clone)]
pub struct ReprojectorLite {
    source: Crs,
    target: Crs,
}

impl ReprojectorLite {
    /// Crée un nouveau reprojector
    pub fn new(source_epsg: u32, target_epsg: u32) -> Result<Self, VicinalError> {
        let source = Crs::from_epsg(source_epsg)
            .ok_or(VicinalError::UnsupportedCrs { epsg: source_epsg })?;
        let target = Crs::from_epsg(target_epsg)
            .ok_or(VicinalError::UnsupportedCrs { epsg: target_epsg })?;

        Ok(Self { source, target })
    }

    /// Vérifie si la reprojection est supportée
    pub fn is_supported(source: u32, target: u32) -> bool {
        Crs::from_epsg(source).is_some() && Crs::from_epsg(target).is_some()
    }

    /// Transforme un point (x, y) de la source vers la cible
    pub fn transform_point(&self, x: f64, y: f64) -> Result<(f64, f64), VicinalError> {
        // Étape 1: Source → Géographique
        let geo = match self.source {
            Crs::Geographic { .. } => Geographic::from_degrees(x, y),
            Crs::Utm {
                zone,
                south,
                ellipsoid,
                ..
            } => utm::utm_to_geographic(x, y, zone, south, &ellipsoid),
        };

        // Étape 2: Géographique → Cible
        let (tx, ty) = match self.target {
            Crs::Geographic { .. } => geo.to_degrees(),
            Crs::Utm {
                zone,
                south,
                ellipsoid,
                ..
            } => utm::geographic_to_utm(geo, zone, south, &ellipsoid),
        };

        if !tx.is_finite() || !ty.is_finite() {
            return Err(VicinalError::Projection {
                reason: format!(
                    "({}, {}) EPSG:{} → EPSG:{} gave a non-finite result",
                    x,
                    y,
                    self.source.epsg(),
                    self.target.epsg()
                ),
            });
        }

        Ok((tx, ty))
    }

    /// Transforme une géométrie
    pub fn transform_geometry(&self, geom: &Geometry) -> Result<Geometry, VicinalError> {
        geom.try_map_coords(|c| {
            let (x, y) = self.transform_point(c.x, c.y)?;
            Ok(Coord { x, y })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::coord;

    #[test]
    fn test_wgs84_to_sirgas_utm23s() {
        let reproj = ReprojectorLite::new(4326, WORKING_EPSG).unwrap();
        let (x, y) = reproj.transform_point(-46.6333, -23.5505).unwrap();

        assert!((x - 333288.0).abs() < 1.0, "x={}", x);
        assert!((y - 7394588.3).abs() < 1.0, "y={}", y);
    }

    #[test]
    fn test_utm_to_wgs84() {
        let reproj = ReprojectorLite::new(WORKING_EPSG, OUTPUT_EPSG).unwrap();
        let (lon, lat) = reproj.transform_point(500000.0, 7567173.04).unwrap();

        assert!((lon - (-45.0)).abs() < 1e-6, "lon={}", lon);
        assert!((lat - (-22.0)).abs() < 1e-6, "lat={}", lat);
    }

    #[test]
    fn test_zone_22_to_zone_23() {
        // Même point exprimé en 22S puis reprojeté en 23S
        let to_22 = ReprojectorLite::new(4326, 31982).unwrap();
        let (x22, y22) = to_22.transform_point(-48.0, -21.0).unwrap();
        let to_23 = ReprojectorLite::new(31982, 31983).unwrap();
        let (x, y) = to_23.transform_point(x22, y22).unwrap();

        assert!((x - 188106.92).abs() < 0.5, "x={}", x);
        assert!((y - 7674924.31).abs() < 0.5, "y={}", y);
    }

    #[test]
    fn test_unsupported_epsg() {
        assert_eq!(
            ReprojectorLite::new(5880, 31983).unwrap_err(),
            VicinalError::UnsupportedCrs { epsg: 5880 }
        );
        assert!(!ReprojectorLite::is_supported(2154, 31983));
    }

    #[test]
    fn test_check_extent() {
        let geographic = Crs::from_epsg(4326).unwrap();
        let utm = Crs::from_epsg(31983).unwrap();

        let degrees = Rect::new(coord! { x: -53.1, y: -25.3 }, coord! { x: -44.2, y: -19.8 });
        let metres = Rect::new(
            coord! { x: 150000.0, y: 7200000.0 },
            coord! { x: 800000.0, y: 7800000.0 },
        );

        assert!(geographic.check_extent("network", degrees).is_ok());
        assert!(utm.check_extent("network", metres).is_ok());
        assert!(matches!(
            geographic.check_extent("network", metres),
            Err(VicinalError::InconsistentUnits { .. })
        ));
        assert!(matches!(
            utm.check_extent("network", degrees),
            Err(VicinalError::InconsistentUnits { .. })
        ));
    }
}
