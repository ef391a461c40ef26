//! Statistiques descriptives des segments et classification du revêtement

use std::collections::BTreeMap;

use crate::types::{Origin, RoadSegment};

/// Bornes des classes de longueur (km), intervalles `[min, max)`
pub const LENGTH_BANDS_KM: [(f64, f64); 5] = [
    (0.0, 2.0),
    (2.0, 5.0),
    (5.0, 10.0),
    (10.0, 20.0),
    (20.0, 40.0),
];

/// Revêtement
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SurfaceClass {
    Paved,
    Unpaved,
    Unknown,
}

impl SurfaceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Paved => "paved",
            Self::Unpaved => "unpaved",
            Self::Unknown => "unknown",
        }
    }

    /// Tag `surface` OSM
    pub fn from_osm(surface: Option<&str>) -> Self {
        let Some(surface) = surface else {
            return Self::Unknown;
        };
        match surface.trim().to_ascii_lowercase().as_str() {
            "paved" | "asphalt" | "concrete" | "concrete:plates" | "concrete:lanes"
            | "paving_stones" | "sett" | "cobblestone" | "unhewn_cobblestone" | "chipseal"
            | "metal" | "wood" => Self::Paved,
            "unpaved" | "gravel" | "fine_gravel" | "compacted" | "dirt" | "earth" | "ground"
            | "grass" | "sand" | "mud" | "pebblestone" | "rock" | "clay" | "woodchips" => {
                Self::Unpaved
            }
            _ => Self::Unknown,
        }
    }

    /// Type de pista du cadastre : mots-clés, pavé par défaut
    pub fn from_lane_type(lane_type: Option<&str>) -> Self {
        let lane = lane_type.unwrap_or_default().to_lowercase();
        if ["dupla", "simples", "paviment"].iter().any(|k| lane.contains(k)) {
            Self::Paved
        } else if ["natural", "leito", "implant"].iter().any(|k| lane.contains(k)) {
            Self::Unpaved
        } else {
            Self::Paved
        }
    }

    pub fn of(segment: &RoadSegment) -> Self {
        match segment.origin {
            Origin::CrowdSourced => Self::from_osm(segment.tags.surface.as_deref()),
            Origin::OfficialCadastre => Self::from_lane_type(segment.tags.lane_type.as_deref()),
        }
    }
}

/// Statistiques de longueur (km)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LengthStatistics {
    pub count: usize,
    pub total_km: f64,
    pub mean_km: f64,
    pub median_km: f64,
    /// Écart-type d'échantillon (n - 1), `None` sous deux segments
    pub std_km: Option<f64>,
    pub min_km: f64,
    pub max_km: f64,
    pub q25_km: f64,
    pub q75_km: f64,
    pub amplitude_km: f64,
}

/// Part d'une catégorie
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Share {
    pub count: usize,
    pub length_km: f64,
    pub count_pct: f64,
    pub length_pct: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BandShare {
    pub min_km: f64,
    pub max_km: f64,
    pub share: Share,
}

impl BandShare {
    pub fn label(&self) -> String {
        format!("{}-{} km", self.min_km, self.max_km)
    }
}

/// Statistiques complètes d'une couche
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmentStatistics {
    pub lengths: LengthStatistics,
    pub bands: Vec<BandShare>,
    /// Segments au-delà de la dernière classe
    pub beyond_bands: usize,
    pub by_class: BTreeMap<String, Share>,
    pub by_surface: BTreeMap<SurfaceClass, Share>,
}

/// Quantile par interpolation linéaire sur des valeurs triées
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

pub fn length_statistics(lengths_km: &[f64]) -> LengthStatistics {
    let mut sorted: Vec<f64> = lengths_km.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(f64::total_cmp);

    let count = sorted.len();
    if count == 0 {
        return LengthStatistics::default();
    }

    let total_km: f64 = sorted.iter().sum();
    let mean_km = total_km / count as f64;
    let std_km = (count > 1).then(|| {
        let ss: f64 = sorted.iter().map(|v| (v - mean_km).powi(2)).sum();
        (ss / (count - 1) as f64).sqrt()
    });
    let min_km = sorted[0];
    let max_km = sorted[count - 1];

    LengthStatistics {
        count,
        total_km,
        mean_km,
        median_km: quantile(&sorted, 0.5).unwrap_or_default(),
        std_km,
        min_km,
        max_km,
        q25_km: quantile(&sorted, 0.25).unwrap_or_default(),
        q75_km: quantile(&sorted, 0.75).unwrap_or_default(),
        amplitude_km: max_km - min_km,
    }
}

fn finish_share(share: &mut Share, count: usize, total_km: f64) {
    share.count_pct = if count > 0 {
        share.count as f64 * 100.0 / count as f64
    } else {
        0.0
    };
    share.length_pct = if total_km > 0.0 {
        share.length_km * 100.0 / total_km
    } else {
        0.0
    };
}

/// Statistiques d'un ensemble de segments
pub fn segment_statistics(segments: &[RoadSegment]) -> SegmentStatistics {
    let lengths: Vec<f64> = segments.iter().map(|s| s.length_km()).collect();
    let stats = length_statistics(&lengths);
    let (count, total) = (segments.len(), stats.total_km);

    let mut bands: Vec<BandShare> = LENGTH_BANDS_KM
        .iter()
        .map(|&(min_km, max_km)| BandShare {
            min_km,
            max_km,
            share: Share::default(),
        })
        .collect();
    let mut beyond_bands = 0;
    let mut by_class: BTreeMap<String, Share> = BTreeMap::new();
    let mut by_surface: BTreeMap<SurfaceClass, Share> = BTreeMap::new();

    for segment in segments {
        let km = segment.length_km();

        match bands
            .iter_mut()
            .find(|b| km >= b.min_km && km < b.max_km)
        {
            Some(band) => {
                band.share.count += 1;
                band.share.length_km += km;
            }
            None => beyond_bands += 1,
        }

        let class = segment
            .tags
            .highway
            .as_ref()
            .map(|h| h.as_str().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let entry = by_class.entry(class).or_default();
        entry.count += 1;
        entry.length_km += km;

        let entry = by_surface.entry(SurfaceClass::of(segment)).or_default();
        entry.count += 1;
        entry.length_km += km;
    }

    for band in &mut bands {
        finish_share(&mut band.share, count, total);
    }
    for share in by_class.values_mut().chain(by_surface.values_mut()) {
        finish_share(share, count, total);
    }

    SegmentStatistics {
        lengths: stats,
        bands,
        beyond_bands,
        by_class,
        by_surface,
    }
}
