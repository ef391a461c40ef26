//! Connectivité de la malha vicinal au réseau officiel
//!
//! Un segment est connecté quand une extrémité de l'une de ses parties est à
//! moins de `tolerance_m` du réseau officiel. Les extrémités connectées
//! forment les points de connexion, regroupés à `cluster_m` près.

use std::collections::BTreeMap;

use geo::{EuclideanDistance, Line, MultiLineString, Point};
use rayon::prelude::*;
use rstar::{RTree, RTreeObject, AABB};
use tracing::info;

use crate::types::{RoadSegment, Tally};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConnectivityParams {
    /// Distance maximale extrémité → réseau officiel (mètres)
    pub tolerance_m: f64,
    /// Rayon de regroupement des points de connexion (mètres)
    pub cluster_m: f64,
}

impl Default for ConnectivityParams {
    fn default() -> Self {
        Self {
            tolerance_m: 50.0,
            cluster_m: 10.0,
        }
    }
}

struct NetworkPiece(Line<f64>);

impl RTreeObject for NetworkPiece {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        let (p1, p2) = self.0.points();
        AABB::from_corners([p1.x(), p1.y()], [p2.x(), p2.y()])
    }
}

/// Index du réseau officiel pour les requêtes de proximité
pub struct NetworkIndex {
    tree: RTree<NetworkPiece>,
}

impl NetworkIndex {
    pub fn build<'a>(network: impl IntoIterator<Item = &'a RoadSegment>) -> Self {
        let pieces: Vec<NetworkPiece> = network
            .into_iter()
            .flat_map(|s| s.geometry.0.iter())
            .flat_map(|ls| ls.lines())
            .map(NetworkPiece)
            .collect();
        Self {
            tree: RTree::bulk_load(pieces),
        }
    }

    /// Le point est-il à moins de `tolerance` du réseau ?
    pub fn is_near(&self, point: Point<f64>, tolerance: f64) -> bool {
        let query = AABB::from_corners(
            [point.x() - tolerance, point.y() - tolerance],
            [point.x() + tolerance, point.y() + tolerance],
        );
        self.tree
            .locate_in_envelope_intersecting(&query)
            .any(|piece| point.euclidean_distance(&piece.0) <= tolerance)
    }
}

/// Point de connexion retenu après regroupement
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionPoint {
    pub point: Point<f64>,
    /// Segment d'origine du premier point du groupe
    pub segment_id: String,
    pub highway: Option<String>,
    pub name: Option<String>,
    /// Nombre d'extrémités regroupées
    pub merged: usize,
}

/// Résultat de l'analyse de connectivité
#[derive(Debug, Clone, Default)]
pub struct ConnectivityReport {
    /// Statut par segment, dans l'ordre d'entrée
    pub connected: Vec<bool>,
    pub connected_tally: Tally,
    pub isolated_tally: Tally,
    /// Comptes par classe `highway` : (connectés, total)
    pub by_class: BTreeMap<String, (usize, usize)>,
    pub raw_points: usize,
    pub points: Vec<ConnectionPoint>,
}

fn endpoints(geometry: &MultiLineString<f64>) -> impl Iterator<Item = Point<f64>> + '_ {
    geometry.0.iter().flat_map(|ls| {
        let first = ls.0.first().copied();
        let last = ls.0.last().copied();
        first.into_iter().chain(last).map(Point::from)
    })
}

/// Analyse la connectivité de la malha vicinal
pub fn analyze(
    segments: &[RoadSegment],
    network: &NetworkIndex,
    params: &ConnectivityParams,
) -> ConnectivityReport {
    let near: Vec<Vec<Point<f64>>> = segments
        .par_iter()
        .map(|s| {
            endpoints(&s.geometry)
                .filter(|p| network.is_near(*p, params.tolerance_m))
                .collect()
        })
        .collect();

    let mut report = ConnectivityReport::default();
    let mut raw: Vec<(Point<f64>, usize)> = Vec::new();

    for (i, (segment, points)) in segments.iter().zip(&near).enumerate() {
        let connected = !points.is_empty();
        report.connected.push(connected);

        let class = segment
            .tags
            .highway
            .as_ref()
            .map(|h| h.as_str().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let entry = report.by_class.entry(class).or_default();
        entry.1 += 1;

        if connected {
            entry.0 += 1;
            report.connected_tally.add(segment.length_m);
            raw.extend(points.iter().map(|p| (*p, i)));
        } else {
            report.isolated_tally.add(segment.length_m);
        }
    }

    report.raw_points = raw.len();
    report.points = cluster(&raw, segments, params.cluster_m);

    info!(
        connected = report.connected_tally.count,
        isolated = report.isolated_tally.count,
        raw_points = report.raw_points,
        points = report.points.len(),
        "Connectivity analysis done"
    );

    report
}

struct IndexedPoint {
    pos: [f64; 2],
    index: usize,
}

impl RTreeObject for IndexedPoint {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.pos)
    }
}

/// Regroupement glouton : chaque point libre absorbe les points libres à moins de `radius`
fn cluster(raw: &[(Point<f64>, usize)], segments: &[RoadSegment], radius: f64) -> Vec<ConnectionPoint> {
    let tree = RTree::bulk_load(
        raw.iter()
            .enumerate()
            .map(|(index, (p, _))| IndexedPoint {
                pos: [p.x(), p.y()],
                index,
            })
            .collect(),
    );

    let mut assigned = vec![false; raw.len()];
    let mut out = Vec::new();
    for (i, (seed, seg)) in raw.iter().enumerate() {
        if assigned[i] {
            continue;
        }
        let query = AABB::from_corners(
            [seed.x() - radius, seed.y() - radius],
            [seed.x() + radius, seed.y() + radius],
        );
        let mut merged = 0;
        for item in tree.locate_in_envelope_intersecting(&query) {
            let j = item.index;
            if !assigned[j] && seed.euclidean_distance(&raw[j].0) <= radius {
                assigned[j] = true;
                merged += 1;
            }
        }

        let segment = &segments[*seg];
        out.push(ConnectionPoint {
            point: *seed,
            segment_id: segment.id.clone(),
            highway: segment.tags.highway.as_ref().map(|h| h.as_str().to_string()),
            name: segment.tags.name.clone(),
            merged,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{HighwayClass, Origin, RoadTags};
    use geo::LineString;

    fn road(id: &str, highway: &str, coords: &[(f64, f64)]) -> RoadSegment {
        let geometry = MultiLineString::new(vec![LineString::from(coords.to_vec())]);
        RoadSegment {
            id: id.to_string(),
            length_m: crate::length::planar_length(&geometry),
            geometry,
            tags: RoadTags {
                highway: Some(HighwayClass::parse(highway)),
                ..Default::default()
            },
            origin: Origin::CrowdSourced,
        }
    }

    #[test]
    fn test_connected_endpoint() {
        let official = vec![road("sp", "primary", &[(0.0, 0.0), (0.0, 10_000.0)])];
        let index = NetworkIndex::build(&official);

        let vicinal = vec![
            road("a", "unclassified", &[(40.0, 500.0), (2000.0, 500.0)]),
            road("b", "track", &[(60.0, 900.0), (2000.0, 900.0)]),
            // Les extrémités sont loin, seul le milieu croise le réseau : pas connecté
            road("c", "track", &[(-1000.0, 2000.0), (1000.0, 2000.0)]),
        ];

        let report = analyze(&vicinal, &index, &ConnectivityParams::default());
        assert_eq!(report.connected, vec![true, false, false]);
        assert_eq!(report.connected_tally.count, 1);
        assert_eq!(report.by_class.get("track"), Some(&(0, 2)));
        assert_eq!(report.by_class.get("unclassified"), Some(&(1, 1)));
    }

    #[test]
    fn test_connection_points_clustered() {
        let official = vec![road("sp", "primary", &[(0.0, 0.0), (0.0, 10_000.0)])];
        let index = NetworkIndex::build(&official);

        // Trois extrémités proches de (10, 1000), une autre éloignée de 500 m
        let vicinal = vec![
            road("a", "unclassified", &[(10.0, 1000.0), (900.0, 1000.0)]),
            road("b", "unclassified", &[(14.0, 1003.0), (900.0, 1300.0)]),
            road("c", "unclassified", &[(8.0, 995.0), (900.0, 700.0)]),
            road("d", "unclassified", &[(10.0, 1500.0), (900.0, 1500.0)]),
        ];

        let report = analyze(&vicinal, &index, &ConnectivityParams::default());
        assert_eq!(report.raw_points, 4);
        assert_eq!(report.points.len(), 2);
        assert_eq!(report.points[0].merged, 3);
        assert_eq!(report.points[0].segment_id, "a");
    }
}
