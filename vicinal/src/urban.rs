//! Exclusion des segments contenus dans la mancha urbana
//!
//! Les polygones urbains sont indexés dans un R-tree ; leur réunion
//! (« dissolve ») est évaluée à la demande. Un segment est exclu seulement
//! s'il est entièrement contenu dans la réunion (prédicat « within ») : un
//! segment à cheval sur la limite est conservé en entier, sans découpe.

use std::sync::atomic::{AtomicUsize, Ordering};

use geo::line_intersection::{line_intersection, LineIntersection};
use geo::{BoundingRect, Coord, Intersects, Line, MultiLineString, Point, Polygon, Rect};
use rayon::prelude::*;
use rstar::{RTree, RTreeObject, AABB};
use tracing::{info, warn};

use crate::geometry::{covered_measure, Interval};
use crate::length::along;
use crate::types::{RoadSegment, Tally};

/// Tolérance sur la couverture d'un segment (fraction de sa longueur)
const COVER_EPS: f64 = 1e-9;

/// Paramètres du filtre urbain
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UrbanParams {
    /// Écarter d'abord les polygones hors de l'emprise du réseau candidat
    pub clip_to_network_bbox: bool,
    pub progress_every: usize,
}

impl Default for UrbanParams {
    fn default() -> Self {
        Self {
            clip_to_network_bbox: true,
            progress_every: 100_000,
        }
    }
}

struct FootprintPolygon {
    polygon: Polygon<f64>,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for FootprintPolygon {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Résultat du test de contenance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Containment {
    Contained,
    NotContained,
    /// Test impossible : le segment est conservé
    Failed,
}

/// Réunion des polygones urbains
pub struct UrbanFootprint {
    tree: RTree<FootprintPolygon>,
    /// Polygones écartés par le découpage à l'emprise du réseau
    pub clipped_out: usize,
}

impl UrbanFootprint {
    /// Indexe les polygones, éventuellement restreints à une emprise
    pub fn dissolve(polygons: impl IntoIterator<Item = Polygon<f64>>, clip: Option<Rect<f64>>) -> Self {
        let mut clipped_out = 0;
        let mut items = Vec::new();

        for polygon in polygons {
            let Some(rect) = polygon.bounding_rect() else {
                continue;
            };
            if clip.is_some_and(|c| !c.intersects(&rect)) {
                clipped_out += 1;
                continue;
            }
            items.push(FootprintPolygon {
                envelope: AABB::from_corners(
                    [rect.min().x, rect.min().y],
                    [rect.max().x, rect.max().y],
                ),
                polygon,
            });
        }

        info!(polygons = items.len(), clipped_out, "Urban footprint indexed");
        Self {
            tree: RTree::bulk_load(items),
            clipped_out,
        }
    }

    /// Nombre de polygones retenus
    pub fn polygons(&self) -> usize {
        self.tree.size()
    }

    /// Le segment est-il entièrement dans la réunion des polygones ?
    ///
    /// La limite des polygones compte comme intérieure.
    pub fn contains(&self, geometry: &MultiLineString<f64>) -> Containment {
        let lines: Vec<Line<f64>> = geometry.0.iter().flat_map(|ls| ls.lines()).collect();
        if lines.is_empty() {
            return Containment::Failed;
        }
        if lines.iter().any(|l| !finite(l.start) || !finite(l.end)) {
            return Containment::Failed;
        }

        for line in &lines {
            if !self.covers(line) {
                return Containment::NotContained;
            }
        }
        Containment::Contained
    }

    fn covers(&self, line: &Line<f64>) -> bool {
        let (p1, p2) = line.points();
        let query = AABB::from_corners([p1.x(), p1.y()], [p2.x(), p2.y()]);
        let nearby: Vec<&Polygon<f64>> = self
            .tree
            .locate_in_envelope_intersecting(&query)
            .map(|f| &f.polygon)
            .collect();

        if nearby.is_empty() {
            return false;
        }

        // Segment réduit à un point
        if line.start == line.end {
            return nearby.iter().any(|poly| poly.intersects(&p1));
        }

        let inside: Vec<Interval> = nearby
            .iter()
            .flat_map(|poly| inside_intervals(line, poly))
            .collect();

        covered_measure(inside) >= 1.0 - COVER_EPS
    }
}

/// Intervalles de `line` situés dans `polygon` (limite incluse)
fn inside_intervals(line: &Line<f64>, polygon: &Polygon<f64>) -> Vec<Interval> {
    let d = line.delta();
    let dd = d.x * d.x + d.y * d.y;
    let param = |c: Coord<f64>| ((c.x - line.start.x) * d.x + (c.y - line.start.y) * d.y) / dd;

    let mut breaks = vec![0.0, 1.0];
    let rings = std::iter::once(polygon.exterior()).chain(polygon.interiors());
    for edge in rings.flat_map(|ring| ring.lines()) {
        match line_intersection(*line, edge) {
            Some(LineIntersection::SinglePoint { intersection, .. }) => {
                breaks.push(param(intersection))
            }
            Some(LineIntersection::Collinear { intersection }) => {
                breaks.push(param(intersection.start));
                breaks.push(param(intersection.end));
            }
            None => {}
        }
    }

    breaks.retain(|t| (0.0..=1.0).contains(t));
    breaks.sort_by(f64::total_cmp);
    breaks.dedup();

    breaks
        .windows(2)
        .filter(|w| {
            let mid = Point::from(along(line, (w[0] + w[1]) / 2.0));
            polygon.intersects(&mid)
        })
        .map(|w| (w[0], w[1]))
        .collect()
}

fn finite(c: Coord<f64>) -> bool {
    c.x.is_finite() && c.y.is_finite()
}

/// Emprise d'un réseau (pour le découpage des polygones urbains)
pub fn network_extent(segments: &[RoadSegment]) -> Option<Rect<f64>> {
    segments
        .iter()
        .filter_map(|s| s.geometry.bounding_rect())
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

/// Résultat du filtre urbain
#[derive(Debug, Clone, Default)]
pub struct UrbanOutcome {
    pub retained: Vec<RoadSegment>,
    pub removed: Vec<RoadSegment>,
    pub input: Tally,
    pub retained_tally: Tally,
    pub removed_tally: Tally,
    /// Identifiants dont le test de contenance a échoué (conservés)
    pub failures: Vec<String>,
}

/// Retire les segments entièrement contenus dans la mancha urbana
pub fn exclude_urban(
    candidates: Vec<RoadSegment>,
    footprint: &UrbanFootprint,
    params: &UrbanParams,
) -> UrbanOutcome {
    let total = candidates.len();
    let processed = AtomicUsize::new(0);

    let results: Vec<Containment> = candidates
        .par_iter()
        .map(|segment| {
            let c = footprint.contains(&segment.geometry);
            let done = processed.fetch_add(1, Ordering::Relaxed) + 1;
            if params.progress_every > 0 && done % params.progress_every == 0 {
                info!(processed = done, total, "Urban containment progress");
            }
            c
        })
        .collect();

    let mut outcome = UrbanOutcome {
        input: Tally::of(&candidates),
        ..Default::default()
    };

    for (segment, containment) in candidates.into_iter().zip(results) {
        match containment {
            Containment::Contained => {
                outcome.removed_tally.add(segment.length_m);
                outcome.removed.push(segment);
            }
            Containment::NotContained => {
                outcome.retained_tally.add(segment.length_m);
                outcome.retained.push(segment);
            }
            Containment::Failed => {
                warn!(feature_id = %segment.id, "Containment test failed, segment kept");
                outcome.failures.push(segment.id.clone());
                outcome.retained_tally.add(segment.length_m);
                outcome.retained.push(segment);
            }
        }
    }

    info!(
        retained = outcome.retained_tally.count,
        removed = outcome.removed_tally.count,
        "Urban exclusion done"
    );

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Origin, RoadTags};
    use geo::{line_string, polygon};

    fn square(x0: f64, y0: f64, size: f64) -> Polygon<f64> {
        polygon![
            (x: x0, y: y0),
            (x: x0 + size, y: y0),
            (x: x0 + size, y: y0 + size),
            (x: x0, y: y0 + size),
            (x: x0, y: y0),
        ]
    }

    fn mls(coords: &[(f64, f64)]) -> MultiLineString<f64> {
        MultiLineString::new(vec![coords.to_vec().into()])
    }

    #[test]
    fn test_inside_single_polygon() {
        let urban = UrbanFootprint::dissolve(vec![square(0.0, 0.0, 100.0)], None);
        assert_eq!(
            urban.contains(&mls(&[(10.0, 10.0), (90.0, 90.0)])),
            Containment::Contained
        );
    }

    #[test]
    fn test_partially_inside_kept() {
        let urban = UrbanFootprint::dissolve(vec![square(0.0, 0.0, 100.0)], None);
        assert_eq!(
            urban.contains(&mls(&[(50.0, 50.0), (150.0, 50.0)])),
            Containment::NotContained
        );
    }

    #[test]
    fn test_contained_in_union_of_adjacent_polygons() {
        // Deux carrés adjacents : le segment traverse la limite commune
        let urban = UrbanFootprint::dissolve(
            vec![square(0.0, 0.0, 100.0), square(100.0, 0.0, 100.0)],
            None,
        );
        assert_eq!(
            urban.contains(&mls(&[(50.0, 50.0), (150.0, 50.0)])),
            Containment::Contained
        );
    }

    #[test]
    fn test_hole_excludes() {
        let with_hole = Polygon::new(
            line_string![(x: 0., y: 0.), (x: 100., y: 0.), (x: 100., y: 100.), (x: 0., y: 100.), (x: 0., y: 0.)],
            vec![line_string![(x: 40., y: 40.), (x: 60., y: 40.), (x: 60., y: 60.), (x: 40., y: 60.), (x: 40., y: 40.)]],
        );
        let urban = UrbanFootprint::dissolve(vec![with_hole], None);
        assert_eq!(
            urban.contains(&mls(&[(10.0, 50.0), (90.0, 50.0)])),
            Containment::NotContained
        );
        assert_eq!(
            urban.contains(&mls(&[(10.0, 10.0), (90.0, 10.0)])),
            Containment::Contained
        );
    }

    #[test]
    fn test_boundary_counts_as_inside() {
        let urban = UrbanFootprint::dissolve(vec![square(0.0, 0.0, 100.0)], None);
        assert_eq!(
            urban.contains(&mls(&[(0.0, 0.0), (100.0, 0.0)])),
            Containment::Contained
        );
    }

    #[test]
    fn test_clip_to_extent() {
        let extent = Rect::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 50.0, y: 50.0 });
        let urban = UrbanFootprint::dissolve(
            vec![square(0.0, 0.0, 100.0), square(1000.0, 1000.0, 10.0)],
            Some(extent),
        );
        assert_eq!(urban.polygons(), 1);
        assert_eq!(urban.clipped_out, 1);
    }

    #[test]
    fn test_exclude_urban_counts() {
        let urban = UrbanFootprint::dissolve(vec![square(0.0, 0.0, 100.0)], None);
        let seg = |id: &str, coords: &[(f64, f64)]| {
            let geometry = mls(coords);
            RoadSegment {
                id: id.to_string(),
                length_m: crate::length::planar_length(&geometry),
                geometry,
                tags: RoadTags::default(),
                origin: Origin::CrowdSourced,
            }
        };

        let outcome = exclude_urban(
            vec![
                seg("in", &[(10.0, 10.0), (20.0, 10.0)]),
                seg("cross", &[(90.0, 10.0), (120.0, 10.0)]),
                seg("out", &[(200.0, 10.0), (300.0, 10.0)]),
            ],
            &urban,
            &UrbanParams::default(),
        );

        assert_eq!(outcome.removed_tally.count, 1);
        assert_eq!(outcome.retained_tally.count, 2);
        assert!((outcome.removed_tally.length_m - 10.0).abs() < 1e-12);
        assert!(
            (outcome.retained_tally.length_m + outcome.removed_tally.length_m
                - outcome.input.length_m)
                .abs()
                < 1e-9
        );
    }
}
