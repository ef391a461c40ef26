//! Soustraction spatiale du cadastre officiel
//!
//! Le masque (rodovias estaduais et federais) est découpé en segments droits
//! indexés dans un R-tree. La réunion des tampons n'est jamais construite :
//! pour chaque segment droit d'un candidat, on réunit les intervalles situés à
//! moins de `buffer_m` des morceaux de masque voisins, ce qui donne exactement
//! l'intersection avec la réunion des tampons arrondis.

use std::sync::atomic::{AtomicUsize, Ordering};

use geo::{EuclideanLength, Line, MultiLineString};
use rayon::prelude::*;
use rstar::{RTree, RTreeObject, AABB};
use tracing::{debug, info, warn};

use crate::geometry::{covered_measure, within_distance};
use crate::types::{Jurisdiction, RoadSegment, Tally};

/// Paramètres d'une passe de soustraction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubtractionParams {
    /// Rayon du tampon autour du masque (mètres)
    pub buffer_m: f64,
    /// Fraction de recouvrement à partir de laquelle un candidat est retiré
    pub overlap_threshold: f64,
    /// Fréquence des logs de progression (segments)
    pub progress_every: usize,
}

impl Default for SubtractionParams {
    fn default() -> Self {
        Self {
            buffer_m: 15.0,
            overlap_threshold: 0.5,
            progress_every: 100_000,
        }
    }
}

impl SubtractionParams {
    /// Passe grossière (dédoublonnage large)
    pub fn coarse() -> Self {
        Self {
            buffer_m: 60.0,
            ..Self::default()
        }
    }
}

/// Morceau droit du masque
#[derive(Debug, Clone)]
struct MaskPiece {
    line: Line<f64>,
}

impl RTreeObject for MaskPiece {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        let (p1, p2) = self.line.points();
        AABB::from_corners([p1.x(), p1.y()], [p2.x(), p2.y()])
    }
}

/// Index spatial du réseau masque, partagé en lecture seule entre workers
pub struct MaskIndex {
    tree: RTree<MaskPiece>,
    segments: usize,
}

/// Résultat du calcul de recouvrement d'un candidat
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Overlap {
    /// Fraction dans [0,1]
    Fraction(f64),
    /// Segment de longueur nulle : fraction 0, conservé
    ZeroLength,
    /// Calcul impossible (coordonnées non finies) : fraction 0, conservé
    Failed,
}

impl Overlap {
    pub fn fraction(&self) -> f64 {
        match self {
            Self::Fraction(f) => *f,
            Self::ZeroLength | Self::Failed => 0.0,
        }
    }
}

/// Sélectionne les segments du cadastre qui servent de masque
pub fn select_mask<'a>(
    cadastre: &'a [RoadSegment],
    jurisdictions: &'a [Jurisdiction],
) -> impl Iterator<Item = &'a RoadSegment> + 'a {
    cadastre.iter().filter(move |s| {
        s.tags
            .jurisdiction
            .as_ref()
            .is_some_and(|j| jurisdictions.contains(j))
    })
}

impl MaskIndex {
    /// Construit l'index (bulk load) à partir des segments masque
    pub fn build<'a>(mask: impl IntoIterator<Item = &'a RoadSegment>) -> Self {
        let mut segments = 0;
        let mut pieces = Vec::new();
        for segment in mask {
            segments += 1;
            for ls in &segment.geometry.0 {
                pieces.extend(
                    ls.lines()
                        .filter(|l| {
                            l.start.x.is_finite()
                                && l.start.y.is_finite()
                                && l.end.x.is_finite()
                                && l.end.y.is_finite()
                        })
                        .map(|line| MaskPiece { line }),
                );
            }
        }

        debug!(segments, pieces = pieces.len(), "Mask index built");
        Self {
            tree: RTree::bulk_load(pieces),
            segments,
        }
    }

    /// Nombre de segments du masque
    pub fn segments(&self) -> usize {
        self.segments
    }

    /// Nombre de morceaux droits indexés
    pub fn pieces(&self) -> usize {
        self.tree.size()
    }

    /// Fraction de la longueur de `geometry` située dans la réunion des tampons
    pub fn overlap(&self, geometry: &MultiLineString<f64>, buffer_m: f64) -> Overlap {
        let mut total = 0.0;
        let mut covered = 0.0;

        for line in geometry.0.iter().flat_map(|ls| ls.lines()) {
            let len = line.euclidean_length();
            if !len.is_finite() {
                return Overlap::Failed;
            }
            if len == 0.0 {
                continue;
            }
            total += len;

            let (p1, p2) = line.points();
            let query = AABB::from_corners(
                [p1.x().min(p2.x()) - buffer_m, p1.y().min(p2.y()) - buffer_m],
                [p1.x().max(p2.x()) + buffer_m, p1.y().max(p2.y()) + buffer_m],
            );

            let intervals: Vec<_> = self
                .tree
                .locate_in_envelope_intersecting(&query)
                .filter_map(|piece| within_distance(&line, &piece.line, buffer_m))
                .collect();

            covered += covered_measure(intervals) * len;
        }

        if total == 0.0 {
            return Overlap::ZeroLength;
        }

        let fraction = covered / total;
        if !fraction.is_finite() {
            return Overlap::Failed;
        }
        Overlap::Fraction(fraction.clamp(0.0, 1.0))
    }
}

/// Résultat d'une passe de soustraction
#[derive(Debug, Clone, Default)]
pub struct SubtractionOutcome {
    pub retained: Vec<RoadSegment>,
    pub removed: Vec<RoadSegment>,
    pub input: Tally,
    pub retained_tally: Tally,
    pub removed_tally: Tally,
    /// Identifiants des segments de longueur nulle
    pub zero_length: Vec<String>,
    /// Identifiants dont le recouvrement n'a pas pu être calculé
    pub failures: Vec<String>,
}

/// Retire les candidats dont la fraction de recouvrement atteint le seuil
pub fn subtract(
    candidates: Vec<RoadSegment>,
    mask: &MaskIndex,
    params: &SubtractionParams,
) -> SubtractionOutcome {
    let total = candidates.len();
    let processed = AtomicUsize::new(0);

    info!(
        candidates = total,
        mask_segments = mask.segments(),
        buffer_m = params.buffer_m,
        threshold = params.overlap_threshold,
        "Spatial subtraction started"
    );

    let overlaps: Vec<Overlap> = candidates
        .par_iter()
        .map(|segment| {
            let overlap = mask.overlap(&segment.geometry, params.buffer_m);

            let done = processed.fetch_add(1, Ordering::Relaxed) + 1;
            if params.progress_every > 0 && done % params.progress_every == 0 {
                info!(
                    processed = done,
                    total,
                    percent = %format!("{:.1}", done as f64 * 100.0 / total as f64),
                    "Subtraction progress"
                );
            }
            overlap
        })
        .collect();

    let mut outcome = SubtractionOutcome {
        input: Tally::of(&candidates),
        ..Default::default()
    };

    for (segment, overlap) in candidates.into_iter().zip(overlaps) {
        match overlap {
            Overlap::ZeroLength => {
                warn!(feature_id = %segment.id, "Zero-length segment, overlap treated as 0");
                outcome.zero_length.push(segment.id.clone());
            }
            Overlap::Failed => {
                warn!(feature_id = %segment.id, "Overlap computation failed, overlap treated as 0");
                outcome.failures.push(segment.id.clone());
            }
            Overlap::Fraction(_) => {}
        }

        if overlap.fraction() < params.overlap_threshold {
            outcome.retained_tally.add(segment.length_m);
            outcome.retained.push(segment);
        } else {
            outcome.removed_tally.add(segment.length_m);
            outcome.removed.push(segment);
        }
    }

    info!(
        retained = outcome.retained_tally.count,
        removed = outcome.removed_tally.count,
        removed_km = %format!("{:.2}", outcome.removed_tally.length_km()),
        "Spatial subtraction done"
    );

    outcome
}
