//! Primitives géométriques sur intervalles de paramètre
//!
//! Un segment droit `A + t·D`, `t ∈ [0,1]`, est découpé en intervalles de `t`.
//! Le tampon arrondi de rayon `r` autour d'un segment `BC` est un « stade »
//! convexe : son intersection avec une droite est un intervalle, que l'on
//! obtient exactement comme enveloppe des intersections avec le rectangle
//! central et les deux disques d'extrémité.

use geo::{Coord, Line};

/// Intervalle fermé de paramètre
pub type Interval = (f64, f64);

/// Fusionne des intervalles qui se chevauchent ou se touchent
pub fn merge_intervals(mut intervals: Vec<Interval>) -> Vec<Interval> {
    intervals.retain(|(a, b)| a <= b);
    intervals.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut merged: Vec<Interval> = Vec::with_capacity(intervals.len());
    for (lo, hi) in intervals {
        match merged.last_mut() {
            Some(last) if lo <= last.1 => last.1 = last.1.max(hi),
            _ => merged.push((lo, hi)),
        }
    }
    merged
}

/// Mesure de la réunion des intervalles (après fusion)
pub fn covered_measure(intervals: Vec<Interval>) -> f64 {
    merge_intervals(intervals)
        .iter()
        .map(|(lo, hi)| hi - lo)
        .sum()
}

/// Partie de `piece` à distance au plus `r` du segment `mask`
///
/// `piece` doit être de longueur non nulle. Renvoie `None` si la partie est vide.
pub fn within_distance(piece: &Line<f64>, mask: &Line<f64>, r: f64) -> Option<Interval> {
    let a = piece.start;
    let d = piece.delta();
    let dd = dot(d, d);
    if dd <= 0.0 {
        return None;
    }

    let mut hull: Option<Interval> = None;
    let mut extend = |iv: Option<Interval>| {
        if let Some((lo, hi)) = iv {
            hull = Some(match hull {
                Some((hlo, hhi)) => (hlo.min(lo), hhi.max(hi)),
                None => (lo, hi),
            });
        }
    };

    // Disques d'extrémité
    extend(disc(a, d, dd, mask.start, r));
    extend(disc(a, d, dd, mask.end, r));

    // Rectangle central (repère local du segment masque)
    let e = mask.delta();
    let len = dot(e, e).sqrt();
    if len > 0.0 {
        let w = a - mask.start;
        let u = slab(dot(w, e) / len, dot(d, e) / len, 0.0, len);
        let v = slab(cross(e, w) / len, cross(e, d) / len, -r, r);
        extend(intersect(u, v));
    }

    let (lo, hi) = hull?;
    let (lo, hi) = (lo.max(0.0), hi.min(1.0));
    (lo <= hi).then_some((lo, hi))
}

/// `|A + tD - Q|² ≤ r²`
fn disc(a: Coord<f64>, d: Coord<f64>, dd: f64, q: Coord<f64>, r: f64) -> Option<Interval> {
    let w = a - q;
    let b = dot(w, d);
    let c = dot(w, w) - r * r;
    let disc = b * b - dd * c;
    if disc < 0.0 {
        return None;
    }
    let s = disc.sqrt();
    Some(((-b - s) / dd, (-b + s) / dd))
}

/// `lo ≤ p + q·t ≤ hi`
fn slab(p: f64, q: f64, lo: f64, hi: f64) -> Option<Interval> {
    if q == 0.0 {
        return (lo <= p && p <= hi).then_some((f64::NEG_INFINITY, f64::INFINITY));
    }
    let t1 = (lo - p) / q;
    let t2 = (hi - p) / q;
    Some((t1.min(t2), t1.max(t2)))
}

fn intersect(a: Option<Interval>, b: Option<Interval>) -> Option<Interval> {
    let (alo, ahi) = a?;
    let (blo, bhi) = b?;
    let (lo, hi) = (alo.max(blo), ahi.min(bhi));
    (lo <= hi).then_some((lo, hi))
}

fn dot(a: Coord<f64>, b: Coord<f64>) -> f64 {
    a.x * b.x + a.y * b.y
}

fn cross(a: Coord<f64>, b: Coord<f64>) -> f64 {
    a.x * b.y - a.y * b.x
}
