//! Classes de disparité par rapport à la moyenne estadual

use std::fmt;

use crate::VicinalError;

/// Classe ordinale d'écart à la moyenne
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DisparityClass {
    MuchBelow,
    Below,
    Average,
    Above,
    MuchAbove,
}

impl DisparityClass {
    pub const ALL: [DisparityClass; 5] = [
        Self::MuchBelow,
        Self::Below,
        Self::Average,
        Self::Above,
        Self::MuchAbove,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MuchBelow => "much_below",
            Self::Below => "below",
            Self::Average => "average",
            Self::Above => "above",
            Self::MuchAbove => "much_above",
        }
    }

    /// Libellé des rapports (`Muito Abaixo`…)
    pub fn label(&self) -> &'static str {
        match self {
            Self::MuchBelow => "Muito Abaixo",
            Self::Below => "Abaixo",
            Self::Average => "Média",
            Self::Above => "Acima",
            Self::MuchAbove => "Muito Acima",
        }
    }
}

impl fmt::Display for DisparityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Bornes de classe en pourcentage d'écart
///
/// `< -outer` MuchBelow, `[-outer, -inner)` Below, `[-inner, inner]` Average,
/// `(inner, outer]` Above, `> outer` MuchAbove.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CutPoints {
    pub inner: f64,
    pub outer: f64,
}

impl Default for CutPoints {
    fn default() -> Self {
        Self {
            inner: 20.0,
            outer: 50.0,
        }
    }
}

impl CutPoints {
    pub fn new(inner: f64, outer: f64) -> Result<Self, VicinalError> {
        if !(inner.is_finite() && outer.is_finite() && 0.0 < inner && inner < outer) {
            return Err(VicinalError::invalid_input(
                "disparity",
                format!("cut points must satisfy 0 < inner < outer, got {} / {}", inner, outer),
            ));
        }
        Ok(Self { inner, outer })
    }

    /// Classe un écart ; `None` seulement pour NaN
    pub fn classify(&self, deviation: f64) -> Option<DisparityClass> {
        if deviation.is_nan() {
            return None;
        }
        Some(if deviation < -self.outer {
            DisparityClass::MuchBelow
        } else if deviation < -self.inner {
            DisparityClass::Below
        } else if deviation <= self.inner {
            DisparityClass::Average
        } else if deviation <= self.outer {
            DisparityClass::Above
        } else {
            DisparityClass::MuchAbove
        })
    }
}

/// Écart en pourcentage `(value - mean) / mean × 100`
///
/// # Errors
///
/// `UndefinedDisparity` si la moyenne est nulle ou si une valeur n'est pas finie.
pub fn deviation(value: f64, mean: f64) -> Result<f64, VicinalError> {
    if !value.is_finite() || !mean.is_finite() {
        return Err(VicinalError::UndefinedDisparity {
            reason: format!("non-finite input (value {}, mean {})", value, mean),
        });
    }
    if mean == 0.0 {
        return Err(VicinalError::UndefinedDisparity {
            reason: "state mean is zero".to_string(),
        });
    }
    Ok((value - mean) / mean * 100.0)
}

/// Écart et classe, `None` quand non calculable
pub fn assess(
    value: Option<f64>,
    mean: Option<f64>,
    cuts: &CutPoints,
) -> (Option<f64>, Option<DisparityClass>) {
    let dev = match (value, mean) {
        (Some(v), Some(m)) => deviation(v, m).ok(),
        _ => None,
    };
    (dev, dev.and_then(|d| cuts.classify(d)))
}

/// Moyenne arithmétique des valeurs définies
pub fn mean_of(values: impl IntoIterator<Item = Option<f64>>) -> Option<f64> {
    let (sum, n) = values
        .into_iter()
        .flatten()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundaries() {
        let cuts = CutPoints::default();
        let cases = [
            (-50.0001, DisparityClass::MuchBelow),
            (-50.0, DisparityClass::Below),
            (-20.0001, DisparityClass::Below),
            (-20.0, DisparityClass::Average),
            (0.0, DisparityClass::Average),
            (20.0, DisparityClass::Average),
            (20.0001, DisparityClass::Above),
            (50.0, DisparityClass::Above),
            (50.0001, DisparityClass::MuchAbove),
            (f64::INFINITY, DisparityClass::MuchAbove),
            (f64::NEG_INFINITY, DisparityClass::MuchBelow),
        ];
        for (dev, expected) in cases {
            assert_eq!(cuts.classify(dev), Some(expected), "deviation={}", dev);
        }
        assert_eq!(cuts.classify(f64::NAN), None);
    }

    #[test]
    fn test_partition_is_total_and_ordered() {
        // Balayage de la droite réelle : une classe par valeur, classes croissantes
        let cuts = CutPoints::default();
        let mut previous = DisparityClass::MuchBelow;
        let mut seen = std::collections::BTreeSet::new();
        for i in -20_000..=20_000 {
            let dev = i as f64 * 0.01;
            let class = cuts.classify(dev).unwrap();
            assert!(class >= previous, "non monotonic at {}", dev);
            previous = class;
            seen.insert(class);
        }
        assert_eq!(seen.len(), DisparityClass::ALL.len());
    }

    #[test]
    fn test_alternate_cut_points() {
        let cuts = CutPoints::new(15.0, 50.0).unwrap();
        assert_eq!(cuts.classify(17.0), Some(DisparityClass::Above));
        assert_eq!(CutPoints::default().classify(17.0), Some(DisparityClass::Average));
        assert!(CutPoints::new(50.0, 20.0).is_err());
        assert!(CutPoints::new(0.0, 20.0).is_err());
    }

    #[test]
    fn test_deviation() {
        assert!((deviation(150.0, 100.0).unwrap() - 50.0).abs() < 1e-12);
        assert!(matches!(
            deviation(1.0, 0.0),
            Err(VicinalError::UndefinedDisparity { .. })
        ));
        assert!(deviation(f64::NAN, 10.0).is_err());
    }

    #[test]
    fn test_assess_undefined() {
        let cuts = CutPoints::default();
        assert_eq!(assess(None, Some(10.0), &cuts), (None, None));
        assert_eq!(assess(Some(5.0), Some(0.0), &cuts), (None, None));
        let (dev, class) = assess(Some(5.0), Some(10.0), &cuts);
        assert!((dev.unwrap() + 50.0).abs() < 1e-12);
        assert_eq!(class, Some(DisparityClass::Below));
    }

    #[test]
    fn test_mean_of() {
        assert_eq!(mean_of([Some(1.0), None, Some(3.0)]), Some(2.0));
        assert_eq!(mean_of([None, None]), None);
    }
}
