//! Définitions des ellipsoïdes

/// Paramètres d'un ellipsoïde de révolution
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipsoid {
    /// Demi-grand axe (rayon équatorial) en mètres
    pub a: f64,
    /// Première excentricité au carré
    pub e2: f64,
    /// Deuxième excentricité au carré
    pub ep2: f64,
}

/// Ellipsoïde WGS84
pub struct WGS84;

impl WGS84 {
    /// Demi-grand axe (rayon équatorial) en mètres
    pub const A: f64 = 6378137.0;

    /// Aplatissement
    pub const F: f64 = 1.0 / 298.257223563;

    /// Première excentricité au carré
    pub const E2: f64 = 2.0 * Self::F - Self::F * Self::F;

    /// Deuxième excentricité au carré
    pub const EP2: f64 = Self::E2 / (1.0 - Self::E2);

    pub const ELLIPSOID: Ellipsoid = Ellipsoid {
        a: Self::A,
        e2: Self::E2,
        ep2: Self::EP2,
    };
}

/// Ellipsoïde GRS80 (utilisé par SIRGAS 2000)
/// Note: Quasi identique à WGS84, différence < 0.1mm
pub struct GRS80;

impl GRS80 {
    pub const A: f64 = 6378137.0;
    pub const F: f64 = 1.0 / 298.257222101;
    pub const E2: f64 = 2.0 * Self::F - Self::F * Self::F;
    pub const EP2: f64 = Self::E2 / (1.0 - Self::E2);

    pub const ELLIPSOID: Ellipsoid = Ellipsoid {
        a: Self::A,
        e2: Self::E2,
        ep2: Self::EP2,
    };
}
