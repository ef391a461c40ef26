//! Types de données pour le crate vicinal

use std::collections::BTreeMap;
use std::fmt;

use geo::{MultiLineString, MultiPolygon};

/// Identifiant opaque d'une unité administrative (code IBGE, code de région)
///
/// Toujours une chaîne : les fichiers sources mélangent entiers, flottants
/// (`3550308.0`) et chaînes, ce qui casse les jointures si on les compare bruts.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnitId(String);

impl UnitId {
    /// Normalise une représentation textuelle
    ///
    /// Supprime les espaces et une partie décimale nulle (`"3550308.0"` → `"3550308"`).
    /// Les zéros de tête sont conservés.
    pub fn normalize(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let Some((int, frac)) = trimmed.split_once('.') {
            let int_ok = !int.is_empty()
                && int
                    .strip_prefix('-')
                    .unwrap_or(int)
                    .chars()
                    .all(|c| c.is_ascii_digit());
            if int_ok && !frac.is_empty() && frac.chars().all(|c| c == '0') {
                return Self(int.to_string());
            }
        }
        Self(trimmed.to_string())
    }

    /// Normalise un identifiant numérique (JSON number)
    pub fn from_number(value: f64) -> Self {
        if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
            Self(format!("{}", value as i64))
        } else {
            Self(value.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UnitId {
    fn from(raw: &str) -> Self {
        Self::normalize(raw)
    }
}

/// Provenance d'un segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Extrait OpenStreetMap
    CrowdSourced,
    /// Cadastre officiel des rodovias (DER)
    OfficialCadastre,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CrowdSourced => "crowd_sourced",
            Self::OfficialCadastre => "official_cadastre",
        }
    }
}

/// Classe `highway` OSM
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HighwayClass {
    Motorway,
    MotorwayLink,
    Trunk,
    TrunkLink,
    Primary,
    PrimaryLink,
    Secondary,
    SecondaryLink,
    Tertiary,
    TertiaryLink,
    Unclassified,
    Residential,
    Service,
    LivingStreet,
    Track,
    Road,
    /// Valeur non reconnue, conservée telle quelle
    Other(String),
}

impl HighwayClass {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "motorway" => Self::Motorway,
            "motorway_link" => Self::MotorwayLink,
            "trunk" => Self::Trunk,
            "trunk_link" => Self::TrunkLink,
            "primary" => Self::Primary,
            "primary_link" => Self::PrimaryLink,
            "secondary" => Self::Secondary,
            "secondary_link" => Self::SecondaryLink,
            "tertiary" => Self::Tertiary,
            "tertiary_link" => Self::TertiaryLink,
            "unclassified" => Self::Unclassified,
            "residential" => Self::Residential,
            "service" => Self::Service,
            "living_street" => Self::LivingStreet,
            "track" => Self::Track,
            "road" => Self::Road,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Motorway => "motorway",
            Self::MotorwayLink => "motorway_link",
            Self::Trunk => "trunk",
            Self::TrunkLink => "trunk_link",
            Self::Primary => "primary",
            Self::PrimaryLink => "primary_link",
            Self::Secondary => "secondary",
            Self::SecondaryLink => "secondary_link",
            Self::Tertiary => "tertiary",
            Self::TertiaryLink => "tertiary_link",
            Self::Unclassified => "unclassified",
            Self::Residential => "residential",
            Self::Service => "service",
            Self::LivingStreet => "living_street",
            Self::Track => "track",
            Self::Road => "road",
            Self::Other(s) => s,
        }
    }
}

/// Juridiction d'une rodovia du cadastre officiel
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Jurisdiction {
    State,
    Federal,
    Municipal,
    Unknown(String),
}

impl Jurisdiction {
    /// Interprète le libellé du cadastre (`Estadual`, `Federal`, `Municipal`)
    /// ou le nom anglais utilisé dans la configuration
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "estadual" | "state" => Self::State,
            "federal" => Self::Federal,
            "municipal" => Self::Municipal,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::State => "State",
            Self::Federal => "Federal",
            Self::Municipal => "Municipal",
            Self::Unknown(s) => s,
        }
    }
}

/// Attributs typés d'un segment
///
/// Seuls les champs nommés participent à la classification ; `extra` conserve
/// les autres attributs pour l'export.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoadTags {
    pub name: Option<String>,
    pub highway: Option<HighwayClass>,
    pub reference: Option<String>,
    pub surface: Option<String>,
    /// Juridiction (cadastre officiel uniquement)
    pub jurisdiction: Option<Jurisdiction>,
    /// Type de pista (cadastre officiel uniquement)
    pub lane_type: Option<String>,
    pub extra: BTreeMap<String, String>,
}

/// Segment routier mesuré dans le système de travail
#[derive(Debug, Clone)]
pub struct RoadSegment {
    pub id: String,
    /// Géométrie dans le système de travail (mètres)
    pub geometry: MultiLineString<f64>,
    pub tags: RoadTags,
    pub origin: Origin,
    /// Longueur planaire en mètres, calculée une seule fois à l'ingestion
    pub length_m: f64,
}

impl RoadSegment {
    pub fn length_km(&self) -> f64 {
        self.length_m / 1000.0
    }
}

/// Município avec son polygone dans le système de travail
#[derive(Debug, Clone)]
pub struct Municipality {
    pub id: UnitId,
    pub name: String,
    pub region_id: UnitId,
    /// Surface déclarée par l'attribut source, si présente
    pub area_km2: Option<f64>,
    pub polygon: MultiPolygon<f64>,
}

/// Population d'un município pour une année de référence
#[derive(Debug, Clone, PartialEq)]
pub struct PopulationRecord {
    pub id: UnitId,
    pub population: f64,
    pub year: Option<u16>,
}

/// Somme de longueurs et de segments, unité des comptes d'audit
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Tally {
    pub count: usize,
    pub length_m: f64,
}

impl Tally {
    pub fn add(&mut self, length_m: f64) {
        self.count += 1;
        self.length_m += length_m;
    }

    pub fn merge(mut self, other: Tally) -> Tally {
        self.count += other.count;
        self.length_m += other.length_m;
        self
    }

    pub fn of(segments: &[RoadSegment]) -> Tally {
        segments.iter().fold(Tally::default(), |mut t, s| {
            t.add(s.length_m);
            t
        })
    }

    pub fn length_km(&self) -> f64 {
        self.length_m / 1000.0
    }
}
