//! Couches GeoJSON : lecture, CRS déclaré, conversion en types du pipeline

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use geo::{Geometry, Polygon};
use geojson::{Feature, GeoJson, JsonObject, JsonValue};
use regex::Regex;
use tracing::{debug, info, warn};
use vicinal::ingest::{check_units, project_polygonal, RawFeature};
use vicinal::{
    HighwayClass, Jurisdiction, LengthEngine, Municipality, RoadTags, UnitId, VicinalError,
};

use super::decode::{read_text, InputFile};
use crate::config::{CadastreFields, MunicipalityFields, NetworkFields};

static EPSG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"EPSG:{1,2}(\d+)").expect("valid regex"));

/// Couche GeoJSON chargée en mémoire
#[derive(Debug)]
pub struct Layer {
    pub name: String,
    /// EPSG déclaré par le membre `crs`, s'il existe
    pub declared_epsg: Option<u32>,
    pub features: Vec<Feature>,
    pub file: InputFile,
}

impl Layer {
    /// EPSG effectif : surcharge, puis CRS déclaré, puis 4326 (RFC 7946)
    pub fn epsg(&self, override_epsg: Option<u32>) -> u32 {
        override_epsg
            .or(self.declared_epsg)
            .unwrap_or(vicinal::projection::OUTPUT_EPSG)
    }
}

/// Lit une FeatureCollection GeoJSON
pub fn read_layer(name: &str, path: &Path) -> Result<Layer> {
    let decoded = read_text(name, path)?;
    let geojson: GeoJson = decoded
        .text
        .parse()
        .with_context(|| format!("Failed to parse GeoJSON: {}", path.display()))?;

    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        GeoJson::Feature(f) => geojson::FeatureCollection {
            bbox: None,
            features: vec![f],
            foreign_members: None,
        },
        GeoJson::Geometry(_) => {
            anyhow::bail!("Expected a FeatureCollection in {}", path.display())
        }
    };

    let declared_epsg = collection.foreign_members.as_ref().and_then(declared_crs);
    info!(
        layer = name,
        path = %path.display(),
        features = collection.features.len(),
        declared_epsg = ?declared_epsg,
        "Layer read"
    );

    Ok(Layer {
        name: name.to_string(),
        declared_epsg,
        features: collection.features,
        file: decoded.file,
    })
}

/// EPSG du membre `crs` (`urn:ogc:def:crs:EPSG::31983`, `EPSG:4674`, `CRS84`)
fn declared_crs(members: &JsonObject) -> Option<u32> {
    let name = members
        .get("crs")?
        .get("properties")?
        .get("name")?
        .as_str()?;
    if name.ends_with("CRS84") {
        return Some(4326);
    }
    EPSG_RE.captures(name)?.get(1)?.as_str().parse().ok()
}

/// Valeur d'attribut en texte (`None` pour null ou chaîne vide)
fn text(properties: Option<&JsonObject>, key: &str) -> Option<String> {
    match properties?.get(key)? {
        JsonValue::Null => None,
        JsonValue::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

/// Valeur d'attribut numérique (les nombres saisis en texte sont acceptés)
fn number(properties: Option<&JsonObject>, key: &str) -> Option<f64> {
    match properties?.get(key)? {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().replace(',', ".").parse().ok(),
        _ => None,
    }
}

/// Identifiant d'entité : attribut configuré, puis `id` GeoJSON, puis rang
fn feature_id(feature: &Feature, key: &str, index: usize) -> String {
    if let Some(id) = text(feature.properties.as_ref(), key) {
        return id;
    }
    match &feature.id {
        Some(geojson::feature::Id::String(s)) => s.clone(),
        Some(geojson::feature::Id::Number(n)) => n.to_string(),
        None => format!("#{}", index),
    }
}

/// Géométrie `geo`, `None` si absente ; erreur par entité si inconvertible
fn geometry(feature: &Feature, id: &str) -> Result<Option<Geometry>, VicinalError> {
    let Some(g) = feature.geometry.clone() else {
        return Ok(None);
    };
    Geometry::<f64>::try_from(g)
        .map(Some)
        .map_err(|e| VicinalError::invalid_geometry(id, e.to_string()))
}

/// Attributs non mappés, conservés pour l'export
fn extra(properties: Option<&JsonObject>, mapped: &[&str]) -> BTreeMap<String, String> {
    properties
        .map(|p| {
            p.iter()
                .filter(|(k, v)| !mapped.contains(&k.as_str()) && !v.is_null())
                .map(|(k, v)| {
                    let value = match v {
                        JsonValue::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (k.clone(), value)
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Entités converties, plus les entités écartées à la conversion
#[derive(Debug)]
pub struct Converted<T> {
    pub items: Vec<T>,
    pub invalid: Vec<VicinalError>,
}

impl<T> Default for Converted<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            invalid: Vec::new(),
        }
    }
}

/// Réseau collaboratif → entités brutes
pub fn network_features(layer: Layer, fields: &NetworkFields) -> Converted<RawFeature> {
    let mapped = [
        fields.id.as_str(),
        fields.name.as_str(),
        fields.highway.as_str(),
        fields.reference.as_str(),
        fields.surface.as_str(),
    ];
    let mut out = Converted::default();

    for (i, feature) in layer.features.into_iter().enumerate() {
        let id = feature_id(&feature, &fields.id, i);
        let props = feature.properties.as_ref();
        let tags = RoadTags {
            name: text(props, &fields.name),
            highway: text(props, &fields.highway).map(|h| HighwayClass::parse(&h)),
            reference: text(props, &fields.reference),
            surface: text(props, &fields.surface),
            jurisdiction: None,
            lane_type: None,
            extra: extra(props, &mapped),
        };
        push_raw(&mut out, &layer.name, &feature, id, tags);
    }
    out
}

/// Cadastre officiel → entités brutes
pub fn cadastre_features(layer: Layer, fields: &CadastreFields) -> Converted<RawFeature> {
    let mut mapped = vec![
        fields.id.as_str(),
        fields.reference.as_str(),
        fields.jurisdiction.as_str(),
        fields.lane_type.as_str(),
    ];
    if let Some(name) = &fields.name {
        mapped.push(name.as_str());
    }
    let mut out = Converted::default();

    for (i, feature) in layer.features.into_iter().enumerate() {
        let id = feature_id(&feature, &fields.id, i);
        let props = feature.properties.as_ref();
        let reference = text(props, &fields.reference);
        let tags = RoadTags {
            name: fields
                .name
                .as_deref()
                .and_then(|k| text(props, k))
                .or_else(|| reference.clone()),
            highway: None,
            reference,
            surface: None,
            jurisdiction: text(props, &fields.jurisdiction).map(|j| Jurisdiction::parse(&j)),
            lane_type: text(props, &fields.lane_type),
            extra: extra(props, &mapped),
        };
        push_raw(&mut out, &layer.name, &feature, id, tags);
    }
    out
}

fn push_raw(out: &mut Converted<RawFeature>, layer: &str, feature: &Feature, id: String, tags: RoadTags) {
    match geometry(feature, &id) {
        Ok(geometry) => out.items.push(RawFeature { id, geometry, tags }),
        Err(e) => {
            warn!(layer, feature_id = %id, "{}", e);
            out.invalid.push(e);
        }
    }
}

/// Municípios reprojetés dans le système de travail
///
/// Une entité sans géométrie surfacique exploitable est une erreur de couche :
/// le município disparaîtrait des tables.
pub fn municipalities(
    layer: Layer,
    fields: &MunicipalityFields,
    engine: &LengthEngine,
) -> Result<Vec<Municipality>> {
    let path = layer.file.path.display().to_string();

    let mut parsed = Vec::with_capacity(layer.features.len());
    for (i, feature) in layer.features.iter().enumerate() {
        let id = UnitId::normalize(&text(feature.properties.as_ref(), &fields.id).unwrap_or_default());
        let label = if id.is_empty() { format!("#{}", i) } else { id.to_string() };
        let shape = geometry(feature, &label)?.ok_or_else(|| {
            VicinalError::invalid_input(&layer.name, format!("municipality {} has no geometry", label))
        })?;
        parsed.push((feature, id, label, shape));
    }

    check_units(&layer.name, engine.source_epsg(), parsed.iter().map(|(_, _, _, g)| g))
        .with_context(|| format!("Unit check failed for {}", path))?;

    let mut out = Vec::with_capacity(parsed.len());
    for (feature, id, label, shape) in parsed {
        let props = feature.properties.as_ref();
        let polygon = project_polygonal(&label, &shape, engine)
            .map_err(|e| VicinalError::invalid_input(&layer.name, e.to_string()))
            .with_context(|| format!("Invalid municipality in {}", path))?;

        out.push(Municipality {
            id,
            name: text(props, &fields.name).unwrap_or_default(),
            region_id: UnitId::normalize(&text(props, &fields.region).unwrap_or_default()),
            area_km2: number(props, &fields.area),
            polygon,
        });
    }

    debug!(municipalities = out.len(), "Municipalities loaded");
    Ok(out)
}

/// Polygones de la mancha urbana, aplatis et reprojetés
pub fn urban_polygons(layer: Layer, engine: &LengthEngine) -> Result<Converted<Polygon<f64>>> {
    let mut out = Converted::default();
    let mut geometries = Vec::with_capacity(layer.features.len());

    for (i, feature) in layer.features.iter().enumerate() {
        let id = feature_id(feature, "id", i);
        match geometry(feature, &id) {
            Ok(Some(g)) => geometries.push((id, g)),
            Ok(None) => out
                .invalid
                .push(VicinalError::invalid_geometry(&id, "null geometry")),
            Err(e) => out.invalid.push(e),
        }
    }

    check_units(&layer.name, engine.source_epsg(), geometries.iter().map(|(_, g)| g))
        .with_context(|| format!("Unit check failed for {}", layer.file.path.display()))?;

    for (id, g) in geometries {
        match project_polygonal(&id, &g, engine) {
            Ok(mp) => out.items.extend(mp.0),
            Err(e) if !e.is_fatal() => {
                warn!(layer = %layer.name, feature_id = %id, "{}", e);
                out.invalid.push(e);
            }
            Err(e) => return Err(e.into()),
        }
    }

    info!(polygons = out.items.len(), invalid = out.invalid.len(), "Urban footprint loaded");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn collection(value: serde_json::Value) -> geojson::FeatureCollection {
        match GeoJson::from_json_value(value).unwrap() {
            GeoJson::FeatureCollection(fc) => fc,
            other => panic!("expected a FeatureCollection, got {}", other),
        }
    }

    #[test]
    fn test_declared_crs() {
        let fc = collection(json!({
            "type": "FeatureCollection",
            "crs": {"type": "name", "properties": {"name": "urn:ogc:def:crs:EPSG::31983"}},
            "features": []
        }));
        assert_eq!(fc.foreign_members.as_ref().and_then(declared_crs), Some(31983));

        let fc = collection(json!({
            "type": "FeatureCollection",
            "crs": {"type": "name", "properties": {"name": "urn:ogc:def:crs:OGC:1.3:CRS84"}},
            "features": []
        }));
        assert_eq!(fc.foreign_members.as_ref().and_then(declared_crs), Some(4326));
    }

    #[test]
    fn test_network_tags_mapping() {
        let fc = collection(json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": {"osm_id": 123, "name": "Estrada do Sítio", "highway": "track",
                               "ref": "SPA-010", "surface": "dirt", "tracktype": "grade3"},
                "geometry": {"type": "LineString", "coordinates": [[-47.0, -22.0], [-47.001, -22.0]]}
            }, {
                "type": "Feature",
                "properties": {"highway": "unclassified"},
                "geometry": null
            }]
        }));
        let layer = Layer {
            name: "network".to_string(),
            declared_epsg: None,
            features: fc.features,
            file: InputFile {
                layer: "network".to_string(),
                path: "mem".into(),
                bytes: 0,
                blake3: String::new(),
                encoding: "utf-8",
            },
        };
        assert_eq!(layer.epsg(None), 4326);
        assert_eq!(layer.epsg(Some(31983)), 31983);

        let converted = network_features(layer, &NetworkFields::default());
        assert_eq!(converted.items.len(), 2);
        let first = &converted.items[0];
        assert_eq!(first.id, "123");
        assert_eq!(first.tags.highway, Some(HighwayClass::Track));
        assert_eq!(first.tags.reference.as_deref(), Some("SPA-010"));
        assert_eq!(first.tags.extra.get("tracktype").map(String::as_str), Some("grade3"));
        assert_eq!(converted.items[1].id, "#1");
        assert!(converted.items[1].geometry.is_none());
    }

    #[test]
    fn test_number_and_text_values() {
        let props: JsonObject = serde_json::from_value(json!({
            "Cod_ibge": 3550308.0, "Area_Km2": "1521,11", "RA": "  "
        }))
        .unwrap();
        assert_eq!(
            UnitId::normalize(&text(Some(&props), "Cod_ibge").unwrap()).as_str(),
            "3550308"
        );
        assert_eq!(number(Some(&props), "Area_Km2"), Some(1521.11));
        assert_eq!(text(Some(&props), "RA"), None);
    }
}
