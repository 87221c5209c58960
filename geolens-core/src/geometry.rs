use geo::{BoundingRect, HasDimensions, Validation};
use geo_types::Geometry;
use geolens_common::{GeoLensError, Result};
use geozero::wkb::Wkb;
use geozero::{CoordDimensions, ToGeo, ToWkb};
use serde::{Deserialize, Serialize};
use wkt::{ToWkt, TryFromWkt};

/// Minimal axis-aligned rectangle around a set of geometries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn union(&mut self, other: &BoundingBox) {
        self.min_x = self.min_x.min(other.min_x);
        self.min_y = self.min_y.min(other.min_y);
        self.max_x = self.max_x.max(other.max_x);
        self.max_y = self.max_y.max(other.max_y);
    }
}

/// One geometry cell counts in exactly one bucket: emptiness is checked
/// before validity, so an empty geometry is never also flagged invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryClass {
    Empty,
    Invalid,
    Valid,
}

pub fn classify(geom: &Geometry<f64>) -> GeometryClass {
    if geom.is_empty() {
        GeometryClass::Empty
    } else if !geom.is_valid() {
        GeometryClass::Invalid
    } else {
        GeometryClass::Valid
    }
}

pub fn decode_wkb(bytes: &[u8]) -> Result<Geometry<f64>> {
    Wkb(bytes)
        .to_geo()
        .map_err(|e| GeoLensError::Geometry(e.to_string()))
}

pub fn encode_wkb(geom: &Geometry<f64>) -> Result<Vec<u8>> {
    geom.to_wkb(CoordDimensions::xy())
        .map_err(|e| GeoLensError::Geometry(e.to_string()))
}

pub fn wkb_to_wkt(bytes: &[u8]) -> Result<String> {
    Ok(decode_wkb(bytes)?.wkt_string())
}

pub fn wkt_to_wkb(text: &str) -> Result<Vec<u8>> {
    let geom = Geometry::<f64>::try_from_wkt_str(text)
        .map_err(|e| GeoLensError::Geometry(e.to_string()))?;
    encode_wkb(&geom)
}

pub fn type_label(geom: &Geometry<f64>) -> &'static str {
    match geom {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}

pub fn bounds(geom: &Geometry<f64>) -> Option<BoundingBox> {
    geom.bounding_rect().map(|r| BoundingBox {
        min_x: r.min().x,
        min_y: r.min().y,
        max_x: r.max().x,
        max_y: r.max().y,
    })
}
