use serde_json::Value;

use crate::bbox::Bbox;

/// A ring is a closed sequence of `[lon, lat]` vertices. The closing vertex may
/// or may not repeat the first one.
pub type Ring = Vec<[f64; 2]>;

#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    pub exterior: Ring,
    pub holes: Vec<Ring>,
}

impl Polygon {
    pub fn new(exterior: Ring) -> Self {
        Self {
            exterior,
            holes: Vec::new(),
        }
    }

    pub fn with_holes(exterior: Ring, holes: Vec<Ring>) -> Self {
        Self { exterior, holes }
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        ring_contains(&self.exterior, x, y) && !self.holes.iter().any(|h| ring_contains(h, x, y))
    }
}

/// Region geometry: one or more polygons (GeoJSON Polygon or MultiPolygon).
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    polygons: Vec<Polygon>,
    envelope: Bbox,
}

impl Geometry {
    pub fn new(polygons: Vec<Polygon>) -> Result<Self, String> {
        if polygons.is_empty() {
            return Err("geometry has no polygons".to_string());
        }
        for polygon in &polygons {
            if polygon.exterior.len() < 3 {
                return Err("polygon ring needs at least 3 vertices".to_string());
            }
        }

        let envelope = Bbox::from_points(polygons.iter().flat_map(|p| p.exterior.iter()))
            .ok_or_else(|| "geometry has no vertices".to_string())?;

        Ok(Self { polygons, envelope })
    }

    pub fn polygon(exterior: Ring) -> Result<Self, String> {
        Self::new(vec![Polygon::new(exterior)])
    }

    /// Axis-aligned rectangle, handy for square lakes in tests and for clipping.
    pub fn rectangle(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Result<Self, String> {
        Self::polygon(vec![
            [xmin, ymin],
            [xmax, ymin],
            [xmax, ymax],
            [xmin, ymax],
            [xmin, ymin],
        ])
    }

    /// Merge several geometries into a single multipolygon.
    pub fn union_of<'a, I>(geometries: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = &'a Geometry>,
    {
        let polygons = geometries
            .into_iter()
            .flat_map(|g| g.polygons.iter().cloned())
            .collect();
        Self::new(polygons)
    }

    pub fn envelope(&self) -> &Bbox {
        &self.envelope
    }

    pub fn polygons(&self) -> &[Polygon] {
        &self.polygons
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.envelope.contains(x, y) && self.polygons.iter().any(|p| p.contains(x, y))
    }

    /// Whether any polygon shares at least one point with the closed `bbox`.
    /// Holes are ignored.
    pub fn intersects_bbox(&self, bbox: &Bbox) -> bool {
        if !self.envelope.intersects(bbox) {
            return false;
        }

        self.polygons.iter().any(|polygon| {
            let ring = &polygon.exterior;
            let edge_meets = (0..ring.len())
                .any(|i| segment_meets_bbox(ring[i], ring[(i + 1) % ring.len()], bbox));

            // No edge inside: the box is either fully inside the ring or apart
            edge_meets || ring_contains(ring, bbox.xmin, bbox.ymin)
        })
    }

    /// Parse a GeoJSON `Polygon` or `MultiPolygon` geometry object.
    pub fn from_geojson(value: &Value) -> Result<Self, String> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| "geometry without a type".to_string())?;
        let coordinates = value
            .get("coordinates")
            .ok_or_else(|| "geometry without coordinates".to_string())?;

        match kind {
            "Polygon" => Self::new(vec![parse_polygon(coordinates)?]),
            "MultiPolygon" => {
                let parts = coordinates
                    .as_array()
                    .ok_or_else(|| "MultiPolygon coordinates must be an array".to_string())?;
                let polygons = parts
                    .iter()
                    .map(parse_polygon)
                    .collect::<Result<Vec<_>, _>>()?;
                Self::new(polygons)
            }
            other => Err(format!("unsupported geometry type {}", other)),
        }
    }
}

fn parse_polygon(value: &Value) -> Result<Polygon, String> {
    let rings = value
        .as_array()
        .ok_or_else(|| "Polygon coordinates must be an array of rings".to_string())?;
    let mut rings = rings.iter().map(parse_ring);

    let exterior = rings
        .next()
        .ok_or_else(|| "Polygon without exterior ring".to_string())??;
    let holes = rings.collect::<Result<Vec<_>, _>>()?;

    Ok(Polygon::with_holes(exterior, holes))
}

fn parse_ring(value: &Value) -> Result<Ring, String> {
    let positions = value
        .as_array()
        .ok_or_else(|| "ring must be an array of positions".to_string())?;

    positions
        .iter()
        .map(|pos| {
            let x = pos.get(0).and_then(Value::as_f64);
            let y = pos.get(1).and_then(Value::as_f64);
            match (x, y) {
                (Some(x), Some(y)) => Ok([x, y]),
                _ => Err(format!("invalid position {}", pos)),
            }
        })
        .collect()
}

// Liang-Barsky clipping of segment a-b against a closed box.
fn segment_meets_bbox(a: [f64; 2], b: [f64; 2], bbox: &Bbox) -> bool {
    let (dx, dy) = (b[0] - a[0], b[1] - a[1]);
    let (mut t0, mut t1) = (0.0_f64, 1.0_f64);

    for (p, q) in [
        (-dx, a[0] - bbox.xmin),
        (dx, bbox.xmax - a[0]),
        (-dy, a[1] - bbox.ymin),
        (dy, bbox.ymax - a[1]),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return false;
            }
            continue;
        }

        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return false;
            }
            t0 = t0.max(r);
        } else {
            if r < t0 {
                return false;
            }
            t1 = t1.min(r);
        }
    }

    true
}

// Even-odd ray casting.
fn ring_contains(ring: &[[f64; 2]], x: f64, y: f64) -> bool {
    let n = ring.len();
    if n < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let [xi, yi] = ring[i];
        let [xj, yj] = ring[j];
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }

    inside
}
