//! Geometry types and bounding boxes.
//!
//! Geometries are tagged variants carrying their own SRID; coordinates are
//! always stored in the axis order of that SRID's `Crs` (see `src/crs`).
//! Axis swapping happens only at the parse boundary (GML/GeoJSON literal ->
//! `Geometry`) and the emit boundary (`Geometry` -> GML/GeoJSON text),
//! never in between — see SPEC_FULL.md §3.

use crate::crs::{AxisOrder, Crs};

pub type Coord = (f64, f64);

#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point { srid: i32, x: f64, y: f64 },
    LineString { srid: i32, points: Vec<Coord> },
    LinearRing { srid: i32, points: Vec<Coord> },
    Polygon { srid: i32, exterior: Vec<Coord>, interiors: Vec<Vec<Coord>> },
    MultiPoint { srid: i32, points: Vec<Coord> },
    MultiLineString { srid: i32, lines: Vec<Vec<Coord>> },
    MultiPolygon { srid: i32, polygons: Vec<(Vec<Coord>, Vec<Vec<Coord>>)> },
    GeometryCollection { srid: i32, geometries: Vec<Geometry> },
}

impl Geometry {
    pub fn srid(&self) -> i32 {
        match self {
            Geometry::Point { srid, .. }
            | Geometry::LineString { srid, .. }
            | Geometry::LinearRing { srid, .. }
            | Geometry::Polygon { srid, .. }
            | Geometry::MultiPoint { srid, .. }
            | Geometry::MultiLineString { srid, .. }
            | Geometry::MultiPolygon { srid, .. }
            | Geometry::GeometryCollection { srid, .. } => *srid,
        }
    }

    pub fn geometry_type_name(&self) -> &'static str {
        match self {
            Geometry::Point { .. } => "Point",
            Geometry::LineString { .. } => "LineString",
            Geometry::LinearRing { .. } => "LinearRing",
            Geometry::Polygon { .. } => "Polygon",
            Geometry::MultiPoint { .. } => "MultiPoint",
            Geometry::MultiLineString { .. } => "MultiLineString",
            Geometry::MultiPolygon { .. } => "MultiPolygon",
            Geometry::GeometryCollection { .. } => "GeometryCollection",
        }
    }

    /// All coordinate pairs this geometry is built from, in storage order.
    pub fn coords(&self) -> Vec<Coord> {
        match self {
            Geometry::Point { x, y, .. } => vec![(*x, *y)],
            Geometry::LineString { points, .. } | Geometry::LinearRing { points, .. } => {
                points.clone()
            }
            Geometry::MultiPoint { points, .. } => points.clone(),
            Geometry::Polygon { exterior, interiors, .. } => {
                let mut all = exterior.clone();
                for ring in interiors {
                    all.extend(ring.iter().copied());
                }
                all
            }
            Geometry::MultiLineString { lines, .. } => lines.iter().flatten().copied().collect(),
            Geometry::MultiPolygon { polygons, .. } => polygons
                .iter()
                .flat_map(|(ext, holes)| ext.iter().chain(holes.iter().flatten()).copied())
                .collect(),
            Geometry::GeometryCollection { geometries, .. } => {
                geometries.iter().flat_map(|g| g.coords()).collect()
            }
        }
    }

    pub fn bounding_box(&self) -> BoundingBox {
        let coords = self.coords();
        let mut bbox = BoundingBox::empty(self.srid());
        for (x, y) in coords {
            bbox.extend_point(x, y);
        }
        bbox
    }

    /// Swap x/y on every coordinate, preserving the SRID. Used only at the
    /// parse/emit boundary when a CRS's axis order differs from the order
    /// coordinates were written on the wire in.
    pub fn swapped_axes(&self) -> Geometry {
        fn swap(points: &[Coord]) -> Vec<Coord> {
            points.iter().map(|(x, y)| (*y, *x)).collect()
        }
        match self {
            Geometry::Point { srid, x, y } => Geometry::Point { srid: *srid, x: *y, y: *x },
            Geometry::LineString { srid, points } => {
                Geometry::LineString { srid: *srid, points: swap(points) }
            }
            Geometry::LinearRing { srid, points } => {
                Geometry::LinearRing { srid: *srid, points: swap(points) }
            }
            Geometry::Polygon { srid, exterior, interiors } => Geometry::Polygon {
                srid: *srid,
                exterior: swap(exterior),
                interiors: interiors.iter().map(|r| swap(r)).collect(),
            },
            Geometry::MultiPoint { srid, points } => {
                Geometry::MultiPoint { srid: *srid, points: swap(points) }
            }
            Geometry::MultiLineString { srid, lines } => {
                Geometry::MultiLineString { srid: *srid, lines: lines.iter().map(|l| swap(l)).collect() }
            }
            Geometry::MultiPolygon { srid, polygons } => Geometry::MultiPolygon {
                srid: *srid,
                polygons: polygons
                    .iter()
                    .map(|(ext, holes)| (swap(ext), holes.iter().map(|h| swap(h)).collect()))
                    .collect(),
            },
            Geometry::GeometryCollection { srid, geometries } => Geometry::GeometryCollection {
                srid: *srid,
                geometries: geometries.iter().map(|g| g.swapped_axes()).collect(),
            },
        }
    }

    /// Axis order the geometry's coordinates should be read back in, given
    /// the wire's declared CRS. `Yx` means the wire order is lat/lon and the
    /// parsed/emitted coordinates need an axis swap relative to this
    /// in-memory representation's x/y storage convention.
    pub fn orient_for(&self, crs: &Crs) -> Geometry {
        match crs.axis_order {
            AxisOrder::Xy => self.clone(),
            AxisOrder::Yx => self.swapped_axes(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub srid: i32,
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn empty(srid: i32) -> Self {
        BoundingBox {
            srid,
            min_x: f64::INFINITY,
            min_y: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            max_y: f64::NEG_INFINITY,
        }
    }

    pub fn new(srid: i32, min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        BoundingBox { srid, min_x, min_y, max_x, max_y }
    }

    pub fn is_empty(&self) -> bool {
        self.min_x > self.max_x || self.min_y > self.max_y
    }

    pub fn extend_point(&mut self, x: f64, y: f64) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        debug_assert_eq!(self.srid, other.srid, "bounding box union across differing SRIDs");
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        BoundingBox {
            srid: self.srid,
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        !(self.max_x < other.min_x
            || other.max_x < self.min_x
            || self.max_y < other.min_y
            || other.max_y < self.min_y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_bounding_box_is_degenerate() {
        let p = Geometry::Point { srid: 4326, x: 5.0, y: 52.0 };
        let bbox = p.bounding_box();
        assert_eq!(bbox, BoundingBox::new(4326, 5.0, 52.0, 5.0, 52.0));
    }

    #[test]
    fn swap_axes_round_trips() {
        let p = Geometry::Point { srid: 4326, x: 5.0, y: 52.0 };
        let swapped = p.swapped_axes();
        assert_eq!(swapped, Geometry::Point { srid: 4326, x: 52.0, y: 5.0 });
        assert_eq!(swapped.swapped_axes(), p);
    }

    #[test]
    fn bbox_union_and_intersects() {
        let a = BoundingBox::new(4326, 0.0, 0.0, 1.0, 1.0);
        let b = BoundingBox::new(4326, 0.5, 0.5, 2.0, 2.0);
        assert!(a.intersects(&b));
        let u = a.union(&b);
        assert_eq!(u, BoundingBox::new(4326, 0.0, 0.0, 2.0, 2.0));

        let c = BoundingBox::new(4326, 5.0, 5.0, 6.0, 6.0);
        assert!(!a.intersects(&c));
    }

    #[test]
    fn polygon_coords_include_holes() {
        let poly = Geometry::Polygon {
            srid: 28992,
            exterior: vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0), (0.0, 0.0)],
            interiors: vec![vec![(2.0, 2.0), (3.0, 2.0), (3.0, 3.0), (2.0, 2.0)]],
        };
        assert_eq!(poly.coords().len(), 8);
    }
}
