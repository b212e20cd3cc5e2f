use crate::config::{LinkingConfig, ThresholdRule};
use crate::error::LinkError;
use crate::grid::GridCell;
use crate::io::layer::LayerFeature;
use geo::algorithm::line_intersection::{LineIntersection, line_intersection};
use geo::algorithm::orient::{Direction, Orient};
use geo::{
    Area, BooleanOps, BoundingRect, Contains, Coord, Euclidean, Intersects, Length, Line, LineString,
    MultiLineString, MultiPolygon, Point, Polygon, Rect,
};
use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

const EDGE_CHUNK: usize = 64;

// Consecutive boundary segments under one bounding box
#[derive(Debug, Clone)]
struct EdgeChunk {
    bbox: Rect<f64>,
    lines: Vec<Line<f64>>,
}

fn edge_chunks(geometry: &MultiPolygon<f64>) -> Vec<EdgeChunk> {
    let mut chunks = Vec::new();
    for polygon in &geometry.0 {
        for ring in std::iter::once(polygon.exterior()).chain(polygon.interiors()) {
            let coords = &ring.0;
            let mut start = 0;
            while start + 1 < coords.len() {
                let end = (start + EDGE_CHUNK).min(coords.len() - 1);
                let part = LineString::from(coords[start..=end].to_vec());
                if let Some(bbox) = part.bounding_rect() {
                    chunks.push(EdgeChunk {
                        bbox,
                        lines: part.lines().collect(),
                    });
                }
                start = end;
            }
        }
    }
    chunks
}

// A feature ready for intersection
#[derive(Debug, Clone)]
pub struct LinkFeature {
    pub id: u32,
    pub geometry: MultiPolygon<f64>,
    pub area: f64,
    bbox: Rect<f64>,
    // the geometry is exactly its bounding box
    rectangular: bool,
    edges: Vec<EdgeChunk>,
}

impl LinkFeature {
    fn new(id: u32, geometry: MultiPolygon<f64>) -> Option<Self> {
        let bbox = geometry.bounding_rect()?;
        let area = geometry.unsigned_area();
        let rectangular = matches!(geometry.0.as_slice(), [p] if p.interiors().is_empty())
            && (bbox.unsigned_area() - area).abs() <= 1e-9 * area;
        let edges = edge_chunks(&geometry);
        (area > 0.0).then_some(LinkFeature {
            id,
            geometry,
            area,
            bbox,
            rectangular,
            edges,
        })
    }

    fn boundary_meets(&self, rect: &Rect<f64>) -> bool {
        self.edges
            .iter()
            .any(|chunk| chunk.bbox.intersects(rect) && chunk.lines.iter().any(|l| rect.intersects(l)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Overlap {
    Inside,
    Outside,
    Boundary,
}

// A rectangular cell the subbasin boundary never touches lies wholly on one
// side of it, so its centre decides.
fn classify(sub: &LinkFeature, cell: &LinkFeature) -> Overlap {
    if !cell.rectangular || sub.boundary_meets(&cell.bbox) {
        return Overlap::Boundary;
    }
    if sub.geometry.contains(&Point::from(cell.bbox.center())) {
        Overlap::Inside
    } else {
        Overlap::Outside
    }
}

/// A layer after null and invalid geometries have been dealt with.
#[derive(Debug, Clone)]
pub struct PreparedLayer {
    pub name: String,
    pub features: Vec<LinkFeature>,
    pub dropped_null: usize,
    pub dropped_invalid: usize,
    /// Invalid parts removed from features that were otherwise kept.
    pub dropped_parts: usize,
}

impl PreparedLayer {
    pub fn from_cells(cells: Vec<GridCell>) -> Self {
        let features = cells
            .into_iter()
            .filter_map(|cell| LinkFeature::new(cell.id, cell.polygon))
            .collect();
        PreparedLayer {
            name: "grid".to_string(),
            features,
            dropped_null: 0,
            dropped_invalid: 0,
            dropped_parts: 0,
        }
    }

    pub fn max_area(&self) -> f64 {
        self.features.iter().map(|f| f.area).fold(0.0, f64::max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RingDefect {
    Degenerate,
    SelfIntersecting,
}

fn ring_self_intersects(ring: &LineString<f64>) -> bool {
    let segments: Vec<_> = ring.lines().collect();
    let n = segments.len();
    for i in 0..n {
        for j in (i + 1)..n {
            let adjacent = j == i + 1 || (i == 0 && j == n - 1);
            match line_intersection(segments[i], segments[j]) {
                None => {}
                // neighbours always share their common vertex
                Some(LineIntersection::SinglePoint { .. }) if adjacent => {}
                Some(_) => return true,
            }
        }
    }
    false
}

/// Closes the ring and removes repeated vertices.
fn clean_ring(ring: &LineString<f64>) -> Result<LineString<f64>, RingDefect> {
    let mut coords: Vec<Coord<f64>> = Vec::with_capacity(ring.0.len() + 1);
    for c in ring.coords() {
        if !c.x.is_finite() || !c.y.is_finite() {
            return Err(RingDefect::Degenerate);
        }
        if coords.last() != Some(c) {
            coords.push(*c);
        }
    }
    if let (Some(first), Some(last)) = (coords.first().copied(), coords.last().copied()) {
        if first != last {
            coords.push(first);
        }
    }
    if coords.len() < 4 {
        return Err(RingDefect::Degenerate);
    }
    let ring = LineString::from(coords);
    if ring_self_intersects(&ring) {
        return Err(RingDefect::SelfIntersecting);
    }
    Ok(ring)
}

fn repair_polygon(polygon: &Polygon<f64>) -> Option<Polygon<f64>> {
    let exterior = clean_ring(polygon.exterior()).ok()?;
    let mut interiors = Vec::with_capacity(polygon.interiors().len());
    for hole in polygon.interiors() {
        match clean_ring(hole) {
            Ok(ring) => interiors.push(ring),
            Err(RingDefect::Degenerate) => {}
            Err(RingDefect::SelfIntersecting) => return None,
        }
    }
    let repaired = Polygon::new(exterior, interiors).orient(Direction::Default);
    (repaired.unsigned_area() > 0.0).then_some(repaired)
}

/// Keeps the valid parts of a geometry; `None` when nothing usable remains.
pub fn repair_geometry(geometry: &MultiPolygon<f64>) -> Option<MultiPolygon<f64>> {
    let mut parts = Vec::with_capacity(geometry.0.len());
    for (part, polygon) in geometry.0.iter().enumerate() {
        match repair_polygon(polygon) {
            Some(repaired) => parts.push(repaired),
            None => tracing::warn!(part, area = polygon.unsigned_area(), "dropping invalid polygon part"),
        }
    }
    (!parts.is_empty()).then_some(MultiPolygon(parts))
}

/// Drops rows with null geometry or no id and repairs or drops invalid
/// geometries.
pub fn prepare_features(
    layer: &str,
    features: Vec<LayerFeature>,
) -> Result<PreparedLayer, LinkError> {
    let mut prepared = PreparedLayer {
        name: layer.to_string(),
        features: Vec::with_capacity(features.len()),
        dropped_null: 0,
        dropped_invalid: 0,
        dropped_parts: 0,
    };

    for (idx, feature) in features.into_iter().enumerate() {
        let (Some(id), Some(geometry)) = (feature.id, feature.geometry) else {
            tracing::warn!(layer, row = idx, "dropping feature with null geometry or id");
            prepared.dropped_null += 1;
            continue;
        };
        let parts = geometry.0.len();
        match repair_geometry(&geometry).and_then(|g| LinkFeature::new(id, g)) {
            Some(f) => {
                let lost = parts - f.geometry.0.len();
                if lost > 0 {
                    tracing::warn!(layer, id, lost, "kept feature without its invalid parts");
                    prepared.dropped_parts += lost;
                }
                prepared.features.push(f);
            }
            None => {
                tracing::warn!(layer, id, "dropping feature with invalid geometry");
                prepared.dropped_invalid += 1;
            }
        }
    }

    if prepared.features.is_empty() {
        return Err(LinkError::NoValidGeometry {
            layer: layer.to_string(),
        });
    }
    tracing::info!(
        layer,
        kept = prepared.features.len(),
        null = prepared.dropped_null,
        invalid = prepared.dropped_invalid,
        parts = prepared.dropped_parts,
        "prepared layer"
    );
    Ok(prepared)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinkageRow {
    pub subbasin: u32,
    pub cell: u32,
    /// Overlap area of the subbasin and the cell.
    pub area: f64,
    /// Share of the cell covered by the subbasin.
    pub fraction: f64,
}

/// Subbasin to grid-cell cross reference, sorted by (subbasin, cell).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LinkageTable {
    rows: Vec<LinkageRow>,
}

impl LinkageTable {
    pub fn new(mut rows: Vec<LinkageRow>) -> Self {
        rows.sort_by_key(|r| (r.subbasin, r.cell));
        LinkageTable { rows }
    }

    pub fn rows(&self) -> &[LinkageRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn total_area(&self) -> f64 {
        self.rows.iter().map(|r| r.area).sum()
    }

    /// Rows ordered by cell, then subbasin.
    pub fn grid_sub(&self) -> Vec<LinkageRow> {
        let mut rows = self.rows.clone();
        rows.sort_by_key(|r| (r.cell, r.subbasin));
        rows
    }

    pub fn cells_for(&self, subbasin: u32) -> impl Iterator<Item = &LinkageRow> + '_ {
        self.rows.iter().filter(move |r| r.subbasin == subbasin)
    }

    /// Area-weighted mean of subbasin values over the part of each cell they
    /// cover. Subbasins without a value are ignored.
    pub fn subbasins_to_cells(&self, values: &HashMap<u32, f64>) -> BTreeMap<u32, f64> {
        weighted_mean(self.rows.iter().filter_map(|r| {
            values.get(&r.subbasin).map(|v| (r.cell, *v, r.area))
        }))
    }

    /// Area-weighted mean of cell values over each subbasin.
    pub fn cells_to_subbasins(&self, values: &HashMap<u32, f64>) -> BTreeMap<u32, f64> {
        weighted_mean(self.rows.iter().filter_map(|r| {
            values.get(&r.cell).map(|v| (r.subbasin, *v, r.area))
        }))
    }
}

fn weighted_mean(items: impl Iterator<Item = (u32, f64, f64)>) -> BTreeMap<u32, f64> {
    let mut acc: BTreeMap<u32, (f64, f64)> = BTreeMap::new();
    for (key, value, weight) in items {
        if !value.is_finite() {
            continue;
        }
        let entry = acc.entry(key).or_insert((0.0, 0.0));
        entry.0 += value * weight;
        entry.1 += weight;
    }
    acc.into_iter()
        .filter(|(_, (_, w))| *w > 0.0)
        .map(|(key, (sum, w))| (key, sum / w))
        .collect()
}

/// Turns summed overlap areas into linkage rows, applying the area threshold.
pub fn filter_rows(
    sums: &BTreeMap<(u32, u32), f64>,
    cell_areas: &HashMap<u32, f64>,
    threshold: Option<f64>,
    rule: ThresholdRule,
) -> Vec<LinkageRow> {
    sums.iter()
        .filter(|(_, area)| threshold.is_none_or(|t| rule.keeps(**area, t)))
        .map(|(&(subbasin, cell), &area)| {
            let cell_area = cell_areas.get(&cell).copied().unwrap_or(0.0);
            LinkageRow {
                subbasin,
                cell,
                area,
                fraction: if cell_area > 0.0 { area / cell_area } else { 0.0 },
            }
        })
        .collect()
}

/// Intersects every subbasin with the grid and builds the linkage table.
pub fn link(
    subbasins: &PreparedLayer,
    grid: &PreparedLayer,
    config: &LinkingConfig,
    progress: &ProgressBar,
) -> LinkageTable {
    let threshold = config.bounded_threshold(grid.max_area());
    let mut cell_areas: HashMap<u32, f64> = HashMap::new();
    for cell in &grid.features {
        *cell_areas.entry(cell.id).or_insert(0.0) += cell.area;
    }

    tracing::info!(
        subbasins = subbasins.features.len(),
        cells = grid.features.len(),
        threshold = ?threshold,
        "intersecting subbasins with grid"
    );

    let mut sums: BTreeMap<(u32, u32), f64> = BTreeMap::new();
    let mut fragments = 0usize;
    let mut interior = 0usize;
    for sub in &subbasins.features {
        for cell in grid.features.iter().filter(|c| c.bbox.intersects(&sub.bbox)) {
            let area = match classify(sub, cell) {
                Overlap::Inside => {
                    interior += 1;
                    cell.area
                }
                Overlap::Outside => continue,
                Overlap::Boundary => sub.geometry.intersection(&cell.geometry).unsigned_area(),
            };
            if area > 0.0 {
                fragments += 1;
                *sums.entry((sub.id, cell.id)).or_insert(0.0) += area;
            }
        }
        progress.inc(1);
    }

    let rows = filter_rows(&sums, &cell_areas, threshold, config.rule);
    tracing::info!(
        fragments,
        interior,
        pairs = sums.len(),
        kept = rows.len(),
        dropped = sums.len() - rows.len(),
        "linking finished"
    );
    if rows.is_empty() {
        tracing::warn!("linkage table is empty; nothing to link");
    }
    LinkageTable::new(rows)
}

/// A river reach ready for clipping against the grid.
#[derive(Debug, Clone)]
pub struct RiverFeature {
    pub id: u32,
    pub geometry: MultiLineString<f64>,
    pub length: f64,
    bbox: Rect<f64>,
}

/// Drops reaches with null geometry, no id or no length.
pub fn prepare_rivers(
    layer: &str,
    features: Vec<LayerFeature<MultiLineString<f64>>>,
) -> Result<Vec<RiverFeature>, LinkError> {
    let mut rivers = Vec::with_capacity(features.len());
    for (idx, feature) in features.into_iter().enumerate() {
        let (Some(id), Some(geometry)) = (feature.id, feature.geometry) else {
            tracing::warn!(layer, row = idx, "dropping reach with null geometry or id");
            continue;
        };
        let length = geometry.length::<Euclidean>();
        match geometry.bounding_rect() {
            Some(bbox) if length.is_finite() && length > 0.0 => rivers.push(RiverFeature {
                id,
                geometry,
                length,
                bbox,
            }),
            _ => tracing::warn!(layer, id, "dropping reach without length"),
        }
    }
    if rivers.is_empty() {
        return Err(LinkError::NoValidGeometry {
            layer: layer.to_string(),
        });
    }
    tracing::info!(layer, kept = rivers.len(), "prepared rivers");
    Ok(rivers)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiverRow {
    pub reach: u32,
    pub cell: u32,
    /// River length inside the cell.
    pub length: f64,
}

/// River to grid-cell cross reference, sorted by (reach, cell). These cells
/// exchange water between the channels and the aquifer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RiverTable {
    rows: Vec<RiverRow>,
}

impl RiverTable {
    pub fn new(mut rows: Vec<RiverRow>) -> Self {
        rows.sort_by_key(|r| (r.reach, r.cell));
        RiverTable { rows }
    }

    pub fn rows(&self) -> &[RiverRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn total_length(&self) -> f64 {
        self.rows.iter().map(|r| r.length).sum()
    }

    /// Distinct river cells in ascending order.
    pub fn cells(&self) -> Vec<u32> {
        let mut cells: Vec<u32> = self.rows.iter().map(|r| r.cell).collect();
        cells.sort_unstable();
        cells.dedup();
        cells
    }
}

fn filter_river_rows(
    sums: &BTreeMap<(u32, u32), f64>,
    threshold: Option<f64>,
    rule: ThresholdRule,
) -> Vec<RiverRow> {
    sums.iter()
        .filter(|(_, length)| threshold.is_none_or(|t| rule.keeps(**length, t)))
        .map(|(&(reach, cell), &length)| RiverRow { reach, cell, length })
        .collect()
}

/// Clips every reach to the grid and sums its length per cell. Cells holding
/// less than the river threshold are dropped.
pub fn link_rivers(
    rivers: &[RiverFeature],
    grid: &PreparedLayer,
    config: &LinkingConfig,
    progress: &ProgressBar,
) -> RiverTable {
    let threshold = config.river_threshold.map(|t| t.max(0.0));
    tracing::info!(
        reaches = rivers.len(),
        cells = grid.features.len(),
        threshold = ?threshold,
        "clipping rivers to grid"
    );

    let mut sums: BTreeMap<(u32, u32), f64> = BTreeMap::new();
    for river in rivers {
        for cell in grid.features.iter().filter(|c| c.bbox.intersects(&river.bbox)) {
            let length = cell.geometry.clip(&river.geometry, false).length::<Euclidean>();
            if length > 0.0 {
                *sums.entry((river.id, cell.id)).or_insert(0.0) += length;
            }
        }
        progress.inc(1);
    }

    let rows = filter_river_rows(&sums, threshold, config.rule);
    tracing::info!(
        pairs = sums.len(),
        kept = rows.len(),
        dropped = sums.len() - rows.len(),
        "river linking finished"
    );
    RiverTable::new(rows)
}

/// Grid cell holding a MODFLOW observation point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationCell {
    pub point: u32,
    pub cell: u32,
}

/// Finds the cell of every observation point, sorted by point id. A point on
/// a shared edge goes to the lowest cell id; points off the grid are skipped.
pub fn locate_points(
    points: Vec<LayerFeature<Point<f64>>>,
    grid: &PreparedLayer,
) -> Vec<ObservationCell> {
    let mut located = Vec::with_capacity(points.len());
    for (idx, feature) in points.into_iter().enumerate() {
        let (Some(point), Some(location)) = (feature.id, feature.geometry) else {
            tracing::warn!(row = idx, "dropping observation point with null geometry or id");
            continue;
        };
        let cell = grid
            .features
            .iter()
            .filter(|c| c.bbox.intersects(&location) && c.geometry.intersects(&location))
            .map(|c| c.id)
            .min();
        match cell {
            Some(cell) => located.push(ObservationCell { point, cell }),
            None => tracing::warn!(point, x = location.x(), y = location.y(), "observation point outside the grid"),
        }
    }
    located.sort_by_key(|o| (o.point, o.cell));
    tracing::info!(points = located.len(), "located observation points");
    located
}
