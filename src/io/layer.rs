use crate::error::ReadError;
use geo::{MultiLineString, MultiPolygon, Point};
use geojson::{GeoJson, JsonValue};
use std::path::Path;

/// One row of a vector layer. Either part may be absent; the linking step
/// decides what to do with incomplete rows.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerFeature<G = MultiPolygon<f64>> {
    pub id: Option<u32>,
    pub geometry: Option<G>,
}

fn id_value(value: &JsonValue) -> Option<u32> {
    match value {
        JsonValue::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64))
            .and_then(|v| u32::try_from(v).ok()),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn polygons(geometry: geo::Geometry<f64>) -> Option<MultiPolygon<f64>> {
    match geometry {
        geo::Geometry::Polygon(p) => Some(MultiPolygon(vec![p])),
        geo::Geometry::MultiPolygon(mp) => Some(mp),
        _ => None,
    }
}

fn lines(geometry: geo::Geometry<f64>) -> Option<MultiLineString<f64>> {
    match geometry {
        geo::Geometry::LineString(ls) => Some(MultiLineString(vec![ls])),
        geo::Geometry::MultiLineString(mls) => Some(mls),
        _ => None,
    }
}

fn point(geometry: geo::Geometry<f64>) -> Option<Point<f64>> {
    match geometry {
        geo::Geometry::Point(p) => Some(p),
        _ => None,
    }
}

fn read_features<G>(
    path: &Path,
    id_field: &str,
    convert: impl Fn(geo::Geometry<f64>) -> Option<G>,
) -> Result<Vec<LayerFeature<G>>, ReadError> {
    let text = std::fs::read_to_string(path).map_err(|e| ReadError::from_io(path, e))?;
    let geojson: GeoJson = text.parse().map_err(|e: geojson::Error| {
        let line = match &e {
            geojson::Error::MalformedJson(json) => json.line(),
            _ => 0,
        };
        ReadError::malformed(path, line, e.to_string())
    })?;
    let GeoJson::FeatureCollection(collection) = geojson else {
        return Err(ReadError::malformed(path, 1, "expected a FeatureCollection"));
    };

    let features = collection
        .features
        .into_iter()
        .map(|feature| LayerFeature {
            id: feature.property(id_field).and_then(id_value),
            geometry: feature
                .geometry
                .and_then(|g| geo::Geometry::<f64>::try_from(g).ok())
                .and_then(&convert),
        })
        .collect::<Vec<_>>();
    tracing::debug!(path = %path.display(), features = features.len(), "read layer");
    Ok(features)
}

/// Reads the polygons of a GeoJSON feature collection, taking each feature's
/// id from the `id_field` attribute. Other geometry types read as `None`.
pub fn read_layer(path: &Path, id_field: &str) -> Result<Vec<LayerFeature>, ReadError> {
    read_features(path, id_field, polygons)
}

/// Reads a river network; `LineString` and `MultiLineString` features only.
pub fn read_line_layer(
    path: &Path,
    id_field: &str,
) -> Result<Vec<LayerFeature<MultiLineString<f64>>>, ReadError> {
    read_features(path, id_field, lines)
}

pub fn read_point_layer(path: &Path, id_field: &str) -> Result<Vec<LayerFeature<Point<f64>>>, ReadError> {
    read_features(path, id_field, point)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Area;

    #[test]
    fn reads_polygons_and_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub.geojson");
        std::fs::write(
            &path,
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","properties":{"Subbasin":1},
                 "geometry":{"type":"Polygon","coordinates":[[[0,0],[10,0],[10,10],[0,10],[0,0]]]}},
                {"type":"Feature","properties":{"Subbasin":"2"},
                 "geometry":{"type":"MultiPolygon","coordinates":[[[[0,0,5],[1,0,5],[1,1,5],[0,0,5]]]]}},
                {"type":"Feature","properties":{"Subbasin":3},"geometry":null},
                {"type":"Feature","properties":{"Name":"x"},
                 "geometry":{"type":"Point","coordinates":[1,2]}}
            ]}"#,
        )
        .unwrap();

        let features = read_layer(&path, "Subbasin").unwrap();
        assert_eq!(features.len(), 4);
        assert_eq!(features[0].id, Some(1));
        assert!((features[0].geometry.as_ref().unwrap().unsigned_area() - 100.0).abs() < 1e-9);
        assert_eq!(features[1].id, Some(2));
        assert!(features[1].geometry.is_some());
        assert_eq!(features[2], LayerFeature { id: Some(3), geometry: None });
        assert_eq!(features[3], LayerFeature { id: None, geometry: None });
    }

    #[test]
    fn reads_rivers_and_points() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rivs.geojson");
        std::fs::write(
            &path,
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","properties":{"Subbasin":4,"obs_id":11},
                 "geometry":{"type":"LineString","coordinates":[[0,0],[10,0]]}},
                {"type":"Feature","properties":{"Subbasin":5,"obs_id":12},
                 "geometry":{"type":"Point","coordinates":[3,4]}}
            ]}"#,
        )
        .unwrap();

        let rivers = read_line_layer(&path, "Subbasin").unwrap();
        assert_eq!(rivers[0].id, Some(4));
        assert_eq!(rivers[0].geometry.as_ref().unwrap().0.len(), 1);
        assert_eq!(rivers[1].geometry, None);

        let points = read_point_layer(&path, "obs_id").unwrap();
        assert_eq!(points[0].geometry, None);
        assert_eq!(points[1], LayerFeature { id: Some(12), geometry: Some(Point::new(3.0, 4.0)) });
    }

    #[test]
    fn missing_layer() {
        let err = read_layer(Path::new("/no/such/sub.geojson"), "Subbasin").unwrap_err();
        assert!(err.is_missing());
    }

    #[test]
    fn invalid_json_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grid.geojson");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(read_layer(&path, "grid_id"), Err(ReadError::Malformed { .. })));

        std::fs::write(&path, r#"{"type":"Point","coordinates":[1,2]}"#).unwrap();
        assert!(matches!(read_layer(&path, "grid_id"), Err(ReadError::Malformed { .. })));
    }
}
