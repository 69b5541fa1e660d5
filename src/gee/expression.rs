//! Server-side expression builder for the geospatial platform.
//!
//! The platform evaluates computation graphs submitted as JSON: nodes are
//! function invocations over constants, geometries, images, and collections.
//! All heavy lifting (filtering, masking, compositing, reduction) happens
//! remotely; this module only assembles the graph. Builders are thin and
//! composable so the sensor-specific recipes in `indices.rs` read close to
//! the operations they describe.

use serde_json::{json, Map, Value};

// ---

/// Literal node.
pub fn constant(v: Value) -> Value {
    json!({ "constantValue": v })
}

/// Function invocation node.
pub fn invoke(name: &str, args: &[(&str, Value)]) -> Value {
    let mut arguments = Map::new();
    for (k, v) in args {
        arguments.insert((*k).to_string(), v.clone());
    }
    json!({
        "functionInvocationValue": {
            "functionName": name,
            "arguments": Value::Object(arguments),
        }
    })
}

/// Reference to a lambda parameter, used inside mapped functions.
pub fn arg_ref(name: &str) -> Value {
    json!({ "argumentReference": name })
}

/// Single-argument lambda, for mapping over image collections.
pub fn lambda(param: &str, body: Value) -> Value {
    json!({
        "functionDefinitionValue": {
            "argumentNames": [param],
            "body": body,
        }
    })
}

/// Wrap a finished graph into the request envelope expected by `value:compute`
/// and `table:export`.
pub fn envelope(root: Value) -> Value {
    json!({ "expression": { "result": "0", "values": { "0": root } } })
}

// --- geometry ---

pub fn point(lon: f64, lat: f64) -> Value {
    invoke(
        "GeometryConstructors.Point",
        &[("coordinates", constant(json!([lon, lat])))],
    )
}

/// Buffer a geometry by `meters`.
pub fn buffer(geometry: Value, meters: f64) -> Value {
    invoke(
        "Geometry.buffer",
        &[("geometry", geometry), ("distance", constant(json!(meters)))],
    )
}

// --- images and collections ---

pub fn image(asset_id: &str) -> Value {
    invoke("Image.load", &[("id", constant(json!(asset_id)))])
}

pub fn image_collection(asset_id: &str) -> Value {
    invoke("ImageCollection.load", &[("id", constant(json!(asset_id)))])
}

pub fn filter_date(collection: Value, start: &str, end: &str) -> Value {
    invoke(
        "Collection.filterDate",
        &[
            ("collection", collection),
            ("start", constant(json!(start))),
            ("end", constant(json!(end))),
        ],
    )
}

pub fn filter_bounds(collection: Value, geometry: Value) -> Value {
    invoke(
        "Collection.filterBounds",
        &[("collection", collection), ("geometry", geometry)],
    )
}

/// Metadata filter, e.g. scene cloud cover below a threshold.
pub fn filter_metadata_lt(collection: Value, property: &str, value: f64) -> Value {
    invoke(
        "Collection.filterMetadata",
        &[
            ("collection", collection),
            ("name", constant(json!(property))),
            ("operator", constant(json!("less_than"))),
            ("value", constant(json!(value))),
        ],
    )
}

/// Map a per-image lambda over a collection.
pub fn map_collection(collection: Value, function: Value) -> Value {
    invoke(
        "Collection.map",
        &[("collection", collection), ("baseAlgorithm", function)],
    )
}

pub fn collection_size(collection: Value) -> Value {
    invoke("Collection.size", &[("collection", collection)])
}

/// Temporal mean composite of a collection.
pub fn mean_composite(collection: Value) -> Value {
    invoke("ImageCollection.mean", &[("collection", collection)])
}

pub fn select(image: Value, bands: &[&str]) -> Value {
    invoke(
        "Image.select",
        &[("input", image), ("bandSelectors", constant(json!(bands)))],
    )
}

/// Band selection returning a single-band image renamed to `name`.
pub fn select_as(image: Value, band: &str, name: &str) -> Value {
    invoke(
        "Image.select",
        &[
            ("input", image),
            ("bandSelectors", constant(json!([band]))),
            ("newNames", constant(json!([name]))),
        ],
    )
}

pub fn add_bands(image: Value, srcs: Value) -> Value {
    invoke("Image.addBands", &[("dstImg", image), ("srcImg", srcs)])
}

pub fn rename(image: Value, name: &str) -> Value {
    invoke(
        "Image.rename",
        &[("input", image), ("names", constant(json!([name])))],
    )
}

pub fn update_mask(image: Value, mask: Value) -> Value {
    invoke("Image.updateMask", &[("image", image), ("mask", mask)])
}

/// `(a - b) / (a + b)` over two named bands, the platform's normalized
/// difference operator.
pub fn normalized_difference(image: Value, band_a: &str, band_b: &str) -> Value {
    invoke(
        "Image.normalizedDifference",
        &[
            ("input", image),
            ("bandNames", constant(json!([band_a, band_b]))),
        ],
    )
}

// --- per-band arithmetic ---

pub fn add(a: Value, b: Value) -> Value {
    invoke("Image.add", &[("image1", a), ("image2", b)])
}

pub fn subtract(a: Value, b: Value) -> Value {
    invoke("Image.subtract", &[("image1", a), ("image2", b)])
}

pub fn multiply(a: Value, b: Value) -> Value {
    invoke("Image.multiply", &[("image1", a), ("image2", b)])
}

pub fn divide(a: Value, b: Value) -> Value {
    invoke("Image.divide", &[("image1", a), ("image2", b)])
}

pub fn eq_const(image: Value, v: f64) -> Value {
    invoke(
        "Image.eq",
        &[("image1", image), ("image2", constant(json!(v)))],
    )
}

pub fn bitwise_and_const(image: Value, v: u32) -> Value {
    invoke(
        "Image.bitwiseAnd",
        &[("image1", image), ("image2", constant(json!(v)))],
    )
}

pub fn or(a: Value, b: Value) -> Value {
    invoke("Image.or", &[("image1", a), ("image2", b)])
}

pub fn and(a: Value, b: Value) -> Value {
    invoke("Image.and", &[("image1", a), ("image2", b)])
}

/// Median composite, used for the ALOS elevation fallback.
pub fn median_composite(collection: Value) -> Value {
    invoke(
        "ImageCollection.reduce",
        &[
            ("collection", collection),
            ("reducer", invoke("Reducer.median", &[])),
        ],
    )
}

// --- feature tables ---

/// Array of expression nodes.
pub fn array(values: Vec<Value>) -> Value {
    json!({ "arrayValue": { "values": values } })
}

/// A feature: a geometry plus a property dictionary.
pub fn feature(geometry: Value, properties: Value) -> Value {
    invoke(
        "Feature",
        &[("geometry", geometry), ("metadata", constant(properties))],
    )
}

pub fn feature_collection(features: Value) -> Value {
    invoke("Collection", &[("features", features)])
}

pub fn feature_geometry(feature: Value) -> Value {
    invoke("Feature.geometry", &[("feature", feature)])
}

/// Merge computed properties onto a feature.
pub fn feature_set_properties(feature: Value, properties: Value) -> Value {
    invoke(
        "Feature.setMulti",
        &[("element", feature), ("properties", properties)],
    )
}

/// Union geometry of a whole collection, used to bound archive filters.
pub fn collection_geometry(collection: Value) -> Value {
    invoke("Collection.geometry", &[("collection", collection)])
}

/// Spatial mean reduction of `image` over `geometry` at `scale` meters,
/// yielding a band-name → scalar dictionary.
pub fn reduce_region_mean(image: Value, geometry: Value, scale: f64) -> Value {
    invoke(
        "Image.reduceRegion",
        &[
            ("image", image),
            ("reducer", invoke("Reducer.mean", &[])),
            ("geometry", geometry),
            ("scale", constant(json!(scale))),
        ],
    )
}

// ---

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn invocation_nodes_carry_name_and_arguments() {
        // ---
        let p = point(8.4114, 54.8599);
        let inv = &p["functionInvocationValue"];
        assert_eq!(inv["functionName"], "GeometryConstructors.Point");
        assert_eq!(
            inv["arguments"]["coordinates"]["constantValue"],
            json!([8.4114, 54.8599])
        );
    }

    #[test]
    fn filters_compose_by_nesting() {
        // ---
        let col = filter_metadata_lt(
            filter_bounds(
                filter_date(image_collection("COPERNICUS/S2_SR"), "2023-01-01", "2023-02-01"),
                point(8.0, 54.0),
            ),
            "CLOUDY_PIXEL_PERCENTAGE",
            60.0,
        );
        let meta = &col["functionInvocationValue"];
        assert_eq!(meta["functionName"], "Collection.filterMetadata");
        assert_eq!(meta["arguments"]["value"]["constantValue"], 60.0);

        let bounds = &meta["arguments"]["collection"]["functionInvocationValue"];
        assert_eq!(bounds["functionName"], "Collection.filterBounds");
    }

    #[test]
    fn lambda_bodies_reference_their_parameter() {
        // ---
        let f = lambda("img", normalized_difference(arg_ref("img"), "B8", "B4"));
        let def = &f["functionDefinitionValue"];
        assert_eq!(def["argumentNames"], json!(["img"]));
        assert_eq!(
            def["body"]["functionInvocationValue"]["arguments"]["input"]["argumentReference"],
            "img"
        );
    }

    #[test]
    fn envelope_wraps_root_at_result_zero() {
        // ---
        let req = envelope(image("CGIAR/SRTM90_V4"));
        assert_eq!(req["expression"]["result"], "0");
        assert_eq!(
            req["expression"]["values"]["0"]["functionInvocationValue"]["functionName"],
            "Image.load"
        );
    }
}
