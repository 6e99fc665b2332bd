//! Rendering of Cloudinary transformation parameters and delivery URLs.

use crate::models::OptionMap;
use serde_json::Value;

/// Option keys that map onto transformation parameters, with their short
/// parameter names.
const TRANSFORMATION_PARAMS: &[(&str, &str)] = &[
    ("angle", "a"),
    ("background", "b"),
    ("crop", "c"),
    ("dpr", "dpr"),
    ("effect", "e"),
    ("fetch_format", "f"),
    ("flags", "fl"),
    ("gravity", "g"),
    ("height", "h"),
    ("opacity", "o"),
    ("quality", "q"),
    ("radius", "r"),
    ("width", "w"),
    ("x", "x"),
    ("y", "y"),
    ("zoom", "z"),
];

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// One transformation component (`c_scale,w_600`) from the recognised keys
/// of `options`. Parameters are sorted by short name.
pub fn component(options: &OptionMap) -> String {
    let mut params: Vec<String> = TRANSFORMATION_PARAMS
        .iter()
        .filter_map(|(key, short)| {
            let value = options.get(*key)?;
            let rendered = match value {
                Value::Array(items) => {
                    let joined: Vec<String> = items.iter().filter_map(scalar).collect();
                    (!joined.is_empty()).then(|| joined.join("."))
                }
                other => scalar(other),
            }?;
            Some(format!("{}_{}", short, rendered))
        })
        .collect();
    params.sort();
    params.join(",")
}

/// Render a `transformation` option value: a raw string is used as is, an
/// object becomes one component and an array chains components with `/`.
pub fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(map) => component(map),
        Value::Array(items) => items
            .iter()
            .map(render)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("/"),
        _ => String::new(),
    }
}

/// Delivery URL for `public_id` (which should carry its format extension)
/// under `base_url/cloud_name`, applying the fetch `options`.
pub fn delivery_url(base_url: &str, cloud_name: &str, public_id: &str, options: &OptionMap) -> String {
    let resource_type = options
        .get("resource_type")
        .and_then(Value::as_str)
        .unwrap_or("image");
    let delivery_type = options.get("type").and_then(Value::as_str).unwrap_or("upload");

    let mut base = base_url.trim_end_matches('/').to_string();
    if options.get("secure") == Some(&Value::Bool(false)) {
        if let Some(rest) = base.strip_prefix("https://") {
            base = format!("http://{}", rest);
        }
    }

    let mut segments = vec![base, cloud_name.to_string(), resource_type.to_string(), delivery_type.to_string()];

    let transformation = [
        options.get("transformation").map(render).unwrap_or_default(),
        component(options),
    ]
    .into_iter()
    .filter(|s| !s.is_empty())
    .collect::<Vec<_>>()
    .join("/");
    if !transformation.is_empty() {
        segments.push(transformation);
    }

    if let Some(version) = options.get("version").and_then(scalar) {
        segments.push(format!("v{}", version));
    }

    segments.push(public_id.trim_start_matches('/').to_string());
    segments.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> OptionMap {
        serde_json::from_value(value).unwrap()
    }

    const BASE: &str = "https://res.cloudinary.com";

    #[test]
    fn test_component_sorted_by_short_name() {
        let options = map(json!({"width": 600, "crop": "scale", "quality": "auto", "folder": "x"}));
        assert_eq!(component(&options), "c_scale,q_auto,w_600");
    }

    #[test]
    fn test_component_flags_joined_with_dot() {
        let options = map(json!({"flags": ["progressive", "lossy"]}));
        assert_eq!(component(&options), "fl_progressive.lossy");
    }

    #[test]
    fn test_render_chained() {
        let value = json!([{"width": 100, "crop": "fill"}, "e_sepia", {}]);
        assert_eq!(render(&value), "c_fill,w_100/e_sepia");
    }

    #[test]
    fn test_delivery_url_plain() {
        let url = delivery_url(BASE, "demo", "blog/cat.jpg", &OptionMap::new());
        assert_eq!(url, "https://res.cloudinary.com/demo/image/upload/blog/cat.jpg");
    }

    #[test]
    fn test_delivery_url_with_transformations_and_version() {
        let options = map(json!({
            "transformation": {"effect": "grayscale"},
            "fetch_format": "auto",
            "quality": "auto",
            "version": 1712000000
        }));
        let url = delivery_url(BASE, "demo", "cat.jpg", &options);
        assert_eq!(
            url,
            "https://res.cloudinary.com/demo/image/upload/e_grayscale/f_auto,q_auto/v1712000000/cat.jpg"
        );
    }

    #[test]
    fn test_delivery_url_insecure() {
        let options = map(json!({"secure": false, "type": "private"}));
        let url = delivery_url(BASE, "demo", "cat.jpg", &options);
        assert_eq!(url, "http://res.cloudinary.com/demo/image/private/cat.jpg");
    }
}
