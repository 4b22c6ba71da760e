//! OpenAPI document handling: format detection and endpoint extraction.

use models::Endpoint;

use crate::Error;

/// HTTP methods an OpenAPI path item can carry.
const HTTP_METHODS: [&str; 8] = [
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

/// Format the document was served in; it dictates the stored file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenapiFormat {
    Json,
    Yaml,
}

/// Parse an OpenAPI description, trying JSON first and YAML second.
pub fn load_openapi(doc: &str) -> Result<(serde_json::Value, OpenapiFormat), Error> {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(doc) {
        return Ok((value, OpenapiFormat::Json));
    }
    match serde_yaml::from_str::<serde_json::Value>(doc) {
        Ok(value) => Ok((value, OpenapiFormat::Yaml)),
        Err(err) => Err(Error::Parse(format!(
            "document is neither JSON nor YAML: {err}"
        ))),
    }
}

/// Endpoints advertised under `paths`. A parseable description that yields no
/// endpoints is broken, which is distinct from a service that advertises no
/// description at all.
pub fn openapi_endpoints(openapi: &serde_json::Value) -> Result<Vec<Endpoint>, Error> {
    let Some(paths) = openapi.get("paths").and_then(|paths| paths.as_object()) else {
        return Err(Error::Parse(
            "OpenAPI description has no paths object".to_string(),
        ));
    };

    let mut endpoints = Vec::new();
    for (path, item) in paths {
        let Some(item) = item.as_object() else {
            continue;
        };
        for (method, _) in item {
            if HTTP_METHODS.contains(&method.as_str()) {
                endpoints.push(Endpoint {
                    method: method.clone(),
                    path: path.clone(),
                });
            }
        }
    }

    if endpoints.is_empty() {
        return Err(Error::Parse(
            "OpenAPI description advertises no endpoints".to_string(),
        ));
    }
    Ok(endpoints)
}
