//! Content-addressed naming of service description documents.
//!
//! Documents are deduplicated by the MD5 of their (already normalized) bytes
//! and named with a per-subsystem monotonic counter: `<N>.wsdl` for WSDL,
//! `<serviceCode>_<N>.{yaml,json}` for OpenAPI. The `yaml` and `json`
//! variants of one service share the counter, so they cannot collide.

use std::collections::BTreeMap;

use lazy_static::lazy_static;
use regex::Regex;

use crate::{DocExt, DocType, Error};

/// Filename-to-MD5 map for one subsystem directory and document type,
/// persisted as the `_wsdl_hashes` / `_openapi_hashes` sidecar.
pub type HashIndex = BTreeMap<String, String>;

lazy_static! {
    static ref WSDL_DOC: Regex = Regex::new(r"^(\d+)\.wsdl$").unwrap();
    static ref OPENAPI_DOC: Regex = Regex::new(r"^.+_(\d+)\.(yaml|json)$").unwrap();
}

pub fn md5_hex(bytes: &[u8]) -> String {
    format!("{:x}", md5::compute(bytes))
}

/// Whether `file_name` looks like a stored document of `doc_type`.
/// Catalogue snapshots at the storage root are never documents, even though
/// `index_<timestamp>.json` matches the OpenAPI name shape.
pub fn matches_doc(file_name: &str, doc_type: DocType) -> bool {
    if crate::history::report_time(file_name).is_some() {
        return false;
    }
    match doc_type {
        DocType::Wsdl => WSDL_DOC.is_match(file_name),
        DocType::Openapi => OPENAPI_DOC.is_match(file_name),
    }
}

/// Where a candidate document should go.
#[derive(Debug, PartialEq, Eq)]
pub enum Placement {
    /// An identical document is already stored under this name.
    Existing(String),
    /// No match; write the document under this new name.
    New(String),
}

/// Decide the filename for a document with hash `doc_hash`, scanning the
/// current index for entries whose name matches the requested extension (and
/// service, for OpenAPI). A hash match short-circuits to the existing file;
/// otherwise the next free counter value is assigned.
pub fn place(
    hashes: &HashIndex,
    doc_hash: &str,
    ext: DocExt,
    service_name: Option<&str>,
) -> Result<Placement, Error> {
    let pattern = match ext {
        DocExt::Wsdl => WSDL_DOC.clone(),
        DocExt::Yaml | DocExt::Json => {
            let service = service_name.ok_or_else(|| {
                Error::Invalid("OpenAPI documents require a service name".to_string())
            })?;
            Regex::new(&format!(
                r"^{}_(\d+)\.(yaml|json)$",
                regex::escape(service)
            ))
            .map_err(|err| Error::Invalid(format!("bad service name pattern: {err}")))?
        }
    };

    let mut max_doc: i64 = -1;
    for (file_name, file_hash) in hashes {
        let Some(captures) = pattern.captures(file_name) else {
            continue;
        };
        if doc_hash == file_hash {
            // Matching document found (both name pattern and hash).
            return Ok(Placement::Existing(file_name.clone()));
        }
        let id: i64 = captures[1]
            .parse()
            .map_err(|_| Error::Invalid(format!("bad document counter in {file_name:?}")))?;
        max_doc = max_doc.max(id);
    }

    let new_file = match ext {
        DocExt::Wsdl => format!("{}.wsdl", max_doc + 1),
        DocExt::Yaml | DocExt::Json => format!(
            "{}_{}.{}",
            service_name.unwrap_or_default(),
            max_doc + 1,
            ext.as_str()
        ),
    };
    Ok(Placement::New(new_file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn index(entries: &[(&str, &str)]) -> HashIndex {
        entries
            .iter()
            .map(|(name, hash)| (name.to_string(), hash.to_string()))
            .collect()
    }

    #[test]
    fn first_wsdl_gets_counter_zero() {
        let placement = place(&HashIndex::new(), "abc", DocExt::Wsdl, None).unwrap();
        assert_eq!(placement, Placement::New("0.wsdl".to_string()));
    }

    #[test]
    fn identical_hash_reuses_existing_file() {
        let hashes = index(&[("0.wsdl", "abc"), ("1.wsdl", "def")]);
        let placement = place(&hashes, "def", DocExt::Wsdl, None).unwrap();
        assert_eq!(placement, Placement::Existing("1.wsdl".to_string()));
    }

    #[test]
    fn counter_is_monotonic_over_matching_names_only() {
        let hashes = index(&[
            ("0.wsdl", "aa"),
            ("7.wsdl", "bb"),
            ("pets_3.json", "cc"),
            ("_wsdl_hashes", "not-a-doc"),
        ]);
        let placement = place(&hashes, "new", DocExt::Wsdl, None).unwrap();
        assert_eq!(placement, Placement::New("8.wsdl".to_string()));
    }

    #[test]
    fn yaml_and_json_share_one_counter_per_service() {
        let hashes = index(&[("pets_0.yaml", "aa"), ("pets_1.json", "bb")]);
        let placement = place(&hashes, "cc", DocExt::Yaml, Some("pets")).unwrap();
        assert_eq!(placement, Placement::New("pets_2.yaml".to_string()));

        // A different service starts its own counter.
        let placement = place(&hashes, "cc", DocExt::Json, Some("orders")).unwrap();
        assert_eq!(placement, Placement::New("orders_0.json".to_string()));
    }

    #[test]
    fn openapi_dedup_matches_across_formats() {
        let hashes = index(&[("pets_0.yaml", "aa")]);
        let placement = place(&hashes, "aa", DocExt::Json, Some("pets")).unwrap();
        assert_eq!(placement, Placement::Existing("pets_0.yaml".to_string()));
    }

    #[test]
    fn service_name_is_escaped_in_the_pattern() {
        let hashes = index(&[("a.b_0.json", "aa"), ("aXb_0.json", "bb")]);
        let placement = place(&hashes, "zz", DocExt::Json, Some("a.b")).unwrap();
        assert_eq!(placement, Placement::New("a.b_1.json".to_string()));
    }

    #[test]
    fn doc_matching_excludes_reports_and_sidecars() {
        assert!(matches_doc("0.wsdl", DocType::Wsdl));
        assert!(matches_doc("pets_12.yaml", DocType::Openapi));
        assert!(!matches_doc("_wsdl_hashes", DocType::Wsdl));
        assert!(!matches_doc("index_20240101000000.json", DocType::Openapi));
        assert!(!matches_doc("pets.json", DocType::Openapi));
    }
}
