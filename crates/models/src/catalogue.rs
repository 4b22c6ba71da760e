use serde::{Deserialize, Serialize};

use crate::identifier::SubsystemId;

/// Outcome of collecting one item (a method list, a single WSDL, a single
/// OpenAPI document). `SKIPPED` is only ever produced by the timeout latch:
/// once one description fetch times out, the remaining descriptions of the
/// same subsystem are not attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Ok,
    Skipped,
    Timeout,
    Error,
}

impl Status {
    pub fn is_ok(&self) -> bool {
        matches!(self, Status::Ok)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub method: String,
    pub path: String,
}

/// A SOAP method discovered through `listMethods` or inside a fetched WSDL.
/// `wsdl` is the document filename relative to the subsystem directory, or
/// empty when no document was stored for this method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Method {
    pub service_code: String,
    pub service_version: String,
    pub status: Status,
    pub wsdl: String,
    pub hash: String,
}

/// A REST service discovered through the REST `listMethods` metaservice.
/// `status == Ok` with an empty `openapi` marks a service that advertises no
/// description document; with a non-empty `openapi` at least one endpoint is
/// present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub service_code: String,
    pub status: Status,
    pub openapi: String,
    pub hash: String,
    pub endpoints: Vec<Endpoint>,
}

/// Aggregated collection result for one subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subsystem {
    pub path: String,
    pub x_road_instance: String,
    pub member_class: String,
    pub member_code: String,
    pub subsystem_code: String,
    pub methods_status: Status,
    pub services_status: Status,
    pub methods: Vec<Method>,
    pub services: Vec<Service>,
}

impl Subsystem {
    pub fn new(
        id: &SubsystemId,
        methods_status: Status,
        methods: Vec<Method>,
        services_status: Status,
        services: Vec<Service>,
    ) -> Self {
        Self {
            path: id.path(),
            x_road_instance: id.x_road_instance.clone(),
            member_class: id.member_class.clone(),
            member_code: id.member_code.clone(),
            subsystem_code: id.subsystem_code.clone(),
            methods_status,
            services_status,
            methods,
            services,
        }
    }

    /// Record for a subsystem whose processing failed outside of the normal
    /// per-item outcome tagging, keeping the snapshot complete.
    pub fn failed(id: &SubsystemId) -> Self {
        Self::new(id, Status::Error, Vec::new(), Status::Error, Vec::new())
    }
}
