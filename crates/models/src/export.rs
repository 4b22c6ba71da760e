//! JSON shapes of the catalogue snapshot. The exported field names and the
//! `subsystemStatus` mapping predate REST support and are kept for backwards
//! compatibility with the catalogue web UI, which does not know `TIMEOUT`.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::catalogue::{Endpoint, Method, Service, Status, Subsystem};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodEntry {
    pub service_code: String,
    pub service_version: String,
    pub method_status: Status,
    pub wsdl: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEntry {
    pub service_code: String,
    pub status: Status,
    pub openapi: String,
    pub endpoints: Vec<Endpoint>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubsystemEntry {
    pub x_road_instance: String,
    pub member_class: String,
    pub member_code: String,
    pub subsystem_code: String,
    pub subsystem_status: Status,
    pub services_status: Status,
    pub methods: Vec<MethodEntry>,
    pub services: Vec<ServiceEntry>,
}

fn export_status(status: Status) -> Status {
    if status.is_ok() {
        Status::Ok
    } else {
        Status::Error
    }
}

fn export_method(method: &Method, path: &str) -> MethodEntry {
    MethodEntry {
        service_code: method.service_code.clone(),
        service_version: method.service_version.clone(),
        method_status: method.status,
        wsdl: if method.wsdl.is_empty() {
            String::new()
        } else {
            format!("{}/{}", path, method.wsdl)
        },
    }
}

fn export_service(service: &Service, path: &str) -> ServiceEntry {
    ServiceEntry {
        service_code: service.service_code.clone(),
        status: service.status,
        openapi: if service.openapi.is_empty() {
            String::new()
        } else {
            format!("{}/{}", path, service.openapi)
        },
        endpoints: service.endpoints.clone(),
    }
}

fn export_subsystem(subsystem: &Subsystem) -> SubsystemEntry {
    SubsystemEntry {
        x_road_instance: subsystem.x_road_instance.clone(),
        member_class: subsystem.member_class.clone(),
        member_code: subsystem.member_code.clone(),
        subsystem_code: subsystem.subsystem_code.clone(),
        subsystem_status: export_status(subsystem.methods_status),
        services_status: export_status(subsystem.services_status),
        methods: subsystem
            .methods
            .iter()
            .map(|method| export_method(method, &subsystem.path))
            .collect(),
        services: subsystem
            .services
            .iter()
            .map(|service| export_service(service, &subsystem.path))
            .collect(),
    }
}

/// Build the snapshot array from collected results. The map is keyed by
/// subsystem path, so iteration yields the lexicographic snapshot order.
pub fn snapshot(results: &BTreeMap<String, Subsystem>) -> Vec<SubsystemEntry> {
    results.values().map(export_subsystem).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::SubsystemId;
    use pretty_assertions::assert_eq;

    fn subsystem() -> Subsystem {
        let id = SubsystemId::new("XTEE", "GOV", "123", "sub");
        Subsystem::new(
            &id,
            Status::Ok,
            vec![
                Method {
                    service_code: "getData".to_string(),
                    service_version: "v1".to_string(),
                    status: Status::Ok,
                    wsdl: "0.wsdl".to_string(),
                    hash: "d41d8cd98f00b204e9800998ecf8427e".to_string(),
                },
                Method {
                    service_code: "slow".to_string(),
                    service_version: "v1".to_string(),
                    status: Status::Timeout,
                    wsdl: String::new(),
                    hash: String::new(),
                },
            ],
            Status::Timeout,
            vec![Service {
                service_code: "pets".to_string(),
                status: Status::Ok,
                openapi: String::new(),
                hash: String::new(),
                endpoints: Vec::new(),
            }],
        )
    }

    #[test]
    fn export_shape() {
        let mut results = BTreeMap::new();
        let subsystem = subsystem();
        results.insert(subsystem.path.clone(), subsystem);

        let value = serde_json::to_value(snapshot(&results)).unwrap();
        assert_eq!(
            value,
            serde_json::json!([{
                "xRoadInstance": "XTEE",
                "memberClass": "GOV",
                "memberCode": "123",
                "subsystemCode": "sub",
                "subsystemStatus": "OK",
                "servicesStatus": "ERROR",
                "methods": [
                    {
                        "serviceCode": "getData",
                        "serviceVersion": "v1",
                        "methodStatus": "OK",
                        "wsdl": "XTEE/GOV/123/sub/0.wsdl",
                    },
                    {
                        "serviceCode": "slow",
                        "serviceVersion": "v1",
                        "methodStatus": "TIMEOUT",
                        "wsdl": "",
                    },
                ],
                "services": [{
                    "serviceCode": "pets",
                    "status": "OK",
                    "openapi": "",
                    "endpoints": [],
                }],
            }])
        );
    }

    #[test]
    fn timeout_downgrades_to_error_for_the_ui() {
        let id = SubsystemId::new("XTEE", "GOV", "123", "sub");
        let subsystem = Subsystem::new(&id, Status::Timeout, vec![], Status::Ok, vec![]);
        let entry = export_subsystem(&subsystem);
        assert_eq!(entry.subsystem_status, Status::Error);
        assert_eq!(entry.services_status, Status::Ok);
    }
}
