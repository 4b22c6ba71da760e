//! Per-subsystem collection: the SOAP phase fetches the method list and the
//! WSDL of every method, the REST phase fetches the service list and the
//! OpenAPI description of every service. Documents flow into storage as they
//! arrive; a timed-out description fetch arms a latch that skips the
//! remaining descriptions of the same subsystem.

use std::collections::BTreeMap;
use std::sync::Arc;

use models::{Method, Service, ServiceId, Status, Subsystem, SubsystemId};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;
use storage::{DocExt, DocType, Storage};
use xroad::{Api, OpenapiFormat};

/// Escapes everything a URL path treats specially, leaving `/` intact.
const QUOTE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~')
    .remove(b'/');

fn quote(name: &str) -> String {
    utf8_percent_encode(name, QUOTE).to_string()
}

pub struct Processor {
    api: Arc<dyn Api>,
    storage: Arc<dyn Storage>,
    wsdl_replaces: Vec<(Regex, String)>,
}

impl Processor {
    pub fn new(
        api: Arc<dyn Api>,
        storage: Arc<dyn Storage>,
        wsdl_replaces: Vec<(Regex, String)>,
    ) -> Self {
        Self {
            api,
            storage,
            wsdl_replaces,
        }
    }

    /// Collect one subsystem. Client errors become per-item statuses;
    /// storage errors abort the subsystem and bubble up to the worker.
    pub async fn process(&self, subsystem: &SubsystemId) -> Result<Subsystem, storage::Error> {
        let path = subsystem.path();
        let (methods_status, methods) = self.process_methods(subsystem, &path).await?;
        let (services_status, services) = self.process_services(subsystem, &path).await?;

        Ok(Subsystem::new(
            subsystem,
            methods_status,
            // The accumulator is keyed by the full method path, so values
            // come out sorted by service code and version.
            methods.into_values().collect(),
            services_status,
            services,
        ))
    }

    /// Replace dynamically generated fragments (embedded generation
    /// timestamps) so that they do not defeat document deduplication.
    fn prepare_wsdl(&self, wsdl: &str) -> String {
        let mut wsdl = wsdl.to_string();
        for (pattern, replacement) in &self.wsdl_replaces {
            wsdl = pattern.replace_all(&wsdl, replacement.as_str()).into_owned();
        }
        wsdl
    }

    fn method_item(method: &ServiceId, status: Status, wsdl: String, hash: String) -> Method {
        Method {
            service_code: method.service_code.clone(),
            service_version: method.service_version.clone().unwrap_or_default(),
            status,
            wsdl,
            hash,
        }
    }

    /// If `status == Ok` and `openapi` is empty, this is a REST service that
    /// does not advertise a description and `endpoints` is empty. If `status
    /// == Ok` and `openapi` is set, at least one endpoint is present. Any
    /// problem with the service is a non-`Ok` status.
    fn service_item(
        service: &ServiceId,
        status: Status,
        openapi: String,
        hash: String,
        endpoints: Vec<models::Endpoint>,
    ) -> Service {
        Service {
            service_code: service.service_code.clone(),
            status,
            openapi,
            hash,
            endpoints,
        }
    }

    async fn process_methods(
        &self,
        subsystem: &SubsystemId,
        subsystem_path: &str,
    ) -> Result<(Status, BTreeMap<String, Method>), storage::Error> {
        let (wsdl_path, mut hashes) = self
            .storage
            .subsystem_state(subsystem_path, DocType::Wsdl)
            .await?;

        let mut method_index: BTreeMap<String, Method> = BTreeMap::new();
        let mut skip_methods = false;

        let mut methods = match self.api.list_methods(subsystem).await {
            Ok(methods) => methods,
            Err(err) if err.is_timeout() => {
                tracing::info!("SOAP: {}: {}", subsystem_path, err);
                return Ok((Status::Timeout, method_index));
            }
            Err(err) => {
                tracing::info!("SOAP: {}: {}", subsystem_path, err);
                return Ok((Status::Error, method_index));
            }
        };
        methods.sort();

        for method in methods {
            let method_name = method.path();
            if method_index.contains_key(&method_name) {
                // Method was already found in a previously fetched WSDL.
                continue;
            }

            if skip_methods {
                // Skipping, because a previous getWsdl request timed out.
                tracing::info!("SOAP: {} - SKIPPING", method_name);
                method_index.insert(
                    method_name,
                    Self::method_item(&method, Status::Skipped, String::new(), String::new()),
                );
                continue;
            }

            let wsdl = match self.api.wsdl(&method).await {
                Ok(wsdl) => wsdl,
                Err(err) if err.is_timeout() => {
                    // Skip all following requests to this subsystem.
                    skip_methods = true;
                    tracing::info!("SOAP: {} - TIMEOUT", method_name);
                    method_index.insert(
                        method_name,
                        Self::method_item(&method, Status::Timeout, String::new(), String::new()),
                    );
                    continue;
                }
                Err(err) => {
                    tracing::info!("SOAP: {}: {}", method_name, err);
                    method_index.insert(
                        method_name,
                        Self::method_item(&method, Status::Error, String::new(), String::new()),
                    );
                    continue;
                }
            };

            let wsdl = self.prepare_wsdl(&wsdl);
            let (doc_name, doc_hash) = self
                .storage
                .save_doc(&wsdl_path, &mut hashes, wsdl.as_bytes(), DocExt::Wsdl, None)
                .await?;

            match xroad::wsdl_methods(&wsdl) {
                Ok(operations) => {
                    let mut txt = format!("SOAP: {doc_name}");
                    for (service_code, service_version) in operations {
                        // One WSDL regularly advertises several methods.
                        let wsdl_method = ServiceId::new(
                            subsystem.clone(),
                            service_code,
                            Some(service_version),
                        );
                        let wsdl_method_name = wsdl_method.path();
                        txt.push_str(&format!("\n    {wsdl_method_name}"));
                        method_index.insert(
                            wsdl_method_name,
                            Self::method_item(
                                &wsdl_method,
                                Status::Ok,
                                quote(&doc_name),
                                doc_hash.clone(),
                            ),
                        );
                    }
                    tracing::info!("{}", txt);
                }
                Err(err) => {
                    tracing::info!("SOAP: {doc_name}\nWSDL parsing failed: {err}");
                    method_index.insert(
                        method_name.clone(),
                        Self::method_item(&method, Status::Error, String::new(), String::new()),
                    );
                }
            }

            if !method_index.contains_key(&method_name) {
                tracing::warn!("SOAP: {} - method was not found in returned WSDL", method_name);
                method_index.insert(
                    method_name,
                    Self::method_item(&method, Status::Error, String::new(), String::new()),
                );
            }
        }

        self.storage
            .save_subsystem_state(&wsdl_path, &hashes, DocType::Wsdl)
            .await?;

        Ok((Status::Ok, method_index))
    }

    async fn process_services(
        &self,
        subsystem: &SubsystemId,
        subsystem_path: &str,
    ) -> Result<(Status, Vec<Service>), storage::Error> {
        let (openapi_path, mut hashes) = self
            .storage
            .subsystem_state(subsystem_path, DocType::Openapi)
            .await?;

        let mut results: Vec<Service> = Vec::new();
        let mut skip_services = false;

        let mut services = match self.api.list_services(subsystem).await {
            Ok(services) => services,
            Err(err) if err.is_timeout() => {
                tracing::info!("REST: {}: {}", subsystem_path, err);
                return Ok((Status::Timeout, results));
            }
            Err(err) => {
                tracing::info!("REST: {}: {}", subsystem_path, err);
                return Ok((Status::Error, results));
            }
        };
        services.sort();

        for service in services {
            let service_name = service.path();

            if skip_services {
                // Skipping, because a previous getOpenAPI request timed out.
                tracing::info!("REST: {} - SKIPPING", service_name);
                results.push(Self::service_item(
                    &service,
                    Status::Skipped,
                    String::new(),
                    String::new(),
                    Vec::new(),
                ));
                continue;
            }

            let openapi = match self.api.openapi(&service).await {
                Ok(openapi) => openapi,
                Err(err) if err.is_timeout() => {
                    // Skip all following requests to this subsystem.
                    skip_services = true;
                    tracing::info!("REST: {} - TIMEOUT", service_name);
                    results.push(Self::service_item(
                        &service,
                        Status::Timeout,
                        String::new(),
                        String::new(),
                        Vec::new(),
                    ));
                    continue;
                }
                Err(xroad::Error::NotOpenapiService) => {
                    // A REST service without a description is still valid.
                    results.push(Self::service_item(
                        &service,
                        Status::Ok,
                        String::new(),
                        String::new(),
                        Vec::new(),
                    ));
                    continue;
                }
                Err(err) => {
                    tracing::info!("REST: {}: {}", service_name, err);
                    results.push(Self::service_item(
                        &service,
                        Status::Error,
                        String::new(),
                        String::new(),
                        Vec::new(),
                    ));
                    continue;
                }
            };

            let (endpoints, format) = match xroad::load_openapi(&openapi)
                .and_then(|(value, format)| Ok((xroad::openapi_endpoints(&value)?, format)))
            {
                Ok(parsed) => parsed,
                Err(err) => {
                    tracing::info!("REST: {}: {}", service_name, err);
                    results.push(Self::service_item(
                        &service,
                        Status::Error,
                        String::new(),
                        String::new(),
                        Vec::new(),
                    ));
                    continue;
                }
            };
            let ext = match format {
                OpenapiFormat::Yaml => DocExt::Yaml,
                OpenapiFormat::Json => DocExt::Json,
            };

            let (doc_name, doc_hash) = self
                .storage
                .save_doc(
                    &openapi_path,
                    &mut hashes,
                    openapi.as_bytes(),
                    ext,
                    Some(&service.service_code),
                )
                .await?;

            results.push(Self::service_item(
                &service,
                Status::Ok,
                quote(&doc_name),
                doc_hash,
                endpoints,
            ));
        }

        self.storage
            .save_subsystem_state(&openapi_path, &hashes, DocType::Openapi)
            .await?;

        Ok((Status::Ok, results))
    }
}
