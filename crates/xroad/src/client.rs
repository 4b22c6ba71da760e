//! HTTP client for a local Security Server.

use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use models::{ClientId, ServiceId, SubsystemId};
use serde::Deserialize;

use crate::{soap, Api, Error};

/// TLS verification of the Security Server certificate.
#[derive(Debug, Clone, Default)]
pub enum Verify {
    /// Verify against the platform trust roots.
    #[default]
    Default,
    /// Do not verify. Only sensible against localhost gateways.
    Disabled,
    /// Verify against the given CA bundle.
    CaBundle(PathBuf),
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Base URL of the local Security Server.
    pub server_url: String,
    /// Identifier the requests are made on behalf of.
    pub client: ClientId,
    /// Federation instance override; autodetected from the global
    /// configuration when absent.
    pub instance: Option<String>,
    pub timeout: Duration,
    pub verify: Verify,
    /// Mutual-TLS material as (certificate, key) PEM file paths.
    pub identity: Option<(PathBuf, PathBuf)>,
}

pub struct Client {
    http: reqwest::Client,
    base_url: String,
    client_id: ClientId,
    instance: Option<String>,
}

impl Client {
    pub fn new(options: ClientOptions) -> Result<Self, Error> {
        let mut builder = reqwest::Client::builder().timeout(options.timeout);
        match &options.verify {
            Verify::Default => {}
            Verify::Disabled => builder = builder.danger_accept_invalid_certs(true),
            Verify::CaBundle(path) => {
                let pem = std::fs::read(path)?;
                let certificate = reqwest::Certificate::from_pem(&pem)
                    .map_err(|err| Error::Config(format!("invalid CA bundle: {err}")))?;
                builder = builder.add_root_certificate(certificate);
            }
        }
        if let Some((cert_path, key_path)) = &options.identity {
            let mut pem = std::fs::read(cert_path)?;
            pem.extend(std::fs::read(key_path)?);
            let identity = reqwest::Identity::from_pem(&pem)
                .map_err(|err| Error::Config(format!("invalid client certificate: {err}")))?;
            builder = builder.identity(identity);
        }

        let base = url::Url::parse(&options.server_url)
            .map_err(|err| Error::Config(format!("invalid Security Server URL: {err}")))?;

        Ok(Self {
            http: builder.build()?,
            base_url: base.as_str().trim_end_matches('/').to_string(),
            client_id: options.client,
            instance: options.instance,
        })
    }

    /// POST a metaservice SOAP request to the producer subsystem.
    async fn soap_request(
        &self,
        producer: &SubsystemId,
        service_code: &str,
        body: &str,
    ) -> Result<reqwest::Response, Error> {
        tracing::debug!(producer = %producer, service_code, "SOAP metaservice request");
        let envelope = soap::request_envelope(&self.client_id, producer, service_code, body);
        let response = self
            .http
            .post(&self.base_url)
            .header(reqwest::header::CONTENT_TYPE, "text/xml; charset=utf-8")
            .body(envelope)
            .send()
            .await?;
        Ok(response)
    }

    fn rest_url(&self, producer: &SubsystemId, tail: &str) -> String {
        format!("{}/r1/{}/{}", self.base_url, producer.path(), tail)
    }

    /// GET a REST metaservice, surfacing X-Road error bodies.
    async fn rest_request(&self, url: String) -> Result<String, Error> {
        tracing::debug!(%url, "REST metaservice request");
        let response = self
            .http
            .get(&url)
            .header("X-Road-Client", self.client_id.path())
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if status.is_success() {
            return Ok(body);
        }
        Err(rest_error(status, &body))
    }
}

/// Error payload of the REST metaservices.
#[derive(Debug, Deserialize)]
struct RestErrorBody {
    #[serde(rename = "type")]
    error_type: Option<String>,
    message: Option<String>,
}

fn rest_error(status: reqwest::StatusCode, body: &str) -> Error {
    if let Ok(error) = serde_json::from_str::<RestErrorBody>(body) {
        let error_type = error.error_type.unwrap_or_default();
        let message = error.message.unwrap_or_default();
        // A SOAP service or a service registered without a description is
        // not an OpenAPI failure; the catalogue lists it without a document.
        if error_type.contains("WrongServiceType")
            || error_type.contains("ServiceDescriptionNotFound")
            || message.contains("OpenAPI")
        {
            return Error::NotOpenapiService;
        }
        if !message.is_empty() {
            return Error::Fault(format!("{error_type}: {message}"));
        }
    }
    Error::Http(format!("request failed with status {status}"))
}

#[derive(Debug, Deserialize)]
struct RestServiceList {
    #[serde(default)]
    service: Vec<RestService>,
}

#[derive(Debug, Deserialize)]
struct RestService {
    xroad_instance: String,
    member_class: String,
    member_code: String,
    subsystem_code: String,
    service_code: String,
}

#[async_trait::async_trait]
impl Api for Client {
    async fn shared_params(&self) -> Result<String, Error> {
        let url = format!("{}/verificationconf", self.base_url);
        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Http(format!(
                "verificationconf request failed with status {status}"
            )));
        }
        let bytes = response.bytes().await?;

        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes.as_ref()))
            .map_err(|err| Error::Parse(format!("verificationconf archive: {err}")))?;

        let instance = match &self.instance {
            Some(instance) => instance.clone(),
            None => {
                let mut identifier = String::new();
                archive
                    .by_name("verificationconf/instance-identifier")
                    .map_err(|err| Error::Parse(format!("verificationconf archive: {err}")))?
                    .read_to_string(&mut identifier)?;
                identifier.trim().to_string()
            }
        };

        let mut shared_params = String::new();
        archive
            .by_name(&format!("verificationconf/{instance}/shared-params.xml"))
            .map_err(|err| Error::Parse(format!("verificationconf archive: {err}")))?
            .read_to_string(&mut shared_params)?;
        Ok(shared_params)
    }

    async fn list_methods(&self, producer: &SubsystemId) -> Result<Vec<ServiceId>, Error> {
        let response = self
            .soap_request(producer, "listMethods", "<xrd:listMethods/>")
            .await?;
        let body = response.text().await?;
        soap::parse_service_list(&body)
    }

    async fn list_services(&self, producer: &SubsystemId) -> Result<Vec<ServiceId>, Error> {
        let body = self.rest_request(self.rest_url(producer, "listMethods")).await?;
        let list: RestServiceList = serde_json::from_str(&body)
            .map_err(|err| Error::Parse(format!("REST listMethods response: {err}")))?;
        Ok(list
            .service
            .into_iter()
            .map(|service| {
                ServiceId::new(
                    SubsystemId::new(
                        service.xroad_instance,
                        service.member_class,
                        service.member_code,
                        service.subsystem_code,
                    ),
                    service.service_code,
                    None,
                )
            })
            .collect())
    }

    async fn wsdl(&self, service: &ServiceId) -> Result<String, Error> {
        let version = match &service.service_version {
            Some(version) if !version.is_empty() => {
                format!("<xrd:serviceVersion>{version}</xrd:serviceVersion>")
            }
            _ => String::new(),
        };
        let body = format!(
            "<xrd:getWsdl><xrd:serviceCode>{}</xrd:serviceCode>{}</xrd:getWsdl>",
            quick_xml::escape::escape(&service.service_code),
            version,
        );
        let response = self
            .soap_request(&service.subsystem, "getWsdl", &body)
            .await?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let bytes = response.bytes().await?;
        soap::extract_wsdl(&content_type, &bytes)
    }

    async fn openapi(&self, service: &ServiceId) -> Result<String, Error> {
        let url = format!(
            "{}?serviceCode={}",
            self.rest_url(&service.subsystem, "getOpenAPI"),
            service.service_code,
        );
        self.rest_request(url).await
    }
}
