//! Client for the X-Road Security Server metaservices.
//!
//! The collection pipeline consumes the [`Api`] trait; [`Client`] is the
//! HTTP implementation talking to a local Security Server. The pure document
//! parsers ([`wsdl_methods`], [`load_openapi`], [`openapi_endpoints`],
//! [`registered_subsystems`]) are exposed as free functions.

mod client;
mod openapi;
mod sharedparams;
mod soap;
mod wsdl;

use models::{ServiceId, SubsystemId};

pub use client::{Client, ClientOptions, Verify};
pub use openapi::{load_openapi, openapi_endpoints, OpenapiFormat};
pub use sharedparams::registered_subsystems;
pub use wsdl::wsdl_methods;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("request timed out: {0}")]
    Timeout(String),
    /// The service exists but is not described by an OpenAPI document.
    /// Not a failure: such services are catalogued without a description.
    #[error("service does not have an OpenAPI description")]
    NotOpenapiService,
    #[error("HTTP request failed: {0}")]
    Http(String),
    #[error("security server fault: {0}")]
    Fault(String),
    #[error("cannot parse response: {0}")]
    Parse(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("client configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout(err.to_string())
        } else {
            Error::Http(err.to_string())
        }
    }
}

/// The Security Server operations the pipeline depends on. Splitting this
/// from [`Client`] keeps the pipeline testable against scripted responses.
#[async_trait::async_trait]
pub trait Api: Send + Sync {
    /// Download the shared parameters of the global configuration.
    async fn shared_params(&self) -> Result<String, Error>;

    /// SOAP `listMethods`: services offered by `producer`.
    async fn list_methods(&self, producer: &SubsystemId) -> Result<Vec<ServiceId>, Error>;

    /// REST `listMethods`: REST services offered by `producer`.
    async fn list_services(&self, producer: &SubsystemId) -> Result<Vec<ServiceId>, Error>;

    /// Fetch the WSDL describing a SOAP service.
    async fn wsdl(&self, service: &ServiceId) -> Result<String, Error>;

    /// Fetch the OpenAPI document describing a REST service.
    async fn openapi(&self, service: &ServiceId) -> Result<String, Error>;
}
