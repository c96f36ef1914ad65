//! Outbound request model and URL construction for GET style transports.

use url::Url;

use crate::MedleyError;

/// The only response format this client negotiates.
pub const FORMAT: &str = "XML";

/// Service endpoint a request is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// The main content catalog service.
    Catalog,
    /// The secondary download link service.
    DownloadLink,
}

/// A single outbound call: method name plus operation parameters.
///
/// Site identity, credentials and format negotiation are the transport's
/// business; [`TransportConfig::request_url`] appends them for transports
/// that issue plain GET requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    pub endpoint: Endpoint,
    pub method: &'static str,
    pub params: Vec<(&'static str, String)>,
}

impl ApiRequest {
    /// A request addressed to the catalog service.
    pub fn catalog(method: &'static str) -> Self {
        Self {
            endpoint: Endpoint::Catalog,
            method,
            params: Vec::new(),
        }
    }

    /// A request addressed to the download link service.
    pub fn download(method: &'static str) -> Self {
        Self {
            endpoint: Endpoint::DownloadLink,
            method,
            params: Vec::new(),
        }
    }

    /// Append an operation parameter.
    pub fn param(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.params.push((name, value.into()));
        self
    }
}

/// Transport construction settings.
///
/// Endpoints are explicit per-instance configuration; nothing in this
/// workspace holds a process wide default URL.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub catalog_endpoint: Url,
    pub link_endpoint: Url,
    pub username: String,
    pub password: String,
    pub site_id: String,
}

impl TransportConfig {
    pub fn new(
        catalog_endpoint: &str,
        link_endpoint: &str,
        username: impl Into<String>,
        password: impl Into<String>,
        site_id: impl Into<String>,
    ) -> Result<Self, MedleyError> {
        Ok(Self {
            catalog_endpoint: Url::parse(catalog_endpoint)?,
            link_endpoint: Url::parse(link_endpoint)?,
            username: username.into(),
            password: password.into(),
            site_id: site_id.into(),
        })
    }

    /// Full GET form of `request`: method and operation parameters first,
    /// then site identity, credentials and the response format.
    pub fn request_url(&self, request: &ApiRequest) -> Url {
        let mut url = match request.endpoint {
            Endpoint::Catalog => self.catalog_endpoint.clone(),
            Endpoint::DownloadLink => self.link_endpoint.clone(),
        };
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("method", request.method);
            for (name, value) in &request.params {
                query.append_pair(name, value);
            }
            query.append_pair("siteid", &self.site_id);
            query.append_pair("username", &self.username);
            query.append_pair("password", &self.password);
            query.append_pair("format", FORMAT);
        }
        url
    }
}
