//! High level content catalog client.
//!
//! Each operation issues one request through the [`Transport`] seam, hands
//! the raw XML body to the normalizer, and returns the resulting [`Value`]
//! (or a specific named field extracted from it). The transport owns the
//! sockets, the endpoints and the authentication parameters; this crate owns
//! the orchestration around it.
//!
//! ```rust,no_run
//! use medley::{ApiRequest, Client, MedleyError, Transport, Value};
//!
//! # struct HttpTransport;
//! # #[async_trait::async_trait]
//! # impl Transport for HttpTransport {
//! #     async fn fetch(&self, _request: &ApiRequest) -> Result<String, MedleyError> {
//! #         Ok(String::new())
//! #     }
//! # }
//! # async fn run() -> Result<(), MedleyError> {
//! let client = Client::new(HttpTransport);
//! let types = client.content_types().await?;
//! if let Value::List(items) = &types {
//!     println!("{} content types", items.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod link;
pub mod request;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

pub use link::DownloadLink;
pub use medley_core::{normalize, Fields, NormalizeError, Value, VALUE_KEY};
pub use medley_xml::{Element, ParseOptions, XmlError};
pub use request::{ApiRequest, Endpoint, TransportConfig};

/// Method names understood by the catalog web service.
pub mod methods {
    pub const CONTENT_TYPES: &str = "ContentTypes";
    pub const CATEGORIES: &str = "Categories";
    pub const CATEGORY_CONTENT: &str = "CategoryContent";
    pub const CONTENT_DETAILS: &str = "ContentDetails";
    pub const CONTENT_DETAILS_EXTENDED: &str = "ContentDetailsExtended";
    pub const NEW_CONTENT: &str = "NewContent";
    pub const GET_LINK: &str = "GetLink";
}

/// Response field names the operations extract.
pub mod keys {
    pub const CONTENT_TYPE: &str = "ContentType";
    pub const CATEGORY: &str = "category";
    pub const CONTENT: &str = "content";
}

/// Error type produced by the catalog client.
#[derive(Debug, Error)]
pub enum MedleyError {
    /// The response body could not be normalized.
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
    /// The transport failed to complete the request.
    #[error("transport: {0}")]
    Transport(String),
    /// An endpoint URL in the transport configuration is invalid.
    #[error("invalid endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
    /// The download link fragment could not be resolved.
    #[error("download link: {0}")]
    Link(String),
}

impl MedleyError {
    fn link<S: Into<String>>(msg: S) -> Self {
        MedleyError::Link(msg.into())
    }
}

/// Request issuing abstraction backed by HTTP or RPC implementations.
///
/// Implementations own endpoint selection, authentication parameters and
/// response format negotiation; [`TransportConfig::request_url`] builds the
/// full GET form of a request for implementations that want it. The client
/// never initiates network traffic itself and performs no retries: a
/// normalization failure would reproduce identically, and retrying the fetch
/// is the caller's decision.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue `request` and return the raw response body.
    async fn fetch(&self, request: &ApiRequest) -> Result<String, MedleyError>;
}

/// Content exclusivity filter forwarded to catalog listing calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Exclusivity {
    NonExclusive,
    Exclusive,
    /// Both exclusive and non-exclusive content.
    #[default]
    Any,
}

impl Exclusivity {
    fn as_param(self) -> &'static str {
        match self {
            Exclusivity::NonExclusive => "0",
            Exclusivity::Exclusive => "1",
            Exclusivity::Any => "2",
        }
    }
}

/// Catalog client facade combining a transport with the normalizer.
#[derive(Debug)]
pub struct Client<T: Transport> {
    transport: T,
    rows: u32,
    columns: u32,
    adult: bool,
    exclusivity: Exclusivity,
    options: ParseOptions,
}

impl<T: Transport> Client<T> {
    /// Create a new client over a transport.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            rows: 0,
            columns: 0,
            adult: false,
            exclusivity: Exclusivity::default(),
            options: ParseOptions::default(),
        }
    }

    /// Return a reference to the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Include adult content in listings.
    pub fn set_adult(&mut self, adult: bool) {
        self.adult = adult;
    }

    /// Restrict listings by content exclusivity.
    pub fn set_exclusivity(&mut self, exclusivity: Exclusivity) {
        self.exclusivity = exclusivity;
    }

    /// Paging shape for category content listings; zero means no paging.
    pub fn set_page_shape(&mut self, rows: u32, columns: u32) {
        self.rows = rows;
        self.columns = columns;
    }

    /// Bound the element nesting accepted from the service.
    ///
    /// Normalization recurses once per nesting level, so callers pointing the
    /// client at an untrusted service should set a limit. Unbounded by
    /// default.
    pub fn set_max_depth(&mut self, max_depth: Option<usize>) {
        self.options.max_depth = max_depth;
    }

    /// Retrieve all content types available for the site.
    pub async fn content_types(&self) -> Result<Value, MedleyError> {
        let request = ApiRequest::catalog(methods::CONTENT_TYPES);
        self.fetch_field(request, keys::CONTENT_TYPE).await
    }

    /// Retrieve the categories of a content type.
    pub async fn categories_for_content_type(
        &self,
        content_type_id: u32,
    ) -> Result<Value, MedleyError> {
        let request = ApiRequest::catalog(methods::CATEGORIES)
            .param("contenttypeid", content_type_id.to_string())
            .param("adult", flag(self.adult))
            .param("exclusive", self.exclusivity.as_param());
        self.fetch_field(request, keys::CATEGORY).await
    }

    /// Retrieve the content items of a category, honouring the configured
    /// paging shape.
    pub async fn content_for_category(&self, category_id: u32) -> Result<Value, MedleyError> {
        let request = ApiRequest::catalog(methods::CATEGORY_CONTENT)
            .param("categoryid", category_id.to_string())
            .param("rows", self.rows.to_string())
            .param("columns", self.columns.to_string())
            .param("exclusive", self.exclusivity.as_param())
            .param("adult", flag(self.adult));
        self.fetch_field(request, keys::CONTENT).await
    }

    /// Retrieve the details of a single content item.
    pub async fn content_details(&self, content_id: u64) -> Result<Value, MedleyError> {
        let request = ApiRequest::catalog(methods::CONTENT_DETAILS)
            .param("contentid", content_id.to_string());
        self.fetch_field(request, keys::CONTENT).await
    }

    /// Retrieve extended details of a content item, optionally including
    /// translations. Returns the whole normalized response.
    pub async fn content_details_extended(
        &self,
        content_id: u64,
        include_translations: bool,
    ) -> Result<Value, MedleyError> {
        let request = ApiRequest::catalog(methods::CONTENT_DETAILS_EXTENDED)
            .param("contentid", content_id.to_string())
            .param("includetranslations", flag(include_translations));
        let fields = self.fetch_object(request).await?;
        Ok(Value::Object(fields))
    }

    /// Retrieve content added to a content type since `start_date`
    /// (`YYYY-MM-DD`), or all recent content when no date is given.
    pub async fn new_content(
        &self,
        content_type_id: u32,
        start_date: Option<&str>,
    ) -> Result<Value, MedleyError> {
        let mut request = ApiRequest::catalog(methods::NEW_CONTENT)
            .param("contenttypeid", content_type_id.to_string())
            .param("exclusive", self.exclusivity.as_param());
        if let Some(date) = start_date {
            request = request.param("startdate", date);
        }
        self.fetch_field(request, keys::CONTENT).await
    }

    /// Resolve the delivery link of a content item via the download link
    /// service.
    pub async fn download_link(&self, content_id: u64) -> Result<DownloadLink, MedleyError> {
        let request =
            ApiRequest::download(methods::GET_LINK).param("contentid", content_id.to_string());
        info!(method = request.method, content_id, "resolving download link");
        let body = self.transport.fetch(&request).await?;
        link::parse_fragment(&body)
    }

    async fn fetch_object(&self, request: ApiRequest) -> Result<Fields, MedleyError> {
        info!(method = request.method, "catalog request");
        let body = self.transport.fetch(&request).await?;
        debug!(method = request.method, bytes = body.len(), "catalog response");
        Ok(medley_core::parse_with(&body, &self.options)?)
    }

    /// Extract `key` from the normalized response. When the answer lacks the
    /// key, the whole object is returned unchanged instead of failing.
    async fn fetch_field(&self, request: ApiRequest, key: &str) -> Result<Value, MedleyError> {
        let method = request.method;
        let mut fields = self.fetch_object(request).await?;
        match fields.remove(key) {
            Some(value) => Ok(value),
            None => {
                debug!(method, key, "expected field missing, returning whole object");
                Ok(Value::Object(fields))
            }
        }
    }
}

fn flag(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}
