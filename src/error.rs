use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// The OGC `exceptionCode` taxonomy used by `ows:ExceptionReport`.
///
/// Each variant maps to exactly one `exceptionCode` string and one HTTP
/// status. Client-fault codes are not logged; server-fault codes are logged
/// via `tracing::error!` before the response is built.
#[derive(Debug, Error)]
pub enum WfsError {
    #[error("operation parsing failed: {message}")]
    OperationParsingFailed { message: String, locator: Option<String> },

    #[error("invalid parameter value: {message}")]
    InvalidParameterValue { message: String, locator: Option<String> },

    #[error("missing parameter value: {0}")]
    MissingParameterValue(String),

    #[error("option not supported: {0}")]
    OptionNotSupported(String),

    #[error("operation not supported: {0}")]
    OperationNotSupported(String),

    #[error("version negotiation failed: {0}")]
    VersionNegotiationFailed(String),

    #[error("no applicable code: {0}")]
    NoApplicableCode(String),

    /// `GetFeatureById` with a malformed or nonexistent id, under the
    /// CITE-compat 404 behavior (disabled by `WfsStrictStandard`). Carries
    /// the same `exceptionCode` as `InvalidParameterValue` but a different
    /// HTTP status.
    #[error("feature id not found: {0}")]
    FeatureIdNotFound(String),

    #[error("processing failed: {0}")]
    ProcessingFailed(String),

    #[error("datastore error: {0}")]
    Datastore(#[from] crate::datastore::DatastoreError),

    #[error("xml parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WfsError {
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        WfsError::InvalidParameterValue { message: message.into(), locator: None }
    }

    pub fn invalid_parameter_at(message: impl Into<String>, locator: impl Into<String>) -> Self {
        WfsError::InvalidParameterValue { message: message.into(), locator: Some(locator.into()) }
    }

    pub fn parsing_failed(message: impl Into<String>) -> Self {
        WfsError::OperationParsingFailed { message: message.into(), locator: None }
    }

    pub fn parsing_failed_at(message: impl Into<String>, locator: impl Into<String>) -> Self {
        WfsError::OperationParsingFailed { message: message.into(), locator: Some(locator.into()) }
    }

    pub fn processing_failed(message: impl Into<String>) -> Self {
        WfsError::ProcessingFailed(message.into())
    }

    /// The OGC `exceptionCode` string for this error.
    pub fn exception_code(&self) -> &'static str {
        match self {
            WfsError::OperationParsingFailed { .. } => "OperationParsingFailed",
            WfsError::InvalidParameterValue { .. } => "InvalidParameterValue",
            WfsError::MissingParameterValue(_) => "MissingParameterValue",
            WfsError::OptionNotSupported(_) => "OptionNotSupported",
            WfsError::OperationNotSupported(_) => "OperationNotSupported",
            WfsError::VersionNegotiationFailed(_) => "VersionNegotiationFailed",
            WfsError::NoApplicableCode(_) => "NoApplicableCode",
            WfsError::FeatureIdNotFound(_) => "InvalidParameterValue",
            WfsError::ProcessingFailed(_) => "ProcessingFailed",
            WfsError::Datastore(_) => "ProcessingFailed",
            WfsError::Xml(_) => "OperationParsingFailed",
            WfsError::Serialization(_) => "ProcessingFailed",
        }
    }

    pub fn locator(&self) -> Option<&str> {
        match self {
            WfsError::OperationParsingFailed { locator, .. } => locator.as_deref(),
            WfsError::InvalidParameterValue { locator, .. } => locator.as_deref(),
            _ => None,
        }
    }

    fn http_status(&self) -> StatusCode {
        match self {
            WfsError::OperationParsingFailed { .. }
            | WfsError::InvalidParameterValue { .. }
            | WfsError::MissingParameterValue(_)
            | WfsError::OptionNotSupported(_)
            | WfsError::OperationNotSupported(_)
            | WfsError::VersionNegotiationFailed(_)
            | WfsError::Xml(_) => StatusCode::BAD_REQUEST,
            WfsError::FeatureIdNotFound(_) => StatusCode::NOT_FOUND,
            WfsError::NoApplicableCode(_)
            | WfsError::ProcessingFailed(_)
            | WfsError::Datastore(_)
            | WfsError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Render this error as an `ows:ExceptionReport` XML document.
    pub fn to_exception_report(&self) -> String {
        if self.http_status() == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(code = self.exception_code(), "{self}");
        }
        let locator_attr = self
            .locator()
            .map(|l| format!(" locator=\"{}\"", xml_escape(l)))
            .unwrap_or_default();
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <ows:ExceptionReport xmlns:ows=\"http://www.opengis.net/ows/1.1\" version=\"2.0.0\">\n\
             \x20\x20<ows:Exception exceptionCode=\"{}\"{}>\n\
             \x20\x20\x20\x20<ows:ExceptionText>{}</ows:ExceptionText>\n\
             \x20\x20</ows:Exception>\n\
             </ows:ExceptionReport>",
            self.exception_code(),
            locator_attr,
            xml_escape(&self.to_string()),
        )
    }
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

impl IntoResponse for WfsError {
    fn into_response(self) -> Response {
        let status = self.http_status();
        let body = self.to_exception_report();
        (status, [("content-type", "text/xml")], body).into_response()
    }
}

pub type WfsResult<T> = Result<T, WfsError>;
