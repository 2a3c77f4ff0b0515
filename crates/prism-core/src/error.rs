//! Error types for Prism

use thiserror::Error;

use crate::utils::xml_escape;

pub type Result<T> = std::result::Result<T, Error>;

/// Client-facing errors, rendered as S3 error documents
#[derive(Error, Debug)]
pub enum Error {
    #[error("The specified bucket does not have a notification configuration: {0}")]
    NoSuchNotificationConfiguration(String),

    #[error("Invalid bucket name: {0}")]
    InvalidBucketName(String),

    #[error("Malformed XML: {0}")]
    MalformedXML(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Storage backend unavailable: {0}")]
    Backend(String),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn code(&self) -> &'static str {
        match self {
            Error::NoSuchNotificationConfiguration(_) => "NoSuchConfiguration",
            Error::InvalidBucketName(_) => "InvalidBucketName",
            Error::MalformedXML(_) => "MalformedXML",
            Error::InvalidArgument(_) | Error::Configuration(_) => "InvalidArgument",
            Error::InvalidRequest(_) => "InvalidRequest",
            Error::Backend(_) => "ServiceUnavailable",
            Error::NotImplemented(_) => "NotImplemented",
            Error::InternalError(_) | Error::Io(_) | Error::Other(_) => "InternalError",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Error::InvalidBucketName(_)
            | Error::MalformedXML(_)
            | Error::InvalidArgument(_)
            | Error::InvalidRequest(_)
            | Error::Configuration(_) => 400,

            Error::NoSuchNotificationConfiguration(_) => 404,

            Error::NotImplemented(_) => 501,

            Error::Backend(_) => 502,

            _ => 500,
        }
    }
}

/// Invalid notification configuration content.
///
/// Raised when a configuration is attached to a bucket, never swallowed while
/// evaluating events.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("expected FilterRule name to be prefix or suffix but was {0:?}")]
    UnknownFilterRule(String),
}

/// S3 Error Response
#[derive(Debug, Clone)]
pub struct S3Error {
    pub code: String,
    pub message: String,
    pub resource: Option<String>,
    pub request_id: String,
}

impl From<Error> for S3Error {
    fn from(err: Error) -> Self {
        S3Error {
            code: err.code().to_string(),
            message: err.to_string(),
            resource: None,
            request_id: String::new(),
        }
    }
}

impl S3Error {
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    pub fn to_xml(&self) -> String {
        let resource = self.resource.as_deref().unwrap_or("");
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<Error>
<Code>{}</Code>
<Message>{}</Message>
<Resource>{}</Resource>
<RequestId>{}</RequestId>
</Error>"#,
            xml_escape(&self.code),
            xml_escape(&self.message),
            xml_escape(resource),
            xml_escape(&self.request_id)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::NoSuchNotificationConfiguration("b".into()).http_status(), 404);
        assert_eq!(Error::InvalidArgument("x".into()).http_status(), 400);
        assert_eq!(
            Error::from(ConfigurationError::UnknownFilterRule("glob".into())).http_status(),
            400
        );
        assert_eq!(Error::InternalError("x".into()).http_status(), 500);
    }

    #[test]
    fn test_error_xml_is_escaped() {
        let xml = S3Error::from(Error::MalformedXML("<bad>".into()))
            .with_resource("/bucket")
            .with_request_id("REQ1")
            .to_xml();

        assert!(xml.contains("<Code>MalformedXML</Code>"));
        assert!(xml.contains("&lt;bad&gt;"));
        assert!(xml.contains("<Resource>/bucket</Resource>"));
        assert!(xml.contains("<RequestId>REQ1</RequestId>"));
    }
}
