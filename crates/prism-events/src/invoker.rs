//! Notification targets
//!
//! An [`Invoker`] delivers one event to one target. [`HttpInvoker`] understands
//! two kinds of target reference:
//! - Lambda function ARNs, invoked asynchronously through a Lambda-compatible
//!   endpoint with a signed `Invoke` call
//! - plain `http://` or `https://` URLs, which receive the event as a webhook

use async_trait::async_trait;
use chrono::Utc;
use prism_auth::{canonical_uri, Credentials, RequestSigner};
use prism_core::config::{AwsConfig, NotificationsConfig};
use prism_core::types::{NotificationEvent, S3EventMessage, S3EventRecord};
use prism_core::utils::lambda_function_name;
use prism_crypto::sha256_hash;
use reqwest::Client;
use std::collections::BTreeMap;
use tracing::debug;
use url::Url;

use crate::error::InvokeError;

/// Lambda invocation API version
const LAMBDA_API_VERSION: &str = "2015-03-31";

/// Delivers an event to a single target
#[async_trait]
pub trait Invoker: Send + Sync {
    async fn invoke(
        &self,
        configuration_id: &str,
        target: &str,
        event: &NotificationEvent,
    ) -> Result<(), InvokeError>;
}

/// Where a target reference points
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Lambda { function: String },
    Webhook(Url),
}

impl Destination {
    pub fn resolve(target: &str) -> Result<Self, InvokeError> {
        if let Some(function) = lambda_function_name(target) {
            return Ok(Destination::Lambda {
                function: function.to_string(),
            });
        }

        if target.starts_with("http://") || target.starts_with("https://") {
            let url = Url::parse(target).map_err(|e| InvokeError::InvalidEndpoint {
                endpoint: target.to_string(),
                reason: e.to_string(),
            })?;
            return Ok(Destination::Webhook(url));
        }

        Err(InvokeError::UnsupportedTarget(target.to_string()))
    }
}

/// HTTP invoker for Lambda functions and webhooks
pub struct HttpInvoker {
    client: Client,
    lambda_endpoint: Url,
    signer: RequestSigner,
    account_id: String,
}

impl HttpInvoker {
    pub fn new(config: &NotificationsConfig, aws: &AwsConfig) -> Result<Self, InvokeError> {
        let client = Client::builder()
            .timeout(config.invoke_timeout())
            .build()
            .map_err(|source| InvokeError::Transport {
                target: config.lambda_endpoint.clone(),
                source,
            })?;

        Self::with_client(client, config, aws)
    }

    pub fn with_client(
        client: Client,
        config: &NotificationsConfig,
        aws: &AwsConfig,
    ) -> Result<Self, InvokeError> {
        let lambda_endpoint =
            Url::parse(&config.lambda_endpoint).map_err(|e| InvokeError::InvalidEndpoint {
                endpoint: config.lambda_endpoint.clone(),
                reason: e.to_string(),
            })?;
        if lambda_endpoint.host_str().is_none() {
            return Err(InvokeError::InvalidEndpoint {
                endpoint: config.lambda_endpoint.clone(),
                reason: "missing host".to_string(),
            });
        }

        let signer = RequestSigner::new(
            Credentials::new(&config.lambda_access_key, &config.lambda_secret_key),
            &aws.region,
            "lambda",
        );

        Ok(Self {
            client,
            lambda_endpoint,
            signer,
            account_id: aws.account_id.clone(),
        })
    }

    /// URL of the `Invoke` call for a function
    pub fn invocation_url(&self, function: &str) -> Url {
        let mut url = self.lambda_endpoint.clone();
        url.set_path(&canonical_uri(&format!(
            "/{}/functions/{}/invocations",
            LAMBDA_API_VERSION, function
        )));
        url.set_query(None);
        url
    }

    async fn invoke_lambda(&self, function: &str, target: &str, body: Vec<u8>) -> Result<(), InvokeError> {
        let url = self.invocation_url(function);

        let mut headers = BTreeMap::new();
        headers.insert("host".to_string(), host_header(&url));
        headers.insert("content-type".to_string(), "application/json".to_string());
        headers.insert("x-amz-invocation-type".to_string(), "Event".to_string());

        let signature = self.signer.sign(
            "POST",
            url.path(),
            "",
            &mut headers,
            &sha256_hash(&body),
            Utc::now(),
        );

        let mut request = self.client.post(url.clone()).body(body);
        for (name, value) in headers.iter().filter(|(name, _)| name.as_str() != "host") {
            request = request.header(name.as_str(), value.as_str());
        }
        request = request.header("authorization", signature.authorization);

        debug!("Invoking {} at {}", target, url);
        self.send(request, target).await
    }

    async fn invoke_webhook(&self, url: Url, target: &str, body: Vec<u8>) -> Result<(), InvokeError> {
        let request = self
            .client
            .post(url)
            .header("content-type", "application/json")
            .body(body);

        debug!("Posting event to webhook {}", target);
        self.send(request, target).await
    }

    async fn send(&self, request: reqwest::RequestBuilder, target: &str) -> Result<(), InvokeError> {
        let response = request.send().await.map_err(|source| InvokeError::Transport {
            target: target.to_string(),
            source,
        })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(InvokeError::Status {
                target: target.to_string(),
                status: response.status().as_u16(),
            })
        }
    }
}

#[async_trait]
impl Invoker for HttpInvoker {
    async fn invoke(
        &self,
        configuration_id: &str,
        target: &str,
        event: &NotificationEvent,
    ) -> Result<(), InvokeError> {
        let record = S3EventRecord::from_event(event, configuration_id, self.signer.region())
            .with_principal(&self.account_id);
        let body = serde_json::to_vec(&S3EventMessage::single(record))?;

        match Destination::resolve(target)? {
            Destination::Lambda { function } => self.invoke_lambda(&function, target, body).await,
            Destination::Webhook(url) => self.invoke_webhook(url, target, body).await,
        }
    }
}

/// `Host` header value as the HTTP client will send it
fn host_header(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_lambda_arn() {
        assert_eq!(
            Destination::resolve("arn:aws:lambda:us-west-2:271828182845:function:myaws-copy-file")
                .unwrap(),
            Destination::Lambda {
                function: "myaws-copy-file".to_string()
            }
        );
    }

    #[test]
    fn test_resolve_webhook() {
        let destination = Destination::resolve("https://hooks.example.com/s3?token=abc").unwrap();
        match destination {
            Destination::Webhook(url) => assert_eq!(url.host_str(), Some("hooks.example.com")),
            other => panic!("unexpected destination {:?}", other),
        }
    }

    #[test]
    fn test_resolve_unsupported() {
        assert!(matches!(
            Destination::resolve("arn:aws:sqs:us-west-2:1:queue"),
            Err(InvokeError::UnsupportedTarget(_))
        ));
    }

    #[test]
    fn test_invocation_url() {
        let invoker = HttpInvoker::new(&NotificationsConfig::default(), &AwsConfig::default()).unwrap();
        assert_eq!(
            invoker.invocation_url("copy-file").as_str(),
            "http://localhost:9050/2015-03-31/functions/copy-file/invocations"
        );
        assert_eq!(host_header(&invoker.invocation_url("f")), "localhost:9050");
    }

    #[test]
    fn test_rejects_bad_endpoint() {
        let config = NotificationsConfig {
            lambda_endpoint: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            HttpInvoker::new(&config, &AwsConfig::default()),
            Err(InvokeError::InvalidEndpoint { .. })
        ));
    }
}
