//! Client for the S3 backend behind the gateway
//!
//! Requests are re-signed with the backend's own credentials. The path and
//! query are sent in SigV4 canonical form, so the text we sign is the text the
//! backend reconstructs.

use axum::http::{header, HeaderMap, HeaderName, Method};
use chrono::Utc;
use prism_auth::{canonical_query_string, canonical_uri, Credentials, RequestSigner, UNSIGNED_PAYLOAD};
use prism_core::config::BackendConfig;
use prism_core::utils::parse_etag;
use prism_core::{Error, Result};
use reqwest::{Client, RequestBuilder};
use std::collections::BTreeMap;
use tracing::debug;
use url::Url;

/// Headers that describe a single connection and are never forwarded
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Client headers replaced by our own signature
const RESIGNED: &[&str] = &[
    "host",
    "authorization",
    "x-amz-date",
    "x-amz-content-sha256",
    "x-amz-security-token",
    "expect",
];

pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

fn is_signed(name: &str) -> bool {
    name.starts_with("x-amz-") || name == "content-md5"
}

/// What a HEAD on a stored object reported
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectStat {
    pub size: i64,
    pub etag: Option<String>,
}

pub struct BackendClient {
    client: Client,
    endpoint: Url,
    host: String,
    signer: RequestSigner,
}

impl BackendClient {
    pub fn new(config: &BackendConfig, region: &str) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint).map_err(|e| {
            Error::InvalidArgument(format!("invalid backend endpoint {}: {}", config.endpoint, e))
        })?;
        let host = match (endpoint.host_str(), endpoint.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(Error::InvalidArgument(format!(
                    "backend endpoint {} has no host",
                    config.endpoint
                )))
            }
        };

        // Redirects are the client's business
        let client = Client::builder()
            .timeout(config.request_timeout())
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::InternalError(format!("unable to build backend client: {}", e)))?;

        let signer = RequestSigner::new(
            Credentials::new(&config.access_key, &config.secret_key),
            region,
            "s3",
        );

        Ok(Self {
            client,
            endpoint,
            host,
            signer,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Backend URL for a client path and raw query
    pub fn url(&self, path: &str, query: &str) -> Url {
        let mut url = self.endpoint.clone();
        let base = self.endpoint.path().trim_end_matches('/');
        url.set_path(&format!("{}{}", base, canonical_uri(path)));

        let query = canonical_query_string(query);
        url.set_query(if query.is_empty() { None } else { Some(&query) });
        url
    }

    /// Build a signed request carrying the client's forwardable headers.
    /// The caller attaches the body.
    pub fn request(
        &self,
        method: Method,
        path: &str,
        query: &str,
        client_headers: &HeaderMap,
    ) -> RequestBuilder {
        let url = self.url(path, query);

        let mut signed = BTreeMap::new();
        signed.insert("host".to_string(), self.host.clone());
        signed.insert("x-amz-content-sha256".to_string(), UNSIGNED_PAYLOAD.to_string());

        let mut builder = self.client.request(method.clone(), url.clone());
        for (name, value) in client_headers {
            let lower = name.as_str();
            if is_hop_by_hop(name) || RESIGNED.contains(&lower) {
                continue;
            }

            match value.to_str() {
                Ok(text) if is_signed(lower) => {
                    signed
                        .entry(lower.to_string())
                        .and_modify(|existing: &mut String| {
                            existing.push(',');
                            existing.push_str(text.trim());
                        })
                        .or_insert_with(|| text.trim().to_string());
                }
                _ => builder = builder.header(name.clone(), value.clone()),
            }
        }

        let signature = self.signer.sign(
            method.as_str(),
            url.path(),
            url.query().unwrap_or(""),
            &mut signed,
            UNSIGNED_PAYLOAD,
            Utc::now(),
        );

        for (name, value) in signed.iter().filter(|(name, _)| name.as_str() != "host") {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder.header(header::AUTHORIZATION, signature.authorization)
    }

    /// Size and ETag of a stored object. `None` when the backend cannot say.
    pub async fn stat(&self, path: &str) -> Option<ObjectStat> {
        let response = match self
            .request(Method::HEAD, path, "", &HeaderMap::new())
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                debug!("HEAD {} failed: {}", path, e);
                return None;
            }
        };

        if !response.status().is_success() {
            debug!("HEAD {} returned {}", path, response.status());
            return None;
        }

        let headers = response.headers();
        let size = headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok())?;
        let etag = headers
            .get(header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(parse_etag);

        Some(ObjectStat { size, etag })
    }
}
