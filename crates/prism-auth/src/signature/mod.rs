//! AWS Signature V4 request signing

use chrono::{DateTime, Utc};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use prism_crypto::{hmac_sha256, sha256_hash};
use std::collections::BTreeMap;
use tracing::trace;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Payload hash sent when the body is streamed through unsigned
pub const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

/// Characters left alone by SigV4 URI encoding
const URI_UNRESERVED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
}

impl Credentials {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }
}

/// Result of signing a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// Value for the `Authorization` header
    pub authorization: String,
    /// Value for the `x-amz-date` header
    pub amz_date: String,
    pub signed_headers: String,
    pub signature: String,
}

/// Signs requests for one service in one region
#[derive(Debug, Clone)]
pub struct RequestSigner {
    credentials: Credentials,
    region: String,
    service: String,
}

impl RequestSigner {
    pub fn new(credentials: Credentials, region: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            credentials,
            region: region.into(),
            service: service.into(),
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Sign a request.
    ///
    /// Every entry in `headers` is signed, so it must contain `host` and only
    /// the headers that will actually be sent. `x-amz-date` is added to it.
    /// `path` and `query` are taken as they appear on the wire (possibly
    /// percent-encoded); send [`canonical_uri`] and [`canonical_query_string`]
    /// of them so the receiver canonicalizes to the same text.
    pub fn sign(
        &self,
        method: &str,
        path: &str,
        query: &str,
        headers: &mut BTreeMap<String, String>,
        payload_hash: &str,
        now: DateTime<Utc>,
    ) -> Signature {
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = now.format("%Y%m%d").to_string();
        headers.insert("x-amz-date".to_string(), amz_date.clone());

        let normalized = normalize_headers(headers);
        let signed_headers = normalized
            .iter()
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>()
            .join(";");
        let canonical_headers: String = normalized
            .iter()
            .map(|(name, value)| format!("{}:{}\n", name, value))
            .collect();

        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            method,
            canonical_uri(path),
            canonical_query_string(query),
            canonical_headers,
            signed_headers,
            payload_hash
        );

        trace!("Canonical request:\n{}", canonical_request);

        let credential_scope = format!(
            "{}/{}/{}/aws4_request",
            date_stamp, self.region, self.service
        );
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            ALGORITHM,
            amz_date,
            credential_scope,
            sha256_hash(canonical_request.as_bytes())
        );

        trace!("String to sign:\n{}", string_to_sign);

        let signature = hex::encode(hmac_sha256(
            &self.signing_key(&date_stamp),
            string_to_sign.as_bytes(),
        ));

        Signature {
            authorization: format!(
                "{} Credential={}/{}, SignedHeaders={}, Signature={}",
                ALGORITHM, self.credentials.access_key, credential_scope, signed_headers, signature
            ),
            amz_date,
            signed_headers,
            signature,
        }
    }

    fn signing_key(&self, date_stamp: &str) -> Vec<u8> {
        let k_date = hmac_sha256(
            format!("AWS4{}", self.credentials.secret_key).as_bytes(),
            date_stamp.as_bytes(),
        );
        let k_region = hmac_sha256(&k_date, self.region.as_bytes());
        let k_service = hmac_sha256(&k_region, self.service.as_bytes());
        hmac_sha256(&k_service, b"aws4_request")
    }
}

fn uri_encode(value: &str) -> String {
    let decoded = percent_decode_str(value).decode_utf8_lossy();
    utf8_percent_encode(&decoded, URI_UNRESERVED).to_string()
}

/// Canonical form of a request path: each segment decoded once and re-encoded
pub fn canonical_uri(path: &str) -> String {
    if path.is_empty() || path == "/" {
        return "/".to_string();
    }

    let encoded = path.split('/').map(uri_encode).collect::<Vec<_>>().join("/");
    if encoded.starts_with('/') {
        encoded
    } else {
        format!("/{}", encoded)
    }
}

/// Canonical form of a query string: pairs encoded and sorted, bare keys get `=`
pub fn canonical_query_string(query: &str) -> String {
    let mut params: Vec<(String, String)> = query
        .split('&')
        .filter(|p| !p.is_empty())
        .map(|p| {
            let (key, value) = p.split_once('=').unwrap_or((p, ""));
            (uri_encode(key), uri_encode(value))
        })
        .collect();

    params.sort();

    params
        .into_iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

fn normalize_headers(headers: &BTreeMap<String, String>) -> Vec<(String, String)> {
    let mut normalized: Vec<(String, String)> = headers
        .iter()
        .map(|(name, value)| {
            let value = value.split_whitespace().collect::<Vec<_>>().join(" ");
            (name.to_lowercase(), value)
        })
        .collect();
    normalized.sort();
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use prism_crypto::EMPTY_SHA256;

    fn example_signer(service: &str) -> RequestSigner {
        RequestSigner::new(
            Credentials::new("AKIDEXAMPLE", "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY"),
            "us-east-1",
            service,
        )
    }

    fn example_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2015, 8, 30, 12, 36, 0).unwrap()
    }

    #[test]
    fn test_get_vanilla() {
        let mut headers = BTreeMap::new();
        headers.insert("host".to_string(), "example.amazonaws.com".to_string());

        let sig = example_signer("service").sign("GET", "/", "", &mut headers, EMPTY_SHA256, example_time());

        assert_eq!(sig.amz_date, "20150830T123600Z");
        assert_eq!(sig.signed_headers, "host;x-amz-date");
        assert_eq!(
            sig.signature,
            "5fa00fa31553b73ebf1942676e86291e8372ff2a2260956d9b8aae1d763fbf31"
        );
        assert_eq!(headers.get("x-amz-date").unwrap(), "20150830T123600Z");
    }

    #[test]
    fn test_iam_list_users() {
        let mut headers = BTreeMap::new();
        headers.insert(
            "content-type".to_string(),
            "application/x-www-form-urlencoded; charset=utf-8".to_string(),
        );
        headers.insert("host".to_string(), "iam.amazonaws.com".to_string());

        let sig = example_signer("iam").sign(
            "GET",
            "/",
            "Action=ListUsers&Version=2010-05-08",
            &mut headers,
            EMPTY_SHA256,
            example_time(),
        );

        assert_eq!(
            sig.signature,
            "5d672d79c15b13162d9279b0855cfba6789a8edb4c82c400e06b5924a6f2b5d7"
        );
        assert_eq!(
            sig.authorization,
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-east-1/iam/aws4_request, \
             SignedHeaders=content-type;host;x-amz-date, \
             Signature=5d672d79c15b13162d9279b0855cfba6789a8edb4c82c400e06b5924a6f2b5d7"
        );
    }

    #[test]
    fn test_canonical_query_string() {
        assert_eq!(canonical_query_string(""), "");
        assert_eq!(canonical_query_string("notification"), "notification=");
        assert_eq!(
            canonical_query_string("uploadId=abc&partNumber=1"),
            "partNumber=1&uploadId=abc"
        );
        assert_eq!(canonical_query_string("prefix=a%20b/c"), "prefix=a%20b%2Fc");
        assert_eq!(canonical_query_string("v=a+b"), "v=a%2Bb");
    }

    #[test]
    fn test_canonical_uri() {
        assert_eq!(canonical_uri(""), "/");
        assert_eq!(canonical_uri("/bucket/dir/file.txt"), "/bucket/dir/file.txt");
        assert_eq!(canonical_uri("/bucket/my%20file"), "/bucket/my%20file");
        assert_eq!(canonical_uri("/bucket/a b~c"), "/bucket/a%20b~c");
    }
}
