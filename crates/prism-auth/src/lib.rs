//! Request signing for Prism
//!
//! The gateway does not authenticate its own clients. It signs the requests it
//! makes on their behalf: forwarded S3 calls to the storage backend and
//! function invocations sent to the Lambda endpoint.

pub mod signature;

pub use signature::{
    canonical_query_string, canonical_uri, Credentials, RequestSigner, Signature, UNSIGNED_PAYLOAD,
};
