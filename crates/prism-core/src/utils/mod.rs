//! Utility functions

use uuid::Uuid;

/// Generate a unique request ID
pub fn generate_request_id() -> String {
    Uuid::new_v4().to_string().replace('-', "").to_uppercase()
}

/// Check a bucket name against the S3 naming rules
pub fn validate_bucket_name(name: &str) -> crate::Result<()> {
    if name.len() < crate::MIN_BUCKET_NAME_LENGTH || name.len() > crate::MAX_BUCKET_NAME_LENGTH {
        return Err(crate::Error::InvalidBucketName(format!(
            "{}: must be between {} and {} characters",
            name,
            crate::MIN_BUCKET_NAME_LENGTH,
            crate::MAX_BUCKET_NAME_LENGTH
        )));
    }

    let bytes = name.as_bytes();
    let edge_ok = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    if !edge_ok(bytes[0]) || !edge_ok(bytes[bytes.len() - 1]) {
        return Err(crate::Error::InvalidBucketName(format!(
            "{}: must start and end with a lowercase letter or number",
            name
        )));
    }

    if let Some(c) = name
        .chars()
        .find(|c| !c.is_ascii_lowercase() && !c.is_ascii_digit() && *c != '-' && *c != '.')
    {
        return Err(crate::Error::InvalidBucketName(format!(
            "{}: invalid character {:?}",
            name, c
        )));
    }

    if name.contains("..") {
        return Err(crate::Error::InvalidBucketName(format!(
            "{}: cannot have consecutive periods",
            name
        )));
    }

    Ok(())
}

/// Parse ETag (remove quotes)
pub fn parse_etag(etag: &str) -> String {
    etag.trim_matches('"').to_string()
}

/// XML escape string
pub fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Format datetime for S3 event records (millisecond precision)
pub fn format_s3_datetime(dt: &chrono::DateTime<chrono::Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Function name from a Lambda ARN
/// (`arn:aws:lambda:<region>:<account>:function:<name>[:<qualifier>]`).
pub fn lambda_function_name(arn: &str) -> Option<&str> {
    let mut parts = arn.split(':');
    if parts.next() != Some("arn") {
        return None;
    }
    let parts: Vec<&str> = parts.collect();
    // aws, lambda, region, account, "function", name
    if parts.len() < 6 || parts[1] != "lambda" || parts[4] != "function" {
        return None;
    }
    Some(parts[5]).filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_request_id_shape() {
        let id = generate_request_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[test]
    fn test_format_s3_datetime() {
        let dt = chrono::Utc
            .with_ymd_and_hms(2022, 4, 14, 11, 39, 29)
            .unwrap()
            + chrono::Duration::milliseconds(346);
        assert_eq!(format_s3_datetime(&dt), "2022-04-14T11:39:29.346Z");
    }

    #[test]
    fn test_lambda_function_name() {
        assert_eq!(
            lambda_function_name("arn:aws:lambda:us-west-2:271828182845:function:copy-file"),
            Some("copy-file")
        );
        assert_eq!(
            lambda_function_name("arn:aws:lambda:us-west-2:1:function:copy-file:live"),
            Some("copy-file")
        );
        assert_eq!(lambda_function_name("arn:aws:sqs:us-west-2:1:queue"), None);
        assert_eq!(lambda_function_name("copy-file"), None);
    }

    #[test]
    fn test_validate_bucket_name() {
        assert!(validate_bucket_name("my-bucket").is_ok());
        assert!(validate_bucket_name("logs.2024").is_ok());
        assert!(validate_bucket_name("ab").is_err());
        assert!(validate_bucket_name("My-Bucket").is_err());
        assert!(validate_bucket_name("-bucket").is_err());
        assert!(validate_bucket_name("a..b").is_err());
        assert!(validate_bucket_name("../etc").is_err());
        assert!(validate_bucket_name("a/b/c").is_err());
    }
}
