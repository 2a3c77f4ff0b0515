//! Object events and the records delivered to notification targets

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

use super::S3EventType;
use crate::utils::format_s3_datetime;
use crate::UNKNOWN_OBJECT_SIZE;

/// A completed object operation, as observed by the gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationEvent {
    pub bucket: String,
    pub key: String,
    pub event_type: S3EventType,
    pub source_ip: String,
    /// Object size in bytes, or [`UNKNOWN_OBJECT_SIZE`]
    pub size: i64,
    pub etag: Option<String>,
    pub request_id: Option<String>,
    pub event_time: DateTime<Utc>,
}

impl NotificationEvent {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>, event_type: S3EventType) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            event_type,
            source_ip: String::new(),
            size: UNKNOWN_OBJECT_SIZE,
            etag: None,
            request_id: None,
            event_time: Utc::now(),
        }
    }

    pub fn with_source_ip(mut self, source_ip: impl Into<String>) -> Self {
        self.source_ip = source_ip.into();
        self
    }

    pub fn with_size(mut self, size: i64) -> Self {
        self.size = size;
        self
    }

    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_event_time(mut self, event_time: DateTime<Utc>) -> Self {
        self.event_time = event_time;
        self
    }
}

/// S3 Event record (sent to targets)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3EventRecord {
    pub event_version: String,
    pub event_source: String,
    pub aws_region: String,
    #[serde(serialize_with = "serialize_event_time")]
    pub event_time: DateTime<Utc>,
    /// Event name without the `s3:` prefix, e.g. `ObjectCreated:Put`
    pub event_name: String,
    pub user_identity: UserIdentity,
    pub request_parameters: RequestParameters,
    pub response_elements: ResponseElements,
    pub s3: S3Info,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    pub principal_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestParameters {
    #[serde(rename = "sourceIPAddress")]
    pub source_ip_address: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseElements {
    #[serde(rename = "x-amz-request-id")]
    pub x_amz_request_id: String,
    #[serde(rename = "x-amz-id-2")]
    pub x_amz_id_2: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3Info {
    pub s3_schema_version: String,
    pub configuration_id: String,
    pub bucket: S3BucketInfo,
    pub object: S3ObjectInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3BucketInfo {
    pub name: String,
    pub owner_identity: UserIdentity,
    pub arn: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3ObjectInfo {
    pub key: String,
    pub size: i64,
    pub e_tag: String,
    pub sequencer: String,
}

/// S3 Event message (contains multiple records)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct S3EventMessage {
    pub records: Vec<S3EventRecord>,
}

impl S3EventMessage {
    pub fn single(record: S3EventRecord) -> Self {
        Self {
            records: vec![record],
        }
    }
}

fn serialize_event_time<S: Serializer>(time: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_s3_datetime(time))
}

impl S3EventRecord {
    /// Build the record a target configured as `configuration_id` receives
    pub fn from_event(event: &NotificationEvent, configuration_id: &str, region: &str) -> Self {
        let request_id = event.request_id.clone().unwrap_or_default();
        let x_amz_id_2 = if request_id.is_empty() {
            String::new()
        } else {
            format!("{}-extended", request_id)
        };
        let sequencer = event
            .event_time
            .timestamp_nanos_opt()
            .map(|nanos| format!("{:016X}", nanos))
            .unwrap_or_default();

        Self {
            event_version: "2.1".to_string(),
            event_source: "aws:s3".to_string(),
            aws_region: region.to_string(),
            event_time: event.event_time,
            event_name: event.event_type.record_name().to_string(),
            user_identity: UserIdentity::default(),
            request_parameters: RequestParameters {
                source_ip_address: event.source_ip.clone(),
            },
            response_elements: ResponseElements {
                x_amz_request_id: request_id,
                x_amz_id_2,
            },
            s3: S3Info {
                s3_schema_version: "1.0".to_string(),
                configuration_id: configuration_id.to_string(),
                bucket: S3BucketInfo {
                    name: event.bucket.clone(),
                    owner_identity: UserIdentity::default(),
                    arn: format!("arn:aws:s3:::{}", event.bucket),
                },
                object: S3ObjectInfo {
                    key: event.key.clone(),
                    size: event.size,
                    e_tag: event.etag.clone().unwrap_or_default(),
                    sequencer,
                },
            },
        }
    }

    /// Attribute the record to an account, as requester and bucket owner
    pub fn with_principal(mut self, account_id: &str) -> Self {
        self.user_identity.principal_id = format!("AWS:{}", account_id);
        self.s3.bucket.owner_identity.principal_id = account_id.to_string();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_new_event_has_unknown_size() {
        let event = NotificationEvent::new("b", "k", S3EventType::ObjectRemovedDelete);
        assert_eq!(event.size, UNKNOWN_OBJECT_SIZE);
        assert!(event.etag.is_none());
    }

    #[test]
    fn test_record_json_shape() {
        let time = Utc.with_ymd_and_hms(2022, 4, 14, 11, 39, 29).unwrap()
            + chrono::Duration::milliseconds(346);
        let event = NotificationEvent::new(
            "bucket-name",
            "dir/file.ext",
            S3EventType::ObjectCreatedCompleteMultipartUpload,
        )
        .with_source_ip("123.45.67.89")
        .with_size(12345)
        .with_etag("6f17b4298e838b30691db31b1d0bc4ec-3")
        .with_request_id("XT6FD2FBQWXM1ABC")
        .with_event_time(time);

        let record = S3EventRecord::from_event(&event, "tf-s3-lambda-1", "us-west-2");
        let json = serde_json::to_value(S3EventMessage::single(record)).unwrap();
        let record = &json["Records"][0];

        assert_eq!(record["eventVersion"], "2.1");
        assert_eq!(record["eventSource"], "aws:s3");
        assert_eq!(record["awsRegion"], "us-west-2");
        assert_eq!(record["eventTime"], "2022-04-14T11:39:29.346Z");
        assert_eq!(record["eventName"], "ObjectCreated:CompleteMultipartUpload");
        assert_eq!(record["requestParameters"]["sourceIPAddress"], "123.45.67.89");
        assert_eq!(record["responseElements"]["x-amz-request-id"], "XT6FD2FBQWXM1ABC");
        assert_eq!(record["s3"]["s3SchemaVersion"], "1.0");
        assert_eq!(record["s3"]["configurationId"], "tf-s3-lambda-1");
        assert_eq!(record["s3"]["bucket"]["name"], "bucket-name");
        assert_eq!(record["s3"]["bucket"]["arn"], "arn:aws:s3:::bucket-name");
        assert_eq!(record["s3"]["object"]["key"], "dir/file.ext");
        assert_eq!(record["s3"]["object"]["size"], 12345);
        assert_eq!(record["s3"]["object"]["eTag"], "6f17b4298e838b30691db31b1d0bc4ec-3");
    }

    #[test]
    fn test_record_parses_back() {
        let event = NotificationEvent::new("b", "k", S3EventType::ObjectCreatedPut).with_size(1);
        let message = S3EventMessage::single(S3EventRecord::from_event(&event, "id", "us-west-2"));

        let json = serde_json::to_string(&message).unwrap();
        let parsed: S3EventMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.records[0].s3.object.size, 1);
        assert_eq!(parsed.records[0].event_name, "ObjectCreated:Put");
    }

    #[test]
    fn test_record_principal() {
        let event = NotificationEvent::new("b", "k", S3EventType::ObjectRemovedDelete);
        let record = S3EventRecord::from_event(&event, "id", "us-west-2");
        assert_eq!(record.user_identity.principal_id, "");

        let record = record.with_principal("271828182845");
        assert_eq!(record.user_identity.principal_id, "AWS:271828182845");
        assert_eq!(record.s3.bucket.owner_identity.principal_id, "271828182845");
    }
}
