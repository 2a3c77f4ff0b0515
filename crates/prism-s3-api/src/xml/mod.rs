//! S3 XML request/response helpers

use prism_core::types::{
    CloudFunctionConfiguration, FilterRule, NotificationConfiguration, NotificationFilter,
    S3KeyFilter,
};
use prism_core::utils::xml_escape;
use quick_xml::de::from_str;
use quick_xml::DeError;
use serde::de::IgnoredAny;
use serde::Deserialize;

pub const S3_XMLNS: &str = "http://s3.amazonaws.com/doc/2006-03-01/";

// ============= Bucket Notification =============

#[derive(Debug, Deserialize)]
struct NotificationConfigurationXml {
    /// Children in document order
    #[serde(rename = "$value", default)]
    entries: Vec<NotificationEntryXml>,
}

#[derive(Debug, Deserialize)]
enum NotificationEntryXml {
    CloudFunctionConfiguration(FunctionConfigurationXml),
    LambdaFunctionConfiguration(FunctionConfigurationXml),
    // Destinations the gateway cannot deliver to
    TopicConfiguration(IgnoredAny),
    QueueConfiguration(IgnoredAny),
    EventBridgeConfiguration(IgnoredAny),
}

/// `CloudFunctionConfiguration` and the newer `LambdaFunctionConfiguration`
/// differ only in the name of the target element.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct FunctionConfigurationXml {
    id: Option<String>,
    #[serde(rename = "Event", default)]
    events: Vec<String>,
    filter: Option<FilterXml>,
    cloud_function: Option<String>,
    lambda_function_arn: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FilterXml {
    #[serde(rename = "S3Key")]
    s3_key: Option<S3KeyXml>,
}

#[derive(Debug, Deserialize)]
struct S3KeyXml {
    #[serde(rename = "FilterRule", default)]
    rules: Vec<FilterRuleXml>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct FilterRuleXml {
    name: String,
    #[serde(default)]
    value: String,
}

impl FunctionConfigurationXml {
    fn into_configuration(self) -> Result<CloudFunctionConfiguration, DeError> {
        let target = self
            .cloud_function
            .or(self.lambda_function_arn)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                DeError::Custom("function configuration without a CloudFunction".to_string())
            })?;

        let filter_rules = self
            .filter
            .and_then(|f| f.s3_key)
            .map(|key| {
                key.rules
                    .into_iter()
                    .map(|r| FilterRule {
                        name: r.name,
                        value: r.value,
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(CloudFunctionConfiguration {
            id: self.id.unwrap_or_default(),
            events: self.events,
            filter: NotificationFilter {
                s3_key: S3KeyFilter { filter_rules },
            },
            cloud_function: target,
        })
    }
}

/// Parse a PutBucketNotificationConfiguration body.
///
/// Filter rule names are kept as written; unknown names are rejected later,
/// when the configuration is attached.
pub fn parse_notification_configuration(
    body: &[u8],
) -> Result<NotificationConfiguration, DeError> {
    let xml_str = String::from_utf8_lossy(body);
    let parsed: NotificationConfigurationXml = from_str(&xml_str)?;

    let mut config = NotificationConfiguration::new();
    for entry in parsed.entries {
        match entry {
            NotificationEntryXml::CloudFunctionConfiguration(function)
            | NotificationEntryXml::LambdaFunctionConfiguration(function) => {
                config = config.add_cloud_function(function.into_configuration()?);
            }
            _ => {}
        }
    }
    Ok(config)
}

/// Generate GetBucketNotificationConfiguration response XML
pub fn notification_configuration_response(config: &NotificationConfiguration) -> String {
    let mut xml = String::from(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    xml.push_str(&format!(r#"<NotificationConfiguration xmlns="{}">"#, S3_XMLNS));

    for function in &config.cloud_function_configurations {
        xml.push_str("<CloudFunctionConfiguration>");
        for event in &function.events {
            xml.push_str(&format!("<Event>{}</Event>", xml_escape(event)));
        }

        let rules = &function.filter.s3_key.filter_rules;
        if !rules.is_empty() {
            xml.push_str("<Filter><S3Key>");
            for rule in rules {
                xml.push_str("<FilterRule>");
                xml.push_str(&format!("<Name>{}</Name>", xml_escape(&rule.name)));
                xml.push_str(&format!("<Value>{}</Value>", xml_escape(&rule.value)));
                xml.push_str("</FilterRule>");
            }
            xml.push_str("</S3Key></Filter>");
        }

        xml.push_str(&format!("<Id>{}</Id>", xml_escape(&function.id)));
        xml.push_str(&format!(
            "<CloudFunction>{}</CloudFunction>",
            xml_escape(&function.cloud_function)
        ));
        xml.push_str("</CloudFunctionConfiguration>");
    }

    xml.push_str("</NotificationConfiguration>");
    xml
}

// ============= Bucket Accelerate =============

/// Status reported when no acceleration status was ever stored
pub const DEFAULT_ACCELERATE_STATUS: &str = "Disabled";

/// Status of a stored AccelerateConfiguration, if it has a usable one
pub fn parse_accelerate_status(body: &[u8]) -> Option<String> {
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    struct AccelerateConfiguration {
        status: Option<String>,
    }

    let xml_str = String::from_utf8_lossy(body);
    let config: AccelerateConfiguration = from_str(&xml_str).ok()?;
    config
        .status
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Generate GetBucketAccelerateConfiguration response XML
pub fn accelerate_configuration_response(status: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<AccelerateConfiguration xmlns="{}"><Status>{}</Status></AccelerateConfiguration>"#,
        S3_XMLNS,
        xml_escape(status)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const AWS_SAMPLE: &str = r#"<NotificationConfiguration
    xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
    <CloudFunctionConfiguration>
        <Event>s3:ObjectRemoved:*</Event>
        <Event>s3:ObjectCreated:*</Event>
        <Filter>
            <S3Key>
                <FilterRule>
                    <Name>prefix</Name>
                    <Value>AWSLogs/</Value>
                </FilterRule>
                <FilterRule>
                    <Name>suffix</Name>
                    <Value>.log</Value>
                </FilterRule>
            </S3Key>
        </Filter>
        <Id>tf-s3-lambda-20220407133353589300000001</Id>
        <CloudFunction>arn:aws:lambda:us-west-2:271828182845:function:myaws-copy-file</CloudFunction>
    </CloudFunctionConfiguration>
</NotificationConfiguration>"#;

    #[test]
    fn test_parse_aws_sample() {
        let config = parse_notification_configuration(AWS_SAMPLE.as_bytes()).unwrap();
        assert_eq!(config.len(), 1);

        let function = &config.cloud_function_configurations[0];
        assert_eq!(function.id, "tf-s3-lambda-20220407133353589300000001");
        assert_eq!(function.events, vec!["s3:ObjectRemoved:*", "s3:ObjectCreated:*"]);
        assert_eq!(
            function.cloud_function,
            "arn:aws:lambda:us-west-2:271828182845:function:myaws-copy-file"
        );
        assert_eq!(
            function.filter.s3_key,
            S3KeyFilter::prefix("AWSLogs/").with_suffix(".log")
        );
    }

    #[test]
    fn test_parse_lambda_function_configuration() {
        let xml = r#"<NotificationConfiguration>
            <LambdaFunctionConfiguration>
                <Id>resize</Id>
                <LambdaFunctionArn>arn:aws:lambda:us-west-2:1:function:resize</LambdaFunctionArn>
                <Event>s3:ObjectCreated:Put</Event>
            </LambdaFunctionConfiguration>
        </NotificationConfiguration>"#;

        let config = parse_notification_configuration(xml.as_bytes()).unwrap();
        let function = &config.cloud_function_configurations[0];
        assert_eq!(function.cloud_function, "arn:aws:lambda:us-west-2:1:function:resize");
        assert!(function.filter.s3_key.filter_rules.is_empty());
    }

    #[test]
    fn test_parse_keeps_document_order() {
        let xml = r#"<NotificationConfiguration>
            <LambdaFunctionConfiguration>
                <Id>first</Id>
                <LambdaFunctionArn>arn:aws:lambda:us-west-2:1:function:first</LambdaFunctionArn>
                <Event>s3:ObjectCreated:*</Event>
            </LambdaFunctionConfiguration>
            <CloudFunctionConfiguration>
                <Id>second</Id>
                <CloudFunction>arn:aws:lambda:us-west-2:1:function:second</CloudFunction>
                <Event>s3:ObjectRemoved:*</Event>
            </CloudFunctionConfiguration>
            <TopicConfiguration>
                <Id>ignored</Id>
                <Topic>arn:aws:sns:us-west-2:1:topic</Topic>
                <Event>s3:ObjectCreated:*</Event>
            </TopicConfiguration>
            <LambdaFunctionConfiguration>
                <Id>third</Id>
                <LambdaFunctionArn>arn:aws:lambda:us-west-2:1:function:third</LambdaFunctionArn>
                <Event>s3:ObjectCreated:Put</Event>
            </LambdaFunctionConfiguration>
        </NotificationConfiguration>"#;

        let config = parse_notification_configuration(xml.as_bytes()).unwrap();
        let ids: Vec<&str> = config
            .cloud_function_configurations
            .iter()
            .map(|f| f.id.as_str())
            .collect();
        assert_eq!(ids, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_parse_empty_and_malformed() {
        let empty = parse_notification_configuration(
            br#"<NotificationConfiguration xmlns="http://s3.amazonaws.com/doc/2006-03-01/"/>"#,
        )
        .unwrap();
        assert!(empty.is_empty());

        assert!(parse_notification_configuration(b"<NotificationConfiguration><Cloud").is_err());
        assert!(parse_notification_configuration(
            b"<NotificationConfiguration><CloudFunctionConfiguration><Id>x</Id></CloudFunctionConfiguration></NotificationConfiguration>"
        )
        .is_err());
    }

    #[test]
    fn test_response_parses_back() {
        let config = parse_notification_configuration(AWS_SAMPLE.as_bytes()).unwrap();
        let xml = notification_configuration_response(&config);

        assert!(xml.contains("<Id>tf-s3-lambda-20220407133353589300000001</Id>"));
        assert!(xml.contains("<Name>prefix</Name><Value>AWSLogs/</Value>"));
        assert_eq!(parse_notification_configuration(xml.as_bytes()).unwrap(), config);
    }

    #[test]
    fn test_accelerate_status() {
        assert_eq!(
            parse_accelerate_status(
                b"<AccelerateConfiguration><Status>Enabled</Status></AccelerateConfiguration>"
            ),
            Some("Enabled".to_string())
        );
        assert_eq!(parse_accelerate_status(b"<AccelerateConfiguration/>"), None);
        assert_eq!(parse_accelerate_status(b"not xml at all <"), None);

        let xml = accelerate_configuration_response(DEFAULT_ACCELERATE_STATUS);
        assert!(xml.contains("<Status>Disabled</Status>"));
    }
}
