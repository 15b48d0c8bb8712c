//! Chat message envelope sent over the socket transport.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Attachment descriptor carried in a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub filename: String,
    /// Resolved storage location; turned into a fetchable link by signing.
    pub url: String,
    #[serde(default)]
    pub requires_auth: bool,
}

/// `{ text, isoDate, files }` envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub text: String,
    pub iso_date: String,
    pub files: Vec<FileMetadata>,
}

/// Build a message, filling unset fields with defaults: empty text, the current
/// UTC time and no attachments.
pub fn create_message(
    text: Option<String>,
    iso_date: Option<String>,
    files: Option<Vec<FileMetadata>>,
) -> Message {
    Message {
        text: text.unwrap_or_default(),
        iso_date: iso_date.unwrap_or_else(now_iso),
        files: files.unwrap_or_default(),
    }
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Format a message timestamp for display as `hh:mm:ss AM/PM` (UTC).
pub fn format_time(iso_date: &str) -> Result<String, AppError> {
    let parsed = DateTime::parse_from_rfc3339(iso_date)?;
    Ok(parsed.with_timezone(&Utc).format("%I:%M:%S %p").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_message_fills_defaults() {
        let message = create_message(None, None, None);
        assert_eq!(message.text, "");
        assert!(message.files.is_empty());
        assert!(message.iso_date.ends_with('Z'));
        assert!(DateTime::parse_from_rfc3339(&message.iso_date).is_ok());
    }

    #[test]
    fn create_message_keeps_given_fields() {
        let files = vec![FileMetadata {
            filename: "a.png".to_string(),
            url: "attachments/1/a.png".to_string(),
            requires_auth: true,
        }];
        let message = create_message(
            Some("hi".to_string()),
            Some("2021-03-04T05:06:07.000Z".to_string()),
            Some(files.clone()),
        );
        assert_eq!(message.text, "hi");
        assert_eq!(message.iso_date, "2021-03-04T05:06:07.000Z");
        assert_eq!(message.files, files);
    }

    #[test]
    fn envelope_uses_camel_case_keys() {
        let message = create_message(
            Some("hello".to_string()),
            Some("2021-03-04T05:06:07.000Z".to_string()),
            Some(vec![FileMetadata {
                filename: "a.png".to_string(),
                url: "attachments/1/a.png".to_string(),
                requires_auth: true,
            }]),
        );
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["isoDate"], "2021-03-04T05:06:07.000Z");
        assert_eq!(json["files"][0]["requiresAuth"], true);
        assert_eq!(json["files"][0]["filename"], "a.png");
    }

    #[test]
    fn requires_auth_defaults_to_false() {
        let file: FileMetadata =
            serde_json::from_str(r#"{"filename":"a.txt","url":"x/a.txt"}"#).unwrap();
        assert!(!file.requires_auth);
    }

    #[test]
    fn format_time_renders_twelve_hour_clock() {
        assert_eq!(format_time("2021-03-04T15:06:07.000Z").unwrap(), "03:06:07 PM");
        assert_eq!(format_time("2021-03-04T00:00:09+00:00").unwrap(), "12:00:09 AM");
    }

    #[test]
    fn format_time_rejects_garbage() {
        let err = format_time("yesterday").unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }
}
