//! Inbound notification envelope and the payload of an object-created event.
//!
//! Field names follow the Event Grid event schema (camelCase on the wire).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Event kind emitted when a new blob is written.
pub const EVENT_TYPE_BLOB_CREATED: &str = "Microsoft.Storage.BlobCreated";

/// Event kind sent once when a webhook subscription is registered.
pub const EVENT_TYPE_SUBSCRIPTION_VALIDATION: &str =
    "Microsoft.EventGrid.SubscriptionValidationEvent";

#[derive(Debug, Error)]
pub enum EventError {
    #[error("event carries no data")]
    MissingData,
    #[error("event data is not an object-created payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
    #[error("object-created payload has no url")]
    MissingUrl,
    #[error("location `{url}` is not usable: {reason}")]
    InvalidLocation { url: String, reason: &'static str },
    #[error("location `{url}` is outside the `{originals}` folder")]
    OutsideOriginals { url: String, originals: String },
}

/// One notification as delivered by the event-delivery collaborator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundEvent {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub topic: Option<String>,

    /// Resource path the event is about; used for logging only.
    #[serde(default)]
    pub subject: String,

    /// Missing kinds deserialize as empty and are ignored downstream.
    #[serde(default)]
    pub event_type: String,

    #[serde(default)]
    pub event_time: Option<DateTime<Utc>>,

    #[serde(default)]
    pub data_version: Option<String>,

    /// Raw payload; interpretation depends on `event_type`.
    #[serde(default)]
    pub data: Option<Value>,
}

impl InboundEvent {
    pub fn is_object_created(&self) -> bool {
        self.event_type == EVENT_TYPE_BLOB_CREATED
    }

    /// Deserialize `data` as an object-created payload and check that it
    /// names a location.
    pub fn object_created_payload(&self) -> Result<ObjectCreatedPayload, EventError> {
        let data = match &self.data {
            Some(Value::Null) | None => return Err(EventError::MissingData),
            Some(data) => data,
        };
        let payload = ObjectCreatedPayload::deserialize(data)?;
        match payload.url.as_deref() {
            Some(url) if !url.trim().is_empty() => Ok(payload),
            _ => Err(EventError::MissingUrl),
        }
    }

    /// Returns the handshake code when this is a subscription validation event.
    pub fn validation_code(&self) -> Option<String> {
        if self.event_type != EVENT_TYPE_SUBSCRIPTION_VALIDATION {
            return None;
        }
        let data = self.data.as_ref()?;
        SubscriptionValidationData::deserialize(data)
            .ok()
            .map(|d| d.validation_code)
    }
}

/// Payload of an object-created event.
///
/// Only `url` drives processing; the rest is informational and logged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectCreatedPayload {
    pub api: Option<String>,
    pub client_request_id: Option<String>,
    pub request_id: Option<String>,
    #[serde(alias = "etag")]
    pub e_tag: Option<String>,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub blob_type: Option<String>,
    pub url: Option<String>,
    pub sequencer: Option<String>,
}

impl ObjectCreatedPayload {
    /// Location of the created object. Empty only for payloads that did not
    /// come through [`InboundEvent::object_created_payload`].
    pub fn location(&self) -> &str {
        self.url.as_deref().unwrap_or_default().trim()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionValidationData {
    validation_code: String,
}

/// Response body for the subscription validation handshake.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionValidationResponse {
    pub validation_response: String,
}

/// Delivery envelope: an array of events, or a single bare event.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum EventBatch {
    Many(Vec<InboundEvent>),
    One(Box<InboundEvent>),
}

impl EventBatch {
    pub fn into_events(self) -> Vec<InboundEvent> {
        match self {
            EventBatch::Many(events) => events,
            EventBatch::One(event) => vec![*event],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn created(data: Value) -> InboundEvent {
        serde_json::from_value(json!({
            "id": "1",
            "subject": "/blobServices/default/containers/originals/blobs/cat.jpg",
            "eventType": EVENT_TYPE_BLOB_CREATED,
            "eventTime": "2024-05-01T10:00:00Z",
            "data": data,
        }))
        .unwrap()
    }

    #[test]
    fn parses_full_blob_created_payload() {
        let event = created(json!({
            "api": "PutBlob",
            "clientRequestId": "c-1",
            "requestId": "r-1",
            "eTag": "0x8D",
            "contentType": "image/jpeg",
            "contentLength": 524288,
            "blobType": "BlockBlob",
            "url": "https://acct.blob.core.windows.net/originals/cat.jpg",
            "sequencer": "0000000000000000000000000000000000000000000000000000000000000001"
        }));

        assert!(event.is_object_created());
        let payload = event.object_created_payload().unwrap();
        assert_eq!(payload.content_length, Some(524288));
        assert_eq!(payload.e_tag.as_deref(), Some("0x8D"));
        assert_eq!(
            payload.location(),
            "https://acct.blob.core.windows.net/originals/cat.jpg"
        );
    }

    #[test]
    fn lowercase_etag_is_accepted() {
        let event = created(json!({ "etag": "abc", "url": "https://a/originals/x.png" }));
        let payload = event.object_created_payload().unwrap();
        assert_eq!(payload.e_tag.as_deref(), Some("abc"));
    }

    #[test]
    fn missing_or_empty_url_is_rejected() {
        let event = created(json!({ "contentLength": 10 }));
        assert!(matches!(
            event.object_created_payload(),
            Err(EventError::MissingUrl)
        ));

        let event = created(json!({ "url": "  " }));
        assert!(matches!(
            event.object_created_payload(),
            Err(EventError::MissingUrl)
        ));
    }

    #[test]
    fn missing_data_and_bad_payloads_are_rejected() {
        let mut event = created(Value::Null);
        assert!(matches!(
            event.object_created_payload(),
            Err(EventError::MissingData)
        ));

        event.data = Some(json!("not an object"));
        assert!(matches!(
            event.object_created_payload(),
            Err(EventError::InvalidPayload(_))
        ));

        event.data = Some(json!({ "url": "https://a/originals/x.png", "contentLength": -1 }));
        assert!(matches!(
            event.object_created_payload(),
            Err(EventError::InvalidPayload(_))
        ));
    }

    #[test]
    fn null_informational_fields_are_tolerated() {
        let event = created(json!({
            "url": "https://a/originals/x.png",
            "contentLength": null,
            "contentType": null
        }));
        let payload = event.object_created_payload().unwrap();
        assert_eq!(payload.content_length, None);
        assert_eq!(payload.location(), "https://a/originals/x.png");
    }

    #[test]
    fn extracts_validation_code() {
        let event: InboundEvent = serde_json::from_value(json!({
            "id": "v",
            "eventType": EVENT_TYPE_SUBSCRIPTION_VALIDATION,
            "data": { "validationCode": "512d38b6-c7b8-40c8-89fe-f46f9e9622b6" }
        }))
        .unwrap();
        assert_eq!(
            event.validation_code().as_deref(),
            Some("512d38b6-c7b8-40c8-89fe-f46f9e9622b6")
        );
        assert!(created(json!({})).validation_code().is_none());
    }

    #[test]
    fn batch_accepts_array_or_single_event() {
        let many: EventBatch = serde_json::from_value(json!([
            { "eventType": "a" },
            { "eventType": "b" }
        ]))
        .unwrap();
        assert_eq!(many.into_events().len(), 2);

        let one: EventBatch = serde_json::from_value(json!({ "eventType": "a" })).unwrap();
        assert_eq!(one.into_events()[0].event_type, "a");
    }
}
