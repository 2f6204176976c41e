//! Binary attachment <-> text-safe token codec.
//!
//! Attachments are persisted as `data:` URLs (media type embedded) alongside
//! their original file name.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::models::Attachment;

const FALLBACK_MEDIA_TYPE: &str = "application/octet-stream";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AttachmentError {
    #[error("not a data URL")] NotDataUrl,
    #[error("data URL is not base64 encoded")] NotBase64,
    #[error("invalid base64 payload: {0}")] Payload(String),
}

/// Persisted form of an attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedAttachment {
    pub data_url: String,
    pub name: String,
}

pub fn to_data_url(data: &[u8], media_type: &str) -> String {
    format!("data:{};base64,{}", media_type, STANDARD.encode(data))
}

/// Splits a `data:` URL into its media type and decoded bytes.
pub fn parse_data_url(url: &str) -> Result<(String, Vec<u8>), AttachmentError> {
    let rest = url.strip_prefix("data:").ok_or(AttachmentError::NotDataUrl)?;
    let (header, payload) = rest.split_once(',').ok_or(AttachmentError::NotDataUrl)?;
    let header = header.strip_suffix(";base64").ok_or(AttachmentError::NotBase64)?;
    let media_type = header.split(';').next().unwrap_or_default().trim();
    let media_type = if media_type.is_empty() { FALLBACK_MEDIA_TYPE } else { media_type };
    let data = STANDARD
        .decode(payload.trim())
        .map_err(|e| AttachmentError::Payload(e.to_string()))?;
    Ok((media_type.to_string(), data))
}

pub fn encode_attachment(data: &[u8], media_type: &str, name: &str) -> EncodedAttachment {
    EncodedAttachment { data_url: to_data_url(data, media_type), name: name.to_string() }
}

pub fn decode_attachment(token: &EncodedAttachment) -> Result<Attachment, AttachmentError> {
    let (media_type, data) = parse_data_url(&token.data_url)?;
    Ok(Attachment::new(token.name.clone(), media_type, data))
}

impl Attachment {
    pub fn encode(&self) -> EncodedAttachment {
        encode_attachment(&self.data, &self.media_type, &self.name)
    }

    pub fn data_url(&self) -> String {
        to_data_url(&self.data, &self.media_type)
    }

    pub fn from_data_url(url: &str, name: impl Into<String>) -> Result<Self, AttachmentError> {
        let (media_type, data) = parse_data_url(url)?;
        Ok(Attachment::new(name, media_type, data))
    }
}
