use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::{Map, Value};
use thiserror::Error;

/// JSON object as decoded from a JWS header or payload segment.
pub type JsonObject = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    Header,
    Claims,
    Signature,
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Segment::Header => "header",
            Segment::Claims => "claims",
            Segment::Signature => "signature",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("expected 3 '.'-separated segments, found {0}")]
    SegmentCount(usize),
    #[error("{segment} segment is not valid base64url: {message}")]
    Base64 { segment: Segment, message: String },
    #[error("{segment} segment is not a JSON object: {message}")]
    Json { segment: Segment, message: String },
}

/// Outcome of a typed field lookup on a header or claims object.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("'{0}' is missing")]
    Missing(&'static str),
    #[error("'{field}' must be a {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
    #[error("'{0}' is empty")]
    Empty(&'static str),
}

/// A parsed but unverified compact JWS.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedToken {
    header: JsonObject,
    claims: JsonObject,
    signature: Vec<u8>,
    signing_input: String,
    encoded_signature: String,
}

impl DecodedToken {
    pub fn decode(raw: &str) -> Result<Self, DecodeError> {
        let segments: Vec<&str> = raw.trim().split('.').collect();
        let [header, claims, signature] = segments.as_slice() else {
            return Err(DecodeError::SegmentCount(segments.len()));
        };

        let header_json = decode_object(Segment::Header, header)?;
        let claims_json = decode_object(Segment::Claims, claims)?;
        let signature_bytes = decode_segment(Segment::Signature, signature)?;

        Ok(Self {
            header: header_json,
            claims: claims_json,
            signature: signature_bytes,
            signing_input: format!("{header}.{claims}"),
            encoded_signature: signature.trim_end_matches('=').to_owned(),
        })
    }

    pub fn header(&self) -> &JsonObject {
        &self.header
    }

    pub fn claims(&self) -> &JsonObject {
        &self.claims
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// The `header.claims` text the signature was computed over.
    pub fn signing_input(&self) -> &str {
        &self.signing_input
    }

    /// The signature segment as it appeared on the wire (unpadded base64url).
    pub fn encoded_signature(&self) -> &str {
        &self.encoded_signature
    }

    pub fn key_id(&self) -> Result<&str, FieldError> {
        non_empty_str(&self.header, "kid")
    }

    pub fn algorithm(&self) -> Result<&str, FieldError> {
        non_empty_str(&self.header, "alg")
    }

    pub fn issuer(&self) -> Result<&str, FieldError> {
        non_empty_str(&self.claims, "iss")
    }

    pub fn subject(&self) -> Result<&str, FieldError> {
        non_empty_str(&self.claims, "sub")
    }

    /// True when the header carries a `jwk` member, whatever its value.
    pub fn has_embedded_key(&self) -> bool {
        self.header.contains_key("jwk")
    }

    /// Reads a NumericDate claim. Fractional seconds are truncated.
    pub fn numeric_claim(&self, field: &'static str) -> Result<Option<i64>, FieldError> {
        match self.claims.get(field) {
            None => Ok(None),
            Some(Value::Number(number)) => number
                .as_i64()
                .or_else(|| number.as_f64().map(|value| value as i64))
                .map(Some)
                .ok_or(FieldError::WrongType {
                    field,
                    expected: "numeric date",
                }),
            Some(_) => Err(FieldError::WrongType {
                field,
                expected: "numeric date",
            }),
        }
    }
}

fn decode_segment(segment: Segment, value: &str) -> Result<Vec<u8>, DecodeError> {
    URL_SAFE_NO_PAD
        .decode(value.trim_end_matches('='))
        .map_err(|err| DecodeError::Base64 {
            segment,
            message: err.to_string(),
        })
}

fn decode_object(segment: Segment, value: &str) -> Result<JsonObject, DecodeError> {
    let bytes = decode_segment(segment, value)?;
    serde_json::from_slice::<JsonObject>(&bytes).map_err(|err| DecodeError::Json {
        segment,
        message: err.to_string(),
    })
}

fn non_empty_str<'a>(map: &'a JsonObject, field: &'static str) -> Result<&'a str, FieldError> {
    match map.get(field) {
        None | Some(Value::Null) => Err(FieldError::Missing(field)),
        Some(Value::String(value)) if value.is_empty() => Err(FieldError::Empty(field)),
        Some(Value::String(value)) => Ok(value),
        Some(_) => Err(FieldError::WrongType {
            field,
            expected: "string",
        }),
    }
}
