//! Capability tokens: signed, expiring, potency scoped delegations.
//!
//! Tokens are JWT shaped (`header.payload.signature`, base64url without
//! padding) and signed with the issuer's Ed25519 key. Issuer and audience
//! are `did:key` identifiers. A token may carry the encoded token it was
//! delegated from as its proof; validation walks that chain.

mod validate;

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::crypto::{KeyError, SecretKey};

pub use validate::{is_valid, root_issuer, validate, MAX_PROOF_DEPTH};

/// Tolerated clock drift between issuer and validator
pub const CLOCK_SKEW_SECS: i64 = 60;
pub const TOKEN_VERSION: &str = "1.0.0";
pub const SIGNATURE_ALGORITHM: &str = "EdDSA";

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token error: {0}")]
    Default(#[from] anyhow::Error),
    #[error("malformed token: {0}")]
    Malformed(String),
    #[error("unsupported signature algorithm {0}")]
    UnsupportedAlgorithm(String),
    #[error("invalid issuer: {0}")]
    Issuer(#[from] KeyError),
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired at {expired_at}, now {now}")]
    Expired { expired_at: i64, now: i64 },
    #[error("token not valid before {not_before}, now {now}")]
    NotYetValid { not_before: i64, now: i64 },
    #[error("proof audience {proof_audience} does not match issuer {issuer}")]
    BrokenChain {
        issuer: String,
        proof_audience: String,
    },
    #[error("potency {claimed:?} exceeds proof potency {granted:?}")]
    PotencyEscalation {
        claimed: Option<Potency>,
        granted: Option<Potency>,
    },
    #[error("proof chain deeper than {0}")]
    ProofTooDeep(usize),
}

/// Permission level, ordered from weakest to strongest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Potency {
    Append,
    Overwrite,
    SuperUser,
}

impl fmt::Display for Potency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Potency::Append => "APPEND",
            Potency::Overwrite => "OVERWRITE",
            Potency::SuperUser => "SUPER_USER",
        };
        f.write_str(s)
    }
}

impl FromStr for Potency {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "APPEND" => Ok(Potency::Append),
            "OVERWRITE" => Ok(Potency::Overwrite),
            "SUPER_USER" => Ok(Potency::SuperUser),
            other => Err(TokenError::Malformed(format!("unknown potency {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub alg: String,
    pub typ: String,
    pub uav: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub iss: String,
    pub aud: String,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    #[serde(default)]
    pub ptc: Option<Potency>,
    /// Encoded proof token
    #[serde(default)]
    pub prf: Option<String>,
}

/// An issued token; immutable once built or decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ucan {
    header: Header,
    payload: Payload,
    /// `base64(header).base64(payload)` exactly as signed
    signed_data: String,
    signature: String,
}

pub struct BuildParams<'a> {
    pub issuer: &'a SecretKey,
    pub audience: String,
    pub potency: Option<Potency>,
    pub lifetime_in_seconds: i64,
    pub proof: Option<String>,
}

fn encode_part<T: Serialize>(part: &T) -> Result<String, TokenError> {
    let json = serde_json::to_vec(part)
        .map_err(|e| TokenError::Malformed(format!("failed to serialize: {}", e)))?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

fn decode_part<T: serde::de::DeserializeOwned>(part: &str, what: &str) -> Result<T, TokenError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(part)
        .map_err(|e| TokenError::Malformed(format!("{} is not base64url: {}", what, e)))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| TokenError::Malformed(format!("{} is not valid json: {}", what, e)))
}

/// Sign a new token. Expiry is relative to now; long lived tokens just use
/// a very large lifetime.
pub fn build(params: BuildParams<'_>) -> Result<Ucan, TokenError> {
    let now = Utc::now().timestamp();
    let header = Header {
        alg: SIGNATURE_ALGORITHM.to_string(),
        typ: "JWT".to_string(),
        uav: TOKEN_VERSION.to_string(),
    };
    let payload = Payload {
        iss: params.issuer.did(),
        aud: params.audience,
        exp: now.saturating_add(params.lifetime_in_seconds),
        nbf: Some(now - CLOCK_SKEW_SECS),
        ptc: params.potency,
        prf: params.proof,
    };

    let signed_data = format!("{}.{}", encode_part(&header)?, encode_part(&payload)?);
    let signature = params.issuer.sign(signed_data.as_bytes());

    Ok(Ucan {
        header,
        payload,
        signed_data,
        signature: URL_SAFE_NO_PAD.encode(signature.to_bytes()),
    })
}

pub fn encode(token: &Ucan) -> String {
    format!("{}.{}", token.signed_data, token.signature)
}

/// Parse without verifying anything
pub fn decode(encoded: &str) -> Result<Ucan, TokenError> {
    let mut parts = encoded.trim().split('.');
    let (Some(header), Some(payload), Some(signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(TokenError::Malformed(
            "expected three dot separated segments".to_string(),
        ));
    };

    Ok(Ucan {
        header: decode_part(header, "header")?,
        payload: decode_part(payload, "payload")?,
        signed_data: format!("{}.{}", header, payload),
        signature: signature.to_string(),
    })
}

impl Ucan {
    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn issuer(&self) -> &str {
        &self.payload.iss
    }

    pub fn audience(&self) -> &str {
        &self.payload.aud
    }

    pub fn potency(&self) -> Option<Potency> {
        self.payload.ptc
    }

    pub fn proof(&self) -> Option<&str> {
        self.payload.prf.as_deref()
    }

    pub fn encode(&self) -> String {
        encode(self)
    }

    pub(crate) fn signed_data(&self) -> &str {
        &self.signed_data
    }

    pub(crate) fn signature(&self) -> &str {
        &self.signature
    }
}

impl fmt::Display for Ucan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for Ucan {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode(s)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_build_encode_decode() {
        let issuer = SecretKey::generate();
        let audience = SecretKey::generate().did();
        let token = build(BuildParams {
            issuer: &issuer,
            audience: audience.clone(),
            potency: Some(Potency::Overwrite),
            lifetime_in_seconds: 30,
            proof: None,
        })
        .unwrap();

        let encoded = encode(&token);
        assert_eq!(encoded.split('.').count(), 3);
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded, token);
        assert_eq!(decoded.issuer(), issuer.did());
        assert_eq!(decoded.audience(), audience);
        assert_eq!(decoded.header().alg, "EdDSA");
        assert!(decoded.payload().exp > Utc::now().timestamp());
    }

    #[test]
    fn test_potency_wire_format_and_order() {
        assert_eq!(
            serde_json::to_string(&Potency::SuperUser).unwrap(),
            "\"SUPER_USER\""
        );
        assert_eq!("APPEND".parse::<Potency>().unwrap(), Potency::Append);
        assert!(Potency::Append < Potency::Overwrite);
        assert!(Potency::Overwrite < Potency::SuperUser);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode("a.b"), Err(TokenError::Malformed(_))));
        assert!(matches!(decode("a.b.c.d"), Err(TokenError::Malformed(_))));
        assert!(matches!(decode("!!.??.sig"), Err(TokenError::Malformed(_))));
    }
}
