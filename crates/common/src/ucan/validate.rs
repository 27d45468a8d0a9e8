use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;

use crate::crypto::{PublicKey, Signature};

use super::{decode, TokenError, Ucan, CLOCK_SKEW_SECS, SIGNATURE_ALGORITHM};

/// Longest proof chain accepted, counting the token itself as depth 0
pub const MAX_PROOF_DEPTH: usize = 8;

/// Check signature, time bounds and the whole proof chain
pub fn validate(token: &Ucan) -> Result<(), TokenError> {
    validate_at(token, Utc::now().timestamp(), 0)
}

pub fn is_valid(token: &Ucan) -> bool {
    match validate(token) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("rejected token from {}: {}", token.issuer(), e);
            false
        }
    }
}

fn validate_at(token: &Ucan, now: i64, depth: usize) -> Result<(), TokenError> {
    if depth > MAX_PROOF_DEPTH {
        return Err(TokenError::ProofTooDeep(MAX_PROOF_DEPTH));
    }

    verify_signature(token)?;

    let payload = token.payload();
    if now > payload.exp {
        return Err(TokenError::Expired {
            expired_at: payload.exp,
            now,
        });
    }
    if let Some(not_before) = payload.nbf {
        if not_before > now + CLOCK_SKEW_SECS {
            return Err(TokenError::NotYetValid { not_before, now });
        }
    }

    let Some(encoded) = token.proof() else {
        return Ok(());
    };
    let proof = decode(encoded)?;
    validate_at(&proof, now, depth + 1)?;

    if proof.audience() != token.issuer() {
        return Err(TokenError::BrokenChain {
            issuer: token.issuer().to_string(),
            proof_audience: proof.audience().to_string(),
        });
    }
    if token.potency() > proof.potency() {
        return Err(TokenError::PotencyEscalation {
            claimed: token.potency(),
            granted: proof.potency(),
        });
    }
    Ok(())
}

fn verify_signature(token: &Ucan) -> Result<(), TokenError> {
    let alg = &token.header().alg;
    if alg != SIGNATURE_ALGORITHM {
        return Err(TokenError::UnsupportedAlgorithm(alg.clone()));
    }

    let issuer = PublicKey::from_did(token.issuer())?;
    let bytes = URL_SAFE_NO_PAD
        .decode(token.signature())
        .map_err(|_| TokenError::InvalidSignature)?;
    let bytes: [u8; 64] = bytes
        .try_into()
        .map_err(|_| TokenError::InvalidSignature)?;
    issuer
        .verify(token.signed_data().as_bytes(), &Signature::from_bytes(&bytes))
        .map_err(|_| TokenError::InvalidSignature)
}

/// Issuer at the bottom of the proof chain. Does not validate anything.
pub fn root_issuer(encoded: &str) -> Result<String, TokenError> {
    let mut token = decode(encoded)?;
    for _ in 0..=MAX_PROOF_DEPTH {
        match token.proof() {
            Some(proof) => token = decode(proof)?,
            None => return Ok(token.issuer().to_string()),
        }
    }
    Err(TokenError::ProofTooDeep(MAX_PROOF_DEPTH))
}
