use {
    base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD},
    rand::Rng,
    sha2::{Digest, Sha256},
};

use crate::types::PkceChallenge;

/// Generate a fresh verifier (43 URL-safe chars) and its S256 challenge.
pub fn generate() -> PkceChallenge {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    let verifier = URL_SAFE_NO_PAD.encode(bytes);
    let challenge = challenge_for(&verifier);
    PkceChallenge {
        verifier,
        challenge,
    }
}

/// S256 code challenge for `verifier`.
pub fn challenge_for(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}
