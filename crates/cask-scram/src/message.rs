//! Canonical auth-message encoding.
//!
//! This is the contract point with clients: both sides MAC over exactly these
//! bytes, so the encoding must stay stable bit-for-bit.

use base64::{engine::general_purpose::STANDARD, Engine as _};

/// Build the auth message both sides sign:
/// `"{login}:{base64(client_nonce)}:{base64(server_nonce)}"` as UTF-8.
pub fn auth_message(login: &str, client_nonce: &[u8], server_nonce: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(login.len() + 2 + (client_nonce.len() + server_nonce.len()) * 2);
    out.extend_from_slice(login.as_bytes());
    out.push(b':');
    out.extend_from_slice(STANDARD.encode(client_nonce).as_bytes());
    out.push(b':');
    out.extend_from_slice(STANDARD.encode(server_nonce).as_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_message_stable() {
        let msg = auth_message("a@b.c", &[1u8; 3], &[2u8; 3]);
        assert_eq!(msg, b"a@b.c:AQEB:AgIC".to_vec());
    }

    #[test]
    fn test_auth_message_distinguishes_inputs() {
        let base = auth_message("a@b.c", &[1u8; 16], &[2u8; 16]);
        assert_ne!(base, auth_message("a@b.d", &[1u8; 16], &[2u8; 16]));
        assert_ne!(base, auth_message("a@b.c", &[3u8; 16], &[2u8; 16]));
        assert_ne!(base, auth_message("a@b.c", &[1u8; 16], &[3u8; 16]));
    }
}
