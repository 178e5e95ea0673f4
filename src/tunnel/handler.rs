//! SSH client handler
//!
//! Implements the russh client `Handler` trait. The only decision the
//! client side makes is whether to trust the server's host key.

use crate::config::HostKeyPolicy;
use russh::client::Handler;
use russh::keys::{HashAlg, PublicKey};

/// SSH client handler applying a [`HostKeyPolicy`]
#[derive(Debug, Clone)]
pub struct ClientHandler {
    policy: HostKeyPolicy,
}

impl ClientHandler {
    /// Create a handler for the given trust policy
    pub fn new(policy: HostKeyPolicy) -> Self {
        Self { policy }
    }
}

impl Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        let fingerprint = server_public_key.fingerprint(HashAlg::Sha256).to_string();

        match &self.policy {
            HostKeyPolicy::AcceptAny => {
                tracing::warn!(
                    %fingerprint,
                    "Host key verification disabled, accepting server key"
                );
                Ok(true)
            }
            HostKeyPolicy::Fingerprint { fingerprint: expected } => {
                if fingerprint_matches(expected, &fingerprint) {
                    tracing::debug!(%fingerprint, "Server host key matches pinned fingerprint");
                    Ok(true)
                } else {
                    tracing::error!(
                        %fingerprint,
                        expected = %expected,
                        "Server host key does not match pinned fingerprint"
                    );
                    Ok(false)
                }
            }
        }
    }
}

/// Compare two OpenSSH `SHA256:` fingerprints
///
/// Base64 padding is optional in OpenSSH output, so trailing `=` is ignored.
pub fn fingerprint_matches(expected: &str, actual: &str) -> bool {
    expected.trim().trim_end_matches('=') == actual.trim().trim_end_matches('=')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_matches_exact() {
        assert!(fingerprint_matches(
            "SHA256:47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU",
            "SHA256:47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU"
        ));
    }

    #[test]
    fn test_fingerprint_matches_ignores_padding_and_whitespace() {
        assert!(fingerprint_matches(
            " SHA256:47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU= ",
            "SHA256:47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU"
        ));
    }

    #[test]
    fn test_fingerprint_mismatch() {
        assert!(!fingerprint_matches("SHA256:aaaa", "SHA256:bbbb"));
        assert!(!fingerprint_matches("", "SHA256:bbbb"));
    }

    #[test]
    fn test_handler_keeps_policy() {
        let handler = ClientHandler::new(HostKeyPolicy::AcceptAny);
        assert_eq!(handler.policy, HostKeyPolicy::AcceptAny);
    }
}
