//! Authentication.
//!
//! The handshake hands the raw bytes of exactly one credential frame to an
//! [`Authenticator`]; the predicate decides, the session layer acts. One
//! attempt per connection, no retry.

use std::collections::HashMap;

use tracing::debug;

use crate::codec;

/// Predicate over the raw credential frame. The session core never
/// interprets credentials itself.
pub trait Authenticator: Send + Sync {
    fn check(&self, raw: &[u8]) -> bool;
}

/// Checks credentials against a static account map.
#[derive(Debug, Default)]
pub struct PasswordAuthenticator {
    accounts: HashMap<String, String>,
}

impl PasswordAuthenticator {
    pub fn new(accounts: HashMap<String, String>) -> Self {
        Self { accounts }
    }

    pub fn with_account(mut self, user: &str, pass: &str) -> Self {
        self.accounts.insert(user.to_string(), pass.to_string());
        self
    }
}

impl Authenticator for PasswordAuthenticator {
    fn check(&self, raw: &[u8]) -> bool {
        let Some((user, pass)) = codec::parse_credentials(raw) else {
            debug!("Malformed credential frame");
            return false;
        };
        self.accounts.get(&user).is_some_and(|expected| *expected == pass)
    }
}

/// Accepts any well-formed credential frame. Open-server mode for LAN play
/// and development; the binary logs loudly when it is active.
#[derive(Debug, Default)]
pub struct OpenAuthenticator;

impl Authenticator for OpenAuthenticator {
    fn check(&self, raw: &[u8]) -> bool {
        codec::parse_credentials(raw).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_authenticator_matches_account() {
        let auth = PasswordAuthenticator::default().with_account("ormr", "fafnir");
        assert!(auth.check(&codec::credentials_frame("ormr", "fafnir")));
        assert!(!auth.check(&codec::credentials_frame("ormr", "wrong")));
        assert!(!auth.check(&codec::credentials_frame("nobody", "fafnir")));
    }

    #[test]
    fn garbage_credentials_rejected() {
        let auth = PasswordAuthenticator::default().with_account("ormr", "fafnir");
        assert!(!auth.check(b"not a credential frame"));
        assert!(!auth.check(&[]));
    }

    #[test]
    fn open_authenticator_requires_well_formed_frame() {
        let auth = OpenAuthenticator;
        assert!(auth.check(&codec::credentials_frame("anyone", "anything")));
        assert!(!auth.check(b"\xff\xff"));
    }
}
