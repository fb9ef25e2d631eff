use data_encoding::BASE64URL_NOPAD;
use itip::{ItipError, TokenMinter};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tiny_keccak::{Hasher, Kmac};

const MAC_CUSTOMIZATION: &[u8] = b"itipd-dav-token";

/// Mints the compact three-segment tokens the DAV frontend accepts as a
/// short-lived password: `base64(user) "!" expiry "!" base64(mac)`,
/// where the MAC is KMAC128 over `user "!" expiry`.
pub struct KmacTokenMinter {
    key: Vec<u8>,
    ttl: Duration,
}

impl KmacTokenMinter {
    pub fn new(key: &[u8], ttl: Duration) -> Self {
        Self {
            key: key.to_vec(),
            ttl,
        }
    }

    fn mac(&self, payload: &[u8]) -> [u8; 16] {
        let mut kmac = Kmac::v128(&self.key, MAC_CUSTOMIZATION);
        kmac.update(payload);
        let mut out = [0u8; 16];
        kmac.finalize(&mut out);
        out
    }

    /// Validate a token and return its user when the MAC matches and
    /// the expiry lies in the future.
    pub fn validate(&self, token: &str) -> Option<String> {
        let mut segments = token.split('!');
        let user = segments.next()?;
        let expiry = segments.next()?;
        let mac = segments.next()?;
        if segments.next().is_some() {
            return None;
        }

        let user = String::from_utf8(BASE64URL_NOPAD.decode(user.as_bytes()).ok()?).ok()?;
        let mac = BASE64URL_NOPAD.decode(mac.as_bytes()).ok()?;
        let expected = self.mac(format!("{user}!{expiry}").as_bytes());
        if mac != expected {
            return None;
        }

        let expires: u64 = expiry.parse().ok()?;
        let now = SystemTime::now().duration_since(UNIX_EPOCH).ok()?.as_secs();
        if expires <= now {
            return None;
        }

        Some(user)
    }
}

impl TokenMinter for KmacTokenMinter {
    fn mint(&self, user: &str) -> itip::Result<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|err| ItipError::Token(err.to_string()))?
            .as_secs();
        let expires = now + self.ttl.as_secs();

        let mac = self.mac(format!("{user}!{expires}").as_bytes());
        Ok(format!(
            "{}!{}!{}",
            BASE64URL_NOPAD.encode(user.as_bytes()),
            expires,
            BASE64URL_NOPAD.encode(&mac),
        ))
    }
}
