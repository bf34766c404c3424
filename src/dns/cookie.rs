use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::net::IpAddr;

type HmacSha256 = Hmac<Sha256>;

/// Process-wide DNS cookie secret (RFC 7873). Generated once at startup
/// unless pinned via `cookiesecret` in config, in which case the same
/// server cookie survives a restart for clients that cached it.
#[derive(Clone)]
pub struct CookieSecret(Vec<u8>);

impl CookieSecret {
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes.to_vec())
    }

    pub fn from_hex(value: &str) -> Option<Self> {
        hex::decode(value).ok().map(Self)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Deterministic, non-reversible server cookie for `client_ip` and the
    /// client's own 8-byte cookie. Truncated to 8 bytes per RFC 7873's
    /// "at least 8, at most 32 bytes" server cookie allowance.
    pub fn server_cookie(&self, client_ip: IpAddr, client_cookie: [u8; 8]) -> [u8; 8] {
        let mut mac = HmacSha256::new_from_slice(&self.0).expect("hmac accepts any key length");
        mac.update(client_ip.to_string().as_bytes());
        mac.update(&client_cookie);
        let digest = mac.finalize().into_bytes();
        let mut out = [0u8; 8];
        out.copy_from_slice(&digest[0..8]);
        out
    }
}

impl std::fmt::Debug for CookieSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CookieSecret(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_cookie_is_deterministic() {
        let secret = CookieSecret::from_hex("00112233445566778899aabbccddeeff00").unwrap_or_else(CookieSecret::generate);
        let ip: IpAddr = "203.0.113.1".parse().unwrap();
        let client_cookie = [1, 2, 3, 4, 5, 6, 7, 8];

        let a = secret.server_cookie(ip, client_cookie);
        let b = secret.server_cookie(ip, client_cookie);
        assert_eq!(a, b);
    }

    #[test]
    fn server_cookie_differs_per_client() {
        let secret = CookieSecret::generate();
        let client_cookie = [1, 2, 3, 4, 5, 6, 7, 8];

        let a = secret.server_cookie("203.0.113.1".parse().unwrap(), client_cookie);
        let b = secret.server_cookie("203.0.113.2".parse().unwrap(), client_cookie);
        assert_ne!(a, b);
    }
}
