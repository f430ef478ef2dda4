//! SSH algorithm tables and run-wide defaults.
//!
//! The `ALL_*` tables list every algorithm the SSH backend can negotiate.
//! Legacy mode picks its algorithms from these tables by wire name, so a
//! device that only speaks `diffie-hellman-group1-sha1` or `3des-cbc` can
//! still be reached when the inventory opts in.

use std::time::Duration;

use russh::keys::{Algorithm, EcdsaCurve, HashAlg};
use russh::{cipher, kex, mac};

/// Default per-command read timeout when the inventory sets none.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Upper bound for the per-command read timeout.
pub const MAX_TIMEOUT_SECS: u64 = 300;

/// Default number of concurrent workers.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Upper bound for the number of concurrent workers.
pub const MAX_CONCURRENCY: usize = 50;

/// Default output directory for transcripts.
pub const DEFAULT_BASE_DIR: &str = "./collected";

/// Length of one read poll. Cancellation is observed at least this often.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// How long to wait for the first prompt after login before sending commands.
pub const INITIAL_PROMPT_TIMEOUT: Duration = Duration::from_secs(10);

/// Grace period after sending the exit command.
pub const EXIT_DRAIN_DELAY: Duration = Duration::from_millis(300);

/// Command sent to leave the CLI once all commands ran.
pub const EXIT_COMMAND: &str = "quit";

/// Step of the linear retry backoff: retry `n` waits `n * RETRY_BACKOFF_STEP`.
pub const RETRY_BACKOFF_STEP: Duration = Duration::from_secs(2);

/// All supported key exchange algorithms.
pub const ALL_KEX_ORDER: &[kex::Name] = &[
    kex::CURVE25519,
    kex::CURVE25519_PRE_RFC_8731,
    kex::DH_GEX_SHA1,
    kex::DH_GEX_SHA256,
    kex::DH_G1_SHA1,
    kex::DH_G14_SHA1,
    kex::DH_G14_SHA256,
    kex::DH_G15_SHA512,
    kex::DH_G16_SHA512,
    kex::DH_G17_SHA512,
    kex::DH_G18_SHA512,
    kex::ECDH_SHA2_NISTP256,
    kex::ECDH_SHA2_NISTP384,
    kex::ECDH_SHA2_NISTP521,
];

/// All supported cipher algorithms, including CBC modes for older devices.
pub static ALL_CIPHERS: &[cipher::Name] = &[
    cipher::AES_128_CTR,
    cipher::AES_192_CTR,
    cipher::AES_256_CTR,
    cipher::AES_256_GCM,
    cipher::AES_128_CBC,
    cipher::AES_192_CBC,
    cipher::AES_256_CBC,
    cipher::TRIPLE_DES_CBC,
    cipher::CHACHA20_POLY1305,
];

/// All supported MAC algorithms.
pub const ALL_MAC_ALGORITHMS: &[mac::Name] = &[
    mac::HMAC_SHA1,
    mac::HMAC_SHA256,
    mac::HMAC_SHA512,
    mac::HMAC_SHA1_ETM,
    mac::HMAC_SHA256_ETM,
    mac::HMAC_SHA512_ETM,
];

/// All supported host key algorithms.
pub const ALL_KEY_TYPES: &[Algorithm] = &[
    Algorithm::Dsa,
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP256,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP384,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP521,
    },
    Algorithm::Ed25519,
    Algorithm::Rsa { hash: None },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha256),
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha512),
    },
];

/// Key exchange algorithms offered in legacy mode when none are configured.
pub const LEGACY_DEFAULT_KEX: &[&str] = &[
    "diffie-hellman-group-exchange-sha256",
    "diffie-hellman-group-exchange-sha1",
    "diffie-hellman-group14-sha1",
    "diffie-hellman-group1-sha1",
];

/// Ciphers offered in legacy mode when none are configured.
pub const LEGACY_DEFAULT_CIPHERS: &[&str] = &[
    "aes128-ctr",
    "aes192-ctr",
    "aes256-ctr",
    "aes128-cbc",
    "aes192-cbc",
    "aes256-cbc",
    "3des-cbc",
];

/// MACs offered in legacy mode when none are configured.
pub const LEGACY_DEFAULT_MACS: &[&str] = &["hmac-sha2-256", "hmac-sha2-512", "hmac-sha1"];

/// Looks up a key exchange algorithm by its wire name.
pub fn kex_by_name(name: &str) -> Option<kex::Name> {
    ALL_KEX_ORDER.iter().find(|k| AsRef::<str>::as_ref(*k) == name).copied()
}

/// Looks up a cipher by its wire name.
pub fn cipher_by_name(name: &str) -> Option<cipher::Name> {
    ALL_CIPHERS.iter().find(|c| AsRef::<str>::as_ref(*c) == name).copied()
}

/// Looks up a MAC algorithm by its wire name.
pub fn mac_by_name(name: &str) -> Option<mac::Name> {
    ALL_MAC_ALGORITHMS.iter().find(|m| AsRef::<str>::as_ref(*m) == name).copied()
}

/// Looks up a host key algorithm by its wire name.
pub fn key_type_by_name(name: &str) -> Option<Algorithm> {
    ALL_KEY_TYPES.iter().find(|a| a.as_str() == name).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_defaults_resolve_to_known_algorithms() {
        for name in LEGACY_DEFAULT_KEX {
            assert!(kex_by_name(name).is_some(), "kex {name}");
        }
        for name in LEGACY_DEFAULT_CIPHERS {
            assert!(cipher_by_name(name).is_some(), "cipher {name}");
        }
        for name in LEGACY_DEFAULT_MACS {
            assert!(mac_by_name(name).is_some(), "mac {name}");
        }
    }

    #[test]
    fn unknown_algorithm_names_are_not_resolved() {
        assert!(kex_by_name("diffie-hellman-group0-md5").is_none());
        assert!(cipher_by_name("rot13").is_none());
        assert!(mac_by_name("hmac-sha1-96").is_none());
    }
}
