//! HMAC-based draw generator.

use hmac::{Hmac, Mac};
use rand::{Rng, distr::Alphanumeric};
use serde::{Deserialize, Serialize};
use sha2::Sha512;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

type HmacSha512 = Hmac<Sha512>;

/// Algorithm tag stored with every draw
pub const ALGORITHM: &str = "sha512";

/// Length of a generated server seed
pub const SERVER_SEED_LEN: usize = 64;

/// Stopping values live in `0..VALUE_MODULUS` hundredths, i.e. `[0, 100)`
const VALUE_MODULUS: u32 = 10_000;

/// Stopping value in hundredths (`5000` is `50.00`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoppingValue(u32);

impl StoppingValue {
    /// Largest representable value (`99.99`)
    pub const MAX: StoppingValue = StoppingValue(VALUE_MODULUS - 1);

    /// Build from hundredths, rejecting anything outside `[0, 100)`
    pub fn from_hundredths(hundredths: u32) -> Option<Self> {
        (hundredths < VALUE_MODULUS).then_some(Self(hundredths))
    }

    pub fn hundredths(self) -> u32 {
        self.0
    }

    /// Decimal view used for persistence and display
    pub fn as_f64(self) -> f64 {
        f64::from(self.0) / 100.0
    }
}

impl fmt::Display for StoppingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

/// Audit record of a single draw
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draw {
    pub algorithm: String,
    pub client_seed: String,
    pub server_seed: String,
    /// Hex-encoded HMAC digest the stopping value was read from
    pub result_hash: String,
    pub nonce: u64,
    pub stopping_value: StoppingValue,
    pub min: u32,
    pub max: u32,
}

/// Draw generator with a monotonic nonce.
///
/// The nonce only ever moves forward. Servers resume it from storage on
/// startup with [`DrawGenerator::starting_at`].
#[derive(Debug, Default)]
pub struct DrawGenerator {
    nonce: AtomicU64,
}

impl DrawGenerator {
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    /// Create a generator whose next draw uses `nonce`
    pub fn starting_at(nonce: u64) -> Self {
        Self {
            nonce: AtomicU64::new(nonce),
        }
    }

    /// Nonce the next draw will use
    pub fn next_nonce(&self) -> u64 {
        self.nonce.load(Ordering::SeqCst)
    }

    /// Produce a draw for `client_seed` with a freshly generated server seed.
    ///
    /// # Arguments
    ///
    /// * `client_seed` - Seed contributed by the caller
    /// * `domain_max` - Upper bound of the declared value domain, recorded as `max`
    pub fn draw(&self, client_seed: &str, domain_max: u32) -> Draw {
        let server_seed = new_server_seed();
        let nonce = self.nonce.fetch_add(1, Ordering::SeqCst);
        let (result_hash, stopping_value) = compute(&server_seed, client_seed, nonce);

        log::debug!(
            "Draw nonce={} stopping_value={} hash={}",
            nonce,
            stopping_value,
            &result_hash[..16]
        );

        Draw {
            algorithm: ALGORITHM.to_string(),
            client_seed: client_seed.to_string(),
            server_seed,
            result_hash,
            nonce,
            stopping_value,
            min: 0,
            max: domain_max,
        }
    }
}

/// Recompute the digest and stopping value for the given inputs.
///
/// `HMAC-SHA512(key = server_seed, msg = "{client_seed}-{nonce}")`, hex
/// encoded; the first five hex digits are read as an integer and reduced
/// modulo 10000.
pub fn compute(server_seed: &str, client_seed: &str, nonce: u64) -> (String, StoppingValue) {
    let mut mac = HmacSha512::new_from_slice(server_seed.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(format!("{client_seed}-{nonce}").as_bytes());
    let digest = mac.finalize().into_bytes();

    // First five hex digits == top 20 bits of the digest
    let prefix =
        (u32::from(digest[0]) << 12) | (u32::from(digest[1]) << 4) | (u32::from(digest[2]) >> 4);

    (hex::encode(digest), StoppingValue(prefix % VALUE_MODULUS))
}

/// Check that a persisted draw is consistent with its own seeds and nonce
pub fn verify(draw: &Draw) -> bool {
    let (hash, value) = compute(&draw.server_seed, &draw.client_seed, draw.nonce);
    hash == draw.result_hash && value == draw.stopping_value
}

/// Generate a server seed from the thread-local CSPRNG
pub fn new_server_seed() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(SERVER_SEED_LEN)
        .map(char::from)
        .collect()
}

/// Client seed used when the caller does not provide one
pub fn new_client_seed() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn test_known_vector() {
        let (hash, value) = compute("server-seed-for-tests", "client-seed", 0);
        assert_eq!(
            hash,
            "cea5ecc5730777b37870676e1a6335eb9d4d4376384a80026b43d23efeaa973c\
             4bc050d31fbfb1ae78db27ecb9f2476f5da8ac9cd09fa9f306f144028d3fc0d4"
        );
        assert_eq!(value.hundredths(), 0xcea5e % 10_000);
        assert_eq!(value.to_string(), "64.30");
    }

    #[test]
    fn test_nonce_changes_result() {
        let (hash0, _) = compute("server-seed-for-tests", "client-seed", 0);
        let (hash1, value1) = compute("server-seed-for-tests", "client-seed", 1);
        assert_ne!(hash0, hash1);
        assert_eq!(value1.hundredths(), 9174);
    }

    #[test]
    fn test_nonce_is_monotonic() {
        let generator = DrawGenerator::new();
        let nonces: Vec<u64> = (0..5).map(|_| generator.draw("seed", 100).nonce).collect();
        assert_eq!(nonces, vec![0, 1, 2, 3, 4]);
        assert_eq!(generator.next_nonce(), 5);
    }

    #[test]
    fn test_starting_at_resumes_nonce() {
        let generator = DrawGenerator::starting_at(41);
        assert_eq!(generator.draw("seed", 100).nonce, 41);
        assert_eq!(generator.next_nonce(), 42);
    }

    #[test]
    fn test_server_seeds_are_fresh() {
        let generator = DrawGenerator::new();
        let seeds: HashSet<String> = (0..50)
            .map(|_| generator.draw("seed", 100).server_seed)
            .collect();
        assert_eq!(seeds.len(), 50);
        assert!(seeds.iter().all(|s| s.len() == SERVER_SEED_LEN));
    }

    #[test]
    fn test_draw_records_domain() {
        let draw = DrawGenerator::new().draw("client", 100);
        assert_eq!(draw.algorithm, ALGORITHM);
        assert_eq!(draw.min, 0);
        assert_eq!(draw.max, 100);
        assert_eq!(draw.client_seed, "client");
        assert!(verify(&draw));
    }

    #[test]
    fn test_tampered_draw_fails_verification() {
        let mut draw = DrawGenerator::new().draw("client", 100);
        draw.nonce += 1;
        assert!(!verify(&draw));
    }

    #[test]
    fn test_stopping_value_bounds() {
        assert!(StoppingValue::from_hundredths(9999).is_some());
        assert!(StoppingValue::from_hundredths(10_000).is_none());
        assert_eq!(StoppingValue::MAX.to_string(), "99.99");
        assert_eq!(StoppingValue(5).to_string(), "0.05");
    }

    proptest! {
        #[test]
        fn prop_compute_is_deterministic(
            server in "[a-zA-Z0-9]{64}",
            client in "[a-z0-9-]{1,36}",
            nonce in any::<u64>(),
        ) {
            let first = compute(&server, &client, nonce);
            let second = compute(&server, &client, nonce);
            prop_assert_eq!(&first, &second);
            prop_assert!(first.1.as_f64() < 100.0);
        }
    }
}
