//! Provably fair draw generation.
//!
//! Every round gets one [`Draw`]: a fresh server seed, a client seed and the
//! generator nonce are fed through HMAC-SHA512, and the first five hex digits
//! of the digest select a stopping value in `[0, 100)`.
//!
//! The seeds, nonce and digest are persisted with the round, so anyone can
//! recompute the stopping value with [`verify`] (or any HMAC implementation).
//!
//! ## Example
//!
//! ```
//! use roulette::fairness::{self, DrawGenerator};
//!
//! let generator = DrawGenerator::new();
//! let draw = generator.draw("my-client-seed", 100);
//!
//! assert!(fairness::verify(&draw));
//! assert!(draw.stopping_value.as_f64() < 100.0);
//! ```

pub mod generator;

pub use generator::{
    ALGORITHM, Draw, DrawGenerator, SERVER_SEED_LEN, StoppingValue, compute, new_client_seed,
    new_server_seed, verify,
};
