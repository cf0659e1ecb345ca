//! Signed QR token issuance and resolution.
//!
//! A token names an entity without embedding its identifier: the text carries
//! only an opaque UUID plus an HMAC signature, and the UUID -> entity mapping
//! lives in the [`TokenStore`]. A forged-but-well-signed token therefore
//! still fails at lookup, and a never-issued UUID fails deterministically,
//! giving two independent failure layers.
//!
//! Token text format (stable, compatibility matters):
//! `"<entity_type>:<uuid>[|eph=1]|sig=<16-hex-char-signature>"`.

pub mod error;
pub mod service;
pub mod signer;
pub mod store;

pub use error::{TokenError, TokenResult};
pub use service::{Resolution, TokenConfig, TokenService, scan_url};
pub use signer::{SIGNATURE_LEN, Signer, generate_secret};
pub use store::{InMemoryTokenStore, TokenRecord, TokenStore};
