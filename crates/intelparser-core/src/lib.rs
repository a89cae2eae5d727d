//! Core data model, error types, and small standalone utilities shared by
//! every other intelparser crate: detector, store, and the root binary.

pub mod cpf;
pub mod entropy;
pub mod errors;
pub mod fingerprint;
pub mod model;

pub use cpf::{extract_cpf, validate_cpf};
pub use entropy::shannon_entropy;
pub use errors::{IntelparserError, IntelparserResult};
pub use fingerprint::{sha1_hex, sha1_hex_file};
pub use model::{Credential, Document, Email, Finding, Fragment, ManifestEntry, Url};
