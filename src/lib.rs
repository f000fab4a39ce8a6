//! Client for the Docker/OCI distribution API (v2).
//!
//! [`Registry`] lists repositories and tags, and gets, uploads, and
//! deletes manifests. Requests go through a [transport chain](transport)
//! that solves `Bearer` and `Basic` authentication challenges, and
//! converts failed responses to [`ClientError`].

mod digest;
mod error;
mod logger;
pub mod manifest;
mod mediatype;
mod registry;
pub mod transport;

pub use digest::{Digest, DigestAlgorithm, DigestError};
pub use error::{BoxError, ClientError, Error, ErrorDetail, HttpStatusError, RegistryErrors, Result};
pub use logger::{Log, Logger, Quiet};
pub use mediatype::{InvalidMediaType, MediaType};
pub use registry::{Registry, RegistryBuilder};
pub use transport::Credentials;
