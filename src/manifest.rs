//! Manifest schemas supported by the registry client.
//!
//! Every deserialized manifest keeps the bytes it was decoded from, so
//! [`Manifest::payload`] returns the exact document received from the
//! registry, and its digest is stable.
//!
//! Refs:
//!
//! * <https://distribution.github.io/distribution/spec/manifest-v2-1/>
//! * <https://distribution.github.io/distribution/spec/manifest-v2-2/>
//! * <https://github.com/opencontainers/image-spec/blob/main/manifest.md>
//! * <https://github.com/opencontainers/image-spec/blob/main/image-index.md>

use std::collections::BTreeMap;

use crate::{Digest, MediaType};

#[derive(thiserror::Error, Debug)]
pub enum ManifestError {
    #[error("{0}")]
    Json(#[from] serde_json::Error),

    #[error("Expected media type {expected}, found {found:?}.")]
    UnexpectedMediaType { expected: MediaType, found: String },

    #[error("Unsupported media type {0} for this schema.")]
    UnsupportedMediaType(MediaType),
}

/// Codec for a manifest schema.
pub trait Manifest {
    /// Decode a manifest received with `media_type`.
    fn decode(media_type: MediaType, data: &[u8]) -> Result<Self, ManifestError>
    where
        Self: Sized;

    /// Media type and serialized document to send to the registry.
    fn payload(&self) -> Result<(MediaType, &[u8]), ManifestError>;

    /// Digest of the serialized document.
    fn digest(&self) -> Result<Digest, ManifestError> {
        let (_, data) = self.payload()?;
        Ok(Digest::from_bytes(data))
    }
}

/// Reference to a blob or to another manifest.
#[derive(serde::Deserialize, serde::Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    pub media_type: String,
    pub size: u64,
    pub digest: Digest,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
}

#[derive(serde::Deserialize, serde::Serialize, Clone, Debug, PartialEq)]
pub struct Platform {
    pub architecture: String,
    pub os: String,

    #[serde(rename = "os.version", default, skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,

    #[serde(rename = "os.features", default, skip_serializing_if = "Vec::is_empty")]
    pub os_features: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<String>,
}

/// Generate a manifest type that keeps the decoded document and its
/// serialized bytes.
macro_rules! deserialized {
    ($(#[$meta:meta])* $name:ident($inner:ty)) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq)]
        pub struct $name {
            document: $inner,
            canonical: Vec<u8>,
        }

        impl $name {
            /// Serialize `document` to build the payload.
            pub fn from_document(document: $inner) -> Result<Self, ManifestError> {
                let canonical = serde_json::to_vec_pretty(&document)?;
                Ok($name { document, canonical })
            }

            pub fn document(&self) -> &$inner {
                &self.document
            }

            pub fn into_document(self) -> $inner {
                self.document
            }
        }
    };
}

/// Check the `mediaType` field of a document, if present.
fn check_media_type(expected: &[MediaType], found: Option<&str>) -> Result<(), ManifestError> {
    match found {
        None => Ok(()),
        Some(f) if expected.iter().any(|e| e.as_str() == f) => Ok(()),
        Some(f) => Err(ManifestError::UnexpectedMediaType {
            expected: expected[0],
            found: f.to_owned(),
        }),
    }
}

// Schema 1.

#[derive(serde::Deserialize, serde::Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ManifestV1 {
    #[serde(default)]
    pub schema_version: u32,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub tag: String,

    #[serde(default)]
    pub architecture: String,

    #[serde(default)]
    pub fs_layers: Vec<FsLayer>,

    #[serde(default)]
    pub history: Vec<History>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signatures: Option<Vec<serde_json::Value>>,
}

#[derive(serde::Deserialize, serde::Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FsLayer {
    pub blob_sum: Digest,
}

#[derive(serde::Deserialize, serde::Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct History {
    pub v1_compatibility: String,
}

deserialized!(
    /// Schema 1 manifest, signed or not.
    SignedManifest(ManifestV1)
);

impl Manifest for SignedManifest {
    fn decode(media_type: MediaType, data: &[u8]) -> Result<Self, ManifestError> {
        match media_type {
            MediaType::DockerManifestV1 | MediaType::DockerManifestV1Signed => (),
            other => return Err(ManifestError::UnsupportedMediaType(other)),
        }

        Ok(SignedManifest {
            document: serde_json::from_slice(data)?,
            canonical: data.to_vec(),
        })
    }

    fn payload(&self) -> Result<(MediaType, &[u8]), ManifestError> {
        let media_type = match &self.document.signatures {
            Some(s) if !s.is_empty() => MediaType::DockerManifestV1Signed,
            _ => MediaType::DockerManifestV1,
        };

        Ok((media_type, &self.canonical))
    }
}

// Schema 2.

#[derive(serde::Deserialize, serde::Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ManifestV2 {
    #[serde(default)]
    pub schema_version: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Descriptor>,

    #[serde(default)]
    pub layers: Vec<Descriptor>,
}

deserialized!(
    /// Docker image manifest, version 2, schema 2.
    DeserializedManifest(ManifestV2)
);

impl Manifest for DeserializedManifest {
    fn decode(media_type: MediaType, data: &[u8]) -> Result<Self, ManifestError> {
        if media_type != MediaType::DockerManifestV2 {
            return Err(ManifestError::UnsupportedMediaType(media_type));
        }

        let document: ManifestV2 = serde_json::from_slice(data)?;
        check_media_type(&[MediaType::DockerManifestV2], document.media_type.as_deref())?;

        Ok(DeserializedManifest {
            document,
            canonical: data.to_vec(),
        })
    }

    fn payload(&self) -> Result<(MediaType, &[u8]), ManifestError> {
        Ok((MediaType::DockerManifestV2, &self.canonical))
    }
}

// OCI.

#[derive(serde::Deserialize, serde::Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageManifest {
    #[serde(default)]
    pub schema_version: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Descriptor>,

    #[serde(default)]
    pub layers: Vec<Descriptor>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<Descriptor>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

deserialized!(
    /// OCI image manifest.
    OciManifest(ImageManifest)
);

impl Manifest for OciManifest {
    fn decode(media_type: MediaType, data: &[u8]) -> Result<Self, ManifestError> {
        if media_type != MediaType::OciManifestV1 {
            return Err(ManifestError::UnsupportedMediaType(media_type));
        }

        let document: ImageManifest = serde_json::from_slice(data)?;
        check_media_type(&[MediaType::OciManifestV1], document.media_type.as_deref())?;

        Ok(OciManifest {
            document,
            canonical: data.to_vec(),
        })
    }

    fn payload(&self) -> Result<(MediaType, &[u8]), ManifestError> {
        Ok((MediaType::OciManifestV1, &self.canonical))
    }
}

// Manifest lists and image indexes.

#[derive(serde::Deserialize, serde::Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageIndex {
    #[serde(default)]
    pub schema_version: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,

    #[serde(default)]
    pub manifests: Vec<Descriptor>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

deserialized!(
    /// Docker manifest list, or OCI image index.
    ManifestList(ImageIndex)
);

impl ManifestList {
    /// Media type of the document.
    ///
    /// Documents with no `mediaType` field are OCI image indexes.
    pub fn media_type(&self) -> MediaType {
        match self.document.media_type.as_deref() {
            Some(t) if t == MediaType::DockerManifestList.as_str() => MediaType::DockerManifestList,
            _ => MediaType::OciImageIndex,
        }
    }
}

impl Manifest for ManifestList {
    fn decode(media_type: MediaType, data: &[u8]) -> Result<Self, ManifestError> {
        const LISTS: &[MediaType] = &[MediaType::DockerManifestList, MediaType::OciImageIndex];

        if !LISTS.contains(&media_type) {
            return Err(ManifestError::UnsupportedMediaType(media_type));
        }

        let document: ImageIndex = serde_json::from_slice(data)?;
        check_media_type(LISTS, document.media_type.as_deref())?;

        Ok(ManifestList {
            document,
            canonical: data.to_vec(),
        })
    }

    fn payload(&self) -> Result<(MediaType, &[u8]), ManifestError> {
        Ok((self.media_type(), &self.canonical))
    }
}
