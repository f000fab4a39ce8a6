use std::{fmt, str::FromStr};

/// Generate the `MediaType` enum, its `FromStr` and `Display`
/// implementations, and the associated constant `ALL` with all
/// the valid values.
macro_rules! media_types {
    ($($variant:ident = $mediatype:expr,)*) => {
        /// Manifest media types understood by the registry client.
        #[non_exhaustive]
        #[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
        pub enum MediaType {
            $(
                #[doc = concat!("Variant for `", $mediatype, "`.")]
                $variant,
            )*
        }

        impl MediaType {
            /// List with all known media types.
            pub const ALL: &[MediaType] = &[ $(MediaType::$variant),* ];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(MediaType::$variant => $mediatype,)*
                }
            }
        }

        impl FromStr for MediaType {
            type Err = InvalidMediaType;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                // Ignore parameters, like `; charset=utf-8`.
                let s = s.split(';').next().unwrap_or_default().trim_ascii();
                match s {
                    $($mediatype => Ok(MediaType::$variant),)*
                    _ => Err(InvalidMediaType(s.to_owned())),
                }
            }
        }

        impl fmt::Display for MediaType {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    }
}

// The order of this list is the order of the `Accept` headers sent
// by `Registry::manifest_digest`.
media_types!(
    DockerManifestV2 = "application/vnd.docker.distribution.manifest.v2+json",
    DockerManifestV1 = "application/vnd.docker.distribution.manifest.v1+json",
    DockerManifestV1Signed = "application/vnd.docker.distribution.manifest.v1+prettyjws",
    DockerManifestList = "application/vnd.docker.distribution.manifest.list.v2+json",
    OciManifestV1 = "application/vnd.oci.image.manifest.v1+json",
    OciImageIndex = "application/vnd.oci.image.index.v1+json",
);

#[derive(thiserror::Error, Debug, PartialEq)]
#[error("Unknown media type: {0:?}")]
pub struct InvalidMediaType(pub String);

struct MediaTypeVisitor;

impl<'de> serde::de::Visitor<'de> for MediaTypeVisitor {
    type Value = MediaType;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("Media type for OCI/Docker manifests.")
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        MediaType::from_str(v).map_err(E::custom)
    }
}

impl<'de> serde::Deserialize<'de> for MediaType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_str(MediaTypeVisitor)
    }
}

impl serde::Serialize for MediaType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

#[test]
fn media_type_in_json() {
    #[derive(serde::Deserialize, Debug)]
    struct Example {
        mt: MediaType,
    }

    assert!(matches!(
        serde_json::from_str(r#"{"mt": "application/vnd.oci.image.index.v1+json"}"#),
        Ok(Example {
            mt: MediaType::OciImageIndex
        })
    ));

    assert!(serde_json::from_str::<Example>(r#"{"mt": "text/plain"}"#).is_err());
}

#[test]
fn ignore_media_type_parameters() {
    assert_eq!(
        MediaType::from_str("application/vnd.docker.distribution.manifest.v2+json; charset=utf-8"),
        Ok(MediaType::DockerManifestV2)
    );
}
