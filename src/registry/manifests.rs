use std::str::FromStr;

use super::Registry;
use crate::{
    manifest::{DeserializedManifest, Manifest, ManifestList, OciManifest, SignedManifest},
    transport::{Method, Request},
    Digest, Error, MediaType, Result,
};

const DIGEST_HEADER: &str = "Docker-Content-Digest";

impl Registry {
    /// Get a schema 1 manifest.
    pub fn manifest(&self, repository: &str, reference: &str) -> Result<SignedManifest> {
        self.get_manifest(repository, reference, MediaType::DockerManifestV1)
            .map(|(m, _)| m)
    }

    /// Get a signed schema 1 manifest.
    pub fn signed_manifest(&self, repository: &str, reference: &str) -> Result<SignedManifest> {
        self.get_manifest(repository, reference, MediaType::DockerManifestV1Signed)
            .map(|(m, _)| m)
    }

    /// Get a Docker image manifest (version 2, schema 2).
    pub fn manifest_v2(&self, repository: &str, reference: &str) -> Result<DeserializedManifest> {
        self.manifest_v2_with_digest(repository, reference)
            .map(|(m, _)| m)
    }

    /// Like [`manifest_v2`](Self::manifest_v2), and also return the
    /// digest sent in the `Docker-Content-Digest` header.
    ///
    /// If the header is missing or invalid, the digest is `None`. It is
    /// not an error.
    pub fn manifest_v2_with_digest(
        &self,
        repository: &str,
        reference: &str,
    ) -> Result<(DeserializedManifest, Option<Digest>)> {
        self.get_manifest(repository, reference, MediaType::DockerManifestV2)
    }

    /// Get an OCI image manifest.
    pub fn manifest_oci(&self, repository: &str, reference: &str) -> Result<OciManifest> {
        self.manifest_oci_with_digest(repository, reference)
            .map(|(m, _)| m)
    }

    /// Like [`manifest_oci`](Self::manifest_oci), and also return the
    /// digest sent in the `Docker-Content-Digest` header.
    ///
    /// If the header is missing or invalid, the digest is `None`. It is
    /// not an error.
    pub fn manifest_oci_with_digest(
        &self,
        repository: &str,
        reference: &str,
    ) -> Result<(OciManifest, Option<Digest>)> {
        self.get_manifest(repository, reference, MediaType::OciManifestV1)
    }

    /// Get a Docker manifest list.
    pub fn manifest_list(&self, repository: &str, reference: &str) -> Result<ManifestList> {
        self.get_manifest(repository, reference, MediaType::DockerManifestList)
            .map(|(m, _)| m)
    }

    /// Get an OCI image index.
    pub fn image_index(&self, repository: &str, reference: &str) -> Result<ManifestList> {
        self.get_manifest(repository, reference, MediaType::OciImageIndex)
            .map(|(m, _)| m)
    }

    /// Get the digest of a manifest, with a `HEAD` request.
    ///
    /// The request accepts all known media types. The returned value
    /// contains the digest and the `Content-Type` selected by the
    /// registry.
    pub fn manifest_digest(
        &self,
        repository: &str,
        reference: &str,
    ) -> Result<(Digest, Option<String>)> {
        let url = self.manifest_url(repository, reference);
        self.logf(format_args!(
            "registry.manifest.head url={url} repository={repository} reference={reference}"
        ));

        let request = MediaType::ALL
            .iter()
            .fold(Request::new(Method::Head, url), |r, t| {
                r.header("Accept", t.as_str())
            });

        let response = self.send(request)?;

        let content_type = response.header("Content-Type").map(str::to_owned);
        let digest = Digest::from_str(response.header(DIGEST_HEADER).unwrap_or_default())
            .map_err(Error::MissingDigest)?;

        Ok((digest, content_type))
    }

    /// Delete the manifest identified by `digest`.
    ///
    /// `digest` is validated before sending any request.
    pub fn delete_manifest(&self, repository: &str, digest: &str) -> Result<()> {
        let digest = Digest::from_str(digest).map_err(|source| Error::InvalidDigest {
            digest: digest.to_owned(),
            source,
        })?;

        let url = self.manifest_url(repository, digest.as_str());
        self.logf(format_args!(
            "registry.manifest.delete url={url} repository={repository} reference={digest}"
        ));

        self.send(Request::new(Method::Delete, url))?;
        Ok(())
    }

    /// Upload `manifest` to `repository`, with the tag or digest in `reference`.
    pub fn put_manifest(
        &self,
        repository: &str,
        reference: &str,
        manifest: &(impl Manifest + ?Sized),
    ) -> Result<()> {
        let url = self.manifest_url(repository, reference);
        self.logf(format_args!(
            "registry.manifest.put url={url} repository={repository} reference={reference}"
        ));

        let (media_type, payload) = manifest.payload()?;

        let request = Request::new(Method::Put, url)
            .header("Content-Type", media_type.as_str())
            .body(payload);

        self.send(request)?;
        Ok(())
    }

    fn manifest_url(&self, repository: &str, reference: &str) -> String {
        self.endpoint(&format!("/v2/{repository}/manifests/{reference}"))
    }

    /// Get a manifest, and decode it as `M`.
    ///
    /// The digest in the response header is optional. Only errors in the
    /// manifest itself are reported.
    fn get_manifest<M: Manifest>(
        &self,
        repository: &str,
        reference: &str,
        media_type: MediaType,
    ) -> Result<(M, Option<Digest>)> {
        let url = self.manifest_url(repository, reference);
        self.logf(format_args!(
            "registry.manifest.get url={url} repository={repository} reference={reference}"
        ));

        let request = Request::get(url).header("Accept", media_type.as_str());
        let response = self.send(request)?;

        let manifest = M::decode(media_type, response.body())?;

        let digest = response
            .header(DIGEST_HEADER)
            .and_then(|d| Digest::from_str(d).ok());

        Ok((manifest, digest))
    }
}
