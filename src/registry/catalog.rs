use serde::de::DeserializeOwned;

use super::Registry;
use crate::{transport::Request, Result};

#[derive(serde::Deserialize, Debug)]
struct RepositoriesResponse {
    #[serde(default)]
    repositories: Vec<String>,
}

#[derive(serde::Deserialize, Debug)]
struct TagsResponse {
    #[serde(default)]
    tags: Option<Vec<String>>,
}

impl Registry {
    /// List the repositories in the registry.
    ///
    /// The list follows the pages announced in the `Link` header of
    /// every response, and keeps the order sent by the registry.
    pub fn repositories(&self) -> Result<Vec<String>> {
        let mut repositories = Vec::new();

        self.paginate("repositories", self.endpoint("/v2/_catalog"), |page: RepositoriesResponse| {
            repositories.extend(page.repositories);
        })?;

        Ok(repositories)
    }

    /// List the tags of `repository`.
    pub fn tags(&self, repository: &str) -> Result<Vec<String>> {
        let mut tags = Vec::new();

        let url = self.endpoint(&format!("/v2/{repository}/tags/list"));
        self.paginate("tags", url, |page: TagsResponse| {
            tags.extend(page.tags.unwrap_or_default());
        })?;

        Ok(tags)
    }

    /// Send `GET` requests to `url`, and to every page that follows it.
    ///
    /// If any page can't be decoded, the whole operation fails. A page
    /// linking to itself is the last one.
    fn paginate<T, F>(&self, operation: &str, mut url: String, mut on_page: F) -> Result<()>
    where
        T: DeserializeOwned,
        F: FnMut(T),
    {
        loop {
            self.logf(format_args!("registry.{operation} url={url}"));

            let response = self.send(Request::get(url.as_str()))?;
            on_page(response.json()?);

            let next = match response.header_values("link").find_map(next_link) {
                // Some registries send only the path. It is appended to
                // the base URL without processing, since it may contain
                // escaped characters.
                Some(next) if next.starts_with('/') => format!("{}{next}", self.url()),
                Some(next) => next.to_owned(),
                None => return Ok(()),
            };

            if next == url {
                return Ok(());
            }

            url = next;
        }
    }
}

/// Get the URL of the `next` relation in a `Link` header.
///
/// See <https://datatracker.ietf.org/doc/html/rfc8288>.
fn next_link(header: &str) -> Option<&str> {
    header.split(',').find_map(|link| {
        let mut parts = link.split(';');

        let target = parts.next()?.trim_ascii();
        let target = target.strip_prefix('<')?.strip_suffix('>')?;

        let is_next = parts.any(|param| match param.split_once('=') {
            Some((key, value)) => {
                key.trim_ascii().eq_ignore_ascii_case("rel")
                    && value
                        .trim_ascii()
                        .trim_matches('"')
                        .split_ascii_whitespace()
                        .any(|rel| rel.eq_ignore_ascii_case("next"))
            }
            None => false,
        });

        is_next.then_some(target)
    })
}

#[test]
fn parse_link_headers() {
    assert_eq!(
        next_link(r#"</v2/_catalog?last=b&n=2>; rel="next""#),
        Some("/v2/_catalog?last=b&n=2")
    );

    assert_eq!(
        next_link(r#"<https://r.example.com/v2/_catalog?last=%2F>; type="application/json"; rel=next"#),
        Some("https://r.example.com/v2/_catalog?last=%2F")
    );

    assert_eq!(
        next_link(r#"</v2/_catalog?n=1>; rel="prev", </v2/_catalog?last=x>; rel="next""#),
        Some("/v2/_catalog?last=x")
    );

    assert_eq!(next_link(r#"</v2/_catalog?n=1>; rel="prev""#), None);
    assert_eq!(next_link("garbage"), None);
    assert_eq!(next_link(""), None);
}
