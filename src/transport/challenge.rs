/// Authentication challenge from a `WWW-Authenticate` header.
///
/// See <https://distribution.github.io/distribution/spec/auth/token/>
/// for more details.
#[derive(Clone, Debug, PartialEq)]
pub enum Challenge {
    Bearer(BearerChallenge),
    Basic { realm: Option<String> },
}

/// Parameters to request a token from the authorization service.
#[derive(Clone, Debug, PartialEq)]
pub struct BearerChallenge {
    pub realm: String,
    pub service: Option<String>,
    pub scope: Vec<String>,
}

impl Challenge {
    /// Parse the value of a `WWW-Authenticate` header.
    ///
    /// Return `None` if the header can't be parsed, if the scheme
    /// is unknown, or if a `Bearer` challenge has no `realm`.
    pub fn parse(header: &str) -> Option<Challenge> {
        let header = header.trim_ascii();
        let (scheme, tail) = header.split_once(' ').unwrap_or((header, ""));

        let mut realm = None;
        let mut service = None;
        let mut scope = Vec::new();

        for (key, value) in parse_params(tail)? {
            if key.eq_ignore_ascii_case("realm") {
                realm = Some(value.to_owned());
            } else if key.eq_ignore_ascii_case("service") {
                service = Some(value.to_owned());
            } else if key.eq_ignore_ascii_case("scope") {
                scope.extend(value.split_ascii_whitespace().map(str::to_owned));
            }
        }

        if scheme.eq_ignore_ascii_case("bearer") {
            let realm = realm.filter(|r| !r.is_empty())?;
            Some(Challenge::Bearer(BearerChallenge {
                realm,
                service,
                scope,
            }))
        } else if scheme.eq_ignore_ascii_case("basic") {
            Some(Challenge::Basic { realm })
        } else {
            None
        }
    }

    /// Parse all `WWW-Authenticate` headers of a response.
    pub(crate) fn from_response(response: &super::Response) -> impl Iterator<Item = Challenge> + '_ {
        response
            .header_values("www-authenticate")
            .filter_map(Challenge::parse)
    }
}

/// Parse a list of `key=value` or `key="value"` items, separated by commas.
fn parse_params(mut tail: &str) -> Option<Vec<(&str, &str)>> {
    let mut params = Vec::new();

    tail = tail.trim_ascii_start();
    while !tail.is_empty() {
        let (key, value) = tail.split_once('=')?;
        let key = key.trim_ascii();
        if key.is_empty() || key.contains(' ') {
            return None;
        }

        let value = value.trim_ascii_start();
        let (value, after) = match value.strip_prefix('"') {
            Some(quoted) => quoted.split_once('"')?,
            None => value.split_at(value.find(',').unwrap_or(value.len())),
        };

        params.push((key, value.trim_ascii()));

        tail = match after.trim_ascii_start() {
            "" => "",
            t => t.strip_prefix(',')?.trim_ascii_start(),
        };
    }

    Some(params)
}

#[test]
fn parse_bearer_challenge() {
    let header = r#"Bearer realm="https://auth.example.com/token",service="registry.example.com",scope="repository:foo/bar:pull,push repository:foo/baz:pull""#;

    assert_eq!(
        Challenge::parse(header),
        Some(Challenge::Bearer(BearerChallenge {
            realm: "https://auth.example.com/token".into(),
            service: Some("registry.example.com".into()),
            scope: vec![
                "repository:foo/bar:pull,push".into(),
                "repository:foo/baz:pull".into()
            ],
        }))
    );

    // Bare values, extra spaces, and a lowercase scheme.
    assert_eq!(
        Challenge::parse("bearer  realm=http://127.0.0.1/token , service = local"),
        Some(Challenge::Bearer(BearerChallenge {
            realm: "http://127.0.0.1/token".into(),
            service: Some("local".into()),
            scope: vec![],
        }))
    );
}

#[test]
fn parse_basic_challenge() {
    assert_eq!(
        Challenge::parse(r#"Basic realm="Registry Realm""#),
        Some(Challenge::Basic {
            realm: Some("Registry Realm".into())
        })
    );

    assert_eq!(Challenge::parse("Basic"), Some(Challenge::Basic { realm: None }));
}

#[test]
fn reject_invalid_challenges() {
    for header in [
        "",
        "Digest realm=\"x\"",
        "Bearer service=\"x\"",
        "Bearer realm=\"\"",
        "Bearer realm=\"unterminated",
        "Bearer realm",
        "Bearer realm=\"x\" service=\"y\"",
    ] {
        assert_eq!(Challenge::parse(header), None, "{header:?}");
    }
}
