//! Player identity lookup: map a save file's player id to a display name.
//!
//! The default service is the public Mojang profile mirror at
//! `https://api.ashcon.app/mojang/v2/user/{id}`. There is no cache: every
//! collection cycle asks again for every player.
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;

/// A resolved player.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlayerIdentity {
    #[serde(rename = "uuid", alias = "id")]
    pub id: String,
    #[serde(rename = "username", alias = "displayName", alias = "name")]
    pub display_name: String,
}

/// Errors from identity resolution.
#[derive(Debug)]
pub enum IdentityError {
    /// The service reported that the player does not exist.
    NotFound { player_id: String },
    /// Failed to build the HTTP client.
    Client(reqwest::Error),
    /// The request could not be sent or timed out.
    Transport { url: String, source: reqwest::Error },
    /// The service answered with a non-success status other than 404.
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    /// The response body was not a valid profile.
    Decode { url: String, source: reqwest::Error },
    /// The service answered with a profile for a different player.
    Mismatch { player_id: String, returned: String },
    /// The lookup URL template is unusable.
    Template { url: String, reason: String },
}

impl IdentityError {
    /// `true` for the per-player "no such player" outcome; everything else is
    /// a service failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, IdentityError::NotFound { .. })
    }
}

impl std::fmt::Display for IdentityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentityError::NotFound { player_id } => {
                write!(f, "player {player_id} not found by identity service")
            }
            IdentityError::Client(e) => write!(f, "failed to build identity client: {e}"),
            IdentityError::Transport { url, source } => {
                write!(f, "identity request to {url} failed: {source}")
            }
            IdentityError::Status { url, status } => {
                write!(f, "identity service returned {status} for {url}")
            }
            IdentityError::Decode { url, source } => {
                write!(f, "failed to decode identity response from {url}: {source}")
            }
            IdentityError::Mismatch {
                player_id,
                returned,
            } => write!(
                f,
                "identity service returned player {returned} when asked for {player_id}"
            ),
            IdentityError::Template { url, reason } => {
                write!(f, "invalid identity url template '{url}': {reason}")
            }
        }
    }
}

impl std::error::Error for IdentityError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IdentityError::Client(e) => Some(e),
            IdentityError::Transport { source, .. } => Some(source),
            IdentityError::Decode { source, .. } => Some(source),
            IdentityError::NotFound { .. }
            | IdentityError::Status { .. }
            | IdentityError::Mismatch { .. }
            | IdentityError::Template { .. } => None,
        }
    }
}

/// Resolves player ids to identities.
pub trait IdentityResolver: Send + Sync {
    fn resolve(
        &self,
        player_id: &str,
    ) -> impl Future<Output = Result<PlayerIdentity, IdentityError>> + Send;
}

/// Stand-in for `{id}` while the template is parsed as a URL.
const ID_MARKER: &str = "cobblemon-exporter-player-id";

/// Resolver backed by an HTTP profile service.
pub struct HttpResolver {
    client: reqwest::Client,
    /// Template URL cut just before the `{id}` segment.
    base: reqwest::Url,
    /// Already-encoded path that follows the `{id}` segment, e.g. `/profile`.
    tail: String,
}

impl HttpResolver {
    /// `url_template` must contain `{id}` as one whole path segment. The
    /// player id is percent-encoded into that segment on every lookup.
    pub fn new(url_template: &str, timeout: Duration) -> Result<Self, IdentityError> {
        let invalid = |reason: &str| IdentityError::Template {
            url: url_template.to_string(),
            reason: reason.to_string(),
        };

        let parsed = reqwest::Url::parse(&url_template.replacen("{id}", ID_MARKER, 1))
            .map_err(|e| invalid(&e.to_string()))?;
        if parsed.cannot_be_a_base() {
            return Err(invalid("not a hierarchical URL"));
        }
        let (head, tail) = parsed
            .path()
            .split_once(ID_MARKER)
            .ok_or_else(|| invalid("{id} must appear in the path"))?;
        if !head.ends_with('/') || !(tail.is_empty() || tail.starts_with('/')) {
            return Err(invalid("{id} must be a whole path segment"));
        }
        if tail.contains(ID_MARKER) || url_template.matches("{id}").count() > 1 {
            return Err(invalid("{id} must appear exactly once"));
        }

        let mut base = parsed.clone();
        base.set_path(head);
        let tail = tail.to_string();

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("cobblemon-exporter/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(IdentityError::Client)?;
        Ok(Self { client, base, tail })
    }

    fn url_for(&self, player_id: &str) -> reqwest::Url {
        let mut url = self.base.clone();
        // `new` rejects cannot-be-a-base URLs, so this always succeeds.
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(player_id);
        }
        if !self.tail.is_empty() {
            let path = format!("{}{}", url.path(), self.tail);
            url.set_path(&path);
        }
        url
    }
}

/// Player UUIDs compare equal with or without dashes, in any case.
fn same_player(a: &str, b: &str) -> bool {
    let normalize = |s: &str| s.replace('-', "").to_ascii_lowercase();
    normalize(a) == normalize(b)
}

impl IdentityResolver for HttpResolver {
    async fn resolve(&self, player_id: &str) -> Result<PlayerIdentity, IdentityError> {
        let url = self.url_for(player_id);
        tracing::debug!(%url, "resolving player identity");

        let resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|source| IdentityError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(IdentityError::NotFound {
                player_id: player_id.to_string(),
            });
        }
        if !status.is_success() {
            return Err(IdentityError::Status {
                url: url.to_string(),
                status,
            });
        }

        let identity = resp
            .json::<PlayerIdentity>()
            .await
            .map_err(|source| IdentityError::Decode {
                url: url.to_string(),
                source,
            })?;
        if !same_player(&identity.id, player_id) {
            return Err(IdentityError::Mismatch {
                player_id: player_id.to_string(),
                returned: identity.id,
            });
        }
        Ok(identity)
    }
}
