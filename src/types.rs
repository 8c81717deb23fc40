use serde::{Deserialize, Serialize};
use tabled::Tabled;

/// Access credentials for the connected account.
///
/// `expires_at` always belongs to the token pair stored next to it: a session
/// is replaced whole, never patched field by field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix timestamp (seconds) at which `access_token` stops being valid.
    pub expires_at: i64,
}

impl Session {
    /// Builds a session from a token endpoint grant received at `now`.
    ///
    /// Refresh grants may omit the refresh token, in which case the previous
    /// one stays in use.
    pub fn from_grant(grant: TokenGrant, previous_refresh: Option<String>, now: i64) -> Self {
        Session {
            access_token: grant.access_token,
            refresh_token: grant
                .refresh_token
                .or(previous_refresh)
                .unwrap_or_default(),
            expires_at: now + grant.expires_in,
        }
    }

    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }

    /// True once `now` is inside the refresh safety margin.
    pub fn needs_refresh(&self, now: i64, margin_secs: i64) -> bool {
        now >= self.expires_at - margin_secs
    }
}

/// Body of a successful response from the token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    pub expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

/// One authorization attempt. Discarded after success or abandonment.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    /// Anti-CSRF nonce echoed back by the provider.
    pub state: String,
    pub code_verifier: String,
    /// Sent again with the code exchange; must match the consent request.
    pub redirect_uri: String,
}

/// Point-in-time read of the player.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybackSnapshot {
    pub track_id: Option<String>,
    pub is_playing: bool,
    pub device_volume_percent: Option<u8>,
    pub item: Option<MediaItem>,
}

impl PlaybackSnapshot {
    /// Snapshot for "nothing is playing" (HTTP 204 from the player API).
    pub fn idle() -> Self {
        Self::default()
    }
}

impl From<CurrentPlaybackResponse> for PlaybackSnapshot {
    fn from(res: CurrentPlaybackResponse) -> Self {
        PlaybackSnapshot {
            track_id: res.item.as_ref().and_then(|i| i.id().map(str::to_string)),
            is_playing: res.is_playing,
            device_volume_percent: res.device.and_then(|d| d.volume_percent),
            item: res.item,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CurrentPlaybackResponse {
    #[serde(default)]
    pub is_playing: bool,
    #[serde(default)]
    pub device: Option<Device>,
    #[serde(default)]
    pub item: Option<MediaItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Device {
    #[serde(default)]
    pub volume_percent: Option<u8>,
}

/// Whatever the player is currently playing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MediaItem {
    Track(Track),
    Episode(Episode),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
    #[serde(default)]
    pub album: Option<Album>,
    #[serde(default)]
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtistRef {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Album {
    pub name: String,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub images: Vec<Image>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(default)]
    pub show: Option<Show>,
    #[serde(default)]
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Show {
    pub name: String,
    #[serde(default)]
    pub publisher: Option<String>,
}

const UNKNOWN_ALBUM: &str = "Unknown Album";

impl MediaItem {
    pub fn id(&self) -> Option<&str> {
        match self {
            MediaItem::Track(t) => t.id.as_deref(),
            MediaItem::Episode(e) => e.id.as_deref(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            MediaItem::Track(t) => &t.name,
            MediaItem::Episode(e) => &e.name,
        }
    }

    pub fn duration_ms(&self) -> u64 {
        match self {
            MediaItem::Track(t) => t.duration_ms,
            MediaItem::Episode(e) => e.duration_ms,
        }
    }

    /// Artists joined with `", "`; for episodes the publisher, else the show.
    pub fn artist_line(&self) -> String {
        match self {
            MediaItem::Track(t) => t
                .artists
                .iter()
                .map(|a| a.name.as_str())
                .collect::<Vec<&str>>()
                .join(", "),
            MediaItem::Episode(e) => e
                .show
                .as_ref()
                .map(|s| s.publisher.clone().unwrap_or_else(|| s.name.clone()))
                .unwrap_or_default(),
        }
    }

    /// Album name followed by its release date, or the show name for episodes.
    pub fn album_label(&self) -> Option<String> {
        match self {
            MediaItem::Track(t) => t.album.as_ref().map(|a| match &a.release_date {
                Some(date) => format!("{} {}", a.name, date),
                None => a.name.clone(),
            }),
            MediaItem::Episode(e) => e.show.as_ref().map(|s| s.name.clone()),
        }
    }

    /// Medium-sized album art when available, else the first image.
    pub fn cover_art_url(&self) -> Option<&str> {
        let images = match self {
            MediaItem::Track(t) => t.album.as_ref().map(|a| a.images.as_slice())?,
            MediaItem::Episode(e) => e.images.as_slice(),
        };
        let image = match self {
            MediaItem::Track(_) if images.len() > 1 => images.get(1),
            _ => images.first(),
        };
        image.map(|i| i.url.as_str())
    }

    /// Cache key identifying the insight for this item.
    pub fn insight_key(&self) -> InsightKey {
        InsightKey {
            track: self.name().to_string(),
            artist: self.artist_line(),
            album: self
                .album_label()
                .filter(|a| !a.is_empty())
                .unwrap_or_else(|| UNKNOWN_ALBUM.to_string()),
        }
    }
}

/// Composite cache key. Matched exactly, without normalization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InsightKey {
    pub track: String,
    pub artist: String,
    pub album: String,
}

impl InsightKey {
    /// `album` is the display label, release year included.
    pub fn new(track: &str, artist: &str, album: &str) -> Self {
        InsightKey {
            track: track.to_string(),
            artist: artist.to_string(),
            album: album.to_string(),
        }
    }
}

/// One line of `insights list`. The insight is truncated for display.
#[derive(Tabled)]
pub struct InsightTableRow {
    pub track: String,
    pub artist: String,
    pub album: String,
    pub insight: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track_json() -> &'static str {
        r#"{
            "is_playing": true,
            "device": { "id": "d1", "volume_percent": 64 },
            "item": {
                "type": "track",
                "id": "4uLU6hMCjMI75M1A2tKUQC",
                "name": "Never Gonna Give You Up",
                "duration_ms": 213573,
                "artists": [{ "name": "Rick Astley" }],
                "album": {
                    "name": "Whenever You Need Somebody",
                    "release_date": "1987-11-12",
                    "images": [
                        { "url": "https://i.scdn.co/large" },
                        { "url": "https://i.scdn.co/medium" },
                        { "url": "https://i.scdn.co/small" }
                    ]
                }
            }
        }"#
    }

    #[test]
    fn test_track_response_to_snapshot() {
        let res: CurrentPlaybackResponse = serde_json::from_str(track_json()).unwrap();
        let snapshot = PlaybackSnapshot::from(res);

        assert_eq!(snapshot.track_id.as_deref(), Some("4uLU6hMCjMI75M1A2tKUQC"));
        assert!(snapshot.is_playing);
        assert_eq!(snapshot.device_volume_percent, Some(64));

        let item = snapshot.item.unwrap();
        assert_eq!(item.artist_line(), "Rick Astley");
        assert_eq!(
            item.album_label().as_deref(),
            Some("Whenever You Need Somebody 1987-11-12")
        );
        assert_eq!(item.cover_art_url(), Some("https://i.scdn.co/medium"));
    }

    #[test]
    fn test_episode_uses_show_metadata() {
        let json = r#"{
            "is_playing": false,
            "device": { "volume_percent": null },
            "item": {
                "type": "episode",
                "id": "ep1",
                "name": "Pilot",
                "images": [{ "url": "https://i.scdn.co/episode" }],
                "show": { "name": "Song Exploder", "publisher": "Hrishikesh Hirway" }
            }
        }"#;
        let res: CurrentPlaybackResponse = serde_json::from_str(json).unwrap();
        let snapshot = PlaybackSnapshot::from(res);

        assert_eq!(snapshot.device_volume_percent, None);
        let item = snapshot.item.unwrap();
        assert_eq!(item.cover_art_url(), Some("https://i.scdn.co/episode"));
        assert_eq!(
            item.insight_key(),
            InsightKey::new("Pilot", "Hrishikesh Hirway", "Song Exploder")
        );
    }

    #[test]
    fn test_insight_key_falls_back_to_unknown_album() {
        let item = MediaItem::Track(Track {
            id: Some("t1".to_string()),
            name: "Untitled".to_string(),
            artists: vec![
                ArtistRef { name: "A".to_string() },
                ArtistRef { name: "B".to_string() },
            ],
            album: None,
            duration_ms: 0,
        });

        assert_eq!(item.insight_key(), InsightKey::new("Untitled", "A, B", "Unknown Album"));
        assert_eq!(item.cover_art_url(), None);
    }

    #[test]
    fn test_refresh_grant_keeps_previous_refresh_token() {
        let grant = TokenGrant {
            access_token: "new-access".to_string(),
            refresh_token: None,
            expires_in: 3600,
        };
        let session = Session::from_grant(grant, Some("old-refresh".to_string()), 1_000);

        assert_eq!(session.refresh_token, "old-refresh");
        assert_eq!(session.expires_at, 4_600);
        assert!(!session.needs_refresh(4_000, 240));
        assert!(session.needs_refresh(4_400, 240));
        assert!(session.is_expired(4_600));
    }
}
