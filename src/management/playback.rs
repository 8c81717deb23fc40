use crate::types::{InsightKey, MediaItem, PlaybackSnapshot};

/// Text shown while an insight is being generated.
pub const GENERATING_TEXT: &str = "Generating insights...";

/// What presentation renders. Owned by the poller, read-only elsewhere.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NowPlaying {
    /// Latest applied snapshot; `None` until the first successful fetch.
    pub snapshot: Option<PlaybackSnapshot>,
    pub is_playing: bool,
    pub volume_percent: Option<u8>,
    pub album_label: String,
    pub cover_art_url: Option<String>,
    pub insight: String,
    pub is_loading_insights: bool,
}

impl NowPlaying {
    pub fn track_id(&self) -> Option<&str> {
        self.snapshot.as_ref().and_then(|s| s.track_id.as_deref())
    }

    pub fn item(&self) -> Option<&MediaItem> {
        self.snapshot.as_ref().and_then(|s| s.item.as_ref())
    }
}

/// Work a snapshot transition asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Look the insight up in the cache, generate it on a miss.
    ResolveInsight(InsightKey),
}

/// Applies a freshly fetched snapshot to the displayed state.
///
/// With the same track identifier as before only the freshness fields
/// (`is_playing`, volume) change. A different identifier, including a change
/// to or from nothing, clears the insight and refreshes album and cover art;
/// when the new item exists its insight is requested. A missing volume keeps
/// the previous one.
pub fn reduce(previous: &NowPlaying, fetched: PlaybackSnapshot) -> (NowPlaying, Vec<Effect>) {
    let mut next = previous.clone();
    let mut effects = Vec::new();

    next.is_playing = fetched.is_playing;
    if let Some(volume) = fetched.device_volume_percent {
        next.volume_percent = Some(volume);
    }

    if previous.track_id() != fetched.track_id.as_deref() {
        next.insight.clear();
        next.is_loading_insights = false;

        match &fetched.item {
            Some(item) => {
                next.album_label = item.album_label().unwrap_or_default();
                next.cover_art_url = item.cover_art_url().map(str::to_string);
                effects.push(Effect::ResolveInsight(item.insight_key()));
            }
            None => {
                next.album_label.clear();
                next.cover_art_url = None;
            }
        }
    }

    next.snapshot = Some(fetched);
    (next, effects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Album, ArtistRef, Image, Track};

    fn snapshot(id: Option<&str>, playing: bool, volume: Option<u8>) -> PlaybackSnapshot {
        let item = id.map(|id| {
            MediaItem::Track(Track {
                id: Some(id.to_string()),
                name: format!("Song {id}"),
                artists: vec![ArtistRef {
                    name: "Artist".to_string(),
                }],
                album: Some(Album {
                    name: "Record".to_string(),
                    release_date: Some("2001".to_string()),
                    images: vec![Image {
                        url: format!("https://img/{id}"),
                    }],
                }),
                duration_ms: 1000,
            })
        });
        PlaybackSnapshot {
            track_id: id.map(str::to_string),
            is_playing: playing,
            device_volume_percent: volume,
            item,
        }
    }

    #[test]
    fn test_first_track_requests_insight() {
        let (next, effects) = reduce(&NowPlaying::default(), snapshot(Some("x"), true, Some(40)));

        assert_eq!(
            effects,
            vec![Effect::ResolveInsight(InsightKey::new(
                "Song x", "Artist", "Record 2001"
            ))]
        );
        assert_eq!(next.track_id(), Some("x"));
        assert_eq!(next.album_label, "Record 2001");
        assert_eq!(next.cover_art_url.as_deref(), Some("https://img/x"));
        assert_eq!(next.volume_percent, Some(40));
        assert!(next.is_playing);
    }

    #[test]
    fn test_same_track_only_updates_freshness() {
        let (mut current, _) = reduce(&NowPlaying::default(), snapshot(Some("x"), true, Some(40)));
        current.insight = "about x".to_string();

        let (next, effects) = reduce(&current, snapshot(Some("x"), false, Some(70)));

        assert!(effects.is_empty());
        assert_eq!(next.insight, "about x");
        assert!(!next.is_playing);
        assert_eq!(next.volume_percent, Some(70));
        assert_eq!(next.album_label, current.album_label);
    }

    #[test]
    fn test_track_change_clears_insight() {
        let (mut current, _) = reduce(&NowPlaying::default(), snapshot(Some("x"), true, None));
        current.insight = "about x".to_string();
        current.is_loading_insights = true;

        let (next, effects) = reduce(&current, snapshot(Some("y"), true, None));

        assert_eq!(effects.len(), 1);
        assert!(next.insight.is_empty());
        assert!(!next.is_loading_insights);
        assert_eq!(next.cover_art_url.as_deref(), Some("https://img/y"));
    }

    #[test]
    fn test_change_to_nothing_clears_without_generation() {
        let (mut current, _) = reduce(&NowPlaying::default(), snapshot(Some("x"), true, Some(30)));
        current.insight = "about x".to_string();

        let (next, effects) = reduce(&current, snapshot(None, false, None));

        assert!(effects.is_empty());
        assert!(next.insight.is_empty());
        assert!(next.album_label.is_empty());
        assert_eq!(next.cover_art_url, None);
        assert_eq!(next.volume_percent, Some(30));
        assert_eq!(next.item(), None);
    }

    #[test]
    fn test_idle_to_idle_is_unchanged() {
        let (next, effects) = reduce(&NowPlaying::default(), PlaybackSnapshot::idle());
        assert!(effects.is_empty());
        assert!(next.snapshot.is_some());
    }
}
