use tabled::Table;

use crate::{
    config, error, info,
    management::{InsightCache, InsightStore},
    types::{InsightKey, InsightTableRow},
    utils, warning,
};

const PREVIEW_LEN: usize = 60;

pub async fn list_insights(search: Option<String>) {
    let cache = InsightCache::open_default();
    if !cache.is_available() {
        error!(
            "Insight cache at {} cannot be opened",
            config::insights_db_path().display()
        );
        return;
    }

    let mut entries = match cache.entries() {
        Ok(entries) => entries,
        Err(e) => {
            warning!("Failed to load insights. Err: {}", e);
            return;
        }
    };

    if let Some(search) = search {
        let term = search.to_lowercase();
        entries.retain(|(key, _)| {
            key.track.to_lowercase().contains(&term)
                || key.artist.to_lowercase().contains(&term)
                || key.album.to_lowercase().contains(&term)
        });
    }

    if entries.is_empty() {
        info!("No cached insights found.");
        return;
    }

    entries.sort_by(|(a, _), (b, _)| {
        (a.artist.to_lowercase(), a.track.to_lowercase())
            .cmp(&(b.artist.to_lowercase(), b.track.to_lowercase()))
    });

    let table_rows: Vec<InsightTableRow> = entries
        .into_iter()
        .map(|(key, insight)| InsightTableRow {
            track: key.track,
            artist: key.artist,
            album: key.album,
            insight: utils::truncate(&insight, PREVIEW_LEN),
        })
        .collect();

    let table = Table::new(table_rows);
    println!("{}", table);
}

pub async fn show_insight(track: String, artist: String, album: String) {
    let cache = InsightCache::open_default();
    let key = InsightKey {
        track,
        artist,
        album,
    };

    match cache.get(&key) {
        Some(insight) => println!("{}", insight),
        None => warning!(
            "No insight cached for {} - {} ({})",
            key.track,
            key.artist,
            key.album
        ),
    }
}
