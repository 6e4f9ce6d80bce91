//! Source detection and manifest level probing

use crate::{
    error::Error,
    types::{sort_levels_for_display, StreamLevel},
    Result,
};
use m3u8_rs::Playlist;
use serde::{Deserialize, Serialize};
use url::Url;

/// How a source URL has to be played
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    /// Adaptive manifest, played through the streaming engine when possible
    Manifest,
    /// Single progressive file the media element plays directly
    Progressive { mime: &'static str },
}

/// Detect the source kind from the URL path. Unknown extensions are
/// treated as manifests, which is what the catalog serves.
pub fn detect_source_kind(url: &str) -> SourceKind {
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_lowercase(),
        Err(_) => url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_lowercase(),
    };

    let progressive = [
        (".mp4", "video/mp4"),
        (".m4v", "video/mp4"),
        (".webm", "video/webm"),
        (".ogv", "video/ogg"),
        (".mov", "video/quicktime"),
    ];
    for (extension, mime) in progressive {
        if path.ends_with(extension) {
            return SourceKind::Progressive { mime };
        }
    }
    SourceKind::Manifest
}

/// Quality levels advertised by a playlist, highest resolution first.
///
/// A media playlist is a single level of unknown height. I-frame variants
/// are not playable levels and are skipped.
pub fn parse_levels(content: &[u8]) -> Result<Vec<StreamLevel>> {
    let playlist = m3u8_rs::parse_playlist_res(content)
        .map_err(|e| Error::ManifestParse(format!("Failed to parse HLS playlist: {:?}", e)))?;

    let mut levels = match playlist {
        Playlist::MasterPlaylist(master) => master
            .variants
            .iter()
            .filter(|variant| !variant.is_i_frame)
            .enumerate()
            .map(|(index, variant)| StreamLevel {
                index,
                height: variant
                    .resolution
                    .map(|r| u32::try_from(r.height).unwrap_or(u32::MAX))
                    .unwrap_or(0),
                bitrate: Some(variant.bandwidth),
            })
            .collect::<Vec<_>>(),
        Playlist::MediaPlaylist(_) => vec![StreamLevel::new(0, 0)],
    };

    sort_levels_for_display(&mut levels);
    Ok(levels)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MASTER: &str = "#EXTM3U
#EXT-X-VERSION:3
#EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=640x360
360p/index.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=5000000,RESOLUTION=1920x1080
1080p/index.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=2800000,RESOLUTION=1280x720
720p/index.m3u8
";

    const MEDIA: &str = "#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:6
#EXT-X-MEDIA-SEQUENCE:0
#EXTINF:6.0,
seg0.ts
#EXTINF:6.0,
seg1.ts
#EXT-X-ENDLIST
";

    #[test]
    fn test_detect_manifest() {
        assert_eq!(
            detect_source_kind("https://cdn.example.com/hls/index.m3u8"),
            SourceKind::Manifest
        );
        assert_eq!(
            detect_source_kind("https://cdn.example.com/stream?id=42"),
            SourceKind::Manifest
        );
    }

    #[test]
    fn test_detect_progressive() {
        assert_eq!(
            detect_source_kind("https://cdn.example.com/movie.MP4?token=abc"),
            SourceKind::Progressive { mime: "video/mp4" }
        );
        assert_eq!(
            detect_source_kind("/local/trailer.webm#t=10"),
            SourceKind::Progressive { mime: "video/webm" }
        );
    }

    #[test]
    fn test_master_levels_sorted_descending() {
        let levels = parse_levels(MASTER.as_bytes()).unwrap();
        let heights: Vec<u32> = levels.iter().map(|l| l.height).collect();
        assert_eq!(heights, vec![1080, 720, 360]);
        assert_eq!(levels[0].index, 1);
        assert_eq!(levels[0].bitrate, Some(5_000_000));
    }

    #[test]
    fn test_media_playlist_is_single_level() {
        let levels = parse_levels(MEDIA.as_bytes()).unwrap();
        assert_eq!(levels, vec![StreamLevel::new(0, 0)]);
    }

    #[test]
    fn test_garbage_rejected() {
        let err = parse_levels(b"<html>not a playlist</html>").unwrap_err();
        assert_eq!(err.error_code(), "MANIFEST_PARSE");
    }
}
