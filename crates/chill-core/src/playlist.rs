//! Episode navigation across servers
//!
//! A title is served by one or more servers, each listing the same episodes
//! with a manifest link and an embeddable player link. The player mode picks
//! which of the two links is played.

use serde::{Deserialize, Serialize};

/// Which link of an episode gets played
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerMode {
    /// Manifest link through the playback session
    #[default]
    M3u8,
    /// Embedded third-party player, the fallback path
    Embed,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EpisodeData {
    pub name: String,
    pub slug: String,
    pub filename: String,
    pub link_embed: String,
    pub link_m3u8: String,
}

impl EpisodeData {
    /// Link for `mode`, `None` when the server has none
    pub fn link(&self, mode: PlayerMode) -> Option<&str> {
        let link = match mode {
            PlayerMode::M3u8 => &self.link_m3u8,
            PlayerMode::Embed => &self.link_embed,
        };
        let link = link.trim();
        (!link.is_empty()).then_some(link)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerData {
    pub server_name: String,
    pub server_data: Vec<EpisodeData>,
}

/// Position in the playlist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct EpisodeCursor {
    pub server: usize,
    pub episode: usize,
}

impl EpisodeCursor {
    pub fn new(server: usize, episode: usize) -> Self {
        Self { server, episode }
    }
}

/// Episode to play and the link to play it with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection<'a> {
    pub cursor: EpisodeCursor,
    pub episode: &'a EpisodeData,
    pub link: &'a str,
}

/// All servers of a title
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EpisodePlaylist {
    servers: Vec<ServerData>,
}

impl EpisodePlaylist {
    pub fn new(servers: Vec<ServerData>) -> Self {
        Self { servers }
    }

    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn servers(&self) -> &[ServerData] {
        &self.servers
    }

    pub fn is_empty(&self) -> bool {
        self.servers.iter().all(|server| server.server_data.is_empty())
    }

    pub fn episode(&self, cursor: EpisodeCursor) -> Option<&EpisodeData> {
        self.servers
            .get(cursor.server)
            .and_then(|server| server.server_data.get(cursor.episode))
    }

    /// Link to play at `cursor` in `mode`
    pub fn link_for(&self, cursor: EpisodeCursor, mode: PlayerMode) -> Option<&str> {
        self.episode(cursor).and_then(|episode| episode.link(mode))
    }

    /// Episode following `cursor`: the next one on the same server, then the
    /// first episode of the following server. `None` at the end.
    pub fn next_after(&self, cursor: EpisodeCursor) -> Option<EpisodeCursor> {
        let server = self.servers.get(cursor.server)?;
        if cursor.episode + 1 < server.server_data.len() {
            return Some(EpisodeCursor::new(cursor.server, cursor.episode + 1));
        }
        self.servers
            .iter()
            .enumerate()
            .skip(cursor.server + 1)
            .find(|(_, server)| !server.server_data.is_empty())
            .map(|(index, _)| EpisodeCursor::new(index, 0))
    }

    /// Switching server auto-selects its first episode when that episode has
    /// a link for the current mode.
    pub fn select_server(&self, server: usize, mode: PlayerMode) -> Option<Selection<'_>> {
        let cursor = EpisodeCursor::new(server, 0);
        let episode = self.episode(cursor)?;
        let link = episode.link(mode)?;
        Some(Selection {
            cursor,
            episode,
            link,
        })
    }
}
