use std::fmt::Display;

use time::{macros::format_description, OffsetDateTime};

/// A recording stored on the device, as reported by its listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recording {
    /// Identifier of the recording on the device, taken from its content URL
    pub program_id: String,
    /// Identifier of the broadcast episode, shared by every recording of it
    pub episode_id: Option<String>,
    pub title: String,
    pub episode_title: Option<String>,
    pub episode_number: Option<u32>,
    pub series_id: Option<String>,
    pub source_station: Option<String>,
    pub source_channel: Option<String>,
    pub capture_date: OffsetDateTime,
    /// Duration in milliseconds
    pub duration: u64,
    /// Size of the raw recording in bytes
    pub source_size: u64,
    /// Whether the device is still recording it
    pub in_progress: bool,
    pub content_url: String,
}

impl Recording {
    /// Human readable name of the recording.
    ///
    /// `<title> - <episode title>` for episodes,
    /// `<title> - <capture day>` for everything else.
    pub fn display_name(&self) -> String {
        match self.episode_title.as_deref() {
            Some(episode) => format!("{} - {episode}", self.title),
            None => {
                let day = self
                    .capture_date
                    .format(format_description!("[year]-[month]-[day]"))
                    .unwrap_or_default();
                format!("{} - {day}", self.title)
            }
        }
    }

    /// Whether there is enough episode information to name the file after the episode
    pub fn is_episode(&self) -> bool {
        self.episode_number.is_some() || self.episode_title.is_some()
    }
}

impl Display for Recording {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display_name())
    }
}
