use std::io::Write;

use miette::IntoDiagnostic;
use time::macros::format_description;

use crate::{
    human::{human_duration, human_size},
    outside::Pvr,
    result::Result,
    types::Recording,
};

/// Read-only view over the recordings of a device
pub struct Directory<'a> {
    pvr: &'a dyn Pvr,
}

impl<'a> Directory<'a> {
    pub fn new(pvr: &'a dyn Pvr) -> Self {
        Self { pvr }
    }

    pub fn resolve_one(&self, id: &str) -> Result<Recording> {
        self.pvr.resolve_one(id)
    }

    pub fn list_all(&self) -> impl Iterator<Item = Result<Recording>> + 'a {
        self.pvr.list_all()
    }

    pub fn access_key(&self) -> &'a str {
        self.pvr.access_key()
    }
}

/// All the fields of a recording, one `key: value` per line, followed by an empty line
pub fn format_detail(recording: &Recording) -> String {
    let opt = |v: &Option<String>| v.clone().unwrap_or_default();
    let capture_date = recording
        .capture_date
        .format(format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second]"
        ))
        .unwrap_or_default();

    let lines = [
        ("title", recording.title.clone()),
        ("episode_title", opt(&recording.episode_title)),
        (
            "episode_number",
            recording
                .episode_number
                .map(|n| n.to_string())
                .unwrap_or_default(),
        ),
        ("source_station", opt(&recording.source_station)),
        ("program_id", recording.program_id.clone()),
        ("series_id", opt(&recording.series_id)),
        ("episode_id", opt(&recording.episode_id)),
        ("source_size", human_size(recording.source_size)),
        ("duration", human_duration(recording.duration)),
        ("source_channel", opt(&recording.source_channel)),
        ("capture_date", capture_date),
        ("in_progress", recording.in_progress.to_string()),
        ("content_url", recording.content_url.clone()),
    ];

    let mut out = String::new();
    for (key, value) in lines {
        out.push_str(key);
        out.push_str(": ");
        out.push_str(&value);
        out.push('\n');
    }
    out.push('\n');
    out
}

/// One line identifying the recording: `[<id>] <name>`
pub fn format_summary(recording: &Recording) -> String {
    format!("[{}] {}", recording.program_id, recording.display_name())
}

pub fn print_detail(out: &mut dyn Write, recording: &Recording) -> Result<()> {
    out.write_all(format_detail(recording).as_bytes())
        .into_diagnostic()?;
    Ok(())
}

pub fn print_summary(out: &mut dyn Write, recording: &Recording) -> Result<()> {
    writeln!(out, "{}", format_summary(recording)).into_diagnostic()?;
    Ok(())
}
