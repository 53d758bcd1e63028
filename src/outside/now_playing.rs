use std::collections::HashMap;

use miette::{miette, Context, IntoDiagnostic};
use quick_xml::{events::Event, reader::Reader};
use time::{OffsetDateTime, UtcOffset};
use tracing::trace;

use crate::{result::Result, types::Recording};

/// One page of the device "Now Playing" listing
#[derive(Debug, Default)]
pub struct Page {
    /// Number of recordings in the whole listing, if the device told it
    pub total_items: Option<usize>,
    /// Number of items in this page, folders included
    pub item_count: usize,
    pub recordings: Vec<Recording>,
}

/// Raw fields of an `<Item>` element
#[derive(Debug, Default)]
struct ItemFields {
    details: HashMap<String, String>,
    url: Option<String>,
}

impl ItemFields {
    /// Return `None` for items without downloadable content (e.g. folders)
    fn into_recording(mut self, offset: UtcOffset) -> Result<Option<Recording>> {
        let Some(content_url) = self.url else {
            return Ok(None);
        };

        let title = self
            .details
            .remove("Title")
            .ok_or_else(|| miette!("Recording at {content_url} has no title"))?;

        // The same episode recorded twice shares its ProgramId, the URL id is unique
        let program_id = id_from_url(&content_url)
            .ok_or_else(|| miette!("Recording '{title}' has no id in its URL {content_url}"))?
            .to_string();

        let capture_date = match self.details.get("CaptureDate") {
            Some(date) => parse_capture_date(date)?,
            None => OffsetDateTime::UNIX_EPOCH,
        }
        .to_offset(offset);

        let number = |key: &str| -> Result<u64> {
            self.details.get(key).map_or(Ok(0), |v| {
                v.trim()
                    .parse()
                    .into_diagnostic()
                    .wrap_err_with(|| format!("Invalid {key} '{v}' for recording '{title}'"))
                    .map_err(Into::into)
            })
        };
        let duration = number("Duration")?;
        let source_size = number("SourceSize")?;

        Ok(Some(Recording {
            episode_number: self
                .details
                .get("EpisodeNumber")
                .and_then(|n| n.trim().parse().ok()),
            in_progress: self
                .details
                .get("InProgress")
                .is_some_and(|v| v.eq_ignore_ascii_case("yes")),
            episode_id: self.details.remove("ProgramId"),
            episode_title: self.details.remove("EpisodeTitle"),
            series_id: self.details.remove("SeriesId"),
            source_station: self.details.remove("SourceStation"),
            source_channel: self.details.remove("SourceChannel"),
            program_id,
            title,
            capture_date,
            duration,
            source_size,
            content_url,
        }))
    }
}

/// Capture dates are seconds since the epoch, written in hexadecimal
fn parse_capture_date(s: &str) -> Result<OffsetDateTime> {
    let s = s.trim();
    let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    let secs = i64::from_str_radix(digits, 16)
        .into_diagnostic()
        .wrap_err_with(|| format!("Invalid capture date '{s}'"))?;
    Ok(OffsetDateTime::from_unix_timestamp(secs)
        .into_diagnostic()
        .wrap_err_with(|| format!("Capture date '{s}' out of range"))?)
}

/// Extract the `id` query parameter of a content URL
fn id_from_url(url: &str) -> Option<&str> {
    let (_, query) = url.split_once('?')?;
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix("id="))
        .filter(|id| !id.is_empty())
}

/// Parse a `QueryContainer` response.
///
/// Capture dates are converted to the given offset.
pub fn parse_page(xml: &[u8], offset: UtcOffset) -> Result<Page> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut page = Page::default();
    let mut buf = Vec::new();
    let mut path: Vec<String> = Vec::new();
    let mut item: Option<ItemFields> = None;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .into_diagnostic()
            .wrap_err_with(|| format!("Invalid listing XML at position {}", reader.buffer_position()))?;

        match event {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if path.len() == 1 && name == "Item" {
                    item = Some(ItemFields::default());
                }
                path.push(name);
            }
            Event::End(_) => {
                let name = path.pop();
                if path.len() == 1 && name.as_deref() == Some("Item") {
                    page.item_count += 1;
                    if let Some(fields) = item.take() {
                        match fields.into_recording(offset)? {
                            Some(recording) => page.recordings.push(recording),
                            None => trace!("Skipping an item without content"),
                        }
                    }
                }
            }
            Event::Text(e) => {
                let text = e.unescape().into_diagnostic()?.into_owned();
                let keys: Vec<&str> = path.iter().map(String::as_str).collect();
                match (keys.as_slice(), item.as_mut()) {
                    ([_, "Details", "TotalItems"], _) => {
                        page.total_items = text.parse().ok();
                    }
                    ([_, "Item", "Details", key], Some(fields)) => {
                        fields.details.insert(key.to_string(), text);
                    }
                    ([_, "Item", "Links", "Content", "Url"], Some(fields)) => {
                        fields.url = Some(text);
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(page)
}
