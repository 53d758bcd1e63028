use std::collections::VecDeque;

use time::UtcOffset;
use tracing::{debug, info};

use super::{
    command::{assert_success_command, run_command, Arg, Capture, Stage, DIGEST_USER},
    now_playing::{parse_page, Page},
};
use crate::{
    io::cookie_jar,
    result::{bail, Error, Result},
    types::Recording,
};

/// Number of items asked to the device per listing request
const PAGE_SIZE: usize = 50;

/// Interface to the recorder holding the recordings
pub trait Pvr {
    /// The media access key, used both to authenticate and to decode recordings
    fn access_key(&self) -> &str;

    /// Iterate over every recording of the device, in the order it reports them.
    ///
    /// The listing is fetched lazily while iterating and cannot be restarted:
    /// call this method again to get a fresh listing.
    fn list_all(&self) -> Box<dyn Iterator<Item = Result<Recording>> + '_>;

    /// Find the recording with the given identifier.
    ///
    /// Return [`Error::NotFound`] if the device does not have it.
    fn resolve_one(&self, id: &str) -> Result<Recording> {
        for recording in self.list_all() {
            let recording = recording?;
            if recording.program_id == id {
                return Ok(recording);
            }
        }

        Err(Error::NotFound(id.to_string()))
    }
}

/// Client of the TiVoConnect HTTP interface, talking to the device through `curl`
#[derive(Debug)]
pub struct TivoConnect {
    host: String,
    mak: String,
    curl: String,
    offset: UtcOffset,
}

impl TivoConnect {
    /// Verify that the `curl` binary is reachable.
    ///
    /// Capture dates of the listed recordings will be shown in the given offset.
    pub fn new(host: String, mak: String, curl: String, offset: UtcOffset) -> Result<Self> {
        assert_success_command(&Stage::new(&curl).arg("--version"))
            .map_err(|err| err.wrap_err_with(|| format!("{curl} is needed to talk to the device")))?;

        Ok(Self {
            host,
            mak,
            curl,
            offset,
        })
    }

    fn now_playing_url(&self, anchor: usize) -> String {
        format!(
            "https://{}/TiVoConnect?Command=QueryContainer&Container=%2FNowPlaying\
            &Recurse=Yes&ItemCount={PAGE_SIZE}&AnchorOffset={anchor}",
            self.host
        )
    }

    /// Fetch the page of the listing starting at the given item
    fn fetch_page(&self, anchor: usize) -> Result<Page> {
        // The device sets a session cookie that must be sent back after the digest challenge
        let cookie_jar = cookie_jar()?;

        // The device uses a self-signed certificate
        let stage = Stage::new(&self.curl)
            .args(["--silent", "--show-error", "--fail", "--insecure", "--digest"])
            .arg("--user")
            .arg(Arg::secret(
                format!("{DIGEST_USER}:{}", self.mak),
                format!("{DIGEST_USER}:****"),
            ))
            .arg("--cookie-jar")
            .arg(cookie_jar.path())
            .arg(self.now_playing_url(anchor));

        let res = run_command(&stage, Capture::STDOUT | Capture::STDERR)?;
        if !res.status.success() {
            let stderr = String::from_utf8_lossy(&res.stderr);
            return bail(format!(
                "Could not list the recordings of {}: {}",
                self.host,
                stderr.trim()
            ));
        }

        let page = parse_page(&res.stdout, self.offset)
            .map_err(|err| err.wrap_err_with(|| "Could not parse the device listing"))?;
        debug!(
            "Listing page at {anchor}: {} items, {} recordings, {:?} in total",
            page.item_count,
            page.recordings.len(),
            page.total_items
        );
        Ok(page)
    }
}

impl Pvr for TivoConnect {
    fn access_key(&self) -> &str {
        &self.mak
    }

    fn list_all(&self) -> Box<dyn Iterator<Item = Result<Recording>> + '_> {
        info!("Listing the recordings of {}", self.host);
        Box::new(NowPlaying::new(|anchor| self.fetch_page(anchor)))
    }
}

/// Lazy iterator over a paged listing.
///
/// Stops after the last page or after the first error.
pub struct NowPlaying<F> {
    fetch: F,
    anchor: usize,
    buffer: VecDeque<Recording>,
    done: bool,
}

impl<F> NowPlaying<F>
where
    F: FnMut(usize) -> Result<Page>,
{
    pub fn new(fetch: F) -> Self {
        Self {
            fetch,
            anchor: 0,
            buffer: VecDeque::new(),
            done: false,
        }
    }
}

impl<F> Iterator for NowPlaying<F>
where
    F: FnMut(usize) -> Result<Page>,
{
    type Item = Result<Recording>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.buffer.is_empty() {
            if self.done {
                return None;
            }

            let page = match (self.fetch)(self.anchor) {
                Ok(page) => page,
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            };

            self.anchor += page.item_count;
            let reached_total = page.total_items.is_some_and(|total| self.anchor >= total);
            if page.item_count == 0 || reached_total {
                self.done = true;
            }
            self.buffer.extend(page.recordings);
        }

        self.buffer.pop_front().map(Ok)
    }
}
