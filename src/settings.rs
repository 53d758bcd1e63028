use std::{path::Path, time::Duration};

use ::config::{Config, File, FileFormat};
use miette::{miette, Context, IntoDiagnostic};
use serde::Deserialize;

use crate::{cli::Args, result::Result};

/// Config file looked up in the working directory when none is given
const DEFAULT_CONFIG_FILE: &str = "tivo-fetch.toml";

/// External programs making up the fetch pipelines
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Tools {
    /// HTTP client supporting digest authentication, `curl` compatible
    pub downloader: String,
    /// `tivodecode` compatible decoder
    pub decoder: String,
    /// `ffmpeg` compatible transcoder
    pub transcoder: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub host: Option<String>,
    pub mak: Option<String>,
    pub pause_secs: u64,
    pub tools: Tools,
}

impl Settings {
    /// Merge, by increasing priority: defaults, the config file, the command line
    pub fn load(args: &Args) -> Result<Self> {
        let file = match &args.config {
            Some(path) => File::from(path.as_path()).format(FileFormat::Toml),
            None => File::from(Path::new(DEFAULT_CONFIG_FILE))
                .format(FileFormat::Toml)
                .required(false),
        };

        let settings = Config::builder()
            .set_default("pause_secs", 2_i64)
            .and_then(|b| b.set_default("tools.downloader", "curl"))
            .and_then(|b| b.set_default("tools.decoder", "tivodecode"))
            .and_then(|b| b.set_default("tools.transcoder", "ffmpeg"))
            .into_diagnostic()?
            .add_source(file)
            .set_override_option("host", args.host.clone())
            .and_then(|b| b.set_override_option("mak", args.mak.clone()))
            .into_diagnostic()?
            .build()
            .into_diagnostic()
            .wrap_err("Could not read the configuration")?
            .try_deserialize()
            .into_diagnostic()
            .wrap_err("Invalid configuration")?;

        Ok(settings)
    }

    pub fn host(&self) -> Result<&str> {
        Ok(self
            .host
            .as_deref()
            .ok_or_else(|| miette!("No device address. Use --host or set `host` in the config file"))?)
    }

    pub fn mak(&self) -> Result<&str> {
        Ok(self
            .mak
            .as_deref()
            .ok_or_else(|| miette!("No media access key. Use --mak or set `mak` in the config file"))?)
    }

    pub fn pause(&self) -> Duration {
        Duration::from_secs(self.pause_secs)
    }
}
