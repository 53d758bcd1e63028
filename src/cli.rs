use std::path::PathBuf;

use clap::{ArgAction, Parser};
use indoc::indoc;

use crate::fetch::Operation;

macro_rules! arg_env {
    ($v:literal) => {
        concat!("TIVO_FETCH_", $v)
    };
}

/// List the recordings of a TiVo, show their details or download them.
///
/// Without any ID, every recording of the device is listed.
/// With IDs, only those recordings are acted upon.
#[derive(Parser, Debug)]
#[command(version, after_help = indoc! {"
    Examples:
      tivo-fetch --host 10.0.0.5 --mak 0123456789
      tivo-fetch --host 10.0.0.5 --mak 0123456789 --detail 1234
      tivo-fetch --host 10.0.0.5 --mak 0123456789 --mp4 --show --skip --fetch
"})]
pub struct Args {
    /// IDs of the recordings to act upon
    pub ids: Vec<String>,

    /// Network address of the device
    #[arg(long, env = arg_env!("HOST"))]
    pub host: Option<String>,

    /// Media access key of the device
    #[arg(long, env = arg_env!("MAK"), hide_env_values = true)]
    pub mak: Option<String>,

    /// Print the details of the recordings instead of fetching them
    #[arg(long)]
    pub detail: bool,

    /// Decode the recordings to MPEG program streams
    #[arg(long)]
    pub decode: bool,

    /// Decode then transcode the recordings to H.264 videos
    #[arg(long, visible_alias = "encode")]
    pub mp4: bool,

    /// Fetch every recording not being recorded, when no ID is given
    #[arg(long)]
    pub fetch: bool,

    /// Skip recordings already fetched instead of fetching them to a new name
    #[arg(long)]
    pub skip: bool,

    /// Put episodes in a directory named after their series, and name them after the episode
    #[arg(long)]
    pub show: bool,

    /// The path to the output directory
    #[arg(long, default_value = ".", env = arg_env!("OUT"))]
    pub out: PathBuf,

    /// The path to a TOML configuration file.
    /// By default, `tivo-fetch.toml` is read from the working directory if it exists
    #[arg(long, env = arg_env!("CONFIG"))]
    pub config: Option<PathBuf>,

    /// Report failed recordings and continue with the next ones instead of stopping
    #[arg(long)]
    pub keep_going: bool,

    /// Increase the logging verbosity. Can be repeated
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// Whether any of the options asking to download recordings is set
    pub fn wants_fetch(&self) -> bool {
        self.fetch || self.decode || self.mp4
    }

    pub fn operation(&self) -> Operation {
        if self.mp4 {
            Operation::Encode
        } else if self.decode {
            Operation::Decode
        } else {
            Operation::Raw
        }
    }

    pub fn log_level(&self) -> tracing::Level {
        match self.verbose {
            0 => tracing::Level::INFO,
            1 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }
}
