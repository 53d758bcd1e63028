mod app;
mod cli;
mod fetch;
mod human;
mod io;
mod logging;
mod outside;
mod result;
mod session;
mod settings;
mod types;

use clap::Parser;
use miette::Result;
use time::UtcOffset;
use tracing::debug;

use crate::{
    app::Request,
    cli::Args,
    fetch::FetchOptions,
    logging::init_logging,
    outside::{ProcessRunner, TivoConnect},
    settings::Settings,
};

fn main() -> Result<()> {
    // Must be read before anything can spawn a thread
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);

    let args = Args::parse();
    init_logging(args.log_level(), offset)?;

    let settings = Settings::load(&args)?;
    debug!("Tools: {:?}, pause: {:?}", settings.tools, settings.pause());

    let request = Request {
        ids: args.ids.clone(),
        detail: args.detail,
        fetch_all: args.wants_fetch(),
        keep_going: args.keep_going,
        fetch: FetchOptions {
            operation: args.operation(),
            skip: args.skip,
            show_dir: args.show,
            out_dir: args.out.clone(),
            pause: settings.pause(),
        },
    };

    let tivo = TivoConnect::new(
        settings.host()?.to_string(),
        settings.mak()?.to_string(),
        settings.tools.downloader.clone(),
        offset,
    )?;

    let mut stdout = std::io::stdout().lock();
    app::run(&request, &tivo, &ProcessRunner, &settings.tools, &mut stdout)?;

    Ok(())
}
