use std::io::Write;

use tracing::{error, info};

use crate::{
    fetch::{FetchOptions, Fetcher, Origin, Outcome},
    outside::{PipelineRunner, Pvr},
    result::{bail, Result},
    session::{print_detail, print_summary, Directory},
    settings::Tools,
};

/// What the user asked for, once the command line and configuration are merged
#[derive(Debug, Clone)]
pub struct Request {
    pub ids: Vec<String>,
    pub detail: bool,
    /// Fetch the recordings instead of listing them when no ID is given
    pub fetch_all: bool,
    /// Log errors and carry on with the next recording instead of stopping
    pub keep_going: bool,
    pub fetch: FetchOptions,
}

/// Act on the requested recordings, printing to `out`
pub fn run(
    request: &Request,
    pvr: &dyn Pvr,
    runner: &dyn PipelineRunner,
    tools: &Tools,
    out: &mut dyn Write,
) -> Result<()> {
    let directory = Directory::new(pvr);
    let fetcher = Fetcher::new(&directory, runner, tools, &request.fetch);
    let mut failures = 0usize;

    let mut handle = |res: Result<()>| -> Result<()> {
        match res {
            Err(err) if request.keep_going => {
                failures += 1;
                error!("{:?}", miette::Report::from(err));
                Ok(())
            }
            res => res,
        }
    };

    if request.ids.is_empty() {
        for recording in directory.list_all() {
            let res = recording.and_then(|recording| {
                if request.detail {
                    print_detail(out, &recording)
                } else if request.fetch_all {
                    fetcher.fetch(out, &recording, Origin::Bulk).map(log_outcome)
                } else {
                    print_summary(out, &recording)
                }
            });
            handle(res)?;
        }
    } else {
        for id in &request.ids {
            let res = if request.detail {
                directory
                    .resolve_one(id)
                    .and_then(|recording| print_detail(out, &recording))
            } else {
                fetcher.fetch_id(out, id).map(log_outcome)
            };
            handle(res)?;
        }
    }

    if failures > 0 {
        return bail(format!("{failures} recording(s) could not be processed"));
    }
    Ok(())
}

fn log_outcome(outcome: Outcome) {
    match outcome {
        Outcome::Done(path) => info!("Done: {}", path.display()),
        Outcome::SkippedInProgress => {}
        Outcome::SkippedExisting(path) => info!("Already fetched: {}", path.display()),
    }
}
