use std::{fmt::Display, path::PathBuf, process::ExitStatus};

use miette::miette;

#[derive(Debug)]
pub enum Error {
    /// The device does not know any recording with this identifier
    NotFound(String),

    /// A stage of an external pipeline did run but was not successful
    PipelineFailure {
        stage: String,
        pipeline: String,
        status: ExitStatus,
    },

    /// Creating a directory or moving a file in the output tree failed
    Filesystem {
        action: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },

    Miette(miette::Report),
}

impl From<miette::Report> for Error {
    fn from(err: miette::Report) -> Self {
        Error::Miette(err)
    }
}

impl From<Error> for miette::Report {
    fn from(err: Error) -> Self {
        match err {
            Error::NotFound(id) => miette!("No recording with id '{id}' on the device"),
            Error::PipelineFailure {
                stage,
                pipeline,
                status,
            } => miette!("`{stage}` failed ({status}) while running: {pipeline}"),
            Error::Filesystem {
                action,
                path,
                source,
            } => miette!("Could not {action} '{}': {source}", path.display()),
            Error::Miette(err) => err,
        }
    }
}

impl Error {
    pub fn wrap_err_with<D, F>(self, f: F) -> Error
    where
        D: Display + Send + Sync + 'static,
        F: FnOnce() -> D,
    {
        match self {
            Error::Miette(report) => Error::Miette(report.wrap_err(f())),
            err => err,
        }
    }

    pub fn filesystem(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Filesystem {
            action,
            path: path.into(),
            source,
        }
    }
}

/// Build an error out of a simple message
pub fn err_msg<D: Display>(msg: D) -> Error {
    Error::Miette(miette!("{msg}"))
}

pub fn bail<T, D: Display>(msg: D) -> Result<T> {
    Err(err_msg(msg))
}

pub type Result<T> = std::result::Result<T, Error>;
