mod command;
mod now_playing;
mod pipeline;
mod tivo;

pub use command::{Arg, Stage, DIGEST_USER};
pub use pipeline::{Pipeline, PipelineRunner, ProcessRunner};
pub use tivo::{Pvr, TivoConnect};

#[cfg(test)]
pub(crate) use tivo::tests::FakePvr;
