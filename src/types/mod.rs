mod extension;
mod recording;

pub use extension::Extension;
pub use recording::Recording;

#[cfg(test)]
pub(crate) use recording::tests::sample as sample_recording;
