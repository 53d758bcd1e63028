/// File extension of a fetched recording, telling which format it holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extension {
    /// Raw device container, as served by the recorder
    Tivo,
    /// Decoded MPEG program stream
    Mpg,
    /// Transcoded H.264 video
    M4v,
}

impl Extension {
    /// Return the extension with the leading dot.
    /// e.g. ".ext"
    pub fn with_dot(self) -> &'static str {
        match self {
            Extension::Tivo => ".tivo",
            Extension::Mpg => ".mpg",
            Extension::M4v => ".m4v",
        }
    }
}
