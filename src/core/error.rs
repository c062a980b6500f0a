use std::fmt;

/// Coarse classification of what went wrong.
///
/// `Io`/`Corruption`/`Version`/`Budget`/`Invariant`/`Cancelled` map directly to
/// the error kinds the scorer, codec and cache manager are required to
/// surface; `InvalidArgument`/`InvalidState` cover precondition violations
/// raised at the library boundary (bad quantizer input, querying a index that
/// hasn't been built yet).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    Corruption,
    Version,
    Budget,
    Invariant,
    Cancelled,
    InvalidArgument,
    InvalidState,
}

#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub context: String,
}

impl Error {
    pub fn new(kind: ErrorKind, context: impl Into<String>) -> Self {
        Error {
            kind,
            context: context.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.context)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::new(ErrorKind::Io, err.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::new(ErrorKind::Corruption, err.to_string())
    }
}

impl From<fst::Error> for Error {
    fn from(err: fst::Error) -> Self {
        Error::new(ErrorKind::Corruption, format!("term dictionary: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
