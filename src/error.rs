use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// `dlsym` couldn't find one of the real allocator's primitives
    #[error("could not resolve `{symbol}`: {reason}")]
    Unresolved { symbol: &'static str, reason: String },
    #[error("leak tracking is already initialized")]
    AlreadyInitialized,
    #[error("leak tracking has been torn down")]
    TornDown,
}
