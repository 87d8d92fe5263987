use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Session(#[from] tavolo_sessions::Error),

    #[error(transparent)]
    Quota(#[from] tavolo_quota::Error),

    #[error(transparent)]
    Dispatch(#[from] tavolo_dispatch::Error),

    /// A direct send hit the transport and failed; queued sends surface
    /// failures through the event stream instead.
    #[error(transparent)]
    Transport(#[from] tavolo_dispatch::TransportError),
}

pub type Result<T> = std::result::Result<T, Error>;
