use thiserror::Error;
use tokio::time::error::Elapsed;

/// Possible errors for the package.
#[derive(Error, Debug)]
pub enum RconError {
    /// Returned if the connector could not open a channel to the host.
    #[error("host cannot be reached")]
    UnreachableHost(#[source] std::io::Error),
    /// The channel is open, but there was a problem writing to it.
    #[error("cannot send message to host")]
    SendError(#[source] std::io::Error),
    /// The channel is open, but there was a problem reading from it.
    #[error("cannot receive response from host")]
    ReceiveError(#[source] std::io::Error),
    /// The channel could not be closed cleanly. It is unusable either way.
    #[error("cannot close connection to host")]
    CloseError(#[source] std::io::Error),
    /// Returned if the server did not respond in time.
    #[error("timeout")]
    TimeoutError(#[from] Elapsed),
    /// Returned for any exchange attempted after `disconnect()`.
    #[error("connection closed")]
    Closed,
    /// Only used by the mock server.
    #[error("cannot bind to address")]
    BindError(#[source] std::io::Error),
    /// The server wants a challenge token we have not negotiated (or got wrong).
    #[error("challenge required for this server")]
    ChallengeRequired,
    /// Returned if you can't remember the password.
    #[error("rcon password provided is invalid")]
    InvalidPassword,
    /// The challenge reply was missing its header or its terminator.
    #[error("server sent an invalid response for challenge request")]
    InvalidChallengeResponse,
}
