use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use log::trace;
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::{
    error::RconError,
    options::Options,
    packet::{self, CommandPacket, Reply},
    transport::{Channel, Connector},
};

/// Command used by [Client::validate_credentials]. Harmless on every server.
const PROBE_COMMAND: &str = "stats";
const PROBE_REPLY_SIZE: usize = 2048;

/// Asynchronous GoldSrc rcon session. Call `connect()` to open the channel and,
/// if the server wants one, fetch a challenge token.
///
/// UDP has no way to match a reply to its request, so every exchange holds an
/// internal lock from send until receive. The client can be shared between
/// tasks behind an `Arc`; commands simply run one after another.
///
/// ## Example
/// ```no_run
/// use hlrcon::client::Client;
/// use hlrcon::transport::UdpConnector;
/// use std::error::Error;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn Error>> {
///     let host = "127.0.0.1:27015";
///     let client = Client::connect(host, "<put rcon password here>", true, &UdpConnector).await?;
///     client.validate_credentials().await?;
///
///     let reply = client.command("status", 4096).await?;
///     println!("{}", String::from_utf8_lossy(&reply));
///
///     client.disconnect().await?;
///     Ok(())
/// }
/// ```
pub struct Client {
    address: String,
    credentials: RwLock<Credentials>,
    // `None` once torn down. Holding the guard is holding the exchange lock.
    channel: Mutex<Option<Box<dyn Channel>>>,
    options: Options,
}

#[derive(Debug, Clone, Default)]
struct Credentials {
    secret: String,
    challenge: Vec<u8>,
    challenge_required: bool,
}

/// Where a [Client] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// `disconnect()` has been called.
    Disconnected,
    /// Channel open, no challenge token.
    Connected,
    /// Channel open and a challenge token has been negotiated.
    ChallengeEstablished,
}

impl Client {
    /// Open a session with default [Options]. With `use_challenge` set, a
    /// challenge is negotiated before this returns; if that fails the channel
    /// is closed again and the error is returned.
    pub async fn connect(
        address: &str,
        secret: &str,
        use_challenge: bool,
        connector: &dyn Connector,
    ) -> Result<Self, RconError> {
        Self::connect_with_options(address, secret, use_challenge, connector, Options::default())
            .await
    }

    pub async fn connect_with_options(
        address: &str,
        secret: &str,
        use_challenge: bool,
        connector: &dyn Connector,
        options: Options,
    ) -> Result<Self, RconError> {
        let channel = connector
            .connect(address, options.connect_timeout)
            .await
            .map_err(RconError::UnreachableHost)?;

        trace!("opened channel to {}", address);

        let client = Client {
            address: address.to_owned(),
            credentials: RwLock::new(Credentials {
                secret: secret.to_owned(),
                challenge: Vec::new(),
                challenge_required: use_challenge,
            }),
            channel: Mutex::new(Some(channel)),
            options,
        };

        if use_challenge {
            if let Err(e) = client.negotiate().await {
                trace!("challenge negotiation with {} failed, closing", address);
                if let Err(close) = client.disconnect().await {
                    trace!("closing {} failed too: {}", address, close);
                }
                return Err(e);
            }
        }

        Ok(client)
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Replace the password used for every following command.
    pub fn set_secret(&self, secret: &str) {
        self.credentials
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .secret = secret.to_owned();
    }

    /// The negotiated challenge token; empty until a negotiation succeeds.
    pub fn challenge(&self) -> Vec<u8> {
        self.credentials().challenge
    }

    pub fn challenge_required(&self) -> bool {
        self.credentials().challenge_required
    }

    /// Waits for any exchange in flight.
    pub async fn state(&self) -> State {
        if self.channel.lock().await.is_none() {
            State::Disconnected
        } else if self.credentials().challenge.is_empty() {
            State::Connected
        } else {
            State::ChallengeEstablished
        }
    }

    /// Ask the server for a fresh challenge token. Can be called again at any
    /// time to replace the current token. Nothing changes if it fails.
    pub async fn negotiate(&self) -> Result<(), RconError> {
        let mut guard = self.channel.lock().await;
        let channel = guard.as_mut().ok_or(RconError::Closed)?;

        trace!("requesting challenge from {}", self.address);
        let reply = self
            .exchange(
                &mut **channel,
                packet::CHALLENGE_REQUEST,
                packet::CHALLENGE_REPLY_MAX_SIZE,
            )
            .await?;
        let token = packet::parse_challenge(&reply)?;

        trace!("got challenge of {} bytes", token.len());
        let mut credentials = self
            .credentials
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        credentials.challenge = token.to_vec();
        credentials.challenge_required = true;

        Ok(())
    }

    /// Run a rcon command and return the raw reply datagram, cut to
    /// `max_reply_size` bytes. There is no length prefix to tell how big the
    /// reply will be, so anything beyond the cap is silently lost.
    pub async fn command(
        &self,
        command: &str,
        max_reply_size: usize,
    ) -> Result<Vec<u8>, RconError> {
        let credentials = self.credentials();
        let challenge = credentials
            .challenge_required
            .then_some(credentials.challenge.as_slice());
        let command_packet = CommandPacket::new(challenge, &credentials.secret, command).pack();

        let mut guard = self.channel.lock().await;
        let channel = guard.as_mut().ok_or(RconError::Closed)?;

        trace!("sending command to {}", self.address);
        self.exchange(&mut **channel, &command_packet, max_reply_size)
            .await
    }

    /// Send a harmless command and let the server tell us whether the password
    /// and challenge are good.
    pub async fn validate_credentials(&self) -> Result<(), RconError> {
        let reply = self.command(PROBE_COMMAND, PROBE_REPLY_SIZE).await?;

        match Reply::classify(&reply) {
            Reply::InvalidPassword => Err(RconError::InvalidPassword),
            Reply::MissingChallenge => Err(RconError::ChallengeRequired),
            _ => Ok(()),
        }
    }

    /// Close the channel. Calling this more than once is fine.
    pub async fn disconnect(&self) -> Result<(), RconError> {
        let channel = self.channel.lock().await.take();

        match channel {
            Some(mut channel) => {
                trace!("closing channel to {}", self.address);
                channel.close().await.map_err(RconError::CloseError)
            }
            None => Ok(()),
        }
    }

    fn credentials(&self) -> Credentials {
        self.credentials
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// One send followed by one receive. Callers hold the channel lock.
    ///
    /// A previous exchange that timed out, or whose future was dropped after
    /// sending, may have left its reply on the channel. Anything queued before
    /// our send cannot be ours, so it is dropped first.
    async fn exchange(
        &self,
        channel: &mut dyn Channel,
        datagram: &[u8],
        max_reply_size: usize,
    ) -> Result<Vec<u8>, RconError> {
        let deadline = self.options.io_timeout;

        let stale = channel.drain().map_err(RconError::ReceiveError)?;
        if stale > 0 {
            trace!("dropped {} stale datagrams", stale);
        }

        Self::write_to_channel(channel, datagram, deadline).await?;
        Self::read_from_channel(channel, max_reply_size, deadline).await
    }

    async fn write_to_channel(
        channel: &mut dyn Channel,
        datagram: &[u8],
        deadline: Duration,
    ) -> Result<(), RconError> {
        timeout(deadline, channel.send(datagram))
            .await?
            .map_err(RconError::SendError)
    }

    async fn read_from_channel(
        channel: &mut dyn Channel,
        max_size: usize,
        deadline: Duration,
    ) -> Result<Vec<u8>, RconError> {
        let mut buf = vec![0u8; max_size];

        let n = timeout(deadline, channel.recv(&mut buf))
            .await?
            .map_err(RconError::ReceiveError)?;

        trace!("received {} bytes", n);
        buf.truncate(n);
        Ok(buf)
    }
}
