use std::net::SocketAddr;

use log::{error, info};
use tokio::{net::UdpSocket, task::JoinHandle};

use crate::{
    error::RconError,
    packet::{self, CommandPacket},
    transport::Channel,
};

const MAX_DATAGRAM: usize = 4096;

/// A stand-in for a GoldSrc dedicated server that only knows rcon.
///
/// It answers challenge requests, checks the password and challenge of every
/// command, prints back the argument of `echo` and acknowledges everything
/// else.
#[derive(Debug, Clone)]
pub struct MockServer {
    password: String,
    challenge: Vec<u8>,
    require_challenge: bool,
}

impl MockServer {
    pub const DEFAULT_CHALLENGE: &'static [u8] = b"3741520813";

    /// A server that requires the default challenge.
    pub fn new(password: &str) -> Self {
        MockServer {
            password: password.to_owned(),
            challenge: Self::DEFAULT_CHALLENGE.to_vec(),
            require_challenge: true,
        }
    }

    pub fn with_challenge(mut self, challenge: &[u8]) -> Self {
        self.challenge = challenge.to_vec();
        self
    }

    pub fn require_challenge(mut self, required: bool) -> Self {
        self.require_challenge = required;
        self
    }

    /// The reply to a single datagram, if the server would send one at all.
    pub fn respond(&self, datagram: &[u8]) -> Option<Vec<u8>> {
        if datagram == packet::CHALLENGE_REQUEST {
            let mut reply = packet::CHALLENGE_REPLY_HEADER.to_vec();
            reply.extend_from_slice(&self.challenge);
            reply.extend_from_slice(&[packet::TERMINATOR, 0]);
            return Some(reply);
        }

        let line = datagram
            .strip_prefix(packet::COMMAND_HEADER)?
            .strip_suffix(b"\x00\x00")?;

        // Without a challenge in play the line is "<password> <command>", with
        // one it is "<challenge> <password> <command>". Look for the password
        // in both places so a missing token is told apart from a bad password.
        let (first, rest) = split_word(line);
        let (second, tail) = split_word(rest);
        let password = self.password.as_bytes();

        let command = if self.require_challenge {
            if second == password && first == self.challenge.as_slice() {
                tail
            } else if first == password || second == password {
                return Some(packet::MISSING_CHALLENGE_REPLY.to_vec());
            } else {
                return Some(packet::INVALID_PASSWORD_REPLY.to_vec());
            }
        } else if first == password {
            rest
        } else {
            return Some(packet::INVALID_PASSWORD_REPLY.to_vec());
        };

        match command.strip_prefix(b"echo ") {
            Some(text) => {
                let mut reply = packet::PRINT_HEADER.to_vec();
                reply.extend_from_slice(text);
                reply.extend_from_slice(&[packet::TERMINATOR, 0, 0]);
                Some(reply)
            }
            None => Some(packet::ACK_REPLY.to_vec()),
        }
    }

    /// Answer everything arriving on `channel` until the other end goes away.
    pub fn serve<C>(self, mut channel: C) -> JoinHandle<()>
    where
        C: Channel + 'static,
    {
        tokio::spawn(async move {
            let mut buf = [0u8; MAX_DATAGRAM];
            loop {
                let n = match channel.recv(&mut buf).await {
                    Ok(n) => n,
                    Err(e) => {
                        info!("peer gone: {}", e);
                        break;
                    }
                };

                if let Some(reply) = self.respond(&buf[..n]) {
                    if let Err(e) = channel.send(&reply).await {
                        error!("{:?}", e);
                        break;
                    }
                }
            }
        })
    }

    /// Bind a UDP socket on `addr` and answer any peer that writes to it.
    pub async fn start(self, addr: &str) -> Result<(SocketAddr, JoinHandle<()>), RconError> {
        let socket = UdpSocket::bind(addr).await.map_err(RconError::BindError)?;
        let local = socket.local_addr().map_err(RconError::BindError)?;

        let sample = CommandPacket::new(
            Some(self.challenge.as_slice()),
            &self.password,
            "echo hello world",
        );
        info!("try this sample packet: {:x?}", sample.pack());

        let handle: JoinHandle<()> = tokio::spawn(async move {
            info!("server running on {}", local);
            let mut buf = [0u8; MAX_DATAGRAM];
            loop {
                match socket.recv_from(&mut buf).await {
                    Ok((n, peer)) => {
                        info!("receive {} bytes from {:?}", n, peer);
                        if let Some(reply) = self.respond(&buf[..n]) {
                            if let Err(e) = socket.send_to(&reply, peer).await {
                                error!("{:?}", e);
                            }
                        }
                    }
                    Err(e) => error!("{:?}", e),
                }
            }
        });

        Ok((local, handle))
    }
}

fn split_word(line: &[u8]) -> (&[u8], &[u8]) {
    match line.iter().position(|&b| b == packet::SEPARATOR) {
        Some(i) => (&line[..i], &line[i + 1..]),
        None => (line, &line[line.len()..]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(challenge: Option<&[u8]>, secret: &str, text: &str) -> Vec<u8> {
        CommandPacket::new(challenge, secret, text).pack()
    }

    #[test]
    fn answers_challenge_request() {
        let server = MockServer::new("pw").with_challenge(b"42");
        let reply = server.respond(packet::CHALLENGE_REQUEST).unwrap();

        assert_eq!(reply, b"\xFF\xFF\xFF\xFFchallenge rcon 42\n\x00");
        assert_eq!(packet::parse_challenge(&reply).unwrap(), b"42");
    }

    #[test]
    fn checks_challenge_and_password() {
        let server = MockServer::new("pw");
        let token = MockServer::DEFAULT_CHALLENGE;

        assert_eq!(
            server.respond(&command(Some(token), "pw", "stats")).unwrap(),
            packet::ACK_REPLY
        );
        assert_eq!(
            server.respond(&command(None, "pw", "stats")).unwrap(),
            packet::MISSING_CHALLENGE_REPLY
        );
        assert_eq!(
            server.respond(&command(Some(b"nope".as_slice()), "pw", "stats")).unwrap(),
            packet::MISSING_CHALLENGE_REPLY
        );
        assert_eq!(
            server.respond(&command(Some(token), "bad", "stats")).unwrap(),
            packet::INVALID_PASSWORD_REPLY
        );
        assert_eq!(
            server.respond(&command(None, "bad", "stats")).unwrap(),
            packet::INVALID_PASSWORD_REPLY
        );
    }

    #[test]
    fn without_challenge() {
        let server = MockServer::new("pw").require_challenge(false);

        assert_eq!(
            server.respond(&command(None, "pw", "echo hi there")).unwrap(),
            b"\xFF\xFF\xFF\xFFlhi there\n\x00\x00"
        );
        assert_eq!(
            server.respond(&command(None, "bad", "stats")).unwrap(),
            packet::INVALID_PASSWORD_REPLY
        );
    }

    #[test]
    fn ignores_noise() {
        let server = MockServer::new("pw");
        assert!(server.respond(b"").is_none());
        assert!(server.respond(b"\xFF\xFF\xFF\xFFinfo\x00").is_none());
        assert!(server.respond(b"\xFF\xFF\xFF\xFFrcon pw stats").is_none());
    }
}
