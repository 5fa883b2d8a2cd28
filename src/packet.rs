use crate::error::RconError;

/// Every connectionless GoldSrc datagram starts with this marker.
pub const MARKER: [u8; 4] = [0xFF, 0xFF, 0xFF, 0xFF];

/// `FF FF FF FF "rcon "`
pub const COMMAND_HEADER: &[u8] = b"\xFF\xFF\xFF\xFFrcon ";

/// `FF FF FF FF "challenge rcon\n" 00`
pub const CHALLENGE_REQUEST: &[u8] = b"\xFF\xFF\xFF\xFFchallenge rcon\n\x00";

/// Prefix of the server's answer to [CHALLENGE_REQUEST]; the token follows.
pub const CHALLENGE_REPLY_HEADER: &[u8] = b"\xFF\xFF\xFF\xFFchallenge rcon ";

/// Largest challenge reply we are willing to read. Tokens are not fixed width.
pub const CHALLENGE_REPLY_MAX_SIZE: usize = 64;

pub const TERMINATOR: u8 = 0x0A;
pub const SEPARATOR: u8 = 0x20;

/// Prefix of every "print" reply (`'l'`).
pub const PRINT_HEADER: &[u8] = b"\xFF\xFF\xFF\xFFl";

pub const ACK_REPLY: &[u8] = b"\xFF\xFF\xFF\xFFl\x00\x00";
pub const INVALID_PASSWORD_REPLY: &[u8] = b"\xFF\xFF\xFF\xFFlBad rcon_password.\n\x00\x00";
pub const MISSING_CHALLENGE_REPLY: &[u8] = b"\xFF\xFF\xFF\xFF9";

/// A single rcon command datagram. Borrowing everything keeps packing the only
/// allocation.
pub struct CommandPacket<'a> {
    challenge: Option<&'a [u8]>,
    secret: &'a str,
    command: &'a str,
}

impl<'a> CommandPacket<'a> {
    /// `challenge` must be `None` unless the session runs in challenge mode.
    pub fn new(challenge: Option<&'a [u8]>, secret: &'a str, command: &'a str) -> Self {
        CommandPacket {
            challenge,
            secret,
            command,
        }
    }

    pub fn size(&self) -> usize {
        let challenge = self.challenge.map_or(0, |token| token.len() + 1);
        COMMAND_HEADER.len() + challenge + self.secret.len() + 1 + self.command.len() + 2
    }

    pub fn pack(&self) -> Vec<u8> {
        // Header, [Challenge, Separator], Secret, Separator, Command, Terminator
        let mut payload = Vec::<u8>::with_capacity(self.size());
        payload.extend_from_slice(COMMAND_HEADER);
        if let Some(token) = self.challenge {
            payload.extend_from_slice(token);
            payload.push(SEPARATOR);
        }
        payload.extend_from_slice(self.secret.as_bytes());
        payload.push(SEPARATOR);
        payload.extend_from_slice(self.command.as_bytes());
        payload.extend_from_slice(&[0u8, 0u8]);
        payload
    }
}

/// Pull the token out of a challenge reply: everything between the header and
/// the first terminator.
pub fn parse_challenge(reply: &[u8]) -> Result<&[u8], RconError> {
    let rest = reply
        .strip_prefix(CHALLENGE_REPLY_HEADER)
        .ok_or(RconError::InvalidChallengeResponse)?;
    let end = rest
        .iter()
        .position(|&b| b == TERMINATOR)
        .ok_or(RconError::InvalidChallengeResponse)?;

    match &rest[..end] {
        [] => Err(RconError::InvalidChallengeResponse),
        token => Ok(token),
    }
}

/// What the server meant by a command reply, decided by prefix alone.
#[derive(Debug, PartialEq, Eq)]
pub enum Reply<'a> {
    InvalidPassword,
    MissingChallenge,
    Ack,
    /// Console output, up to (not including) the first NUL.
    Print(&'a [u8]),
    Other(&'a [u8]),
}

impl<'a> Reply<'a> {
    pub fn classify(reply: &'a [u8]) -> Self {
        if reply.starts_with(INVALID_PASSWORD_REPLY) {
            Reply::InvalidPassword
        } else if reply.starts_with(MISSING_CHALLENGE_REPLY) {
            Reply::MissingChallenge
        } else if reply.starts_with(ACK_REPLY) {
            Reply::Ack
        } else if let Some(body) = reply.strip_prefix(PRINT_HEADER) {
            let end = body.iter().position(|&b| b == 0).unwrap_or(body.len());
            Reply::Print(&body[..end])
        } else {
            Reply::Other(reply)
        }
    }

    /// Printed console text, if this is a print reply with a UTF-8 body.
    pub fn text(&self) -> Option<&'a str> {
        match self {
            Reply::Print(body) => std::str::from_utf8(body).ok(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_match_the_wire_layout() {
        assert_eq!(
            INVALID_PASSWORD_REPLY,
            &[
                0xFF, 0xFF, 0xFF, 0xFF, 0x6C, 0x42, 0x61, 0x64, 0x20, 0x72, 0x63, 0x6F, 0x6E, 0x5F,
                0x70, 0x61, 0x73, 0x73, 0x77, 0x6F, 0x72, 0x64, 0x2E, 0x0A, 0x00, 0x00
            ]
        );
        assert_eq!(ACK_REPLY, &[0xFF, 0xFF, 0xFF, 0xFF, 0x6C, 0x00, 0x00]);
        assert_eq!(MISSING_CHALLENGE_REPLY, &[0xFF, 0xFF, 0xFF, 0xFF, 0x39]);
        assert_eq!(CHALLENGE_REQUEST.len(), 20);
        assert_eq!(CHALLENGE_REPLY_HEADER.len(), 19);
        assert!(CHALLENGE_REQUEST.starts_with(&MARKER));
    }

    #[test]
    fn pack_without_challenge() {
        let packet = CommandPacket::new(None, "p455w0rd", "stats");
        let packed = packet.pack();

        assert_eq!(packed, b"\xFF\xFF\xFF\xFFrcon p455w0rd stats\x00\x00");
        assert_eq!(packed.len(), packet.size());
    }

    #[test]
    fn pack_with_challenge() {
        let packet = CommandPacket::new(Some(b"1234567890".as_slice()), "p455w0rd", "stats");
        let packed = packet.pack();

        let mut expected = COMMAND_HEADER.to_vec();
        expected.extend_from_slice(b"1234567890");
        expected.push(0x20);
        expected.extend_from_slice(b"p455w0rd");
        expected.push(0x20);
        expected.extend_from_slice(b"stats");
        expected.extend_from_slice(&[0, 0]);

        assert_eq!(packed, expected);
        assert_eq!(packed.len(), packet.size());
        assert_eq!(packed.capacity(), packet.size());
    }

    #[test]
    fn pack_without_challenge_never_adds_a_separator() {
        for (secret, command) in [("", ""), ("a", "b c"), ("pass word", "say  hi ")] {
            let packed = CommandPacket::new(None, secret, command).pack();
            let spaces = |s: &str| s.bytes().filter(|&b| b == SEPARATOR).count();

            // one after "rcon", one after the secret, plus whatever the caller wrote
            let total = packed.iter().filter(|&&b| b == SEPARATOR).count();
            assert_eq!(total, 2 + spaces(secret) + spaces(command));
        }
    }

    #[test]
    fn command_text_is_not_escaped() {
        let packed = CommandPacket::new(None, "pw", "say \"hi\"\n").pack();
        assert!(packed.ends_with(b"say \"hi\"\n\x00\x00"));
    }

    #[test]
    fn parse_challenge_stops_at_terminator() {
        let reply = b"\xFF\xFF\xFF\xFFchallenge rcon 3741520813\n\x00garbage";
        assert_eq!(parse_challenge(reply).unwrap(), b"3741520813");

        // no fixed token width
        let reply = b"\xFF\xFF\xFF\xFFchallenge rcon 42\n\x00";
        assert_eq!(parse_challenge(reply).unwrap(), b"42");
    }

    #[test]
    fn parse_challenge_rejects_malformed_replies() {
        let cases: [&[u8]; 4] = [
            b"\xFF\xFF\xFF\xFFchallenge rcon",
            b"\xFF\xFF\xFF\xFFchallenge rcon 1234",
            b"\xFF\xFF\xFF\xFFchallenge rcon \n",
            MISSING_CHALLENGE_REPLY,
        ];

        for reply in cases {
            assert!(matches!(
                parse_challenge(reply),
                Err(RconError::InvalidChallengeResponse)
            ));
        }
    }

    #[test]
    fn classify_follows_precedence() {
        assert_eq!(Reply::classify(INVALID_PASSWORD_REPLY), Reply::InvalidPassword);
        assert_eq!(Reply::classify(b"\xFF\xFF\xFF\xFF9\n"), Reply::MissingChallenge);
        assert_eq!(Reply::classify(ACK_REPLY), Reply::Ack);
        assert_eq!(Reply::classify(b"hello"), Reply::Other(b"hello"));
        assert_eq!(Reply::classify(b""), Reply::Other(b""));
    }

    #[test]
    fn print_reply_text() {
        let reply = Reply::classify(b"\xFF\xFF\xFF\xFFlmap: crossfire\n\x00\x00");
        assert_eq!(reply, Reply::Print(b"map: crossfire\n"));
        assert_eq!(reply.text(), Some("map: crossfire\n"));
        assert_eq!(Reply::Ack.text(), None);
    }
}
