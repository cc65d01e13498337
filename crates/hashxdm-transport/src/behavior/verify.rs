use rand::{rngs::OsRng, RngCore};

use super::{Link, Stage, Wake};

/// 64 bits from the operating system's CSPRNG as 16 hex digits.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; 8];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Shared-secret handshake that filters frames from anyone but the
/// counterpart.
///
/// The initiator sends its secret once the wire is ready, the responder
/// answers `<initiator secret>.<responder secret>`, and the initiator
/// echoes the responder's secret back. Data frames are
/// `<sender secret>_<payload>`.
pub struct VerifyBehavior {
    initiate: bool,
    own_secret: String,
    their_secret: Option<String>,
    verified: bool,
}

impl VerifyBehavior {
    pub fn new(initiate: bool) -> Self {
        Self::with_secret(initiate, generate_secret())
    }

    pub fn with_secret(initiate: bool, secret: impl Into<String>) -> Self {
        Self {
            initiate,
            own_secret: secret.into(),
            their_secret: None,
            verified: false,
        }
    }

    pub fn is_verified(&self) -> bool {
        self.verified
    }

    fn verify(&mut self, link: &mut Link) {
        tracing::debug!(initiator = self.initiate, "counterpart verified");
        self.verified = true;
        link.ready();
    }

    fn handshake(&mut self, message: String, origin: String, link: &mut Link) {
        if self.initiate {
            match message.split_once('.') {
                Some((own, theirs)) if own == self.own_secret && !theirs.is_empty() => {
                    link.down(theirs);
                    self.their_secret = Some(theirs.to_string());
                    self.verify(link);
                }
                _ => tracing::trace!("initiator ignoring frame before verification"),
            }
            return;
        }

        if message == self.own_secret {
            self.verify(link);
            return;
        }
        if let Some(theirs) = &self.their_secret {
            let data = message
                .strip_prefix(theirs.as_str())
                .and_then(|rest| rest.strip_prefix('_'));
            if let Some(payload) = data {
                let payload = payload.to_string();
                self.verify(link);
                link.up(payload, origin);
                return;
            }
        }
        if is_secret(&message) {
            link.down(format!("{message}.{}", self.own_secret));
            self.their_secret = Some(message);
        } else {
            tracing::trace!("responder ignoring frame before verification");
        }
    }
}

impl Stage for VerifyBehavior {
    fn name(&self) -> &'static str {
        "verify"
    }

    fn outgoing(&mut self, message: String, wake: Option<Wake>, link: &mut Link) {
        if !self.verified {
            tracing::warn!("dropping outgoing frame before verification");
            return;
        }
        link.down_with(format!("{}_{message}", self.own_secret), wake);
    }

    fn incoming(&mut self, message: String, origin: String, link: &mut Link) {
        if !self.verified {
            self.handshake(message, origin, link);
            return;
        }
        let accepted = message
            .split_once('_')
            .filter(|(secret, _)| self.their_secret.as_deref() == Some(*secret));
        match accepted {
            Some((_, payload)) => link.up(payload, origin),
            None => tracing::warn!("dropping frame with unknown secret"),
        }
    }

    fn ready(&mut self, link: &mut Link) {
        if self.initiate && !self.verified {
            link.down(self.own_secret.as_str());
        }
    }

    fn wake(&mut self, _key: u64, _link: &mut Link) {}
}

fn is_secret(message: &str) -> bool {
    !message.is_empty() && message.chars().all(|ch| ch.is_ascii_alphanumeric())
}
