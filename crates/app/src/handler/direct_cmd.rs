//! Single-shot handler for a direct command sent to one device.

use std::fmt;

use linkhub_domain::address::Address;
use linkhub_domain::error::{CommandError, ContractViolation};
use linkhub_domain::message::{InboundMessage, Message, MessageKind};

use crate::completion::Completion;
use crate::ports::{Disposition, Link, ReplyHandler};

type OnAck = Box<dyn FnOnce(&InboundMessage) -> String + Send>;

/// Waits for the direct ACK or NAK of `addr`.
///
/// The ACK callback applies the confirmed change (new level, database
/// record) and returns the completion message.
pub struct DirectCmd {
    addr: Address,
    expect_cmd1: Option<u8>,
    on_ack: Option<OnAck>,
    on_done: Option<Completion>,
}

impl DirectCmd {
    #[must_use]
    pub fn new(addr: Address, on_done: Completion) -> Self {
        Self {
            addr,
            expect_cmd1: None,
            on_ack: None,
            on_done: Some(on_done),
        }
    }

    /// Only accept ACKs echoing `cmd1`.
    #[must_use]
    pub fn expect_cmd1(mut self, cmd1: u8) -> Self {
        self.expect_cmd1 = Some(cmd1);
        self
    }

    #[must_use]
    pub fn on_ack<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&InboundMessage) -> String + Send + 'static,
    {
        self.on_ack = Some(Box::new(f));
        self
    }

    fn complete(&mut self, result: Result<String, CommandError>) {
        if let Some(on_done) = self.on_done.take() {
            on_done.complete(result);
        }
    }
}

impl ReplyHandler for DirectCmd {
    fn on_message(
        &mut self,
        msg: &Message,
        _link: &dyn Link,
    ) -> Result<Disposition, ContractViolation> {
        let Message::Inbound(reply) = msg else {
            return Ok(Disposition::NotMine);
        };
        if self.on_done.is_none() || reply.from != self.addr || !reply.is_direct_reply() {
            return Ok(Disposition::NotMine);
        }

        if reply.kind == MessageKind::DirectNak {
            tracing::error!(addr = %self.addr, cmd2 = reply.cmd2, "device NAK");
            self.complete(Err(CommandError::Nak(format!(
                "Device {} rejected command {:#04x}",
                self.addr, reply.cmd1
            ))));
            return Ok(Disposition::Finished);
        }

        if self.expect_cmd1.is_some_and(|cmd1| cmd1 != reply.cmd1) {
            return Ok(Disposition::NotMine);
        }

        let message = match self.on_ack.take() {
            Some(on_ack) => on_ack(reply),
            None => format!("Device {} acknowledged command", self.addr),
        };
        self.complete(Ok(message));
        Ok(Disposition::Finished)
    }

    fn on_failure(&mut self, error: CommandError) {
        if self.on_done.is_some() {
            tracing::warn!(addr = %self.addr, %error, "direct command failed");
        }
        self.complete(Err(error));
    }
}

impl fmt::Debug for DirectCmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectCmd")
            .field("addr", &self.addr)
            .field("expect_cmd1", &self.expect_cmd1)
            .field("done", &self.on_done.is_none())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MODEM, RecordingLink};
    use std::sync::{Arc, Mutex};

    fn device() -> Address {
        Address::new(0x12, 0x34, 0x56)
    }

    fn reply(from: Address, kind: MessageKind, cmd1: u8, cmd2: u8) -> Message {
        Message::Inbound(InboundMessage {
            from,
            to: MODEM,
            kind,
            cmd1,
            cmd2,
        })
    }

    #[test]
    fn should_run_ack_callback_and_complete_with_its_message() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let mut handler = DirectCmd::new(device(), Completion::new(move |r| s.lock().unwrap().push(r)))
            .expect_cmd1(0x11)
            .on_ack(|msg| format!("level {}", msg.cmd2));

        let disposition = handler
            .on_message(&reply(device(), MessageKind::DirectAck, 0x11, 0x80), &RecordingLink::default())
            .unwrap();

        assert_eq!(disposition, Disposition::Finished);
        assert_eq!(*seen.lock().unwrap(), vec![Ok("level 128".to_string())]);
    }

    #[test]
    fn should_ignore_replies_from_other_devices() {
        let mut handler = DirectCmd::new(device(), Completion::none());
        let other = Address::new(0xaa, 0xaa, 0xaa);

        let disposition = handler
            .on_message(&reply(other, MessageKind::DirectAck, 0x11, 0), &RecordingLink::default())
            .unwrap();

        assert_eq!(disposition, Disposition::NotMine);
    }

    #[test]
    fn should_ignore_broadcasts_from_the_device() {
        let mut handler = DirectCmd::new(device(), Completion::none());

        let disposition = handler
            .on_message(&reply(device(), MessageKind::AllLinkBroadcast, 0x11, 0), &RecordingLink::default())
            .unwrap();

        assert_eq!(disposition, Disposition::NotMine);
    }

    #[test]
    fn should_fail_on_nak() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let mut handler = DirectCmd::new(device(), Completion::new(move |r| s.lock().unwrap().push(r)))
            .on_ack(|_| panic!("must not run on NAK"));

        handler
            .on_message(&reply(device(), MessageKind::DirectNak, 0x11, 0xfd), &RecordingLink::default())
            .unwrap();

        assert!(matches!(seen.lock().unwrap()[0], Err(CommandError::Nak(_))));
    }

    #[test]
    fn should_complete_once_when_timeout_follows_ack() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let mut handler = DirectCmd::new(device(), Completion::new(move |r| s.lock().unwrap().push(r)));

        handler
            .on_message(&reply(device(), MessageKind::DirectAck, 0x13, 0), &RecordingLink::default())
            .unwrap();
        handler.on_failure(CommandError::Timeout("late".to_string()));

        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
