use crate::socket::MessageSink;
use anyhow::{bail, Result};
use async_trait::async_trait;
use common::envelope::MessageEnvelope;

/// Transport sink that records delivered envelopes instead of writing to a
/// socket. Flip `open` to simulate a dead connection.
#[derive(Debug, Default)]
pub struct MockSink {
    pub open: bool,
    pub sent: Vec<MessageEnvelope>,
}

impl MockSink {
    pub fn new() -> Self {
        Self {
            open: true,
            sent: Vec::new(),
        }
    }
}

#[async_trait]
impl MessageSink for MockSink {
    async fn send_envelope(&mut self, envelope: &MessageEnvelope) -> Result<()> {
        if !self.open {
            bail!("sink closed");
        }
        self.sent.push(envelope.clone());
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}
