/// One device read's worth of raw sample bytes.
///
/// The buffer is exactly the size the read returned — a device may deliver
/// fewer bytes than the negotiated buffer capacity. Frames are immutable
/// after construction; the capture loop shares them by `Arc` between the
/// notifier and the segment sink or encode queue, so a frame can never be
/// mutated after handoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    data: Vec<u8>,
}

impl AudioFrame {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            data: bytes.to_vec(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl From<Vec<u8>> for AudioFrame {
    fn from(data: Vec<u8>) -> Self {
        Self { data }
    }
}
