use std::sync::Mutex;

use async_trait::async_trait;

use crate::iface::Iface;
use crate::link::{Result, Transmit};
use crate::packet::Frame;

/// A link layer that remembers every frame instead of sending it.
#[derive(Default)]
pub struct Recorder {
    sent: Mutex<Vec<(String, Vec<u8>)>>,
}

impl Recorder {
    /// Frames sent so far, decoded, tagged with their egress interface.
    pub fn sent(&self) -> Vec<(String, Frame)> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(iface, bytes)| (iface.clone(), Frame::decode(bytes).unwrap()))
            .collect()
    }

    /// Frames sent so far, exactly as they went out.
    pub fn sent_bytes(&self) -> Vec<(String, Vec<u8>)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_ifaces(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(iface, _)| iface.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

#[async_trait]
impl Transmit for Recorder {
    async fn send_frame(&self, iface: &Iface, frame: &[u8]) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((iface.name.clone(), frame.to_vec()));
        Ok(())
    }
}
