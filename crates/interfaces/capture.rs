use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::InterfaceError;

/// A single captured frame. Pixel data is kept opaque; only dimensions are
/// exposed since nothing in this runtime inspects raw bytes directly, it
/// only ever hands the frame to `Cv`.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Raw pixel bytes, format defined by the concrete capture backend.
    pub data: Vec<u8>,
}

impl Frame {
    /// Creates a frame from raw dimensions and bytes.
    #[must_use]
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self { width, height, data }
    }
}

/// The screen-capture channel: grabs a frame from the device for `Cv` to
/// match against. Kept separate from `Adb` so a capture backend (e.g.
/// `scrcpy`, a virtual display) can be swapped independently of input.
#[async_trait]
pub trait Capture: Send + Sync {
    /// Captures the current frame.
    async fn grab_frame(&self) -> Result<Frame, InterfaceError>;
}

/// In-memory `Capture` fake returning a fixed frame, or a configured error.
pub struct FakeCapture {
    frame: Mutex<Frame>,
    grab_count: Mutex<usize>,
}

impl FakeCapture {
    /// Creates a fake that always returns a blank frame of the given size.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            frame: Mutex::new(Frame::new(width, height, vec![0; (width * height) as usize])),
            grab_count: Mutex::new(0),
        }
    }

    /// Replaces the frame returned by subsequent `grab_frame` calls.
    pub fn set_frame(&self, frame: Frame) {
        *self.frame.lock() = frame;
    }

    /// Number of times `grab_frame` has been called.
    #[must_use]
    pub fn grab_count(&self) -> usize {
        *self.grab_count.lock()
    }
}

#[async_trait]
impl Capture for FakeCapture {
    async fn grab_frame(&self) -> Result<Frame, InterfaceError> {
        *self.grab_count.lock() += 1;
        Ok(self.frame.lock().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn grab_frame_counts_calls_and_returns_configured_frame() {
        let capture = FakeCapture::new(1080, 1920);
        capture.set_frame(Frame::new(2, 2, vec![1, 2, 3, 4]));
        let frame = capture.grab_frame().await.unwrap();
        assert_eq!(frame.data, vec![1, 2, 3, 4]);
        assert_eq!(capture.grab_count(), 1);
    }
}
