use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::InterfaceError;
use crate::geometry::Point;

/// The device-input channel: click/swipe/key/input at integer coordinates,
/// plus app lifecycle control. The concrete transport (a real `adb`
/// connection to an emulator) is out of scope; this trait is the seam every
/// `Action` primitive executes through.
#[async_trait]
pub trait Adb: Send + Sync {
    /// Taps the screen at the given point.
    async fn click(&self, x: i32, y: i32) -> Result<(), InterfaceError>;
    /// Drags from one point to another over `duration_ms`.
    async fn swipe(
        &self,
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        duration_ms: u64,
    ) -> Result<(), InterfaceError>;
    /// Sends a named key event (e.g. `"KEYCODE_BACK"`).
    async fn send_key(&self, key: &str) -> Result<(), InterfaceError>;
    /// Types literal text into the focused field.
    async fn input(&self, text: &str) -> Result<(), InterfaceError>;
    /// Launches an app by package and activity name.
    async fn start_app(&self, package: &str, activity: &str) -> Result<(), InterfaceError>;
    /// Force-stops an app by package name.
    async fn force_stop(&self, package: &str) -> Result<(), InterfaceError>;
    /// Runs a raw shell command, returning its stdout.
    async fn shell(&self, command: &str) -> Result<String, InterfaceError>;
    /// Returns the device's screen bounds in pixels.
    async fn screen_bounds(&self) -> Result<(i32, i32), InterfaceError>;
}

/// One recorded call made through [`FakeAdb`], for test assertions.
#[derive(Debug, Clone, PartialEq)]
pub enum AdbCall {
    /// A `click` call.
    Click(Point),
    /// A `swipe` call.
    Swipe { from: Point, to: Point, duration_ms: u64 },
    /// A `send_key` call.
    SendKey(String),
    /// An `input` call.
    Input(String),
    /// A `start_app` call.
    StartApp { package: String, activity: String },
    /// A `force_stop` call.
    ForceStop(String),
    /// A `shell` call.
    Shell(String),
}

/// In-memory `Adb` fake that records every call it receives and always
/// succeeds, for use by every other crate's test suite.
#[derive(Default)]
pub struct FakeAdb {
    calls: Mutex<Vec<AdbCall>>,
    screen_bounds: Mutex<(i32, i32)>,
}

impl FakeAdb {
    /// Creates a fake with a default 1080x1920 screen.
    #[must_use]
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            screen_bounds: Mutex::new((1080, 1920)),
        }
    }

    /// Returns every call recorded so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<AdbCall> {
        self.calls.lock().clone()
    }

    /// Counts how many `Click` calls landed at the given point.
    #[must_use]
    pub fn click_count(&self, x: i32, y: i32) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| matches!(call, AdbCall::Click(p) if *p == Point::new(x, y)))
            .count()
    }
}

#[async_trait]
impl Adb for FakeAdb {
    async fn click(&self, x: i32, y: i32) -> Result<(), InterfaceError> {
        self.calls.lock().push(AdbCall::Click(Point::new(x, y)));
        Ok(())
    }

    async fn swipe(
        &self,
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        duration_ms: u64,
    ) -> Result<(), InterfaceError> {
        self.calls.lock().push(AdbCall::Swipe {
            from: Point::new(x1, y1),
            to: Point::new(x2, y2),
            duration_ms,
        });
        Ok(())
    }

    async fn send_key(&self, key: &str) -> Result<(), InterfaceError> {
        self.calls.lock().push(AdbCall::SendKey(key.to_string()));
        Ok(())
    }

    async fn input(&self, text: &str) -> Result<(), InterfaceError> {
        self.calls.lock().push(AdbCall::Input(text.to_string()));
        Ok(())
    }

    async fn start_app(&self, package: &str, activity: &str) -> Result<(), InterfaceError> {
        self.calls.lock().push(AdbCall::StartApp {
            package: package.to_string(),
            activity: activity.to_string(),
        });
        Ok(())
    }

    async fn force_stop(&self, package: &str) -> Result<(), InterfaceError> {
        self.calls.lock().push(AdbCall::ForceStop(package.to_string()));
        Ok(())
    }

    async fn shell(&self, command: &str) -> Result<String, InterfaceError> {
        self.calls.lock().push(AdbCall::Shell(command.to_string()));
        Ok(String::new())
    }

    async fn screen_bounds(&self) -> Result<(i32, i32), InterfaceError> {
        Ok(*self.screen_bounds.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_records_calls_in_order() {
        let adb = FakeAdb::new();
        adb.click(100, 200).await.unwrap();
        adb.send_key("KEYCODE_BACK").await.unwrap();
        assert_eq!(adb.click_count(100, 200), 1);
        assert_eq!(adb.calls().len(), 2);
    }
}
