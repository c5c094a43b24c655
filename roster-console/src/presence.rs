//! Terminal rendering of the "also editing" notice.

use std::io::Write;
use std::sync::Mutex;

use roster_collab::NotificationSurface;

/// Prints the notice when it changes and a line when it goes away.
#[derive(Default)]
pub struct TerminalNotice {
    current: Mutex<Option<String>>,
}

impl TerminalNotice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notice currently on screen.
    pub fn current(&self) -> Option<String> {
        self.current.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn print(line: &str) {
        let mut stdout = std::io::stdout().lock();
        // A closed stdout is not worth failing the session over.
        let _ = writeln!(stdout, "{line}");
    }
}

impl NotificationSurface for TerminalNotice {
    fn show(&self, message: &str) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if current.as_deref() == Some(message) {
            return;
        }
        *current = Some(message.to_string());
        Self::print(&format!("[notice] {message}"));
    }

    fn hide(&self) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if current.take().is_some() {
            Self::print("[notice] cleared");
        }
    }
}
