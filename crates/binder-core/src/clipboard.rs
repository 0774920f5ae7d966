//! Access to the shared system clipboard.
//!
//! The clipboard is process-external global state. Paste-mode triggers
//! overwrite it without coordinating with any other writer.

use crate::error::{BinderError, Result};
use arboard::Clipboard;
use std::io::Write;
use std::process::{Command, Stdio};
use tracing::{debug, warn};

pub trait ClipboardBackend {
    fn set_text(&mut self, text: &str) -> Result<()>;

    fn name(&self) -> &'static str;
}

/// Clipboard backed by arboard. The handle is kept alive because some
/// platforms drop clipboard ownership when it goes away.
pub struct SystemClipboard {
    clipboard: Clipboard,
}

impl SystemClipboard {
    pub fn new() -> Result<Self> {
        let clipboard = Clipboard::new().map_err(|e| BinderError::Clipboard(e.to_string()))?;
        Ok(Self { clipboard })
    }
}

impl ClipboardBackend for SystemClipboard {
    fn set_text(&mut self, text: &str) -> Result<()> {
        self.clipboard
            .set_text(text)
            .map_err(|e| BinderError::Clipboard(e.to_string()))
    }

    fn name(&self) -> &'static str {
        "arboard"
    }
}

/// Clipboard written through the operating system's own copy command.
pub struct CommandClipboard {
    program: &'static str,
    args: &'static [&'static str],
}

impl CommandClipboard {
    /// Candidate commands for this platform, most preferred first.
    pub fn candidates() -> Vec<CommandClipboard> {
        #[cfg(target_os = "macos")]
        let list: &[(&str, &[&str])] = &[("pbcopy", &[])];
        #[cfg(target_os = "windows")]
        let list: &[(&str, &[&str])] = &[("clip", &[])];
        #[cfg(not(any(target_os = "macos", target_os = "windows")))]
        let list: &[(&str, &[&str])] = &[
            ("wl-copy", &[]),
            ("xclip", &["-selection", "clipboard"]),
            ("xsel", &["--clipboard", "--input"]),
        ];

        list.iter()
            .map(|(program, args)| CommandClipboard { program, args })
            .collect()
    }
}

impl ClipboardBackend for CommandClipboard {
    fn set_text(&mut self, text: &str) -> Result<()> {
        let mut child = Command::new(self.program)
            .args(self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| BinderError::Clipboard(format!("{}: {}", self.program, e)))?;

        if let Some(stdin) = child.stdin.as_mut() {
            stdin.write_all(text.as_bytes())?;
        }
        // Close stdin so the command sees end of input.
        drop(child.stdin.take());

        let status = child.wait()?;
        if status.success() {
            Ok(())
        } else {
            Err(BinderError::Clipboard(format!(
                "{} exited with {:?}",
                self.program,
                status.code()
            )))
        }
    }

    fn name(&self) -> &'static str {
        self.program
    }
}

/// Tries arboard first, then each OS copy command in turn.
pub struct ClipboardChain {
    backends: Vec<Box<dyn ClipboardBackend>>,
}

impl ClipboardChain {
    pub fn new(backends: Vec<Box<dyn ClipboardBackend>>) -> Self {
        Self { backends }
    }

    pub fn system() -> Self {
        let mut backends: Vec<Box<dyn ClipboardBackend>> = Vec::new();
        match SystemClipboard::new() {
            Ok(clipboard) => backends.push(Box::new(clipboard)),
            Err(e) => warn!(error = %e, "arboard clipboard unavailable, using OS commands"),
        }
        for candidate in CommandClipboard::candidates() {
            backends.push(Box::new(candidate));
        }
        Self { backends }
    }
}

impl ClipboardBackend for ClipboardChain {
    fn set_text(&mut self, text: &str) -> Result<()> {
        let mut last_error = None;
        for backend in self.backends.iter_mut() {
            match backend.set_text(text) {
                Ok(()) => {
                    debug!(backend = backend.name(), "Clipboard updated");
                    return Ok(());
                }
                Err(e) => {
                    debug!(backend = backend.name(), error = %e, "Clipboard backend failed");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| {
            BinderError::BackendUnavailable("no clipboard backend".to_string())
        }))
    }

    fn name(&self) -> &'static str {
        "chain"
    }
}

/// Set the clipboard content as text
pub fn set_clipboard_text(text: &str) -> Result<()> {
    ClipboardChain::system().set_text(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Recording {
        fail: bool,
        log: Arc<Mutex<Vec<String>>>,
        label: &'static str,
    }

    impl ClipboardBackend for Recording {
        fn set_text(&mut self, text: &str) -> Result<()> {
            self.log.lock().unwrap().push(format!("{}:{}", self.label, text));
            if self.fail {
                Err(BinderError::Clipboard("nope".to_string()))
            } else {
                Ok(())
            }
        }

        fn name(&self) -> &'static str {
            self.label
        }
    }

    #[test]
    fn chain_stops_at_first_working_backend() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut chain = ClipboardChain::new(vec![
            Box::new(Recording { fail: true, log: log.clone(), label: "a" }),
            Box::new(Recording { fail: false, log: log.clone(), label: "b" }),
            Box::new(Recording { fail: false, log: log.clone(), label: "c" }),
        ]);

        chain.set_text("hi").unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["a:hi", "b:hi"]);
    }

    #[test]
    fn empty_chain_is_backend_unavailable() {
        let mut chain = ClipboardChain::new(Vec::new());
        assert!(matches!(
            chain.set_text("x"),
            Err(BinderError::BackendUnavailable(_))
        ));
    }

    #[test]
    fn all_failing_reports_last_error() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut chain = ClipboardChain::new(vec![Box::new(Recording {
            fail: true,
            log,
            label: "a",
        })]);
        assert!(matches!(chain.set_text("x"), Err(BinderError::Clipboard(_))));
    }
}
