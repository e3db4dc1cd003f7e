use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::Mutex;

use recall_core::model::MediaRef;
use services::Player;
use tracing::{debug, warn};

/// Plays media by spawning an external program (`mpv`, `afplay`, ...) per request.
#[derive(Debug)]
pub struct CommandPlayer {
    program: String,
    args: Vec<String>,
    child: Mutex<Option<Child>>,
}

impl CommandPlayer {
    /// `command` is split on whitespace; the media path is appended last.
    #[must_use]
    pub fn new(command: &str) -> Option<Self> {
        let mut parts = command.split_whitespace().map(str::to_owned);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
            child: Mutex::new(None),
        })
    }

    fn kill_current(slot: &mut Option<Child>) {
        if let Some(mut child) = slot.take() {
            // Already exited is fine.
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl Player for CommandPlayer {
    fn play(&self, media: &MediaRef) {
        let Ok(mut slot) = self.child.lock() else {
            return;
        };
        Self::kill_current(&mut slot);

        if !Path::new(media.as_str()).exists() {
            warn!(media = %media, "audio file missing");
            return;
        }

        match Command::new(&self.program)
            .args(&self.args)
            .arg(media.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => {
                debug!(media = %media, pid = child.id(), "playback started");
                *slot = Some(child);
            }
            Err(err) => warn!(program = %self.program, error = %err, "cannot start player"),
        }
    }

    fn stop(&self) {
        if let Ok(mut slot) = self.child.lock() {
            Self::kill_current(&mut slot);
        }
    }
}

impl Drop for CommandPlayer {
    fn drop(&mut self) {
        if let Ok(slot) = self.child.get_mut() {
            Self::kill_current(slot);
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
