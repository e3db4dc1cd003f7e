//! Card sources: where the engine learns which cards exist.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use recall_core::model::{DiscoveredCard, MediaRef};
use tracing::{debug, info, warn};

use crate::error::SourceError;

/// Supplies the current set of cards on demand.
///
/// Implementations may be slow (disk scans); callers run them off the control thread.
pub trait CardSource: Send + Sync {
    /// Report every card currently available.
    ///
    /// # Errors
    ///
    /// Returns `SourceError` if the source cannot be read at all.
    fn discover(&self) -> Result<Vec<DiscoveredCard>, SourceError>;
}

/// A fixed list of cards, for tests and prototyping.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    cards: Vec<DiscoveredCard>,
}

impl StaticSource {
    #[must_use]
    pub fn new(cards: Vec<DiscoveredCard>) -> Self {
        Self { cards }
    }
}

impl CardSource for StaticSource {
    fn discover(&self) -> Result<Vec<DiscoveredCard>, SourceError> {
        Ok(self.cards.clone())
    }
}

//
// ─── AUDIO DIRECTORY ───────────────────────────────────────────────────────────
//

/// Pairs question/answer recordings in one flat directory.
///
/// Naming convention: `<id>_A_<word>.<ext>` is the question, the first
/// `<id>_B_*` file is the answer. Without an answer file the card points at
/// `<id>_B_Eng.<ext>`, which the player reports as missing when played.
#[derive(Debug, Clone)]
pub struct AudioDirectorySource {
    dir: PathBuf,
    extension: String,
}

impl AudioDirectorySource {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            extension: "mp3".into(),
        }
    }

    #[must_use]
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into().trim_start_matches('.').to_owned();
        self
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn media(&self, file_name: &str) -> MediaRef {
        MediaRef::new(self.dir.join(file_name).to_string_lossy().into_owned())
    }
}

impl CardSource for AudioDirectorySource {
    fn discover(&self) -> Result<Vec<DiscoveredCard>, SourceError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                warn!(dir = %self.dir.display(), "audio directory missing, no cards discovered");
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(SourceError::Unreadable {
                    path: self.dir.clone(),
                    source,
                });
            }
        };

        let mut names: Vec<String> = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        names.sort();

        let suffix = format!(".{}", self.extension);
        let mut seen = HashSet::new();
        let mut cards = Vec::new();
        for front in names
            .iter()
            .filter(|name| name.contains("_A_") && name.ends_with(&suffix))
        {
            let Some((id, _)) = front.split_once('_') else {
                continue;
            };
            if id.is_empty() || !seen.insert(id.to_owned()) {
                debug!(file = %front, "skipping front file with empty or duplicate id");
                continue;
            }

            let back_prefix = format!("{id}_B_");
            let back = names
                .iter()
                .find(|name| name.starts_with(&back_prefix))
                .cloned()
                .unwrap_or_else(|| format!("{id}_B_Eng{suffix}"));

            cards.push(DiscoveredCard {
                id: id.into(),
                front: self.media(front),
                back: self.media(&back),
            });
        }

        info!(dir = %self.dir.display(), cards = cards.len(), "scanned audio directory");
        Ok(cards)
    }
}

/// Human-readable word for a recording, taken from its file name.
///
/// `0001_A_Gato.mp3` → `Gato`, `0001_B_Eng_Cat.mp3` → `Cat`,
/// `0001_B_Eng.mp3` → `[English Audio]`, anything else → `Unknown`.
#[must_use]
pub fn display_label(media: &MediaRef) -> String {
    let stem = Path::new(media.as_str())
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let word = if let Some((_, rest)) = stem.split_once("_A_") {
        rest.replace('_', " ")
    } else if let Some((_, rest)) = stem.split_once("_B_") {
        let raw = rest.replace('_', " ");
        if raw.trim().eq_ignore_ascii_case("eng") {
            "[English Audio]".to_owned()
        } else {
            raw.replace("Eng", "")
        }
    } else {
        String::new()
    };

    let word = word.trim();
    if word.is_empty() {
        "Unknown".to_owned()
    } else {
        word.to_owned()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
