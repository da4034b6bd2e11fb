//! Frame store display sink
//!
//! Stands in for the monitor UI: keeps the latest frame overlay (source,
//! capture time, uuid), counts what came in, and optionally persists raw
//! frame bytes to a directory.

use std::fs;
use std::io;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::engine::dispatcher::{DisplaySink, ImageFrame};
use crate::protocol::ErrorInfo;

/// Overlay metadata of the most recent frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Overlay {
    /// Envelope UUID of the frame
    pub uuid: Uuid,
    /// Source device identifier
    pub source: String,
    /// Capture time, when the frame id carried one
    pub captured_at: Option<DateTime<Utc>>,
}

/// Display sink that records frames and optionally saves them to disk.
#[derive(Debug, Default)]
pub struct FrameStore {
    save_dir: Option<PathBuf>,
    overlay: Option<Overlay>,
    frames: u64,
    errors: u64,
}

impl FrameStore {
    /// Create a store that only keeps metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store persisting raw frames into `dir`.
    pub fn with_save_dir(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            save_dir: Some(dir),
            ..Self::default()
        })
    }

    /// Overlay of the most recent frame, if any arrived yet.
    pub fn overlay(&self) -> Option<&Overlay> {
        self.overlay.as_ref()
    }

    /// Number of image frames seen.
    pub fn frames_seen(&self) -> u64 {
        self.frames
    }

    /// Number of server errors seen.
    pub fn errors_seen(&self) -> u64 {
        self.errors
    }

    fn persist(&self, frame: &ImageFrame) {
        let Some(dir) = &self.save_dir else {
            return;
        };
        let ext = frame
            .mime
            .rsplit_once('/')
            .map(|(_, sub)| sub)
            .unwrap_or("bin");
        let path = dir.join(format!("{}.{ext}", frame.uuid));
        if let Err(err) = fs::write(&path, &frame.raw) {
            tracing::warn!(path = %path.display(), error = %err, "failed to persist frame");
        }
    }
}

impl DisplaySink for FrameStore {
    fn show_image(&mut self, frame: ImageFrame) {
        self.persist(&frame);
        self.frames += 1;
        self.overlay = Some(Overlay {
            uuid: frame.uuid,
            source: frame.source,
            captured_at: frame.captured_at,
        });
    }

    fn show_error(&mut self, uuid: Uuid, error: &ErrorInfo) {
        self.errors += 1;
        tracing::warn!(%uuid, code = ?error.code, description = %error.description, "displaying server error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(mime: &str) -> ImageFrame {
        ImageFrame {
            uuid: Uuid::now_v7(),
            source: "cam0".into(),
            mime: mime.into(),
            captured_at: None,
            raw: vec![1, 2, 3],
        }
    }

    #[test]
    fn records_overlay_and_counts() {
        let mut store = FrameStore::new();
        let f = frame("image/png");
        let uuid = f.uuid;
        store.show_image(f);
        assert_eq!(store.frames_seen(), 1);
        let overlay = store.overlay().unwrap();
        assert_eq!(overlay.uuid, uuid);
        assert_eq!(overlay.source, "cam0");
    }

    #[test]
    fn persists_frames_with_mime_extension() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FrameStore::with_save_dir(dir.path()).unwrap();
        let f = frame("image/png");
        let expected = dir.path().join(format!("{}.png", f.uuid));
        store.show_image(f);
        assert_eq!(fs::read(expected).unwrap(), vec![1, 2, 3]);
    }
}
