//! JPEG persistence of captured frames.
//!
//! Layout: `<root>/camera_<safe id>/camera_<safe id>_<YYYYMMDD_HHMMSS_mmm>[_mocked]_<label>.jpg`.
//! Files are written to a temporary name in the same directory and then
//! linked into place without clobbering, so a reader never sees a partial
//! JPEG and two frames never overwrite each other.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDateTime};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

use crate::traits::{CameraId, Result};

/// JPEG quality used for every frame.
pub const JPEG_QUALITY: u8 = 95;

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S_%3f";
const MOCK_MARKER: &str = "mocked";

/// One saved frame. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRecord {
    /// Camera the frame came from.
    pub session_id: CameraId,
    /// Position of the frame within its session, starting at 0.
    pub sequence: u64,
    /// Wall-clock capture time.
    pub captured_at: DateTime<Local>,
    /// Whether the frame was synthesized.
    pub is_mock: bool,
    /// Where the JPEG was written.
    pub path: PathBuf,
}

/// The information encoded in a frame's file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameName {
    /// Camera, as recovered from its safe name.
    pub camera: CameraId,
    /// Capture time, millisecond precision.
    pub captured_at: NaiveDateTime,
    /// Whether the frame was synthesized.
    pub mock: bool,
    /// Free-form label.
    pub label: String,
}

impl FrameName {
    /// Build the name for a frame captured at `captured_at`.
    #[must_use]
    pub fn new(camera: &CameraId, captured_at: &DateTime<Local>, mock: bool, label: &str) -> Self {
        Self {
            camera: camera.clone(),
            captured_at: captured_at.naive_local(),
            mock,
            label: label.to_owned(),
        }
    }

    /// Render the file name.
    #[must_use]
    pub fn file_name(&self) -> String {
        let stamp = self.captured_at.format(TIMESTAMP_FORMAT);
        let marker = if self.mock { "_mocked" } else { "" };
        format!(
            "camera_{}_{stamp}{marker}_{}.jpg",
            self.camera.file_name_id(),
            self.label
        )
    }

    /// Recover a name from a file name produced by [`FrameName::file_name`].
    ///
    /// Camera ids that contain reserved characters (paths, colons) come back
    /// as their [`CameraId::safe_name`].
    #[must_use]
    pub fn parse(file_name: &str) -> Option<Self> {
        let stem = file_name.strip_prefix("camera_")?.strip_suffix(".jpg")?;
        let parts: Vec<&str> = stem.split('_').collect();

        let split = (1..parts.len()).find(|&at| is_timestamp(parts.get(at..at + 3)))?;
        let camera = parts.get(..split)?.join("_");
        let stamp = parts.get(split..split + 3)?.join("_");
        let captured_at = NaiveDateTime::parse_from_str(&stamp, TIMESTAMP_FORMAT).ok()?;

        let (mock, label) = match parts.get(split + 3..)? {
            [] => return None,
            [MOCK_MARKER, label @ ..] if !label.is_empty() => (true, label.join("_")),
            label => (false, label.join("_")),
        };

        Some(Self {
            camera: CameraId::from(camera),
            captured_at,
            mock,
            label,
        })
    }
}

/// Why `label` cannot be used in frame file names, if it cannot.
///
/// A label must be a single, non-empty path component, and must not begin
/// with the mock marker token or a real frame would parse back as mocked.
#[must_use]
pub fn label_problem(label: &str) -> Option<&'static str> {
    if label.is_empty() {
        Some("label is empty")
    } else if label.contains(['/', '\\']) {
        Some("label contains a path separator")
    } else if label.chars().any(|c| c.is_control() || ":*?\"<>|".contains(c)) {
        Some("label contains a character not allowed in file names")
    } else if label
        .strip_prefix(MOCK_MARKER)
        .is_some_and(|rest| rest.starts_with('_'))
    {
        Some("label starts with the mock marker")
    } else {
        None
    }
}

fn is_timestamp(parts: Option<&[&str]>) -> bool {
    let digits = |s: &str, len: usize| s.len() == len && s.bytes().all(|b| b.is_ascii_digit());
    matches!(parts, Some([date, time, millis])
        if digits(date, 8) && digits(time, 6) && digits(millis, 3))
}

/// Writes one session's frames into its own directory.
#[derive(Debug, Clone)]
pub struct FrameWriter {
    dir: PathBuf,
    quality: u8,
}

impl FrameWriter {
    /// Writer for `camera` under `output_root`.
    #[must_use]
    pub fn new(output_root: &Path, camera: &CameraId) -> Self {
        Self {
            dir: output_root.join(format!("camera_{}", camera.safe_name())),
            quality: JPEG_QUALITY,
        }
    }

    /// Session directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the session directory if it does not exist yet.
    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    /// Encode `image` and store it under `name`.
    ///
    /// If the name is already taken (two frames in the same millisecond),
    /// `_<sequence>` is appended to the label.
    pub fn write(&self, image: &RgbImage, name: &FrameName, sequence: u64) -> Result<PathBuf> {
        self.ensure_dir()?;

        let mut encoded = Vec::new();
        JpegEncoder::new_with_quality(&mut encoded, self.quality).encode_image(image)?;

        let mut staged = tempfile::Builder::new()
            .prefix(".frame-")
            .suffix(".part")
            .tempfile_in(&self.dir)?;
        staged.write_all(&encoded)?;

        let path = self.dir.join(name.file_name());
        match staged.persist_noclobber(&path) {
            Ok(_) => Ok(path),
            Err(err) if err.error.kind() == io::ErrorKind::AlreadyExists => {
                let renamed = FrameName {
                    label: format!("{}_{sequence}", name.label),
                    ..name.clone()
                };
                let path = self.dir.join(renamed.file_name());
                err.file.persist_noclobber(&path).map_err(|err| err.error)?;
                Ok(path)
            }
            Err(err) => Err(err.error.into()),
        }
    }
}
