//! One-shot frame snapshots
//!
//! Each snapshot is a JPEG plus a label file sharing one key:
//!
//! ```text
//! <dir>/snapshot_<timestamp_ns>.jpg
//! <dir>/snapshot_<timestamp_ns>.txt   one line per detection:
//!                                     class_id cx cy w h confidence
//! ```
//!
//! Coordinates in the label file are normalized to [0, 1] by frame size.

use crate::core::imaging;
use crate::core::types::{Frame, RawDetection};
use crate::error::Result;
use log::info;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

/// Files written for one snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotFiles {
    pub image: PathBuf,
    pub labels: PathBuf,
}

/// Writes snapshots into a directory
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    directory: PathBuf,
    jpeg_quality: u8,
}

impl SnapshotStore {
    pub fn new<P: AsRef<Path>>(directory: P, jpeg_quality: u8) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
            jpeg_quality,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Persist a frame and its unfiltered detections
    pub fn write(&self, frame: &Frame, detections: &[RawDetection]) -> Result<SnapshotFiles> {
        fs::create_dir_all(&self.directory)?;
        let key = format!("snapshot_{}", frame.timestamp_ns);
        let files = SnapshotFiles {
            image: self.directory.join(format!("{}.jpg", key)),
            labels: self.directory.join(format!("{}.txt", key)),
        };

        let jpeg = imaging::encode_jpeg(frame, self.jpeg_quality)?;
        fs::write(&files.image, jpeg)?;
        fs::write(&files.labels, label_lines(frame, detections))?;

        info!(
            "Snapshot written: {} ({} detections)",
            files.image.display(),
            detections.len()
        );
        Ok(files)
    }
}

fn label_lines(frame: &Frame, detections: &[RawDetection]) -> String {
    let (fw, fh) = (frame.width.max(1) as f32, frame.height.max(1) as f32);
    let mut out = String::new();
    for d in detections {
        let _ = writeln!(
            out,
            "{} {:.6} {:.6} {:.6} {:.6} {:.6}",
            d.class_id,
            d.cx / fw,
            d.cy / fh,
            d.w / fw,
            d.h / fh,
            d.confidence
        );
    }
    out
}
