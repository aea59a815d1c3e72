use crate::error::RecordError;
use crate::locator::{Detection, Stage};
use crate::results::CaptureRecord;
use crate::utils::{capture_filename, capture_stem};
use chrono::Local;
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Cursor, Write};
use std::path::{Path, PathBuf};

/// Upper bound on `_N` suffixes tried for one timestamp
const MAX_NAME_ATTEMPTS: usize = 1000;

/// Where captured images and their metadata go
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Directory receiving one PNG per capture
    #[serde(default = "default_image_dir")]
    pub image_dir: PathBuf,

    /// Append-only JSON Lines metadata store
    #[serde(default = "default_metadata_path")]
    pub metadata_path: PathBuf,
}

fn default_image_dir() -> PathBuf {
    PathBuf::from("data/raw")
}

fn default_metadata_path() -> PathBuf {
    PathBuf::from("data/processed/captures.jsonl")
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            image_dir: default_image_dir(),
            metadata_path: default_metadata_path(),
        }
    }
}

/// A snapshot written to disk
#[derive(Debug, Clone)]
pub struct CapturedImage {
    pub path: PathBuf,
    pub record: CaptureRecord,
}

/// Writes captured images and appends their metadata records
#[derive(Debug, Clone)]
pub struct CaptureStore {
    image_dir: PathBuf,
    metadata_path: PathBuf,
}

impl CaptureStore {
    pub fn new(config: &CaptureConfig) -> Self {
        Self {
            image_dir: config.image_dir.clone(),
            metadata_path: config.metadata_path.clone(),
        }
    }

    pub fn metadata_path(&self) -> &Path {
        &self.metadata_path
    }

    /// Write the detection's snapshot as a new PNG file and build its record.
    ///
    /// The record is not appended; see [`CaptureStore::append`].
    pub fn save_image(
        &self,
        detection: &Detection,
        stage: Stage,
        url: &str,
        page_title: &str,
    ) -> Result<CapturedImage, RecordError> {
        fs::create_dir_all(&self.image_dir).map_err(|e| io_error(&self.image_dir, e))?;

        let now = Local::now();
        let png = as_png(&detection.png)?;
        let (path, mut file) = self.create_unique(&capture_stem(&now))?;
        file.write_all(&png).map_err(|e| io_error(&path, e))?;

        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        ::log::info!("CAPTCHA saved: {}", path.display());

        let record = CaptureRecord {
            filename,
            url: url.to_string(),
            page_title: page_title.to_string(),
            timestamp: now,
            stage: stage.to_string(),
            reason: detection.reason,
            width: detection.attributes.width,
            height: detection.attributes.height,
            prediction: None,
            solution: None,
            success: None,
        };
        Ok(CapturedImage { path, record })
    }

    /// Save the snapshot and append its record in one step
    pub fn capture(
        &self,
        detection: &Detection,
        stage: Stage,
        url: &str,
        page_title: &str,
    ) -> Result<CapturedImage, RecordError> {
        let captured = self.save_image(detection, stage, url, page_title)?;
        self.append(&captured.record)?;
        Ok(captured)
    }

    /// Append one record to the metadata store
    pub fn append(&self, record: &CaptureRecord) -> Result<(), RecordError> {
        if let Some(parent) = self.metadata_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
            }
        }

        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.metadata_path)
            .map_err(|e| io_error(&self.metadata_path, e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| io_error(&self.metadata_path, e))?;

        ::log::debug!("Metadata appended to {}", self.metadata_path.display());
        Ok(())
    }

    /// All readable records. A missing or unreadable store reads as empty;
    /// lines that are not valid records are skipped.
    pub fn records(&self) -> Vec<CaptureRecord> {
        let file = match File::open(&self.metadata_path) {
            Ok(file) => file,
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    ::log::warn!(
                        "Metadata store {} unreadable, treating as empty: {}",
                        self.metadata_path.display(),
                        e
                    );
                }
                return Vec::new();
            }
        };

        let mut records = Vec::new();
        for (number, line) in BufReader::new(file).split(b'\n').enumerate() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    ::log::warn!("Stopped reading metadata at line {}: {}", number + 1, e);
                    break;
                }
            };
            if line.trim_ascii().is_empty() {
                continue;
            }
            match serde_json::from_slice(&line) {
                Ok(record) => records.push(record),
                Err(e) => ::log::warn!("Skipping corrupt metadata line {}: {}", number + 1, e),
            }
        }
        records
    }

    fn create_unique(&self, stem: &str) -> Result<(PathBuf, File), RecordError> {
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let path = self.image_dir.join(capture_filename(stem, attempt));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(io_error(&path, e)),
            }
        }

        let path = self.image_dir.join(capture_filename(stem, MAX_NAME_ATTEMPTS));
        Err(io_error(
            &path,
            io::Error::new(io::ErrorKind::AlreadyExists, "no free capture file name"),
        ))
    }
}

/// Snapshot bytes as PNG, re-encoding other formats
fn as_png(bytes: &[u8]) -> Result<Vec<u8>, RecordError> {
    if matches!(image::guess_format(bytes), Ok(ImageFormat::Png)) {
        return Ok(bytes.to_vec());
    }

    let decoded = image::load_from_memory(bytes)?;
    let mut png = Vec::new();
    decoded.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    Ok(png)
}

fn io_error(path: &Path, source: io::Error) -> RecordError {
    RecordError::Io {
        path: path.display().to_string(),
        source,
    }
}
