//! Line-finder job description
//!
//! A job names one image plus the options the line finder needs to read
//! its timestamp and calibration. Jobs are plain values: build one, hand it
//! to the invoker, throw it away. They serialize to JSON so a batch script
//! can write them to disk.

use serde::{de, Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Where the line finder should read the capture time from
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TimestampSource {
    /// Parse the timestamp out of the image filename
    Filename,
    /// Read the timestamp from the image's EXIF data
    Exif,
}

impl TimestampSource {
    /// The command-line flag that selects this source
    pub fn flag(self) -> &'static str {
        match self {
            TimestampSource::Filename => "--timestamp_from_filename",
            TimestampSource::Exif => "--timestamp_from_exif",
        }
    }
}

impl fmt::Display for TimestampSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimestampSource::Filename => f.write_str("filename"),
            TimestampSource::Exif => f.write_str("exif"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown timestamp source '{0}' (expected 'filename' or 'exif')")]
pub struct UnknownTimestampSource(pub String);

impl FromStr for TimestampSource {
    type Err = UnknownTimestampSource;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "filename" => Ok(TimestampSource::Filename),
            "exif" => Ok(TimestampSource::Exif),
            _ => Err(UnknownTimestampSource(s.to_string())),
        }
    }
}

// Same spellings as the command line, so job files and flags agree
impl<'de> Deserialize<'de> for TimestampSource {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Everything needed for one line-finder run.
///
/// Fields are fixed at construction; only the builder-style
/// `with_result_image` produces a changed copy.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LineFindItem {
    /// Image to analyse. Existence is checked by the line finder, not here
    image_filepath: String,
    timestamp_src: TimestampSource,
    /// Offset of the timestamp within the filename (ignored for EXIF)
    timestamp_start_pos: u32,
    /// Date pattern such as `yy-mm-dd-hh-mm`, passed through untouched
    timestamp_format: String,
    /// Calibration JSON produced by an earlier calibration run
    calib_filepath: String,
    /// Where to write the annotated result image; empty means none
    #[serde(default)]
    result_image_filepath: String,
}

impl LineFindItem {
    /// Create a job without a result image
    pub fn new(
        image_filepath: impl Into<String>,
        timestamp_src: TimestampSource,
        timestamp_start_pos: u32,
        timestamp_format: impl Into<String>,
        calib_filepath: impl Into<String>,
    ) -> Self {
        Self {
            image_filepath: image_filepath.into(),
            timestamp_src,
            timestamp_start_pos,
            timestamp_format: timestamp_format.into(),
            calib_filepath: calib_filepath.into(),
            result_image_filepath: String::new(),
        }
    }

    pub fn image_filepath(&self) -> &str {
        &self.image_filepath
    }

    pub fn timestamp_src(&self) -> TimestampSource {
        self.timestamp_src
    }

    pub fn timestamp_start_pos(&self) -> u32 {
        self.timestamp_start_pos
    }

    pub fn timestamp_format(&self) -> &str {
        &self.timestamp_format
    }

    pub fn calib_filepath(&self) -> &str {
        &self.calib_filepath
    }

    pub fn result_image_filepath(&self) -> &str {
        &self.result_image_filepath
    }

    /// Request an annotated result image at `path`
    pub fn with_result_image(mut self, path: impl Into<String>) -> Self {
        self.result_image_filepath = path.into();
        self
    }

    /// Whether a result image was requested
    pub fn wants_result_image(&self) -> bool {
        !self.result_image_filepath.is_empty()
    }

    /// Convert to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parse from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
