// src/replay.rs
//
// Recorded streams: one JSON Lines pose log per stream, each line one frame.
//
//   {"timestamp": 0.033, "width": 640, "height": 480,
//    "landmarks": [{"x": 312.0, "y": 80.5, "confidence": 0.91}, ...],
//    "frame": "frames/000001.png"}
//
// `landmarks` null or absent = no detection on that frame. `frame` is an
// optional image path relative to the log file.

use crate::detection::{Landmark, PoseFrame};
use crate::error::DetectError;
use crate::pipeline::AlertEvent;
use crate::types::{Config, Frame, ReplayConfig};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Lines, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use walkdir::WalkDir;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoseRecord {
    pub timestamp: f64,
    pub width: usize,
    pub height: usize,
    #[serde(default)]
    pub landmarks: Option<Vec<Landmark>>,
    #[serde(default)]
    pub frame: Option<PathBuf>,
}

impl PoseRecord {
    pub fn pose(&self) -> Result<Option<PoseFrame>, DetectError> {
        self.landmarks
            .as_deref()
            .map(PoseFrame::from_landmarks)
            .transpose()
    }
}

pub fn find_recordings(config: &ReplayConfig) -> Result<Vec<PathBuf>> {
    let root = Path::new(&config.input_dir);
    if !root.is_dir() {
        anyhow::bail!("recording directory {} does not exist", root.display());
    }

    let mut logs: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(&config.extension))
        })
        .collect();
    logs.sort();

    info!("Found {} pose log(s) in {}", logs.len(), root.display());
    Ok(logs)
}

/// Stream name of a log: its file stem
pub fn stream_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "stream".to_string())
}

pub struct PoseLog {
    path: PathBuf,
    base_dir: PathBuf,
    lines: Lines<BufReader<File>>,
    line_no: usize,
}

impl PoseLog {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("opening pose log {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            base_dir: path.parent().map(Path::to_path_buf).unwrap_or_default(),
            lines: BufReader::new(file).lines(),
            line_no: 0,
        })
    }

    /// Decode the image a record points at, if any.
    pub fn load_frame(&self, record: &PoseRecord) -> Result<Option<Frame>> {
        record
            .frame
            .as_ref()
            .map(|rel| decode_frame(&self.base_dir.join(rel), record.timestamp))
            .transpose()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Iterator for PoseLog {
    type Item = Result<PoseRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = self.lines.next()?;
            self.line_no += 1;
            let parsed = line
                .with_context(|| format!("reading {}:{}", self.path.display(), self.line_no))
                .and_then(|line| {
                    if line.trim().is_empty() {
                        return Ok(None);
                    }
                    serde_json::from_str::<PoseRecord>(&line)
                        .map(Some)
                        .with_context(|| format!("parsing {}:{}", self.path.display(), self.line_no))
                });
            match parsed {
                Ok(None) => continue,
                Ok(Some(record)) => return Some(Ok(record)),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

pub fn decode_frame(path: &Path, timestamp: f64) -> Result<Frame> {
    let img = image::open(path)
        .with_context(|| format!("decoding frame {}", path.display()))?
        .to_rgb8();
    let (width, height) = img.dimensions();
    Ok(Frame {
        data: img.into_raw(),
        width: width as usize,
        height: height as usize,
        timestamp,
    })
}

/// Alerts of one stream as JSON Lines
pub struct AlertWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    written: usize,
}

impl AlertWriter {
    pub fn create(output_dir: &Path, stream: &str) -> Result<Self> {
        fs::create_dir_all(output_dir)
            .with_context(|| format!("creating output directory {}", output_dir.display()))?;
        let path = output_dir.join(format!("{stream}.alerts.jsonl"));
        let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            written: 0,
        })
    }

    pub fn write(&mut self, event: &AlertEvent) -> Result<()> {
        serde_json::to_writer(&mut self.writer, event)
            .with_context(|| format!("writing alert to {}", self.path.display()))?;
        self.writer.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    pub fn finish(mut self) -> Result<usize> {
        self.writer
            .flush()
            .with_context(|| format!("flushing {}", self.path.display()))?;
        Ok(self.written)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Default config location, overridable by the first CLI argument
pub fn config_path_from_args<I: IntoIterator<Item = String>>(args: I) -> PathBuf {
    args.into_iter()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.yaml"))
}

/// Load the config if the file exists, otherwise run on defaults.
pub fn load_config_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        Config::load(path)
    } else {
        info!("No config at {}, using defaults", path.display());
        Ok(Config::default())
    }
}
