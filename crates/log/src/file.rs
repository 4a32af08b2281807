use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use stepsim_kernel::WorldState;

use crate::record::StateLog;

const LOG_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CBOR serialization error: {0}")]
    CborEncode(String),
    #[error("CBOR deserialization error: {0}")]
    CborDecode(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("integrity check failed: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },
    #[error("schema version mismatch: file has v{file_version}, expected v{expected_version}")]
    SchemaMismatch {
        file_version: u32,
        expected_version: u32,
    },
    #[error("header promises {expected} states, body holds {actual}")]
    CountMismatch { expected: usize, actual: usize },
}

/// Sidecar describing a saved log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogHeader {
    pub schema_version: u32,
    pub project: String,
    pub time_step: f64,
    pub state_count: usize,
    pub first_time: Option<f64>,
    pub last_time: Option<f64>,
    /// Hex sha256 of the compressed body file.
    pub sha256: String,
}

#[derive(Serialize, Deserialize)]
struct LogBody {
    project: String,
    time_step: f64,
    states: Vec<WorldState>,
}

/// Path of the JSON header that accompanies the log at `path`.
pub fn header_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".json");
    PathBuf::from(name)
}

/// Write `log` to `path` plus its header sidecar. Returns the header written.
pub fn save(log: &StateLog, path: impl AsRef<Path>) -> Result<LogHeader, LogError> {
    let path = path.as_ref();
    let body = LogBody {
        project: log.project.clone(),
        time_step: log.time_step,
        states: log.states().cloned().collect(),
    };
    let compressed = zstd_compress(&cbor_serialize(&body)?)?;

    let header = LogHeader {
        schema_version: LOG_SCHEMA_VERSION,
        project: body.project,
        time_step: body.time_step,
        state_count: body.states.len(),
        first_time: log.first().map(|s| s.time),
        last_time: log.last().map(|s| s.time),
        sha256: sha256_hex(&compressed),
    };

    std::fs::write(path, &compressed)?;
    serde_json::to_writer_pretty(std::fs::File::create(header_path(path))?, &header)?;
    tracing::info!(path = %path.display(), states = header.state_count, "state log saved");
    Ok(header)
}

/// Read and schema-check the header of the log at `path`.
pub fn read_header(path: impl AsRef<Path>) -> Result<LogHeader, LogError> {
    let header: LogHeader =
        serde_json::from_reader(std::fs::File::open(header_path(path.as_ref()))?)?;
    if header.schema_version != LOG_SCHEMA_VERSION {
        return Err(LogError::SchemaMismatch {
            file_version: header.schema_version,
            expected_version: LOG_SCHEMA_VERSION,
        });
    }
    Ok(header)
}

/// Load the log at `path`, verifying it against its header.
pub fn load(path: impl AsRef<Path>) -> Result<StateLog, LogError> {
    let path = path.as_ref();
    let header = read_header(path)?;
    let compressed = std::fs::read(path)?;

    let actual = sha256_hex(&compressed);
    if actual != header.sha256 {
        return Err(LogError::IntegrityMismatch {
            expected: header.sha256,
            actual,
        });
    }

    let body: LogBody = cbor_deserialize(&zstd_decompress(&compressed)?)?;
    if body.states.len() != header.state_count {
        return Err(LogError::CountMismatch {
            expected: header.state_count,
            actual: body.states.len(),
        });
    }
    Ok(StateLog::from_parts(body.project, body.time_step, body.states))
}

fn cbor_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, LogError> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| LogError::CborEncode(e.to_string()))?;
    Ok(buf)
}

fn cbor_deserialize<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, LogError> {
    ciborium::from_reader(data).map_err(|e| LogError::CborDecode(e.to_string()))
}

fn zstd_compress(data: &[u8]) -> Result<Vec<u8>, LogError> {
    let mut encoder = zstd::Encoder::new(Vec::new(), 3)?;
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn zstd_decompress(data: &[u8]) -> Result<Vec<u8>, LogError> {
    let mut decoder = zstd::Decoder::new(data)?;
    let mut buf = Vec::new();
    decoder.read_to_end(&mut buf)?;
    Ok(buf)
}

fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}
