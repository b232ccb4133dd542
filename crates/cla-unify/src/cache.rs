// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! On-disk artifact for atom-metric tables.
//!
//! An artifact is a JSON envelope around an encoded `{config, table}`
//! payload. The envelope records the SHA-256 key of the atom configuration,
//! a CRC32 of the payload, and the schema version. Float values are stored
//! by bit pattern so NaN and infinities survive either codec.

use crate::atom::AtomMetricTable;
use crate::config::{AtomMetricConfig, DistanceGrid};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;
use tracing::{debug, info};

use cla_core::ClaError;

/// Schema version emitted by writers.
pub const CURRENT_ATOM_TABLE_SCHEMA_VERSION: u32 = 1;
/// Oldest schema version accepted by readers.
pub const MIN_SUPPORTED_ATOM_TABLE_SCHEMA_VERSION: u32 = 1;
pub const ATOM_TABLE_FILE_EXTENSION: &str = "clatbl";

/// Encoding of the payload bytes inside the envelope.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadCodec {
    Json,
    #[default]
    Bincode,
}

/// Serialized artifact envelope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtomTableArtifact {
    pub schema_version: u32,
    pub engine_fingerprint: String,
    pub config_key: String,
    pub created_at_ns: i64,
    pub payload_crc32: u32,
    pub payload_codec: PayloadCodec,
    pub payload: Vec<u8>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct AtomTablePayload {
    config: AtomMetricConfig,
    grid_bits: Vec<u64>,
    column_bits: BTreeMap<String, Vec<u64>>,
}

impl AtomTablePayload {
    fn from_table(config: &AtomMetricConfig, table: &AtomMetricTable) -> Self {
        let to_bits = |values: &[f64]| values.iter().map(|v| v.to_bits()).collect::<Vec<u64>>();
        Self {
            config: config.clone(),
            grid_bits: to_bits(table.d()),
            column_bits: table
                .columns()
                .iter()
                .map(|(key, values)| (key.clone(), to_bits(values)))
                .collect(),
        }
    }

    fn into_table(self) -> Result<(AtomMetricConfig, AtomMetricTable), ClaError> {
        let from_bits = |bits: Vec<u64>| bits.into_iter().map(f64::from_bits).collect::<Vec<f64>>();
        let grid = DistanceGrid::new(from_bits(self.grid_bits)).map_err(|err| {
            ClaError::invalid_input(format!("atom table artifact has an invalid grid: {err}"))
        })?;
        let columns = self
            .column_bits
            .into_iter()
            .map(|(key, bits)| (key, from_bits(bits)))
            .collect();
        let table = AtomMetricTable::new(grid, columns)?;
        Ok((self.config, table))
    }
}

/// Decoded artifact contents.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredAtomTable {
    pub config_key: String,
    pub config: AtomMetricConfig,
    pub table: AtomMetricTable,
    pub created_at_ns: i64,
}

impl AtomTableArtifact {
    fn validate_metadata(&self) -> Result<(), ClaError> {
        if self.engine_fingerprint.trim().is_empty() {
            return Err(ClaError::invalid_input(
                "atom table artifact engine_fingerprint must be non-empty",
            ));
        }
        if self.config_key.len() != 64 || !self.config_key.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ClaError::invalid_input(format!(
                "atom table artifact config_key must be 64 hex characters; got '{}'",
                self.config_key
            )));
        }
        if self.created_at_ns < 0 {
            return Err(ClaError::invalid_input(format!(
                "atom table artifact created_at_ns must be >= 0; got {}",
                self.created_at_ns
            )));
        }
        validate_atom_table_schema_version(self.schema_version)
    }

    fn verify_payload_crc32(&self) -> Result<(), ClaError> {
        let observed = crc32fast::hash(&self.payload);
        if observed != self.payload_crc32 {
            return Err(ClaError::invalid_input(format!(
                "atom table payload crc32 mismatch: expected=0x{:08x}, observed=0x{:08x}",
                self.payload_crc32, observed
            )));
        }
        Ok(())
    }

    /// Builds an artifact for `table` computed under `config`.
    pub fn from_table(
        config: &AtomMetricConfig,
        table: &AtomMetricTable,
        payload_codec: PayloadCodec,
    ) -> Result<Self, ClaError> {
        let payload = serialize_payload(&AtomTablePayload::from_table(config, table), payload_codec)?;
        let artifact = Self {
            schema_version: CURRENT_ATOM_TABLE_SCHEMA_VERSION,
            engine_fingerprint: engine_fingerprint(),
            config_key: config.config_key()?,
            created_at_ns: now_unix_ns()?,
            payload_crc32: crc32fast::hash(&payload),
            payload_codec,
            payload,
        };
        artifact.validate_metadata()?;
        Ok(artifact)
    }

    /// Decodes the payload after metadata and CRC checks.
    pub fn into_stored(self) -> Result<StoredAtomTable, ClaError> {
        self.validate_metadata()?;
        self.verify_payload_crc32()?;
        let payload: AtomTablePayload = deserialize_payload(&self.payload, self.payload_codec)?;
        let (config, table) = payload.into_table()?;
        let embedded_key = config.config_key()?;
        if embedded_key != self.config_key {
            return Err(ClaError::invalid_input(format!(
                "atom table artifact config_key does not match its embedded config: envelope={}, embedded={embedded_key}",
                self.config_key
            )));
        }
        Ok(StoredAtomTable {
            config_key: self.config_key,
            config,
            table,
            created_at_ns: self.created_at_ns,
        })
    }
}

fn engine_fingerprint() -> String {
    format!(
        "cla-unify/{}/{}-{}",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

fn now_unix_ns() -> Result<i64, ClaError> {
    Utc::now().timestamp_nanos_opt().ok_or_else(|| {
        ClaError::resource_limit("system timestamp overflow while stamping atom table artifact")
    })
}

fn io_resource_error(action: &str, path: &Path, err: std::io::Error) -> ClaError {
    ClaError::resource_limit(format!("{action} '{}': {err}", path.display()))
}

fn serialize_payload(payload: &AtomTablePayload, codec: PayloadCodec) -> Result<Vec<u8>, ClaError> {
    match codec {
        PayloadCodec::Json => serde_json::to_vec(payload).map_err(|err| {
            ClaError::invalid_input(format!(
                "atom table payload serialization failed (codec=json): {err}"
            ))
        }),
        PayloadCodec::Bincode => bincode::serialize(payload).map_err(|err| {
            ClaError::invalid_input(format!(
                "atom table payload serialization failed (codec=bincode): {err}"
            ))
        }),
    }
}

fn deserialize_payload(payload: &[u8], codec: PayloadCodec) -> Result<AtomTablePayload, ClaError> {
    match codec {
        PayloadCodec::Json => serde_json::from_slice(payload).map_err(|err| {
            ClaError::invalid_input(format!(
                "atom table payload deserialization failed (codec=json): {err}"
            ))
        }),
        PayloadCodec::Bincode => bincode::deserialize(payload).map_err(|err| {
            ClaError::invalid_input(format!(
                "atom table payload deserialization failed (codec=bincode): {err}"
            ))
        }),
    }
}

fn write_file_atomic(path: &Path, encoded: &[u8]) -> Result<(), ClaError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let file_name = path.file_name().ok_or_else(|| {
        ClaError::invalid_input(format!(
            "atom table path '{}' must include a file name",
            path.display()
        ))
    })?;
    let file_name = file_name.to_string_lossy();

    let suffix = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let temp_path = parent.join(format!("{file_name}.tmp-{}-{suffix}", process::id()));

    let mut file = OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&temp_path)
        .map_err(|err| io_resource_error("failed creating atom table temp file", &temp_path, err))?;

    if let Err(err) = file.write_all(encoded) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(io_resource_error(
            "failed writing atom table temp file",
            &temp_path,
            err,
        ));
    }

    if let Err(err) = file.sync_all() {
        let _ = std::fs::remove_file(&temp_path);
        return Err(io_resource_error(
            "failed fsync on atom table temp file",
            &temp_path,
            err,
        ));
    }

    if let Err(err) = std::fs::rename(&temp_path, path) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(io_resource_error("failed renaming atom table temp file", path, err));
    }

    Ok(())
}

/// Accepts schema versions in the supported range.
pub fn validate_atom_table_schema_version(schema_version: u32) -> Result<(), ClaError> {
    if (MIN_SUPPORTED_ATOM_TABLE_SCHEMA_VERSION..=CURRENT_ATOM_TABLE_SCHEMA_VERSION)
        .contains(&schema_version)
    {
        return Ok(());
    }
    Err(ClaError::invalid_input(format!(
        "atom table schema_version={schema_version} is unsupported; supported versions are {}..={}; recompute the table",
        MIN_SUPPORTED_ATOM_TABLE_SCHEMA_VERSION, CURRENT_ATOM_TABLE_SCHEMA_VERSION
    )))
}

/// Serializes an envelope to JSON bytes.
pub fn encode_artifact(artifact: &AtomTableArtifact) -> Result<Vec<u8>, ClaError> {
    artifact.validate_metadata()?;
    artifact.verify_payload_crc32()?;
    serde_json::to_vec(artifact).map_err(|err| {
        ClaError::invalid_input(format!("atom table envelope serialization failed: {err}"))
    })
}

/// Parses envelope JSON bytes and checks metadata and CRC.
pub fn decode_artifact(encoded: &[u8]) -> Result<AtomTableArtifact, ClaError> {
    let artifact: AtomTableArtifact = serde_json::from_slice(encoded).map_err(|err| {
        ClaError::invalid_input(format!("atom table envelope JSON parse failed: {err}"))
    })?;
    artifact.validate_metadata()?;
    artifact.verify_payload_crc32()?;
    Ok(artifact)
}

/// Writes `table` to `path` atomically (temp file, fsync, rename).
pub fn save_atom_table_file(
    path: impl AsRef<Path>,
    config: &AtomMetricConfig,
    table: &AtomMetricTable,
    payload_codec: PayloadCodec,
) -> Result<AtomTableArtifact, ClaError> {
    let path = path.as_ref();
    let artifact = AtomTableArtifact::from_table(config, table, payload_codec)?;
    let encoded = encode_artifact(&artifact)?;
    write_file_atomic(path, &encoded)?;
    info!(path = %path.display(), config_key = %artifact.config_key, "atom table saved");
    Ok(artifact)
}

/// Reads the artifact at `path`; `expected_key` rejects tables built under another config.
pub fn load_atom_table_file(
    path: impl AsRef<Path>,
    expected_key: Option<&str>,
) -> Result<StoredAtomTable, ClaError> {
    let path = path.as_ref();
    let encoded = std::fs::read(path)
        .map_err(|err| io_resource_error("failed reading atom table file", path, err))?;
    let stored = decode_artifact(&encoded)?.into_stored()?;
    if let Some(expected) = expected_key {
        if stored.config_key != expected {
            return Err(ClaError::invalid_input(format!(
                "atom table config mismatch: expected='{expected}', found='{}'",
                stored.config_key
            )));
        }
    }
    info!(path = %path.display(), metrics = stored.table.n_metrics(), "atom table loaded");
    Ok(stored)
}

/// Timestamp-derived artifact file name, unique to the microsecond.
pub fn timestamped_file_name() -> String {
    format!(
        "atom_metrics_{}.{ATOM_TABLE_FILE_EXTENSION}",
        Utc::now().format("%Y%m%dT%H%M%S%6f")
    )
}

/// Directory of artifacts addressed by atom configuration key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AtomMetricCache {
    root: PathBuf,
    codec: PayloadCodec,
}

impl AtomMetricCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            codec: PayloadCodec::default(),
        }
    }

    pub fn with_codec(mut self, codec: PayloadCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, config: &AtomMetricConfig) -> Result<PathBuf, ClaError> {
        let key = config.config_key()?;
        Ok(self
            .root
            .join(format!("atom_metrics_{key}.{ATOM_TABLE_FILE_EXTENSION}")))
    }

    /// `Ok(None)` when no artifact exists for `config`.
    pub fn load(&self, config: &AtomMetricConfig) -> Result<Option<AtomMetricTable>, ClaError> {
        let path = self.path_for(config)?;
        if !path.exists() {
            debug!(path = %path.display(), "atom table cache miss");
            return Ok(None);
        }
        let key = config.config_key()?;
        load_atom_table_file(&path, Some(&key)).map(|stored| Some(stored.table))
    }

    pub fn store(
        &self,
        config: &AtomMetricConfig,
        table: &AtomMetricTable,
    ) -> Result<PathBuf, ClaError> {
        std::fs::create_dir_all(&self.root)
            .map_err(|err| io_resource_error("failed creating cache directory", &self.root, err))?;
        let path = self.path_for(config)?;
        save_atom_table_file(&path, config, table, self.codec)?;
        Ok(path)
    }
}
