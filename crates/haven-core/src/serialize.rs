//! Serialization and snapshot support for the simulation engine.
//!
//! Snapshots are flat records of the owned state (nodes, edges, converter
//! specs, clock) encoded via `bitcode` behind a versioned header. Derived
//! state is not trusted from disk: network membership is rebuilt from the
//! persisted edge set on restore, and converter adjacency caches start
//! cold.

use crate::converter::ConverterModule;
use crate::engine::{Engine, SimState, TickStrategy};
use crate::event::EventBus;
use crate::grid::{Environment, NetworkManager};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Magic number identifying a colony snapshot.
pub const SNAPSHOT_MAGIC: u32 = 0x4841_5601;

/// Current format version. Increment when breaking the wire format.
pub const FORMAT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur during serialization.
#[derive(Debug, thiserror::Error)]
pub enum SerializeError {
    #[error("bitcode encoding failed: {0}")]
    Encode(String),
}

/// Errors that can occur during deserialization.
#[derive(Debug, thiserror::Error)]
pub enum DeserializeError {
    #[error("data too short for snapshot header")]
    TooShort,
    #[error("invalid magic number: expected 0x{:08X}, got 0x{:08X}", SNAPSHOT_MAGIC, .0)]
    InvalidMagic(u32),
    #[error("unsupported format version: expected {}, got {}", FORMAT_VERSION, .0)]
    UnsupportedVersion(u32),
    #[error("snapshot from future version {0} (this build supports up to {FORMAT_VERSION})")]
    FutureVersion(u32),
    #[error("bitcode decoding failed: {0}")]
    Decode(String),
}

// ---------------------------------------------------------------------------
// Snapshot header
// ---------------------------------------------------------------------------

/// Header prepended to every serialized snapshot. Enables format detection
/// and version checking before acting on the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotHeader {
    pub magic: u32,
    pub version: u32,
    /// Tick count at the time the snapshot was taken.
    pub tick: u64,
}

impl SnapshotHeader {
    /// Create a header for the current format version.
    pub fn new(tick: u64) -> Self {
        Self {
            magic: SNAPSHOT_MAGIC,
            version: FORMAT_VERSION,
            tick,
        }
    }

    /// Validate the header. Returns `Ok(())` if valid.
    pub fn validate(&self) -> Result<(), DeserializeError> {
        if self.magic != SNAPSHOT_MAGIC {
            return Err(DeserializeError::InvalidMagic(self.magic));
        }
        if self.version > FORMAT_VERSION {
            return Err(DeserializeError::FutureVersion(self.version));
        }
        if self.version < FORMAT_VERSION {
            return Err(DeserializeError::UnsupportedVersion(self.version));
        }
        Ok(())
    }
}

/// Read just the snapshot header from serialized data.
///
/// Decodes the full snapshot (bitcode has no partial deserialization) but
/// returns only the header, for version detection before deciding how to
/// proceed.
pub fn read_snapshot_header(data: &[u8]) -> Result<SnapshotHeader, DeserializeError> {
    if data.is_empty() {
        return Err(DeserializeError::TooShort);
    }
    let snapshot: EngineSnapshot =
        bitcode::deserialize(data).map_err(|e| DeserializeError::Decode(e.to_string()))?;
    Ok(snapshot.header)
}

// ---------------------------------------------------------------------------
// Serializable engine state
// ---------------------------------------------------------------------------

/// The serializable portion of the engine state. Excludes the EventBus
/// (contains closures) and the converter adjacency cache (recomputed on
/// first tick after restore).
#[derive(Debug, Serialize, Deserialize)]
struct EngineSnapshot {
    header: SnapshotHeader,
    manager: NetworkManager,
    converters: ConverterModule,
    environment: Environment,
    strategy: TickStrategy,
    sim_state: SimState,
    paused: bool,
}

// ---------------------------------------------------------------------------
// Engine serialization methods
// ---------------------------------------------------------------------------

impl Engine {
    /// Serialize the full engine state to a binary blob.
    pub fn serialize(&self) -> Result<Vec<u8>, SerializeError> {
        let snapshot = EngineSnapshot {
            header: SnapshotHeader::new(self.sim_state.tick),
            manager: self.manager.clone(),
            converters: self.converters.clone(),
            environment: self.environment,
            strategy: self.strategy,
            sim_state: self.sim_state,
            paused: self.paused,
        };
        bitcode::serialize(&snapshot).map_err(|e| SerializeError::Encode(e.to_string()))
    }

    /// Deserialize an engine from a binary blob.
    ///
    /// The EventBus is recreated empty; subscribers must re-register.
    /// Network membership is rebuilt from the persisted edge set rather
    /// than trusted from the snapshot.
    pub fn deserialize(data: &[u8]) -> Result<Self, DeserializeError> {
        if data.is_empty() {
            return Err(DeserializeError::TooShort);
        }
        let snapshot: EngineSnapshot =
            bitcode::deserialize(data).map_err(|e| DeserializeError::Decode(e.to_string()))?;
        snapshot.header.validate()?;

        let mut manager = snapshot.manager;
        manager.rebuild_networks();

        let mut engine = Engine::from_parts(
            manager,
            snapshot.converters,
            snapshot.environment,
            snapshot.sim_state,
            snapshot.strategy,
        );
        engine.event_bus = EventBus::new();
        engine.paused = snapshot.paused;
        Ok(engine)
    }
}

// ---------------------------------------------------------------------------
// Snapshot ring buffer
// ---------------------------------------------------------------------------

/// A single entry in the snapshot ring buffer.
#[derive(Debug, Clone)]
pub struct SnapshotEntry {
    /// Tick at which the snapshot was taken.
    pub tick: u64,
    /// Serialized engine state (bitcode bytes).
    pub data: Vec<u8>,
}

/// A fixed-capacity ring buffer of serialized snapshots, for autosave
/// slots and rewind-style debugging. When full, the oldest is evicted.
#[derive(Debug)]
pub struct SnapshotRingBuffer {
    entries: Vec<Option<SnapshotEntry>>,
    head: usize,
    len: usize,
}

impl SnapshotRingBuffer {
    /// Create a ring buffer with the given capacity (0 is clamped to 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: (0..capacity).map(|_| None).collect(),
            head: 0,
            len: 0,
        }
    }

    /// Push a snapshot; evicts the oldest when full.
    pub fn push(&mut self, entry: SnapshotEntry) {
        self.entries[self.head] = Some(entry);
        self.head = (self.head + 1) % self.capacity();
        if self.len < self.capacity() {
            self.len += 1;
        }
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Get a snapshot by index (0 = oldest, len-1 = newest).
    pub fn get(&self, index: usize) -> Option<&SnapshotEntry> {
        if index >= self.len {
            return None;
        }
        let start = if self.len < self.capacity() {
            0
        } else {
            self.head
        };
        let actual = (start + index) % self.capacity();
        self.entries[actual].as_ref()
    }

    /// The most recent snapshot.
    pub fn latest(&self) -> Option<&SnapshotEntry> {
        if self.len == 0 {
            return None;
        }
        self.get(self.len - 1)
    }
}

impl Engine {
    /// Snapshot the current state into the ring buffer.
    pub fn take_snapshot(&self, buffer: &mut SnapshotRingBuffer) -> Result<(), SerializeError> {
        let data = self.serialize()?;
        buffer.push(SnapshotEntry {
            tick: self.sim_state.tick,
            data,
        });
        Ok(())
    }

    /// Restore an engine from a ring-buffer entry. `index` is 0-based
    /// from oldest to newest; out of range returns `Ok(None)`.
    pub fn restore_snapshot(
        buffer: &SnapshotRingBuffer,
        index: usize,
    ) -> Result<Option<Engine>, DeserializeError> {
        let Some(entry) = buffer.get(index) else {
            return Ok(None);
        };
        let engine = Engine::deserialize(&entry.data)?;
        Ok(Some(engine))
    }
}

// ===========================================================================
// Tests
// ===========================================================================
