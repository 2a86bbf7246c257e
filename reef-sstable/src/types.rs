//! On-disk types shared by the legacy and mc row parsers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Ordinal of a column in the schema.
pub type ColumnId = u32;

/// Write timestamp in microseconds since the epoch.
pub type Timestamp = i64;

pub const NO_TIMESTAMP: Timestamp = i64::MIN;
pub const NO_TTL: u32 = 0;
/// Local deletion time of a cell that never expires.
pub const NO_EXPIRY_LOCAL_DELETION_TIME: u32 = u32::MAX;

/// When (and whether) a row or cell was deleted.
///
/// `local_deletion_time` is in seconds since the epoch and
/// `marked_for_delete_at` in microseconds. Anything other than the `LIVE`
/// sentinel is a tombstone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeletionTime {
    pub local_deletion_time: u32,
    pub marked_for_delete_at: i64,
}

impl DeletionTime {
    pub const LIVE: DeletionTime = DeletionTime {
        local_deletion_time: u32::MAX,
        marked_for_delete_at: i64::MIN,
    };

    #[must_use]
    pub fn is_live(self) -> bool {
        self == Self::LIVE
    }
}

/// Element kind the reader can fast-forward a parser to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexableElement {
    Partition,
    Cell,
}

/// Atom mask byte of the legacy row format.
#[derive(Debug, Clone, Copy, Default)]
pub struct ColumnMask(u8);

impl ColumnMask {
    const DELETION: u8 = 0x01;
    const EXPIRATION: u8 = 0x02;
    const COUNTER: u8 = 0x04;
    const COUNTER_UPDATE: u8 = 0x08;
    const RANGE_TOMBSTONE: u8 = 0x10;
    const SHADOWABLE: u8 = 0x40;

    #[must_use]
    pub fn new(raw: u8) -> Self {
        Self(raw)
    }

    #[must_use]
    pub fn is_deletion(self) -> bool {
        self.0 & Self::DELETION != 0
    }

    #[must_use]
    pub fn is_expiration(self) -> bool {
        self.0 & Self::EXPIRATION != 0
    }

    #[must_use]
    pub fn is_counter(self) -> bool {
        self.0 & Self::COUNTER != 0
    }

    #[must_use]
    pub fn is_counter_update(self) -> bool {
        self.0 & Self::COUNTER_UPDATE != 0
    }

    #[must_use]
    pub fn is_range_tombstone(self) -> bool {
        self.0 & Self::RANGE_TOMBSTONE != 0
    }

    #[must_use]
    pub fn is_shadowable(self) -> bool {
        self.0 & Self::SHADOWABLE != 0
    }
}

/// Flags byte of an mc unfiltered.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnfilteredFlags(u8);

impl UnfilteredFlags {
    const END_OF_PARTITION: u8 = 0x01;
    const IS_MARKER: u8 = 0x02;
    const HAS_TIMESTAMP: u8 = 0x04;
    const HAS_TTL: u8 = 0x08;
    const HAS_DELETION: u8 = 0x10;
    const HAS_ALL_COLUMNS: u8 = 0x20;
    const HAS_EXTENDED_FLAGS: u8 = 0x80;

    #[must_use]
    pub fn new(raw: u8) -> Self {
        Self(raw)
    }

    #[must_use]
    pub fn is_end_of_partition(self) -> bool {
        self.0 & Self::END_OF_PARTITION != 0
    }

    #[must_use]
    pub fn is_range_tombstone(self) -> bool {
        self.0 & Self::IS_MARKER != 0
    }

    #[must_use]
    pub fn has_timestamp(self) -> bool {
        self.0 & Self::HAS_TIMESTAMP != 0
    }

    #[must_use]
    pub fn has_ttl(self) -> bool {
        self.0 & Self::HAS_TTL != 0
    }

    #[must_use]
    pub fn has_deletion(self) -> bool {
        self.0 & Self::HAS_DELETION != 0
    }

    #[must_use]
    pub fn has_all_columns(self) -> bool {
        self.0 & Self::HAS_ALL_COLUMNS != 0
    }

    #[must_use]
    pub fn has_extended_flags(self) -> bool {
        self.0 & Self::HAS_EXTENDED_FLAGS != 0
    }
}

/// Extended flags byte of an mc unfiltered.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnfilteredExtendedFlags(u8);

impl UnfilteredExtendedFlags {
    const IS_STATIC: u8 = 0x01;

    #[must_use]
    pub fn new(raw: u8) -> Self {
        Self(raw)
    }

    #[must_use]
    pub fn is_static(self) -> bool {
        self.0 & Self::IS_STATIC != 0
    }
}

/// Flags byte of an mc simple column.
#[derive(Debug, Clone, Copy, Default)]
pub struct ColumnFlags(u8);

impl ColumnFlags {
    const IS_DELETED: u8 = 0x01;
    const IS_EXPIRING: u8 = 0x02;
    const HAS_EMPTY_VALUE: u8 = 0x04;
    const USE_ROW_TIMESTAMP: u8 = 0x08;
    const USE_ROW_TTL: u8 = 0x10;

    #[must_use]
    pub fn new(raw: u8) -> Self {
        Self(raw)
    }

    #[must_use]
    pub fn is_deleted(self) -> bool {
        self.0 & Self::IS_DELETED != 0
    }

    #[must_use]
    pub fn is_expiring(self) -> bool {
        self.0 & Self::IS_EXPIRING != 0
    }

    #[must_use]
    pub fn has_value(self) -> bool {
        self.0 & Self::HAS_EMPTY_VALUE == 0
    }

    #[must_use]
    pub fn use_row_timestamp(self) -> bool {
        self.0 & Self::USE_ROW_TIMESTAMP != 0
    }

    #[must_use]
    pub fn use_row_ttl(self) -> bool {
        self.0 & Self::USE_ROW_TTL != 0
    }
}

/// Per-file bases for the delta encoding of timestamps, TTLs and deletion
/// times in the mc data file.
#[derive(Debug, Clone, Default)]
pub struct SerializationHeader {
    pub min_timestamp: i64,
    pub min_local_deletion_time: u32,
    pub min_ttl: u32,
}

impl SerializationHeader {
    #[must_use]
    pub fn parse_timestamp(&self, delta: u64) -> Timestamp {
        self.min_timestamp.wrapping_add(delta as i64)
    }

    #[must_use]
    pub fn parse_expiry(&self, delta: u64) -> u32 {
        self.min_local_deletion_time.wrapping_add(delta as u32)
    }

    #[must_use]
    pub fn parse_ttl(&self, delta: u64) -> u32 {
        self.min_ttl.wrapping_add(delta as u32)
    }
}

/// Default lifetime of an mc row, inherited by its columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessInfo {
    pub timestamp: Timestamp,
    pub ttl: u32,
    pub local_deletion_time: u32,
}

impl LivenessInfo {
    pub const EMPTY: LivenessInfo = LivenessInfo {
        timestamp: NO_TIMESTAMP,
        ttl: NO_TTL,
        local_deletion_time: NO_EXPIRY_LOCAL_DELETION_TIME,
    };

    pub fn reset(&mut self) {
        *self = Self::EMPTY;
    }
}

impl Default for LivenessInfo {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// One schema column as seen by the mc decoder: its id and, for fixed-width
/// types, the value length that is omitted from the wire.
#[derive(Debug, Clone, Copy, Default)]
pub struct ColumnInfo {
    pub id: Option<ColumnId>,
    pub value_fixed_length: Option<u32>,
}

/// Schema-ordered column lists driving the mc decoder.
#[derive(Debug, Clone, Default)]
pub struct ColumnTranslation {
    pub regular_columns: Vec<ColumnInfo>,
    pub static_columns: Vec<ColumnInfo>,
    pub clustering_fixed_lengths: Vec<Option<u32>>,
}

impl ColumnTranslation {
    #[must_use]
    pub fn from_schema(schema: &Schema) -> Self {
        Self {
            regular_columns: schema.regular_columns.clone(),
            static_columns: schema.static_columns.clone(),
            clustering_fixed_lengths: schema.clustering_fixed_lengths.clone(),
        }
    }
}

/// Opaque schema identity used to key cached translations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SchemaId(pub u64);

/// The slice of the schema the parsers need: clustering column widths plus
/// the ordered regular and static column lists.
#[derive(Debug, Clone)]
pub struct Schema {
    pub id: SchemaId,
    pub clustering_fixed_lengths: Vec<Option<u32>>,
    pub regular_columns: Vec<ColumnInfo>,
    pub static_columns: Vec<ColumnInfo>,
}

impl Schema {
    #[must_use]
    pub fn clustering_column_count(&self) -> usize {
        self.clustering_fixed_lengths.len()
    }
}

/// Column translations computed once per sstable open and reused for the
/// lifetime of the reader.
#[derive(Default)]
pub struct ColumnTranslationCache {
    entries: Mutex<HashMap<SchemaId, Arc<ColumnTranslation>>>,
}

impl ColumnTranslationCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_build(
        &self,
        id: SchemaId,
        build: impl FnOnce() -> ColumnTranslation,
    ) -> Arc<ColumnTranslation> {
        let mut entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(entries.entry(id).or_insert_with(|| Arc::new(build())))
    }
}

/// What an open sstable exposes to the mc parser.
pub trait SsTableMeta {
    fn serialization_header(&self) -> &SerializationHeader;
    fn column_translation(&self, schema: &Schema) -> Arc<ColumnTranslation>;
}

/// In-memory sstable metadata with a translation cache, enough to drive the
/// mc parser without the full sstable machinery.
pub struct SsTableInfo {
    header: SerializationHeader,
    translations: ColumnTranslationCache,
}

impl SsTableInfo {
    #[must_use]
    pub fn new(header: SerializationHeader) -> Self {
        Self {
            header,
            translations: ColumnTranslationCache::new(),
        }
    }
}

impl SsTableMeta for SsTableInfo {
    fn serialization_header(&self) -> &SerializationHeader {
        &self.header
    }

    fn column_translation(&self, schema: &Schema) -> Arc<ColumnTranslation> {
        self.translations
            .get_or_build(schema.id, || ColumnTranslation::from_schema(schema))
    }
}
