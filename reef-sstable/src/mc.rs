//! Partition parser for the mc (3.x) data-file layout.
//!
//! A partition opens with a short-length key and a deletion time, then a
//! sequence of unfiltereds (clustering rows and at most one leading static
//! row) terminated by an end-of-partition flag byte. Row bodies are decoded
//! against the file's [`SerializationHeader`] and the schema's
//! [`ColumnTranslation`]: timestamps, TTLs and deletion times arrive as vint
//! deltas, and fixed-width columns omit their value length.
//!
//! Range-tombstone markers and complex (multi-cell) columns are rejected as
//! malformed until implemented.
//!
//! Byte slices handed to [`PartitionConsumer`] callbacks point into
//! parser-internal buffers and are only valid for the duration of the call.

use crate::bitset::DynBitset;
use crate::read::{PrimitiveReader, ReadStatus, TempBuf};
use crate::stream::{Proceed, StateMachine};
use crate::types::{
    ColumnFlags, ColumnId, ColumnInfo, ColumnTranslation, DeletionTime, IndexableElement,
    LivenessInfo, Schema, SerializationHeader, SsTableMeta, Timestamp, UnfilteredExtendedFlags,
    UnfilteredFlags, NO_EXPIRY_LOCAL_DELETION_TIME, NO_TTL,
};
use bytes::Bytes;
use reef_core::{IoPriority, MemoryTracker, ReefError, Result};
use std::sync::Arc;
use tracing::trace;

/// Receives the typed events of one mc partition stream.
pub trait PartitionConsumer {
    /// The partition key and the partition-level deletion time.
    fn consume_partition_start(&mut self, key: &[u8], deletion_time: DeletionTime) -> Proceed;

    /// End of the current partition.
    fn consume_partition_end(&mut self) -> Proceed;

    /// Start of a clustering row. One buffer per clustering column, in
    /// schema order; columns absent from the prefix are empty buffers.
    fn consume_row_start(&mut self, clustering_key: &[TempBuf]) -> Proceed;

    /// Start of the partition's static row.
    fn consume_static_row_start(&mut self) -> Proceed;

    /// One simple column of the current row. Timestamp, TTL and deletion
    /// time are already resolved against the row liveness and the file
    /// header.
    fn consume_column(
        &mut self,
        column_id: Option<ColumnId>,
        value: &[u8],
        timestamp: Timestamp,
        ttl: u32,
        local_deletion_time: u32,
    ) -> Proceed;

    /// End of the current row, with the row's liveness info.
    fn consume_row_end(&mut self, liveness: &LivenessInfo) -> Proceed;

    /// The reader fast-forwarded to `element`; drop any per-partition state.
    fn reset(&mut self, element: IndexableElement) {
        let _ = element;
    }

    /// Tracker the parser charges its transient buffers to.
    fn memory_tracker(&self) -> MemoryTracker {
        MemoryTracker::untracked()
    }

    /// Priority class for reads issued on behalf of this consumer.
    fn io_priority(&self) -> IoPriority {
        IoPriority::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    PartitionStart,
    DeletionTime,
    DeletionTime2,
    DeletionTime3,
    Flags,
    Flags2,
    ExtendedFlags,
    ClusteringRow,
    CkBlock,
    CkBlockHeader,
    CkBlock2,
    CkBlockValueLength,
    CkBlockValueBytes,
    CkBlockEnd,
    ClusteringRowConsume,
    RowBody,
    RowBodySize,
    RowBodyPrevSize,
    RowBodyTimestamp,
    RowBodyTimestampTtl,
    RowBodyTimestampDeltime,
    RowBodyDeletion,
    RowBodyDeletion2,
    RowBodyDeletion3,
    RowBodyMissingColumns,
    RowBodyMissingColumns2,
    RowBodyMissingColumnsReadColumns,
    RowBodyMissingColumnsReadColumns2,
    Column,
    SimpleColumn,
    ComplexColumn,
    NextColumn,
    ColumnFlags,
    ColumnTimestamp,
    ColumnDeletionTime,
    ColumnDeletionTime2,
    ColumnTtl,
    ColumnTtl2,
    ColumnValue,
    ColumnValueLength,
    ColumnValueBytes,
    ColumnEnd,
    RangeTombstoneMarker,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingBuf {
    None,
    Pk,
    Value,
}

/// Which column translation the current unfiltered decodes against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Regular,
    Static,
}

/// State machine decoding the mc partition format.
pub struct PartitionParser<C: PartitionConsumer> {
    consumer: C,
    reader: PrimitiveReader,
    tracker: MemoryTracker,
    header: SerializationHeader,
    translation: Arc<ColumnTranslation>,
    state: State,
    pending_buf: PendingBuf,

    pk: TempBuf,
    flags: UnfilteredFlags,
    extended_flags: UnfilteredExtendedFlags,
    liveness: LivenessInfo,
    is_first_unfiltered: bool,

    row_key: Vec<TempBuf>,
    ck_cursor: usize,
    ck_blocks_header: u64,
    ck_blocks_header_offset: u32,

    column_kind: ColumnKind,
    column_cursor: usize,
    columns_selector: DynBitset,
    missing_columns_to_read: u64,

    column_flags: ColumnFlags,
    column_timestamp: Timestamp,
    column_ttl: u32,
    column_local_deletion_time: u32,
    column_value_length: u32,
    column_value: TempBuf,
}

impl<C: PartitionConsumer> PartitionParser<C> {
    pub fn new(consumer: C, sstable: &dyn SsTableMeta, schema: &Schema) -> Self {
        let tracker = consumer.memory_tracker();
        let header = sstable.serialization_header().clone();
        let translation = sstable.column_translation(schema);
        Self {
            reader: PrimitiveReader::new(tracker.clone()),
            tracker,
            consumer,
            header,
            translation,
            state: State::PartitionStart,
            pending_buf: PendingBuf::None,
            pk: TempBuf::Empty,
            flags: UnfilteredFlags::default(),
            extended_flags: UnfilteredExtendedFlags::default(),
            liveness: LivenessInfo::EMPTY,
            is_first_unfiltered: true,
            row_key: Vec::new(),
            ck_cursor: 0,
            ck_blocks_header: 0,
            ck_blocks_header_offset: 0,
            column_kind: ColumnKind::Regular,
            column_cursor: 0,
            columns_selector: DynBitset::new(),
            missing_columns_to_read: 0,
            column_flags: ColumnFlags::default(),
            column_timestamp: 0,
            column_ttl: 0,
            column_local_deletion_time: 0,
            column_value_length: 0,
            column_value: TempBuf::Empty,
        }
    }

    #[must_use]
    pub fn consumer(&self) -> &C {
        &self.consumer
    }

    pub fn consumer_mut(&mut self) -> &mut C {
        &mut self.consumer
    }

    #[must_use]
    pub fn into_consumer(self) -> C {
        self.consumer
    }

    fn active_columns(&self) -> &[ColumnInfo] {
        match self.column_kind {
            ColumnKind::Regular => &self.translation.regular_columns,
            ColumnKind::Static => &self.translation.static_columns,
        }
    }

    fn setup_columns(&mut self, kind: ColumnKind) {
        self.column_kind = kind;
        self.column_cursor = 0;
    }

    fn no_more_columns(&self) -> bool {
        self.column_cursor >= self.active_columns().len()
    }

    fn skip_absent_columns(&mut self) {
        self.column_cursor = self
            .columns_selector
            .first_set()
            .unwrap_or_else(|| self.active_columns().len());
    }

    fn move_to_next_column(&mut self) {
        self.column_cursor = self
            .columns_selector
            .next_set(self.column_cursor)
            .unwrap_or_else(|| self.active_columns().len());
    }

    /// The translation carries no complex-column metadata; complex layouts
    /// surface through the typed rejection below.
    #[allow(clippy::unused_self)]
    fn is_column_simple(&self) -> bool {
        true
    }

    fn current_column(&self) -> ColumnInfo {
        self.active_columns()[self.column_cursor]
    }

    fn setup_ck(&mut self) {
        self.row_key.clear();
        self.row_key
            .reserve(self.translation.clustering_fixed_lengths.len());
        self.ck_cursor = 0;
        self.ck_blocks_header_offset = 0;
    }

    fn no_more_ck_blocks(&self) -> bool {
        self.ck_cursor >= self.translation.clustering_fixed_lengths.len()
    }

    fn move_to_next_ck_block(&mut self) {
        self.ck_cursor += 1;
        self.ck_blocks_header_offset += 1;
        if self.ck_blocks_header_offset == 32 {
            self.ck_blocks_header_offset = 0;
        }
    }

    fn ck_block_value_length(&self) -> Option<u32> {
        self.translation.clustering_fixed_lengths[self.ck_cursor]
    }

    /// The block header packs two bits per clustering column; only the low
    /// "empty" bit is consulted here.
    fn is_block_empty(&self) -> bool {
        self.ck_blocks_header & (1u64 << (2 * self.ck_blocks_header_offset)) != 0
    }

    fn should_read_block_header(&self) -> bool {
        self.ck_blocks_header_offset == 0
    }

    #[allow(clippy::too_many_lines)]
    fn process_state(&mut self, data: &mut Bytes) -> Result<Proceed> {
        loop {
            match self.state {
                State::PartitionStart => {
                    self.is_first_unfiltered = true;
                    if self.reader.read_short_length_bytes(data, &mut self.pk)
                        == ReadStatus::NeedMoreData
                    {
                        self.pending_buf = PendingBuf::Pk;
                        self.state = State::DeletionTime;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::DeletionTime;
                }
                State::DeletionTime => {
                    if self.reader.read_32(data) == ReadStatus::NeedMoreData {
                        self.state = State::DeletionTime2;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::DeletionTime2;
                }
                State::DeletionTime2 => {
                    if self.reader.read_64(data) == ReadStatus::NeedMoreData {
                        self.state = State::DeletionTime3;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::DeletionTime3;
                }
                State::DeletionTime3 => {
                    let deletion_time = DeletionTime {
                        local_deletion_time: self.reader.u32_val,
                        marked_for_delete_at: self.reader.u64_val as i64,
                    };
                    let ret = self
                        .consumer
                        .consume_partition_start(self.pk.as_slice(), deletion_time);
                    self.pk.release(&self.tracker);
                    self.state = State::Flags;
                    if ret == Proceed::No {
                        return Ok(Proceed::No);
                    }
                }
                State::Flags => {
                    self.liveness.reset();
                    if self.reader.read_8(data) == ReadStatus::NeedMoreData {
                        self.state = State::Flags2;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::Flags2;
                }
                State::Flags2 => {
                    self.flags = UnfilteredFlags::new(self.reader.u8_val);
                    if self.flags.is_end_of_partition() {
                        // partition boundary: hand control back so a stream
                        // ending here verifies at PartitionStart
                        self.state = State::PartitionStart;
                        if self.consumer.consume_partition_end() == Proceed::No {
                            return Ok(Proceed::No);
                        }
                        return Ok(Proceed::Yes);
                    } else if self.flags.is_range_tombstone() {
                        self.state = State::RangeTombstoneMarker;
                    } else if self.flags.has_extended_flags() {
                        if self.reader.read_8(data) == ReadStatus::NeedMoreData {
                            self.state = State::ExtendedFlags;
                            return Ok(Proceed::Yes);
                        }
                        self.state = State::ExtendedFlags;
                    } else {
                        self.extended_flags = UnfilteredExtendedFlags::new(0);
                        self.setup_columns(ColumnKind::Regular);
                        self.state = State::ClusteringRow;
                    }
                }
                State::ExtendedFlags => {
                    self.extended_flags = UnfilteredExtendedFlags::new(self.reader.u8_val);
                    if self.extended_flags.is_static() {
                        if !self.is_first_unfiltered {
                            return Err(ReefError::MalformedSstable(
                                "static row should be a first unfiltered in a partition".into(),
                            ));
                        }
                        self.setup_columns(ColumnKind::Static);
                        self.is_first_unfiltered = false;
                        self.state = State::RowBody;
                        if self.consumer.consume_static_row_start() == Proceed::No {
                            return Ok(Proceed::No);
                        }
                    } else {
                        self.setup_columns(ColumnKind::Regular);
                        self.state = State::ClusteringRow;
                    }
                }
                State::ClusteringRow => {
                    self.is_first_unfiltered = false;
                    self.setup_ck();
                    self.state = State::CkBlock;
                }
                State::CkBlock => {
                    if self.no_more_ck_blocks() {
                        self.state = State::ClusteringRowConsume;
                    } else if !self.should_read_block_header() {
                        self.state = State::CkBlock2;
                    } else {
                        if self.reader.read_unsigned_vint(data) == ReadStatus::NeedMoreData {
                            self.state = State::CkBlockHeader;
                            return Ok(Proceed::Yes);
                        }
                        self.state = State::CkBlockHeader;
                    }
                }
                State::CkBlockHeader => {
                    self.ck_blocks_header = self.reader.u64_val;
                    self.state = State::CkBlock2;
                }
                State::CkBlock2 => {
                    if self.is_block_empty() {
                        self.row_key.push(TempBuf::Empty);
                        self.move_to_next_ck_block();
                        self.state = State::CkBlock;
                    } else if let Some(len) = self.ck_block_value_length() {
                        self.column_value_length = len;
                        self.state = State::CkBlockValueBytes;
                    } else {
                        if self.reader.read_unsigned_vint(data) == ReadStatus::NeedMoreData {
                            self.state = State::CkBlockValueLength;
                            return Ok(Proceed::Yes);
                        }
                        self.state = State::CkBlockValueLength;
                    }
                }
                State::CkBlockValueLength => {
                    self.column_value_length = self.reader.u64_val as u32;
                    self.state = State::CkBlockValueBytes;
                }
                State::CkBlockValueBytes => {
                    if self.reader.read_bytes(
                        data,
                        self.column_value_length as usize,
                        &mut self.column_value,
                    ) == ReadStatus::NeedMoreData
                    {
                        self.pending_buf = PendingBuf::Value;
                        self.state = State::CkBlockEnd;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::CkBlockEnd;
                }
                State::CkBlockEnd => {
                    self.row_key.push(self.column_value.take());
                    self.move_to_next_ck_block();
                    self.state = State::CkBlock;
                }
                State::ClusteringRowConsume => {
                    let ret = self.consumer.consume_row_start(&self.row_key);
                    for buf in &mut self.row_key {
                        buf.release(&self.tracker);
                    }
                    self.row_key.clear();
                    self.state = State::RowBody;
                    if ret == Proceed::No {
                        return Ok(Proceed::No);
                    }
                }
                State::RowBody => {
                    if self.reader.read_unsigned_vint(data) == ReadStatus::NeedMoreData {
                        self.state = State::RowBodySize;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::RowBodySize;
                }
                State::RowBodySize => {
                    // row body size, unused
                    if self.reader.read_unsigned_vint(data) == ReadStatus::NeedMoreData {
                        self.state = State::RowBodyPrevSize;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::RowBodyPrevSize;
                }
                State::RowBodyPrevSize => {
                    // previous row size, unused
                    if !self.flags.has_timestamp() {
                        self.state = State::RowBodyDeletion;
                        continue;
                    }
                    if self.reader.read_unsigned_vint(data) == ReadStatus::NeedMoreData {
                        self.state = State::RowBodyTimestamp;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::RowBodyTimestamp;
                }
                State::RowBodyTimestamp => {
                    self.liveness.timestamp = self.header.parse_timestamp(self.reader.u64_val);
                    if !self.flags.has_ttl() {
                        self.state = State::RowBodyDeletion;
                        continue;
                    }
                    if self.reader.read_unsigned_vint(data) == ReadStatus::NeedMoreData {
                        self.state = State::RowBodyTimestampTtl;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::RowBodyTimestampTtl;
                }
                State::RowBodyTimestampTtl => {
                    self.liveness.ttl = self.header.parse_ttl(self.reader.u64_val);
                    if self.reader.read_unsigned_vint(data) == ReadStatus::NeedMoreData {
                        self.state = State::RowBodyTimestampDeltime;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::RowBodyTimestampDeltime;
                }
                State::RowBodyTimestampDeltime => {
                    self.liveness.local_deletion_time = self.header.parse_expiry(self.reader.u64_val);
                    self.state = State::RowBodyDeletion;
                }
                State::RowBodyDeletion => {
                    if !self.flags.has_deletion() {
                        self.state = State::RowBodyMissingColumns;
                        continue;
                    }
                    if self.reader.read_unsigned_vint(data) == ReadStatus::NeedMoreData {
                        self.state = State::RowBodyDeletion2;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::RowBodyDeletion2;
                }
                State::RowBodyDeletion2 => {
                    // row tombstone marked-for-delete-at, consumed but unused
                    if self.reader.read_unsigned_vint(data) == ReadStatus::NeedMoreData {
                        self.state = State::RowBodyDeletion3;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::RowBodyDeletion3;
                }
                State::RowBodyDeletion3 => {
                    // row tombstone local-deletion-time, consumed but unused
                    self.state = State::RowBodyMissingColumns;
                }
                State::RowBodyMissingColumns => {
                    if self.flags.has_all_columns() {
                        self.columns_selector =
                            DynBitset::filled(self.active_columns().len(), true);
                        self.state = State::Column;
                        continue;
                    }
                    if self.reader.read_unsigned_vint(data) == ReadStatus::NeedMoreData {
                        self.state = State::RowBodyMissingColumns2;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::RowBodyMissingColumns2;
                }
                State::RowBodyMissingColumns2 => {
                    let candidates = self.active_columns().len();
                    let bitmap_or_count = self.reader.u64_val;
                    if candidates < 64 {
                        // a bitmap of missing columns; present is the
                        // complement, truncated to the candidate count
                        self.columns_selector.clear();
                        self.columns_selector.append_word(bitmap_or_count);
                        self.columns_selector.flip_all();
                        self.columns_selector.truncate(candidates);
                        self.skip_absent_columns();
                        self.state = State::Column;
                        continue;
                    }
                    let Some(present) = (candidates as u64).checked_sub(bitmap_or_count) else {
                        return Err(ReefError::MalformedSstable(
                            "missing columns count larger than total columns".into(),
                        ));
                    };
                    if present < candidates as u64 / 2 {
                        self.missing_columns_to_read = present;
                        self.columns_selector = DynBitset::filled(candidates, false);
                    } else {
                        self.missing_columns_to_read = bitmap_or_count;
                        self.columns_selector = DynBitset::filled(candidates, true);
                    }
                    self.state = State::RowBodyMissingColumnsReadColumns;
                }
                State::RowBodyMissingColumnsReadColumns => {
                    if self.missing_columns_to_read == 0 {
                        self.skip_absent_columns();
                        self.state = State::Column;
                        continue;
                    }
                    self.missing_columns_to_read -= 1;
                    if self.reader.read_unsigned_vint(data) == ReadStatus::NeedMoreData {
                        self.state = State::RowBodyMissingColumnsReadColumns2;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::RowBodyMissingColumnsReadColumns2;
                }
                State::RowBodyMissingColumnsReadColumns2 => {
                    let index = self.reader.u64_val as usize;
                    if index >= self.columns_selector.len() {
                        return Err(ReefError::MalformedSstable(
                            "column index out of range".into(),
                        ));
                    }
                    self.columns_selector.flip(index);
                    self.state = State::RowBodyMissingColumnsReadColumns;
                }
                State::Column => {
                    if self.no_more_columns() {
                        self.state = State::Flags;
                        if self.consumer.consume_row_end(&self.liveness) == Proceed::No {
                            return Ok(Proceed::No);
                        }
                        continue;
                    }
                    if self.is_column_simple() {
                        self.state = State::SimpleColumn;
                    } else {
                        self.state = State::ComplexColumn;
                    }
                }
                State::SimpleColumn => {
                    if self.reader.read_8(data) == ReadStatus::NeedMoreData {
                        self.state = State::ColumnFlags;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::ColumnFlags;
                }
                State::ColumnFlags => {
                    self.column_flags = ColumnFlags::new(self.reader.u8_val);
                    if self.column_flags.use_row_timestamp() {
                        self.column_timestamp = self.liveness.timestamp;
                        self.state = State::ColumnDeletionTime;
                        continue;
                    }
                    if self.reader.read_unsigned_vint(data) == ReadStatus::NeedMoreData {
                        self.state = State::ColumnTimestamp;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::ColumnTimestamp;
                }
                State::ColumnTimestamp => {
                    self.column_timestamp = self.header.parse_timestamp(self.reader.u64_val);
                    self.state = State::ColumnDeletionTime;
                }
                State::ColumnDeletionTime => {
                    if self.column_flags.use_row_ttl() {
                        self.column_local_deletion_time = self.liveness.local_deletion_time;
                        self.state = State::ColumnTtl;
                        continue;
                    }
                    if !self.column_flags.is_deleted() && !self.column_flags.is_expiring() {
                        self.column_local_deletion_time = NO_EXPIRY_LOCAL_DELETION_TIME;
                        self.state = State::ColumnTtl;
                        continue;
                    }
                    if self.reader.read_unsigned_vint(data) == ReadStatus::NeedMoreData {
                        self.state = State::ColumnDeletionTime2;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::ColumnDeletionTime2;
                }
                State::ColumnDeletionTime2 => {
                    self.column_local_deletion_time = self.header.parse_expiry(self.reader.u64_val);
                    self.state = State::ColumnTtl;
                }
                State::ColumnTtl => {
                    if self.column_flags.use_row_timestamp() {
                        self.column_ttl = self.liveness.ttl;
                        self.state = State::ColumnValue;
                        continue;
                    }
                    if !self.column_flags.is_expiring() {
                        self.column_ttl = NO_TTL;
                        self.state = State::ColumnValue;
                        continue;
                    }
                    if self.reader.read_unsigned_vint(data) == ReadStatus::NeedMoreData {
                        self.state = State::ColumnTtl2;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::ColumnTtl2;
                }
                State::ColumnTtl2 => {
                    self.column_ttl = self.header.parse_ttl(self.reader.u64_val);
                    self.state = State::ColumnValue;
                }
                State::ColumnValue => {
                    if !self.column_flags.has_value() {
                        self.column_value = TempBuf::Empty;
                        self.state = State::ColumnEnd;
                        continue;
                    }
                    if let Some(len) = self.current_column().value_fixed_length {
                        self.column_value_length = len;
                        self.state = State::ColumnValueBytes;
                        continue;
                    }
                    if self.reader.read_unsigned_vint(data) == ReadStatus::NeedMoreData {
                        self.state = State::ColumnValueLength;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::ColumnValueLength;
                }
                State::ColumnValueLength => {
                    self.column_value_length = self.reader.u64_val as u32;
                    self.state = State::ColumnValueBytes;
                }
                State::ColumnValueBytes => {
                    if self.reader.read_bytes(
                        data,
                        self.column_value_length as usize,
                        &mut self.column_value,
                    ) == ReadStatus::NeedMoreData
                    {
                        self.pending_buf = PendingBuf::Value;
                        self.state = State::ColumnEnd;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::ColumnEnd;
                }
                State::ColumnEnd => {
                    self.state = State::NextColumn;
                    let column_id = self.current_column().id;
                    let ret = self.consumer.consume_column(
                        column_id,
                        self.column_value.as_slice(),
                        self.column_timestamp,
                        self.column_ttl,
                        self.column_local_deletion_time,
                    );
                    self.column_value.release(&self.tracker);
                    if ret == Proceed::No {
                        return Ok(Proceed::No);
                    }
                }
                State::NextColumn => {
                    self.move_to_next_column();
                    self.state = State::Column;
                }
                State::ComplexColumn => {
                    return Err(ReefError::MalformedSstable(
                        "unimplemented state: complex columns not supported".into(),
                    ));
                }
                State::RangeTombstoneMarker => {
                    return Err(ReefError::MalformedSstable("unimplemented state".into()));
                }
            }
        }
    }
}

impl<C: PartitionConsumer> StateMachine for PartitionParser<C> {
    fn process(&mut self, data: &mut Bytes) -> Result<Proceed> {
        trace!(
            target: "reef::sstable::mc",
            state = ?self.state,
            len = data.len(),
            "process"
        );
        if self.reader.has_pending() {
            let status = match self.pending_buf {
                PendingBuf::Pk => self.reader.continue_pending(data, Some(&mut self.pk)),
                PendingBuf::Value => self
                    .reader
                    .continue_pending(data, Some(&mut self.column_value)),
                PendingBuf::None => self.reader.continue_pending(data, None),
            };
            if status == ReadStatus::NeedMoreData {
                return Ok(Proceed::Yes);
            }
            self.pending_buf = PendingBuf::None;
        }
        self.process_state(data)
    }

    fn non_consuming(&self) -> bool {
        matches!(
            self.state,
            State::DeletionTime3
                | State::Flags2
                | State::ExtendedFlags
                | State::ClusteringRow
                | State::CkBlockHeader
                | State::CkBlockValueLength
                | State::CkBlockEnd
                | State::ClusteringRowConsume
                | State::RowBodyTimestampDeltime
                | State::RowBodyDeletion3
                | State::RowBodyMissingColumns2
                | State::RowBodyMissingColumnsReadColumns2
                | State::Column
                | State::NextColumn
                | State::ColumnTimestamp
                | State::ColumnDeletionTime2
                | State::ColumnTtl2
                | State::ColumnValueLength
                | State::ColumnEnd
        ) && !self.reader.has_pending()
    }

    fn verify_end_state(&mut self) -> Result<()> {
        if self.state != State::PartitionStart || self.reader.has_pending() {
            return Err(ReefError::UnexpectedEof(
                "end of input, but not end of partition".into(),
            ));
        }
        Ok(())
    }

    fn reset(&mut self, element: IndexableElement) -> Result<()> {
        match element {
            IndexableElement::Partition => {
                self.state = State::PartitionStart;
            }
            IndexableElement::Cell => {
                return Err(ReefError::Unsupported(
                    "fast-forward to a cell is not supported by this format",
                ));
            }
        }
        self.reader.clear_pending();
        self.pending_buf = PendingBuf::None;
        self.pk.release(&self.tracker);
        self.column_value.release(&self.tracker);
        for buf in &mut self.row_key {
            buf.release(&self.tracker);
        }
        self.row_key.clear();
        self.consumer.reset(element);
        Ok(())
    }
}
