//! Row parser for the legacy data-file layout.
//!
//! The layout is a sequence of rows. Each row opens with a short-length key
//! and the row deletion time, followed by atoms: cells, counter cells,
//! expiring cells, cell tombstones and range tombstones. A zero-length atom
//! name marks the end of the row.
//!
//! Events are delivered to a [`RowConsumer`]. The name, key and value slices
//! passed to the callbacks point into parser-internal buffers and are only
//! valid for the duration of the call; a consumer that keeps them must copy
//! the contents.

use crate::read::{PrimitiveReader, ReadStatus, TempBuf};
use crate::stream::{Proceed, StateMachine};
use crate::types::{ColumnMask, DeletionTime, IndexableElement, Timestamp};
use bytes::Bytes;
use reef_core::{IoPriority, MemoryTracker, ReefError, Result};
use tracing::trace;

/// Receives the typed events of one legacy row stream.
///
/// Every callback returns a verdict: [`Proceed::No`] stops the parse after
/// the current event. The parser keeps enough state to resume, so the driver
/// can be re-run to deliver the remaining events.
pub trait RowConsumer {
    /// The row key and its deletion time. The deletion time decides whether
    /// the row is a tombstone. The key is in serialized form.
    fn consume_row_start(&mut self, key: &[u8], deletion_time: DeletionTime) -> Proceed;

    /// One live cell. For expiring cells `ttl` is the time to live in seconds
    /// and `expiration` the absolute expiry in seconds since the epoch; both
    /// are zero for cells that do not expire.
    fn consume_cell(
        &mut self,
        name: &[u8],
        value: &[u8],
        timestamp: Timestamp,
        ttl: u32,
        expiration: u32,
    ) -> Proceed;

    /// One counter cell.
    fn consume_counter_cell(&mut self, name: &[u8], value: &[u8], timestamp: Timestamp)
        -> Proceed;

    /// One cell tombstone.
    fn consume_deleted_cell(&mut self, name: &[u8], deletion_time: DeletionTime) -> Proceed;

    /// One shadowable row tombstone.
    fn consume_shadowable_row_tombstone(
        &mut self,
        name: &[u8],
        deletion_time: DeletionTime,
    ) -> Proceed;

    /// One range tombstone covering `[start, end]`.
    fn consume_range_tombstone(
        &mut self,
        start: &[u8],
        end: &[u8],
        deletion_time: DeletionTime,
    ) -> Proceed;

    /// End of the current row.
    fn consume_row_end(&mut self) -> Proceed;

    /// The reader fast-forwarded to `element`; drop any per-row state.
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
    RowStart,
    DeletionTime,
    DeletionTime2,
    DeletionTime3,
    AtomStart,
    AtomStart2,
    AtomMask,
    AtomMask2,
    CounterCell,
    CounterCell2,
    ExpiringCell,
    ExpiringCell2,
    ExpiringCell3,
    Cell,
    Cell2,
    CellValueBytes,
    CellValueBytes2,
    RangeTombstone,
    RangeTombstone2,
    RangeTombstone3,
    RangeTombstone4,
    StopThenAtomStart,
}

/// Which parser buffer a parked byte read deposits into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingBuf {
    None,
    Key,
    Val,
}

/// State machine decoding the legacy row format.
pub struct RowParser<C: RowConsumer> {
    consumer: C,
    reader: PrimitiveReader,
    tracker: MemoryTracker,
    state: State,
    pending_buf: PendingBuf,
    key: TempBuf,
    val: TempBuf,
    deleted: bool,
    counter: bool,
    shadowable: bool,
    ttl: u32,
    expiration: u32,
}

impl<C: RowConsumer> RowParser<C> {
    pub fn new(consumer: C) -> Self {
        let tracker = consumer.memory_tracker();
        Self {
            reader: PrimitiveReader::new(tracker.clone()),
            tracker,
            consumer,
            state: State::RowStart,
            pending_buf: PendingBuf::None,
            key: TempBuf::Empty,
            val: TempBuf::Empty,
            deleted: false,
            counter: false,
            shadowable: false,
            ttl: 0,
            expiration: 0,
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

    /// Hand control back to the driver before decoding the next atom. Used
    /// by the reader after re-positioning mid-row, so the caller re-checks
    /// its clustering filter before more cells stream in.
    pub fn stop_at_next_atom(&mut self) {
        self.state = State::StopThenAtomStart;
    }

    fn process_state(&mut self, data: &mut Bytes) -> Result<Proceed> {
        loop {
            match self.state {
                State::RowStart => {
                    if self.reader.read_short_length_bytes(data, &mut self.key)
                        == ReadStatus::NeedMoreData
                    {
                        self.pending_buf = PendingBuf::Key;
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
                        .consume_row_start(self.key.as_slice(), deletion_time);
                    self.key.release(&self.tracker);
                    self.state = State::AtomStart;
                    if ret == Proceed::No {
                        return Ok(Proceed::No);
                    }
                }
                State::AtomStart => {
                    if self.reader.read_short_length_bytes(data, &mut self.key)
                        == ReadStatus::NeedMoreData
                    {
                        self.pending_buf = PendingBuf::Key;
                        self.state = State::AtomStart2;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::AtomStart2;
                }
                State::AtomStart2 => {
                    if self.reader.u16_val == 0 {
                        // zero-length atom name is the end-of-row marker
                        self.state = State::RowStart;
                        if self.consumer.consume_row_end() == Proceed::No {
                            return Ok(Proceed::No);
                        }
                    } else {
                        self.state = State::AtomMask;
                    }
                    return Ok(Proceed::Yes);
                }
                State::AtomMask => {
                    if self.reader.read_8(data) == ReadStatus::NeedMoreData {
                        self.state = State::AtomMask2;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::AtomMask2;
                }
                State::AtomMask2 => {
                    let mask = ColumnMask::new(self.reader.u8_val);
                    if mask.is_range_tombstone() || mask.is_shadowable() {
                        self.shadowable = mask.is_shadowable();
                        self.state = State::RangeTombstone;
                    } else if mask.is_counter() {
                        self.deleted = false;
                        self.counter = true;
                        self.state = State::CounterCell;
                    } else if mask.is_expiration() {
                        self.deleted = false;
                        self.counter = false;
                        self.state = State::ExpiringCell;
                    } else {
                        if mask.is_counter_update() {
                            return Err(ReefError::MalformedSstable(
                                "FIXME COUNTER_UPDATE_MASK".into(),
                            ));
                        }
                        self.ttl = 0;
                        self.expiration = 0;
                        self.deleted = mask.is_deletion();
                        self.counter = false;
                        self.state = State::Cell;
                    }
                    return Ok(Proceed::Yes);
                }
                State::CounterCell => {
                    if self.reader.read_64(data) == ReadStatus::NeedMoreData {
                        self.state = State::CounterCell2;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::CounterCell2;
                }
                State::CounterCell2 => {
                    // timestamp of last deletion, read and discarded
                    self.state = State::Cell;
                }
                State::ExpiringCell => {
                    if self.reader.read_32(data) == ReadStatus::NeedMoreData {
                        self.state = State::ExpiringCell2;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::ExpiringCell2;
                }
                State::ExpiringCell2 => {
                    self.ttl = self.reader.u32_val;
                    if self.reader.read_32(data) == ReadStatus::NeedMoreData {
                        self.state = State::ExpiringCell3;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::ExpiringCell3;
                }
                State::ExpiringCell3 => {
                    self.expiration = self.reader.u32_val;
                    self.state = State::Cell;
                }
                State::Cell => {
                    // the cell timestamp precedes the value length on the wire
                    if self.reader.read_64(data) == ReadStatus::NeedMoreData {
                        self.state = State::Cell2;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::Cell2;
                }
                State::Cell2 => {
                    if self.reader.read_32(data) == ReadStatus::NeedMoreData {
                        self.state = State::CellValueBytes;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::CellValueBytes;
                }
                State::CellValueBytes => {
                    let len = self.reader.u32_val as usize;
                    if self.reader.read_bytes(data, len, &mut self.val)
                        == ReadStatus::NeedMoreData
                    {
                        self.pending_buf = PendingBuf::Val;
                        self.state = State::CellValueBytes2;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::CellValueBytes2;
                }
                State::CellValueBytes2 => {
                    return self.flush_cell();
                }
                State::RangeTombstone => {
                    if self.reader.read_short_length_bytes(data, &mut self.val)
                        == ReadStatus::NeedMoreData
                    {
                        self.pending_buf = PendingBuf::Val;
                        self.state = State::RangeTombstone2;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::RangeTombstone2;
                }
                State::RangeTombstone2 => {
                    if self.reader.read_32(data) == ReadStatus::NeedMoreData {
                        self.state = State::RangeTombstone3;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::RangeTombstone3;
                }
                State::RangeTombstone3 => {
                    if self.reader.read_64(data) == ReadStatus::NeedMoreData {
                        self.state = State::RangeTombstone4;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::RangeTombstone4;
                }
                State::RangeTombstone4 => {
                    let deletion_time = DeletionTime {
                        local_deletion_time: self.reader.u32_val,
                        marked_for_delete_at: self.reader.u64_val as i64,
                    };
                    let ret = if self.shadowable {
                        self.consumer
                            .consume_shadowable_row_tombstone(self.key.as_slice(), deletion_time)
                    } else {
                        self.consumer.consume_range_tombstone(
                            self.key.as_slice(),
                            self.val.as_slice(),
                            deletion_time,
                        )
                    };
                    self.key.release(&self.tracker);
                    self.val.release(&self.tracker);
                    self.state = State::AtomStart;
                    if ret == Proceed::No {
                        return Ok(Proceed::No);
                    }
                    return Ok(Proceed::Yes);
                }
                State::StopThenAtomStart => {
                    self.state = State::AtomStart;
                    return Ok(Proceed::No);
                }
            }
        }
    }

    fn flush_cell(&mut self) -> Result<Proceed> {
        let timestamp = self.reader.u64_val as i64;
        let ret = if self.deleted {
            if self.val.len() != 4 {
                return Err(ReefError::MalformedSstable(
                    "deleted cell expects local_deletion_time value".into(),
                ));
            }
            let value = self.val.as_slice();
            let deletion_time = DeletionTime {
                local_deletion_time: u32::from_be_bytes([value[0], value[1], value[2], value[3]]),
                marked_for_delete_at: timestamp,
            };
            self.consumer
                .consume_deleted_cell(self.key.as_slice(), deletion_time)
        } else if self.counter {
            self.consumer
                .consume_counter_cell(self.key.as_slice(), self.val.as_slice(), timestamp)
        } else {
            self.consumer.consume_cell(
                self.key.as_slice(),
                self.val.as_slice(),
                timestamp,
                self.ttl,
                self.expiration,
            )
        };
        self.key.release(&self.tracker);
        self.val.release(&self.tracker);
        self.state = State::AtomStart;
        if ret == Proceed::No {
            return Ok(Proceed::No);
        }
        Ok(Proceed::Yes)
    }
}

impl<C: RowConsumer> StateMachine for RowParser<C> {
    fn process(&mut self, data: &mut Bytes) -> Result<Proceed> {
        trace!(
            target: "reef::sstable::legacy",
            state = ?self.state,
            len = data.len(),
            "process"
        );
        if self.reader.has_pending() {
            let status = match self.pending_buf {
                PendingBuf::Key => self.reader.continue_pending(data, Some(&mut self.key)),
                PendingBuf::Val => self.reader.continue_pending(data, Some(&mut self.val)),
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
                | State::CellValueBytes2
                | State::AtomStart2
                | State::AtomMask2
                | State::StopThenAtomStart
                | State::CounterCell2
                | State::RangeTombstone4
                | State::ExpiringCell3
        ) && !self.reader.has_pending()
    }

    fn verify_end_state(&mut self) -> Result<()> {
        // A partial row (a clustering filter cutting the read short) may
        // legally end between atoms; the end-of-row marker was never read,
        // so deliver the row end here.
        if self.state == State::AtomStart || self.state == State::AtomStart2 {
            let _ = self.consumer.consume_row_end();
            return Ok(());
        }
        if self.state != State::RowStart || self.reader.has_pending() {
            return Err(ReefError::UnexpectedEof(
                "end of input, but not end of row".into(),
            ));
        }
        Ok(())
    }

    fn reset(&mut self, element: IndexableElement) -> Result<()> {
        self.state = match element {
            IndexableElement::Partition => State::RowStart,
            IndexableElement::Cell => State::AtomStart,
        };
        self.reader.clear_pending();
        self.pending_buf = PendingBuf::None;
        self.key.release(&self.tracker);
        self.val.release(&self.tracker);
        self.consumer.reset(element);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::stream::{DriveOutcome, SliceStream, StreamDriver};

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        RowStart(Vec<u8>, DeletionTime),
        Cell(Vec<u8>, Vec<u8>, Timestamp, u32, u32),
        CounterCell(Vec<u8>, Vec<u8>, Timestamp),
        DeletedCell(Vec<u8>, DeletionTime),
        ShadowableTombstone(Vec<u8>, DeletionTime),
        RangeTombstone(Vec<u8>, Vec<u8>, DeletionTime),
        RowEnd,
    }

    #[derive(Default)]
    struct Recorder {
        events: Vec<Event>,
    }

    impl RowConsumer for Recorder {
        fn consume_row_start(&mut self, key: &[u8], deletion_time: DeletionTime) -> Proceed {
            self.events
                .push(Event::RowStart(key.to_vec(), deletion_time));
            Proceed::Yes
        }

        fn consume_cell(
            &mut self,
            name: &[u8],
            value: &[u8],
            timestamp: Timestamp,
            ttl: u32,
            expiration: u32,
        ) -> Proceed {
            self.events.push(Event::Cell(
                name.to_vec(),
                value.to_vec(),
                timestamp,
                ttl,
                expiration,
            ));
            Proceed::Yes
        }

        fn consume_counter_cell(
            &mut self,
            name: &[u8],
            value: &[u8],
            timestamp: Timestamp,
        ) -> Proceed {
            self.events
                .push(Event::CounterCell(name.to_vec(), value.to_vec(), timestamp));
            Proceed::Yes
        }

        fn consume_deleted_cell(&mut self, name: &[u8], deletion_time: DeletionTime) -> Proceed {
            self.events
                .push(Event::DeletedCell(name.to_vec(), deletion_time));
            Proceed::Yes
        }

        fn consume_shadowable_row_tombstone(
            &mut self,
            name: &[u8],
            deletion_time: DeletionTime,
        ) -> Proceed {
            self.events
                .push(Event::ShadowableTombstone(name.to_vec(), deletion_time));
            Proceed::Yes
        }

        fn consume_range_tombstone(
            &mut self,
            start: &[u8],
            end: &[u8],
            deletion_time: DeletionTime,
        ) -> Proceed {
            self.events.push(Event::RangeTombstone(
                start.to_vec(),
                end.to_vec(),
                deletion_time,
            ));
            Proceed::Yes
        }

        fn consume_row_end(&mut self) -> Proceed {
            self.events.push(Event::RowEnd);
            Proceed::Yes
        }
    }

    fn short_bytes(payload: &[u8]) -> Vec<u8> {
        let mut out = (payload.len() as u16).to_be_bytes().to_vec();
        out.extend_from_slice(payload);
        out
    }

    fn live_row_header(key: &[u8]) -> Vec<u8> {
        let mut out = short_bytes(key);
        out.extend_from_slice(&u32::MAX.to_be_bytes());
        out.extend_from_slice(&i64::MIN.to_be_bytes());
        out
    }

    fn parse(stream: &[u8]) -> Vec<Event> {
        let parser = RowParser::new(Recorder::default());
        let mut driver = StreamDriver::new(
            parser,
            SliceStream::whole(stream.to_vec()),
            stream.len() as u64,
        );
        assert_eq!(driver.run().unwrap(), DriveOutcome::Done);
        driver.into_machine().into_consumer().events
    }

    fn live_cell_row() -> Vec<u8> {
        let mut stream = live_row_header(b"pk0");
        stream.extend_from_slice(&short_bytes(b"colX"));
        stream.push(0x00); // mask: plain live cell
        stream.extend_from_slice(&10i64.to_be_bytes());
        stream.extend_from_slice(&3u32.to_be_bytes());
        stream.extend_from_slice(b"abc");
        stream.extend_from_slice(&[0x00, 0x00]); // end-of-row marker
        stream
    }

    #[test]
    fn test_live_cell_row() {
        let events = parse(&live_cell_row());
        assert_eq!(
            events,
            vec![
                Event::RowStart(b"pk0".to_vec(), DeletionTime::LIVE),
                Event::Cell(b"colX".to_vec(), b"abc".to_vec(), 10, 0, 0),
                Event::RowEnd,
            ]
        );
    }

    #[test]
    fn test_deleted_cell() {
        let mut stream = live_row_header(b"pk0");
        stream.extend_from_slice(&short_bytes(b"dead"));
        stream.push(0x01); // deletion mask
        stream.extend_from_slice(&77i64.to_be_bytes());
        stream.extend_from_slice(&4u32.to_be_bytes());
        stream.extend_from_slice(&1234u32.to_be_bytes()); // local_deletion_time payload
        stream.extend_from_slice(&[0x00, 0x00]);

        let events = parse(&stream);
        assert_eq!(
            events[1],
            Event::DeletedCell(
                b"dead".to_vec(),
                DeletionTime {
                    local_deletion_time: 1234,
                    marked_for_delete_at: 77,
                }
            )
        );
    }

    #[test]
    fn test_deleted_cell_with_bad_value_length() {
        let mut stream = live_row_header(b"pk0");
        stream.extend_from_slice(&short_bytes(b"dead"));
        stream.push(0x01);
        stream.extend_from_slice(&77i64.to_be_bytes());
        stream.extend_from_slice(&3u32.to_be_bytes());
        stream.extend_from_slice(b"abc");

        let parser = RowParser::new(Recorder::default());
        let mut driver =
            StreamDriver::new(parser, SliceStream::whole(stream.clone()), stream.len() as u64);
        let err = driver.run().unwrap_err();
        assert!(matches!(err, ReefError::MalformedSstable(reason)
            if reason == "deleted cell expects local_deletion_time value"));
    }

    #[test]
    fn test_counter_update_mask_rejected() {
        let mut stream = live_row_header(b"pk0");
        stream.extend_from_slice(&short_bytes(b"ctr"));
        stream.push(0x08); // counter update mask

        let parser = RowParser::new(Recorder::default());
        let mut driver =
            StreamDriver::new(parser, SliceStream::whole(stream.clone()), stream.len() as u64);
        let err = driver.run().unwrap_err();
        assert!(
            matches!(err, ReefError::MalformedSstable(reason) if reason == "FIXME COUNTER_UPDATE_MASK")
        );
    }

    #[test]
    fn test_counter_cell_discards_last_deletion_timestamp() {
        let mut stream = live_row_header(b"pk0");
        stream.extend_from_slice(&short_bytes(b"cnt"));
        stream.push(0x04); // counter mask
        stream.extend_from_slice(&99i64.to_be_bytes()); // timestamp of last deletion
        stream.extend_from_slice(&55i64.to_be_bytes());
        stream.extend_from_slice(&2u32.to_be_bytes());
        stream.extend_from_slice(b"vv");
        stream.extend_from_slice(&[0x00, 0x00]);

        let events = parse(&stream);
        assert_eq!(
            events[1],
            Event::CounterCell(b"cnt".to_vec(), b"vv".to_vec(), 55)
        );
    }

    #[test]
    fn test_expiring_cell() {
        let mut stream = live_row_header(b"pk0");
        stream.extend_from_slice(&short_bytes(b"exp"));
        stream.push(0x02); // expiration mask
        stream.extend_from_slice(&300u32.to_be_bytes()); // ttl
        stream.extend_from_slice(&5000u32.to_be_bytes()); // expiration
        stream.extend_from_slice(&21i64.to_be_bytes());
        stream.extend_from_slice(&1u32.to_be_bytes());
        stream.push(b'x');
        stream.extend_from_slice(&[0x00, 0x00]);

        let events = parse(&stream);
        assert_eq!(
            events[1],
            Event::Cell(b"exp".to_vec(), b"x".to_vec(), 21, 300, 5000)
        );
    }

    #[test]
    fn test_range_and_shadowable_tombstones() {
        let deletion = DeletionTime {
            local_deletion_time: 400,
            marked_for_delete_at: 9000,
        };
        let mut stream = live_row_header(b"pk0");
        stream.extend_from_slice(&short_bytes(b"aa"));
        stream.push(0x10); // range tombstone mask
        stream.extend_from_slice(&short_bytes(b"bb"));
        stream.extend_from_slice(&400u32.to_be_bytes());
        stream.extend_from_slice(&9000i64.to_be_bytes());
        stream.extend_from_slice(&short_bytes(b"cc"));
        stream.push(0x40); // shadowable mask
        stream.extend_from_slice(&short_bytes(b"dd"));
        stream.extend_from_slice(&400u32.to_be_bytes());
        stream.extend_from_slice(&9000i64.to_be_bytes());
        stream.extend_from_slice(&[0x00, 0x00]);

        let events = parse(&stream);
        assert_eq!(
            events[1..],
            [
                Event::RangeTombstone(b"aa".to_vec(), b"bb".to_vec(), deletion),
                Event::ShadowableTombstone(b"cc".to_vec(), deletion),
                Event::RowEnd,
            ]
        );
    }

    #[test]
    fn test_partial_row_clemency_synthesizes_row_end() {
        // Stream cut between atoms: row header plus one full cell, no marker.
        let mut stream = live_row_header(b"pk0");
        stream.extend_from_slice(&short_bytes(b"colX"));
        stream.push(0x00);
        stream.extend_from_slice(&10i64.to_be_bytes());
        stream.extend_from_slice(&0u32.to_be_bytes());

        let events = parse(&stream);
        assert_eq!(events.last(), Some(&Event::RowEnd));
    }

    #[test]
    fn test_truncation_inside_header_rejected() {
        let stream = &live_row_header(b"pk0")[..7];
        let parser = RowParser::new(Recorder::default());
        let mut driver =
            StreamDriver::new(parser, SliceStream::whole(stream.to_vec()), stream.len() as u64);
        assert!(matches!(
            driver.run().unwrap_err(),
            ReefError::UnexpectedEof(_)
        ));
    }

    #[test]
    fn test_stop_at_next_atom_yields_before_the_atom() {
        // an atom stream with no row header, as seen after a mid-row seek
        let mut stream = short_bytes(b"colX");
        stream.push(0x00);
        stream.extend_from_slice(&10i64.to_be_bytes());
        stream.extend_from_slice(&3u32.to_be_bytes());
        stream.extend_from_slice(b"abc");
        stream.extend_from_slice(&[0x00, 0x00]);

        let parser = RowParser::new(Recorder::default());
        let mut driver = StreamDriver::new(
            parser,
            SliceStream::whole(stream.clone()),
            stream.len() as u64,
        );
        driver.machine_mut().reset(IndexableElement::Cell).unwrap();
        driver.machine_mut().stop_at_next_atom();

        assert_eq!(driver.run().unwrap(), DriveOutcome::Stopped);
        assert!(driver.machine().consumer().events.is_empty());

        assert_eq!(driver.run().unwrap(), DriveOutcome::Done);
        assert_eq!(
            driver.into_machine().into_consumer().events,
            vec![
                Event::Cell(b"colX".to_vec(), b"abc".to_vec(), 10, 0, 0),
                Event::RowEnd,
            ]
        );
    }

    #[test]
    fn test_reset_targets() {
        let mut parser = RowParser::new(Recorder::default());
        parser.reset(IndexableElement::Cell).unwrap();
        assert_eq!(parser.state, State::AtomStart);
        parser.reset(IndexableElement::Partition).unwrap();
        assert_eq!(parser.state, State::RowStart);
    }
}
