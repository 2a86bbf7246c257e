#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod bitset;
mod legacy;
mod mc;
mod read;
mod stream;
mod types;

pub use legacy::{RowConsumer, RowParser};
pub use mc::{PartitionConsumer, PartitionParser};
pub use read::{PrimitiveReader, ReadStatus, TempBuf};
pub use stream::{ChunkStream, DriveOutcome, Proceed, SliceStream, StateMachine, StreamDriver};
pub use types::{
    ColumnFlags, ColumnId, ColumnInfo, ColumnMask, ColumnTranslation, ColumnTranslationCache,
    DeletionTime, IndexableElement, LivenessInfo, Schema, SchemaId, SerializationHeader,
    SsTableInfo, SsTableMeta, Timestamp, UnfilteredExtendedFlags, UnfilteredFlags, NO_TIMESTAMP,
    NO_TTL, NO_EXPIRY_LOCAL_DELETION_TIME,
};
