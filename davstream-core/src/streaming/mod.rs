//! Range-aware streaming primitives.
//!
//! The resilient remote reader, chunk planning, range validation, response
//! heads and the tee used to fan transformed output out to the cache.

pub mod chunk_planner;
pub mod media_info;
pub mod range;
pub mod response;
pub mod source;
pub mod tee;

pub use chunk_planner::ChunkPlanner;
pub use media_info::{BandwidthClass, MediaCategory, categorize, extension_of, is_hls};
pub use range::{ByteRange, RangeSpec, parse_range_header};
pub use response::{ContentMeta, ResponseAssembler, ResponseHead};
pub use source::{
    MemoryUsageObserver, RemoteStreamSource, SourceError, SourceResult, SourceStream,
    TransferObserver,
};
pub use tee::{TeeOutcome, TeeReceiver, TeeStream};
