//! Metric record construction and payload encoding

mod builder;
mod codec;

pub use builder::{build_metric, MetricBuilder, NAME_SEPARATOR};
pub use codec::{PayloadCodec, CONTENT_ENCODING};
