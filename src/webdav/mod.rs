//! Generic WebDAV layer: the item model and multistatus decoder shared by
//! every CalDAV report type.

pub mod types;
pub mod xml;

pub use types::{DavItem, Depth, MultistatusResult, ResponseOutcome, status_code};
pub use xml::{escape_xml, parse_multistatus};
