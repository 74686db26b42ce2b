//! Git index reading
//!
//! Streams index records one at a time into a reusable [`ParsedIndexEntry`]
//! and splits each path into parts, reusing the parent parts of the previous
//! record whenever only the final segment changed.

pub mod entry;
pub mod parser;
pub mod path_part;


pub use entry::{
    InternedParts, ParsedIndexEntry, PartMaterializer, PlainParts, MAX_PATH_BUFFER_SIZE,
    PATH_SEPARATOR,
};
pub use parser::{read_index_file, IndexParser};
pub use path_part::{fold_case, PathPart, PathPartInterner};
