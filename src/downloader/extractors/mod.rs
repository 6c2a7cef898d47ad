// Metadata extraction
//
// `MetadataSource` is the seam between the resolver and whatever answers
// "what is behind this URL". The CLI source shells out to yt-dlp.

mod cli;
mod traits;

pub use cli::{parse_metadata, CliMetadataSource};
pub use traits::{MetadataSource, RawMetadata};
