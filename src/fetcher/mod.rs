pub mod archive_fetcher;
pub mod unpacker;

pub use archive_fetcher::{ArchiveFetcher, DownloadProgress, FetchOutcome};
pub use unpacker::{ArchiveUnpacker, ExtractedTree};
