mod download;
mod filename;

pub use download::{DownloadContext, DownloadOutcome, Downloader, PARTIAL_SUFFIX, partial_path};
pub use filename::{
    ContentTypes, FilenameGenerator, MAX_COLLISION_ATTEMPTS, Placeholders, build_placeholders,
    prettify, render, resolve_collision,
};
