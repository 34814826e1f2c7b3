mod parse;
mod source;

pub use parse::{Enclosure, Feed, FeedEntry, parse_feed};
pub use source::{FeedSource, FetchResult, HttpFeedSource, MAX_REDIRECTS, STATUS_NOT_MODIFIED};
