//! The download pipeline, leaves first:
//! validate → title → sanitize → process → relay.

pub mod process;
pub mod relay;
pub mod sanitize;
pub mod title;
pub mod validate;

pub use process::Extractor;
pub use relay::Relay;
pub use sanitize::{content_disposition, sanitize_filename};
pub use title::{HttpTitleResolver, TitleResolver};
pub use validate::validate_url;
