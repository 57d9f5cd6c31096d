//! Text helpers shared by the extractor and the feed codec.
//!
//! # Examples
//!
//! ```
//! use mirrorfeed::util::{clean_text, truncate_title};
//!
//! let text = clean_text("<p>Hello   <b>world</b></p>");
//! assert_eq!(text, "Hello world");
//!
//! let title = truncate_title(&text, 8);
//! assert_eq!(title, "Hello…");
//! ```

mod text;

pub use text::{
    clean_text, collapse_whitespace, decode_entities, strip_tags, truncate_title, window_bounds,
};
