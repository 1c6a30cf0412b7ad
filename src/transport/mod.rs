pub mod streamable;
pub mod traits;

pub use streamable::{StreamableHttpFactory, StreamableHttpOptions, StreamableHttpTransport};
pub use traits::{Link, LinkFactory};
