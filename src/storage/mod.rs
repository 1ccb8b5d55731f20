mod episodes;
mod schema;
mod types;

pub use schema::Database;
pub use types::{decode_pubdate, encode_pubdate, DatabaseError, Episode};
