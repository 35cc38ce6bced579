//! Schema and direct database access.

pub mod schema {
    pub use crate::schema::*;
}

pub mod db {
    pub use crate::db::*;
}
