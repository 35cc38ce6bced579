//! Hosted backend API clients.

pub mod auth_client {
    pub use crate::auth_client::*;
}

pub mod client {
    pub use crate::client::*;
}

pub mod rest_client {
    pub use crate::rest_client::*;
}

pub mod storage_client {
    pub use crate::storage_client::*;
}
