// Probe logic and the shared models/errors it works on
pub mod probe {
    pub use crate::probe::*;
}

pub mod polling {
    pub use crate::polling::*;
}

pub mod fixtures {
    pub use crate::fixtures::*;
}

pub mod models {
    pub use crate::models::*;
}

pub mod errors {
    pub use crate::errors::*;
}
