// Domain-layer modules and shared errors/models
pub mod auth {
    pub use crate::auth::*;
}

pub mod missions {
    pub use crate::missions::*;
}

pub mod models {
    pub use crate::models::*;
}

pub mod unlock {
    pub use crate::unlock::*;
}

pub mod errors {
    pub use crate::errors::*;
}
