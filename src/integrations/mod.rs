//! External service integrations.

pub mod llm_client {
    pub use crate::llm_client::*;
}

pub mod payment_client {
    pub use crate::payment_client::*;
}

pub mod payment_models {
    pub use crate::payment_models::*;
}

pub mod webhook_models {
    pub use crate::webhook_models::*;
}
