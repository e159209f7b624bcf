pub mod clipboard_service;
pub mod preferences_service;
pub mod search_service;
pub mod session_service;
pub mod share_service;
pub mod sync_service;
pub mod validation;

pub use clipboard_service::*;
pub use preferences_service::*;
pub use search_service::*;
pub use session_service::*;
pub use share_service::*;
pub use sync_service::*;
pub use validation::*;
