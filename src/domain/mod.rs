pub mod account;
pub mod filter;
pub mod language;
pub mod share;
pub mod snippet;
pub mod theme;

pub use account::*;
pub use filter::*;
pub use language::*;
pub use share::*;
pub use snippet::*;
pub use theme::*;
