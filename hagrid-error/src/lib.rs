pub mod error_code;
pub mod ext;
pub mod macros;
pub mod stack;
pub mod types;

// Publicly re-export all error types and functions from the submodules to
// simplify access from external code.
pub use error_code::*;
pub use ext::*;
pub use macros::*;
pub use stack::*;
pub use types::*;

pub type HagridResult<T> = Result<T, StackError>;
