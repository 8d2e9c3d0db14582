pub mod types;
pub mod registry;
pub mod actions;
pub mod layout;
pub mod defaults;
pub mod validator;

pub use types::*;
pub use registry::*;
pub use actions::*;
pub use layout::*;
pub use defaults::*;
pub use validator::*;
