pub mod entities;
pub mod notification;
pub mod repositories;
pub mod value_objects;

pub use courier_errors::{DispatchError, DispatchResult};
pub use entities::*;
pub use notification::*;
pub use repositories::*;
pub use value_objects::*;
