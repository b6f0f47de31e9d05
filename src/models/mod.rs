pub mod createmeta;
pub mod field;
pub mod hierarchy;
pub mod issue_type;
pub mod lookup;
pub mod schema;
pub mod user;

pub use createmeta::*;
pub use field::*;
pub use hierarchy::*;
pub use issue_type::*;
pub use lookup::*;
pub use schema::*;
pub use user::*;
