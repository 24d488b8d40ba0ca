mod column;
mod data_type;
mod table;
mod tso;

pub use column::*;
pub use data_type::*;
pub use table::*;
pub use tso::*;
