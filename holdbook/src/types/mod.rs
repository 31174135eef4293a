mod envelope;
mod page;
mod record;

pub use envelope::*;
pub use page::*;
pub use record::*;
