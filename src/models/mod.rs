mod order;
mod payment_record;
mod ticket;

pub use order::*;
pub use payment_record::*;
pub use ticket::*;
