//! Domain core: variation taxonomy, variant expansion, cart pricing, and
//! the order model. Pure and synchronous; persistence lives in `store`.

pub mod aggregates;
pub mod events;
pub mod value_objects;
pub mod variations;
