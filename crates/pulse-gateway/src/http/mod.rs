pub mod events;
pub mod gaps;
pub mod health;
