pub mod intent;
pub mod loyalty;
pub mod plan;
pub mod reservation;
pub mod restaurant;
pub mod session;
pub mod slot;
pub mod venue;
