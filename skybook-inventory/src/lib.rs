pub mod hold;
pub mod inventory;
pub mod memory;

pub use hold::SeatHold;
pub use inventory::FlightInventory;
pub use memory::InMemoryFlightRepository;
