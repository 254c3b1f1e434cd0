pub mod payments;
pub mod rentals;
pub mod table_service;
