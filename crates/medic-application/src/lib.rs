//! Application services for the MEDIC client.
//!
//! This crate wires the domain layer (`medic-core`) to the transport
//! collaborators (`medic-transport`) and owns the session store instance
//! the presentation layer reads from.

pub mod consultation;

pub use consultation::ConsultationService;
