//! Domain layer - Pure business logic.

// Source probing and encoder target negotiation
pub mod av;

// DPG container format
pub mod dpg;

// Job definitions
pub mod jobs;
