pub mod endpoints;
pub mod router;
pub mod ws;
