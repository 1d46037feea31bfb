pub mod core;
pub mod message;
pub mod peer;
pub mod serializer;
pub mod transport;
