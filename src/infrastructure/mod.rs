pub mod clock;
pub mod http_client_factory;
pub mod observability;
pub mod sources;
