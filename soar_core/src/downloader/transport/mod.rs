pub mod download_transport;
pub mod http_transport;
