pub mod download_manager;
pub mod transport;

pub use download_manager::DownloadManager;
pub use transport::download_transport::Transport;
pub use transport::http_transport::HttpTransport;
