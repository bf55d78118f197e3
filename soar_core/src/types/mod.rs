pub mod types;

pub use types::{
    AuthenticationInfo, Destination, DownloadError, DownloadKind, DownloadRequest, RequestData,
    ResultSlot,
};
