//! Resumable upload and download of objects stored with gnfd storage
//! providers.
//!
//! A [`ClientContext`] carries configuration, the chain service, the
//! provider transport and the checkpoint store. The orchestrators borrow it:
//!
//! - [`UploadOrchestrator`] hashes a payload, creates the object on chain
//!   and sends its segments to the primary provider.
//! - [`DownloadOrchestrator`] fetches whole objects or byte ranges into a
//!   file (resumable) or into memory.
//!
//! Both persist a checkpoint as segments complete, so an interrupted
//! transfer picks up where it stopped.

pub mod chain;
pub mod config;
pub mod context;
pub mod download;
pub mod error;
pub mod fault;
pub mod http;
mod runner;
pub mod signer;
pub mod transport;
pub mod types;
pub mod upload;

pub use chain::{ChainFuture, ChainService};
pub use config::{ClientConfig, ConfigError, TransferOptions};
pub use context::ClientContext;
pub use download::DownloadOrchestrator;
pub use error::ClientError;
pub use fault::{FailSegments, FaultInjector, NoFaults};
pub use http::HttpTransport;
pub use signer::{AuthInfo, RequestSigner};
pub use transport::{HttpMethod, SpRequest, SpResponse, SpTransport, TransportFuture};
pub use types::{
    CreateObjectResult, DownloadOutcome, TransferDescriptor, TransferEvent, UploadOutcome,
};
pub use upload::UploadOrchestrator;
