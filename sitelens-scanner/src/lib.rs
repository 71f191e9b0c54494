pub mod capture;
pub mod chrome;
pub mod error;
pub mod http;
pub mod pool;
pub mod renderer;
pub mod snapshot;
pub mod whois;

pub use capture::PageCapture;
pub use chrome::ChromeRenderer;
pub use error::{CaptureError, LookupError, MalformedSignal};
pub use http::HttpRenderer;
pub use pool::{ContextLease, ContextPool};
pub use renderer::{Engine, EngineKind, Renderer};
pub use snapshot::{
    Cookie, RawPageSnapshot, RequestRecord, ResponseRecord, ScriptAsset, StyleAsset, StyleAssets,
};
pub use whois::{RawRegistryRecord, RegistryLookup, WhoisClient};
