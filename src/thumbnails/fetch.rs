use std::io::Read;
use std::time::Duration;

use crate::error::{Error, Result};

/// Largest thumbnail body we are willing to buffer.
const MAX_BYTES: u64 = 8 * 1024 * 1024;

/// Where thumbnail bytes come from.
pub trait ThumbnailFetcher: Send + Sync {
    fn fetch(&self, reference: &str) -> Result<Vec<u8>>;
}

/// Fetches thumbnails over HTTP(S).
pub struct HttpThumbnailFetcher {
    agent: ureq::Agent,
}

impl HttpThumbnailFetcher {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .build();
        Self { agent }
    }
}

impl ThumbnailFetcher for HttpThumbnailFetcher {
    fn fetch(&self, reference: &str) -> Result<Vec<u8>> {
        let response = self.agent.get(reference).call().map_err(classify)?;
        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(MAX_BYTES)
            .read_to_end(&mut bytes)
            .map_err(|e| Error::TransientNetwork(e.to_string()))?;
        Ok(bytes)
    }
}

fn classify(error: ureq::Error) -> Error {
    match error {
        ureq::Error::Status(code, _) => match code {
            408 | 429 | 500 | 502 | 503 | 504 => Error::TransientNetwork(format!("HTTP {code}")),
            _ => Error::PermanentResolution(format!("HTTP {code}")),
        },
        ureq::Error::Transport(transport) => Error::TransientNetwork(transport.to_string()),
    }
}
