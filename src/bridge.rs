//! Host bridge: registration handshake and DMA transport over HTTP.

use std::io::Read;

use log::{info, warn};

use crate::error::{EngineError, Result};

const FIF_PORT: u8 = 0xFD;

pub struct HostBridge {
    host: String,
    callback_url: String,
}

impl HostBridge {
    pub fn new(host: impl Into<String>, callback_url: impl Into<String>) -> Self {
        HostBridge { host: host.into(), callback_url: callback_url.into() }
    }

    /// Best-effort deregister, then register this process as the FIF port
    /// handler. Registration failure is fatal.
    pub fn register(&self) -> Result<()> {
        let _ = self.deregister_inner();

        let url = format!("http://{}/io?p=-{:02X}&b=0x0F", self.host, FIF_PORT);
        let resp = ureq::patch(&url)
            .send_string(&self.callback_url)
            .map_err(|e| EngineError::HostUnreachable { host: self.host.clone(), source: e.to_string() })?;

        if resp.status() != 200 {
            return Err(EngineError::RegistrationRejected { host: self.host.clone(), status: resp.status() });
        }
        info!("registered on port {FIF_PORT:02X}h to {}", self.host);
        Ok(())
    }

    pub fn deregister(&self) {
        if let Err(e) = self.deregister_inner() {
            warn!("deregister failed: {e}");
        }
    }

    fn deregister_inner(&self) -> Result<()> {
        let url = format!("http://{}/io?p={:02X}", self.host, FIF_PORT);
        ureq::delete(&url)
            .call()
            .map_err(|e| EngineError::HostUnreachable { host: self.host.clone(), source: e.to_string() })?;
        Ok(())
    }

    /// `GET /dma?m=<addr>&n=<len>`, returning exactly `len` raw bytes.
    pub fn dma_get(&self, addr: u16, len: usize) -> Result<Vec<u8>> {
        let url = format!("http://{}/dma?m={:04X}&n={:02X}", self.host, addr, len);
        let resp = ureq::get(&url)
            .call()
            .map_err(|e| EngineError::Dma { source: e.to_string() })?;

        let mut buf = Vec::with_capacity(len);
        resp.into_reader()
            .take(len as u64)
            .read_to_end(&mut buf)
            .map_err(|e| EngineError::Dma { source: e.to_string() })?;
        Ok(buf)
    }

    /// `PUT /dma?m=<addr>` with `data` as the raw body.
    pub fn dma_put(&self, addr: u16, data: &[u8]) -> Result<()> {
        let url = format!("http://{}/dma?m={:04X}", self.host, addr);
        ureq::put(&url)
            .send_bytes(data)
            .map_err(|e| EngineError::Dma { source: e.to_string() })?;
        Ok(())
    }
}
