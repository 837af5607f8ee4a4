//! Unix socket client for communicating with dslboostd.

use anyhow::{anyhow, Result};
use dslboost_shared::rpc::{RpcMethod, RpcRequest, RpcResponse};
use dslboost_shared::SOCKET_PATH;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

/// Client for communicating with dslboostd
pub struct DaemonClient {
    stream: UnixStream,
}

impl DaemonClient {
    /// Connect to the daemon socket.
    pub async fn connect() -> Result<Self> {
        Self::connect_to(SOCKET_PATH).await
    }

    pub async fn connect_to(socket_path: &str) -> Result<Self> {
        let path = Path::new(socket_path);
        if !path.exists() {
            return Err(anyhow!(
                "dslboostd is not running.\n\
                 The socket at {} does not exist.\n\
                 Start the daemon first: sudo systemctl start dslboostd",
                socket_path
            ));
        }

        let stream = UnixStream::connect(path).await.map_err(|e| {
            anyhow!(
                "Cannot connect to dslboostd: {}\n\
                 The daemon may have crashed; try: sudo systemctl restart dslboostd",
                e
            )
        })?;

        Ok(Self { stream })
    }

    /// Send an RPC request and return its result, mapping RPC errors into
    /// plain errors.
    pub async fn call(
        &mut self,
        method: RpcMethod,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value> {
        let request = RpcRequest::new(method, params);
        let request_json = serde_json::to_string(&request)?;

        self.stream
            .write_all(format!("{}\n", request_json).as_bytes())
            .await?;

        let (reader, _) = self.stream.split();
        let mut reader = BufReader::new(reader);
        let mut line = String::new();
        reader.read_line(&mut line).await?;

        let response: RpcResponse = serde_json::from_str(&line)?;
        if let Some(error) = response.error {
            return Err(anyhow!("{} (code {})", error.message, error.code));
        }
        response
            .result
            .ok_or_else(|| anyhow!("daemon sent no result"))
    }
}
