//! TCP connection to the store.
//!
//! # Example
//!
//! ```ignore
//! use respwire_client::transport::connect;
//!
//! let stream = connect("localhost", 6379).await?;
//! let (reader, writer) = stream.into_split();
//! ```

use tokio::net::TcpStream;

use crate::error::{RespwireError, Result};

/// Open a TCP connection to `host:port`.
///
/// Resolution failures, refusals and resets all surface as
/// [`RespwireError::Connection`]; there is no retry.
pub async fn connect(host: &str, port: u16) -> Result<TcpStream> {
    let addr = format!("{}:{}", host, port);

    let stream = TcpStream::connect((host, port))
        .await
        .map_err(|source| RespwireError::Connection {
            addr: addr.clone(),
            source,
        })?;

    // Commands are small; don't hold them back for coalescing.
    stream
        .set_nodelay(true)
        .map_err(|source| RespwireError::Connection { addr, source })?;

    Ok(stream)
}
