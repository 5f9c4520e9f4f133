//! Connector presence and EDID.

use serde::Serialize;
use tracing::debug;

use crate::error::Trigger5Error;
use crate::protocol::{
    EDID_BLOCK_LEN, EDID_EXTENSION_COUNT_OFFSET, REQUEST_GET_EDID, REQUEST_GET_STATUS,
    STATUS_INDEX, STATUS_LEN, STATUS_VALUE,
};
use crate::transport::{ControlRequest, UsbTransport, read_control};

/// Physical output of the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectorType {
    Hdmi,
    Vga,
}

impl ConnectorType {
    /// Adapters that also expose an audio interface drive HDMI.
    pub fn for_interface_count(count: u8) -> Self {
        if count > 1 { Self::Hdmi } else { Self::Vga }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectorStatus {
    Connected,
    Disconnected,
    Unknown,
}

/// Query whether a monitor is attached. A failed query reports
/// [`ConnectorStatus::Unknown`].
pub async fn detect(transport: &dyn UsbTransport) -> ConnectorStatus {
    let req = ControlRequest::vendor_in(REQUEST_GET_STATUS, STATUS_VALUE, STATUS_INDEX);
    match read_control(transport, req, STATUS_LEN).await {
        Ok(reply) if reply.len() >= STATUS_LEN => {
            if reply[1] == 1 {
                ConnectorStatus::Connected
            } else {
                ConnectorStatus::Disconnected
            }
        }
        Ok(reply) => {
            debug!(len = reply.len(), "short connector status reply");
            ConnectorStatus::Unknown
        }
        Err(e) => {
            debug!(error = %e, "connector status query failed");
            ConnectorStatus::Unknown
        }
    }
}

/// Read one 128-byte EDID block.
pub async fn read_edid_block(
    transport: &dyn UsbTransport,
    block: u8,
) -> Result<Vec<u8>, Trigger5Error> {
    let req = ControlRequest::vendor_in(REQUEST_GET_EDID, u16::from(block), 0);
    let data = read_control(transport, req, EDID_BLOCK_LEN).await?;
    if data.len() < EDID_BLOCK_LEN {
        return Err(Trigger5Error::ShortResponse {
            expected: EDID_BLOCK_LEN,
            actual: data.len(),
        });
    }
    Ok(data)
}

/// Read the base EDID block and every extension block it announces.
pub async fn read_edid(transport: &dyn UsbTransport) -> Result<Vec<u8>, Trigger5Error> {
    let mut edid = read_edid_block(transport, 0).await?;
    let extensions = edid[EDID_EXTENSION_COUNT_OFFSET];
    for block in 1..=extensions {
        let data = read_edid_block(transport, block).await?;
        edid.extend_from_slice(&data);
    }
    Ok(edid)
}
