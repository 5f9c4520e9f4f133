//! Vendor protocol constants for Trigger 5 adapters.
//!
//! Request codes, control-transfer addressing and the supported
//! device table. Wire structures live next to their encoders
//! ([`ModeRequest`](crate::mode::ModeRequest),
//! [`FrameHeader`](crate::frame::FrameHeader),
//! [`ModeCatalog`](crate::mode::ModeCatalog)).

// ── USB identifiers ──────────────────────────────────────────────

/// Vendor ID shared by every Trigger 5 adapter.
pub const VENDOR_ID: u16 = 0x0711;

/// First product ID in the supported range.
pub const PRODUCT_ID_FIRST: u16 = 0x5800;

/// Last product ID in the supported range.
pub const PRODUCT_ID_LAST: u16 = 0x583F;

/// Whether `vid:pid` names a supported adapter.
pub fn is_supported(vendor_id: u16, product_id: u16) -> bool {
    vendor_id == VENDOR_ID && (PRODUCT_ID_FIRST..=PRODUCT_ID_LAST).contains(&product_id)
}

// ── Control transfer addressing ──────────────────────────────────

/// bmRequestType: vendor request, device recipient, host-to-device.
pub const REQUEST_TYPE_VENDOR_OUT: u8 = 0x40;
/// bmRequestType: vendor request, device recipient, device-to-host.
pub const REQUEST_TYPE_VENDOR_IN: u8 = 0xC0;

// ── Vendor requests ──────────────────────────────────────────────

/// Read the device mode catalog.
pub const REQUEST_GET_MODE: u8 = 0xA4;
/// Read connector presence.
pub const REQUEST_GET_STATUS: u8 = 0xA6;
/// Read one EDID block; `value` selects the block.
pub const REQUEST_GET_EDID: u8 = 0xA8;
/// Apply a [`ModeRequest`](crate::mode::ModeRequest); `value` is the mode id.
pub const REQUEST_SET_MODE: u8 = 0xC3;

/// One-byte status read bracketing SET_MODE.
pub const REQUEST_MODE_STATUS: u8 = 0xD1;
/// Four-byte register read.
pub const REQUEST_READ_REGISTER: u8 = 0xA5;
/// Four-byte register write.
pub const REQUEST_WRITE_REGISTER: u8 = 0xC4;
/// Four-byte register write, second stage.
pub const REQUEST_LATCH_REGISTER: u8 = 0xC8;

/// `value` of the status read issued after SET_MODE.
pub const MODE_STATUS_AFTER_SET: u16 = 0x0201;
/// Register touched after every mode change.
pub const REGISTER_OUTPUT_CONTROL: u16 = 0xEC34;
/// Value written to [`REGISTER_OUTPUT_CONTROL`].
pub const OUTPUT_CONTROL_ENABLE: [u8; 4] = [0x60, 0x00, 0x00, 0x10];

/// GET_STATUS `value` / `index` observed in captures.
pub const STATUS_VALUE: u16 = 0x00FF;
pub const STATUS_INDEX: u16 = 0x0003;
/// GET_STATUS reply length; byte 1 is the presence flag.
pub const STATUS_LEN: usize = 2;

// ── Bulk ─────────────────────────────────────────────────────────

/// OUT endpoint carrying frame payloads.
pub const BULK_OUT_ENDPOINT: u8 = 0x01;

// ── EDID ─────────────────────────────────────────────────────────

/// Size of one EDID block.
pub const EDID_BLOCK_LEN: usize = 128;
/// Offset of the extension-count byte in the base block.
pub const EDID_EXTENSION_COUNT_OFFSET: usize = 126;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supported_range() {
        assert!(is_supported(0x0711, 0x5800));
        assert!(is_supported(0x0711, 0x5824));
        assert!(is_supported(0x0711, 0x583F));
        assert!(!is_supported(0x0711, 0x5840));
        assert!(!is_supported(0x17e9, 0x5800));
    }
}
