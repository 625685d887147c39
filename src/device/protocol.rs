//! N4/AKP05E device constants
//!
//! Display index mapping (for set_button_image):
//!   - Top row (5 keys):    display keys 10-14
//!   - Bottom row (5 keys): display keys 5-9
//!   - Touch strip:         display key 0 (full 800x128 image)
//!
//! Input mapping:
//!   - Top row:    IDs 0x01-0x05 → keys 0-4
//!   - Bottom row: IDs 0x06-0x0a → keys 5-9
//!   - Strip soft buttons: IDs 0x40-0x43 → touches over dials 0-3

/// Key image dimensions (N4 uses 112x112 for square LCD keys)
pub const KEY_WIDTH: u32 = 112;
pub const KEY_HEIGHT: u32 = 112;

/// Touch strip dimensions; each dial owns a quarter
pub const STRIP_WIDTH: u32 = 800;
pub const STRIP_HEIGHT: u32 = 128;

/// Keys with an LCD face
pub const KEY_COUNT: usize = 10;

/// Addressable displays as counted by the HID protocol (keys plus strip slots)
pub const DISPLAY_COUNT: usize = 15;

/// Rotary encoders
pub const ENCODER_COUNT: usize = 4;

/// USB Vendor ID for AJAZZ/Mirabox (HOTSPOTEKUSB)
pub const VENDOR_ID: u16 = 0x0300;

/// USB Product ID for AKP05E/N4
pub const PRODUCT_ID: u16 = 0x3004;

/// Convert a key index (0-9) to the device display key
#[inline]
pub fn key_to_display_key(key: usize) -> u8 {
    if key < 5 {
        key as u8 + 10
    } else {
        key as u8
    }
}

/// Horizontal strip position at the centre of a dial's slice
#[inline]
pub fn dial_slot_center(dial: usize) -> u32 {
    let slot = STRIP_WIDTH / ENCODER_COUNT as u32;
    dial as u32 * slot + slot / 2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_to_display_key() {
        assert_eq!(key_to_display_key(0), 10);
        assert_eq!(key_to_display_key(4), 14);
        assert_eq!(key_to_display_key(5), 5);
        assert_eq!(key_to_display_key(9), 9);
    }

    #[test]
    fn test_dial_slot_center() {
        assert_eq!(dial_slot_center(0), 100);
        assert_eq!(dial_slot_center(3), 700);
    }
}
