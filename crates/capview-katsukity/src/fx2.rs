//! Cypress FX2 firmware upload over the vendor `0xA0` request.

use std::time::Duration;

use rusb::{DeviceHandle, Direction, Recipient, RequestType, UsbContext};

use crate::error::Result;

const FIRMWARE_LOAD: u8 = 0xA0;
const CPUCS_ADDRESS: u16 = 0xE600;
const FIRMWARE_BASE: u16 = 0x0080;
const CHUNK_SIZE: usize = 1023;

/// Interrupt vector stubs written ahead of the image.
static VECTORS: [(u16, [u8; 3]); 5] = [
    (0x0000, [0x02, 0x09, 0x92]),
    (0x000B, [0x02, 0x0D, 0x9B]),
    (0x0033, [0x02, 0x0D, 0xE9]),
    (0x0043, [0x02, 0x08, 0x00]),
    (0x0053, [0x02, 0x08, 0x00]),
];

/// Address/payload pairs for an upload, in write order.
pub(crate) fn upload_plan(firmware: &[u8]) -> Vec<(u16, &[u8])> {
    let mut plan: Vec<(u16, &[u8])> = VECTORS.iter().map(|(addr, bytes)| (*addr, &bytes[..])).collect();

    let mut address = FIRMWARE_BASE;
    for chunk in firmware.chunks(CHUNK_SIZE) {
        plan.push((address, chunk));
        address = address.wrapping_add(chunk.len() as u16);
    }

    plan
}

/// Hold the 8051 in reset, write the image, release it.
///
/// The chip re-enumerates with the programmed product id afterwards.
pub fn send_firmware<T: UsbContext>(
    handle: &mut DeviceHandle<T>,
    firmware: &[u8],
    timeout: Duration,
) -> Result<()> {
    let request_type = rusb::request_type(Direction::Out, RequestType::Vendor, Recipient::Device);

    handle.set_active_configuration(1)?;
    handle.claim_interface(0)?;

    handle.write_control(request_type, FIRMWARE_LOAD, CPUCS_ADDRESS, 0, &[0x01], timeout)?;
    tracing::debug!("[KATSUKITY] FX2 held in reset");

    let plan = upload_plan(firmware);
    for (address, payload) in &plan {
        handle.write_control(request_type, FIRMWARE_LOAD, *address, 0, payload, timeout)?;
    }
    tracing::info!(
        "[KATSUKITY] FX2 firmware written: {} bytes in {} transfers",
        firmware.len(),
        plan.len()
    );

    handle.write_control(request_type, FIRMWARE_LOAD, CPUCS_ADDRESS, 0, &[0x00], timeout)?;
    tracing::debug!("[KATSUKITY] FX2 released for re-enumeration");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_plan_addresses() {
        let firmware = vec![0xAB; 2500];
        let plan = upload_plan(&firmware);

        assert_eq!(plan.len(), VECTORS.len() + 3);
        assert_eq!(plan[0], (0x0000, &[0x02, 0x09, 0x92][..]));

        let image: Vec<_> = plan[VECTORS.len()..].iter().map(|(a, p)| (*a, p.len())).collect();
        assert_eq!(image, vec![(0x0080, 1023), (0x0080 + 1023, 1023), (0x0080 + 2046, 454)]);
    }

    #[test]
    fn test_upload_plan_empty_image() {
        assert_eq!(upload_plan(&[]).len(), VECTORS.len());
    }
}
